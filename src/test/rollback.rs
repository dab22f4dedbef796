use super::util::build_sim_seeded;
use crate::mpi::{MpiOp, PendingWait};
use crate::net::TerminalMsg;
use crate::net::params::{RoutingAlgo, VcState};
use crate::sim::{SimTime, Simulator};
use crate::stats;
use crate::world::World;

#[derive(Debug, PartialEq)]
struct EndpointSnap {
    arrival: Vec<(i32, i32, u64, i32)>,
    pending: Vec<(i32, i32, u64, i32)>,
    completed: Vec<i32>,
    wait: Option<PendingWait>,
    counters: [u64; 9],
    times: [f64; 5],
    nic_occupancy: Vec<u32>,
    nic_states: Vec<VcState>,
    nic_packets: u64,
    rng_pos: u64,
}

#[derive(Debug, PartialEq)]
struct RouterSnap {
    occupancy: Vec<u32>,
    states: Vec<VcState>,
    out_avail: Vec<SimTime>,
    credit_avail: Vec<SimTime>,
    cur_hist: Vec<u32>,
    prev_hist: Vec<u32>,
    total_hops: u64,
    rng_pos: u64,
}

fn snap_endpoint(world: &World, sim: &Simulator<TerminalMsg>, lp: usize) -> EndpointSnap {
    let s = world.endpoint(lp);
    let key = |e: &crate::mpi::QueueEntry| (e.source_rank, e.tag, e.bytes, e.req_id);
    EndpointSnap {
        arrival: s.arrival_queue.iter().map(key).collect(),
        pending: s.pending_recvs_queue.iter().map(key).collect(),
        completed: s.completed_reqs.iter().copied().collect(),
        wait: s.wait_op.clone(),
        counters: [
            s.num_sends,
            s.num_recvs,
            s.num_cols,
            s.num_delays,
            s.num_wait,
            s.num_waitall,
            s.num_waitsome,
            s.num_bytes_sent,
            s.num_bytes_recvd,
        ],
        times: [
            s.elapsed_time,
            s.compute_time,
            s.send_time,
            s.recv_time,
            s.wait_time,
        ],
        nic_occupancy: s.nic.vc_occupancy.clone(),
        nic_states: s.nic.vc_state.clone(),
        nic_packets: s.nic.packet_counter,
        rng_pos: sim.rng_position(lp),
    }
}

fn snap_router(world: &World, sim: &Simulator<TerminalMsg>, lp: usize) -> RouterSnap {
    let r = world.router(lp);
    RouterSnap {
        occupancy: r.vc_occupancy.clone(),
        states: r.vc_state.clone(),
        out_avail: r.next_output_available_time.clone(),
        credit_avail: r.next_credit_available_time.clone(),
        cur_hist: r.cur_hist_num.clone(),
        prev_hist: r.prev_hist_num.clone(),
        total_hops: r.total_hops,
        rng_pos: sim.rng_position(lp),
    }
}

fn busy_workload() -> Vec<Vec<MpiOp>> {
    vec![
        vec![
            MpiOp::Isend {
                src: 0,
                dest: 1,
                tag: 1,
                bytes: 1024,
                req_id: 1,
            },
            MpiOp::Irecv {
                src: 1,
                dest: 0,
                tag: 2,
                bytes: 512,
                req_id: 2,
            },
            MpiOp::Delay { seconds: 2e-6 },
            MpiOp::Waitall {
                req_ids: vec![1, 2],
            },
            MpiOp::Send {
                src: 0,
                dest: 2,
                tag: 3,
                bytes: 256,
                req_id: 0,
            },
        ],
        vec![
            MpiOp::Irecv {
                src: 0,
                dest: 1,
                tag: 1,
                bytes: 1024,
                req_id: 3,
            },
            MpiOp::Delay { seconds: 1e-6 },
            MpiOp::Isend {
                src: 1,
                dest: 0,
                tag: 2,
                bytes: 512,
                req_id: 4,
            },
            MpiOp::Waitall {
                req_ids: vec![3, 4],
            },
            MpiOp::Send {
                src: 1,
                dest: 2,
                tag: 4,
                bytes: 64,
                req_id: 0,
            },
        ],
        vec![
            MpiOp::Recv {
                src: 0,
                dest: 2,
                tag: 3,
                bytes: 256,
                req_id: 0,
            },
            MpiOp::Irecv {
                src: -1,
                dest: 2,
                tag: 4,
                bytes: 64,
                req_id: 7,
            },
            MpiOp::Wait { req_id: 7 },
        ],
    ]
}

#[test]
fn rollback_restores_every_lp_byte_for_byte() {
    let (mut sim, mut world) = build_sim_seeded(busy_workload(), RoutingAlgo::Minimal, 77);
    sim.set_record(true);

    let t0 = SimTime(3_000.0);
    sim.run_until(t0, &mut world);

    let endpoint_lps: Vec<usize> = world
        .endpoints()
        .filter(|(_, s)| s.active)
        .map(|(lp, _)| lp)
        .collect();
    let router_lps: Vec<usize> = world.routers().map(|(lp, _)| lp).collect();

    let endpoints_before: Vec<EndpointSnap> = endpoint_lps
        .iter()
        .map(|&lp| snap_endpoint(&world, &sim, lp))
        .collect();
    let routers_before: Vec<RouterSnap> = router_lps
        .iter()
        .map(|&lp| snap_router(&world, &sim, lp))
        .collect();

    sim.run_until(SimTime(50_000.0), &mut world);
    sim.rollback_to(t0, &mut world);

    let endpoints_after: Vec<EndpointSnap> = endpoint_lps
        .iter()
        .map(|&lp| snap_endpoint(&world, &sim, lp))
        .collect();
    let routers_after: Vec<RouterSnap> = router_lps
        .iter()
        .map(|&lp| snap_router(&world, &sim, lp))
        .collect();

    assert_eq!(endpoints_before, endpoints_after);
    assert_eq!(routers_before, routers_after);
}

#[test]
fn rollback_then_replay_matches_a_pure_sequential_run() {
    let (mut seq_sim, mut seq_world) = build_sim_seeded(busy_workload(), RoutingAlgo::Minimal, 77);
    seq_sim.run(&mut seq_world);
    let seq_reports = stats::endpoint_reports(&seq_world);

    let (mut opt_sim, mut opt_world) = build_sim_seeded(busy_workload(), RoutingAlgo::Minimal, 77);
    opt_sim.set_record(true);
    opt_sim.run_until(SimTime(50_000.0), &mut opt_world);
    opt_sim.rollback_to(SimTime(2_500.0), &mut opt_world);
    opt_sim.run(&mut opt_world);
    let opt_reports = stats::endpoint_reports(&opt_world);

    assert_eq!(seq_reports.len(), opt_reports.len());
    for (a, b) in seq_reports.iter().zip(&opt_reports) {
        assert_eq!(stats::stats_line(a), stats::stats_line(b));
        assert_eq!(a.recv_time, b.recv_time);
        assert_eq!(a.wait_time, b.wait_time);
        assert_eq!(a.elapsed_time, b.elapsed_time);
    }

    assert!(seq_world.network_quiescent());
    assert!(opt_world.network_quiescent());
}

#[test]
fn rollback_to_time_zero_resets_the_run_completely() {
    let (mut sim, mut world) = build_sim_seeded(busy_workload(), RoutingAlgo::Minimal, 13);
    sim.set_record(true);

    let endpoint_lps: Vec<usize> = world
        .endpoints()
        .filter(|(_, s)| s.active)
        .map(|(lp, _)| lp)
        .collect();
    let fresh: Vec<EndpointSnap> = endpoint_lps
        .iter()
        .map(|&lp| snap_endpoint(&world, &sim, lp))
        .collect();

    sim.run_until(SimTime(50_000.0), &mut world);
    sim.rollback_to(SimTime(-1.0), &mut world);

    let rewound: Vec<EndpointSnap> = endpoint_lps
        .iter()
        .map(|&lp| snap_endpoint(&world, &sim, lp))
        .collect();
    assert_eq!(fresh, rewound);

    sim.run(&mut world);
    assert!(world.network_quiescent());
}
