use crate::config::SimConfig;
use crate::mpi::MpiOp;
use crate::net::TerminalMsg;
use crate::net::params::{DragonflyParams, RoutingAlgo};
use crate::sim::Simulator;
use crate::workload::{JobAlloc, TraceWorkload};
use crate::world::World;

pub const TEST_SEED: u64 = 0x5EED;

pub fn build_sim(
    ranks: Vec<Vec<MpiOp>>,
    routing: RoutingAlgo,
) -> (Simulator<TerminalMsg>, World) {
    build_sim_seeded(ranks, routing, TEST_SEED)
}

pub fn build_sim_seeded(
    ranks: Vec<Vec<MpiOp>>,
    routing: RoutingAlgo,
    seed: u64,
) -> (Simulator<TerminalMsg>, World) {
    let cfg = SimConfig::default();
    let mut dcfg = cfg.dragonfly.clone();
    dcfg.routing = routing;
    let params = DragonflyParams::from_config(&dcfg).expect("valid test params");

    let num_ranks = ranks.len();
    let mut workload = TraceWorkload::new();
    for ops in ranks {
        workload.push_rank(ops);
    }
    let alloc = JobAlloc::identity(num_ranks);

    let mut world = World::new(params, Box::new(workload), alloc, cfg.noise, false);
    let mut sim = Simulator::new(world.mapping.num_lps(), seed, cfg.lookahead);
    world.prime(&mut sim);
    (sim, world)
}

/// Pads the rank list with idle (End-only) ranks up to `len` so sends can
/// target far-away terminals.
pub fn pad_ranks(mut ranks: Vec<Vec<MpiOp>>, len: usize) -> Vec<Vec<MpiOp>> {
    while ranks.len() < len {
        ranks.push(Vec::new());
    }
    ranks
}
