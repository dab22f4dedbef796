use crate::sim::{EventCtx, Model, SimTime, Simulator};

#[derive(Default)]
struct CounterModel {
    log: Vec<(usize, u32)>,
    reversed: Vec<(usize, u32)>,
    child_delay: f64,
}

impl Model for CounterModel {
    type Msg = u32;

    fn forward(&mut self, lp: usize, msg: &mut u32, ctx: &mut EventCtx<'_, u32>) {
        self.log.push((lp, *msg));
        // 事件 1 派生事件 2
        if *msg == 1 {
            ctx.schedule_self(self.child_delay, 2);
        }
    }

    fn reverse(&mut self, lp: usize, msg: &mut u32, _ctx: &mut EventCtx<'_, u32>) {
        self.reversed.push((lp, *msg));
        let popped = self.log.pop();
        assert_eq!(popped, Some((lp, *msg)));
    }
}

#[test]
fn events_execute_in_time_then_seq_order() {
    let mut sim: Simulator<u32> = Simulator::new(2, 1, 0.5);
    let mut model = CounterModel::default();
    sim.schedule(0, SimTime(10.0), 10);
    sim.schedule(1, SimTime(5.0), 20);
    sim.schedule(0, SimTime(10.0), 30);
    sim.run(&mut model);
    assert_eq!(model.log, vec![(1, 20), (0, 10), (0, 30)]);
    assert_eq!(sim.now(), SimTime(10.0));
    assert_eq!(sim.executed_events(), 3);
}

#[test]
fn run_until_stops_before_later_events_and_advances_time() {
    let mut sim: Simulator<u32> = Simulator::new(1, 1, 0.5);
    let mut model = CounterModel::default();
    sim.schedule(0, SimTime(1.0), 1);
    sim.schedule(0, SimTime(100.0), 9);
    model.child_delay = 1.0;
    sim.run_until(SimTime(50.0), &mut model);
    assert_eq!(model.log, vec![(0, 1), (0, 2)]);
    assert_eq!(sim.now(), SimTime(50.0));
    sim.run(&mut model);
    assert_eq!(model.log.last(), Some(&(0, 9)));
}

#[test]
fn rollback_cancels_children_and_replays_deterministically() {
    let mut sim: Simulator<u32> = Simulator::new(1, 1, 0.5);
    let mut model = CounterModel {
        child_delay: 10.0,
        ..CounterModel::default()
    };
    sim.set_record(true);
    sim.schedule(0, SimTime(10.0), 1);
    sim.run_until(SimTime(15.0), &mut model);
    assert_eq!(model.log, vec![(0, 1)]);
    assert_eq!(sim.queue_len(), 1);

    sim.rollback_to(SimTime(5.0), &mut model);
    assert_eq!(model.reversed, vec![(0, 1)]);
    assert!(model.log.is_empty());
    // 派生事件被取消，原事件回到队列
    assert_eq!(sim.queue_len(), 1);

    sim.run(&mut model);
    assert_eq!(model.log, vec![(0, 1), (0, 2)]);
}

#[test]
fn commit_discards_processed_prefix() {
    let mut sim: Simulator<u32> = Simulator::new(1, 1, 0.5);
    let mut model = CounterModel::default();
    sim.set_record(true);
    sim.schedule(0, SimTime(1.0), 5);
    sim.schedule(0, SimTime(2.0), 6);
    sim.run(&mut model);
    sim.commit(SimTime(1.5));
    sim.rollback_to(SimTime(1.5), &mut model);
    assert_eq!(model.reversed, vec![(0, 6)]);
    sim.run(&mut model);
    assert_eq!(model.log, vec![(0, 5), (0, 6)]);
}

#[test]
fn per_lp_rng_streams_are_independent_of_dispatch_order() {
    let sim_a: Simulator<u32> = Simulator::new(4, 99, 0.5);
    let sim_b: Simulator<u32> = Simulator::new(4, 99, 0.5);
    for lp in 0..4 {
        assert_eq!(sim_a.rng_position(lp), 0);
        assert_eq!(sim_b.rng_position(lp), 0);
    }
}
