//! 仿真器
//!
//! 事件驱动仿真器：维护当前时间、事件队列与每个 LP 的可逆随机流。
//! 录制模式下保留已执行事件，支持将推测执行回滚到 GVT 之前重放。

use super::event::{NO_CAUSE, ScheduledEvent};
use super::rng::{ReversibleRng, mix64};
use super::time::SimTime;
use std::collections::{BinaryHeap, VecDeque};
use tracing::{debug, trace};

/// 模型：按 LP 分派前向/逆向事件处理。
pub trait Model {
    type Msg;

    fn forward(&mut self, lp: usize, msg: &mut Self::Msg, ctx: &mut EventCtx<'_, Self::Msg>);
    fn reverse(&mut self, lp: usize, msg: &mut Self::Msg, ctx: &mut EventCtx<'_, Self::Msg>);
}

/// 处理器可见的引擎接口：时钟、调度与本 LP 的随机流。
pub struct EventCtx<'a, M> {
    now: SimTime,
    gvt: SimTime,
    lookahead: f64,
    self_lp: usize,
    rng: &'a mut ReversibleRng,
    out: &'a mut Vec<(usize, f64, M)>,
}

impl<M> EventCtx<'_, M> {
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 提交线：之下的事件不再回滚。
    pub fn gvt(&self) -> SimTime {
        self.gvt
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn self_lp(&self) -> usize {
        self.self_lp
    }

    pub fn schedule(&mut self, dest: usize, delay_ns: f64, msg: M) {
        debug_assert!(delay_ns >= 0.0, "negative event delay");
        self.out.push((dest, delay_ns, msg));
    }

    pub fn schedule_self(&mut self, delay_ns: f64, msg: M) {
        let lp = self.self_lp;
        self.schedule(lp, delay_ns, msg);
    }

    pub fn rand_uniform(&mut self) -> f64 {
        self.rng.uniform()
    }

    pub fn rand_exponential(&mut self, mean: f64) -> f64 {
        self.rng.exponential(mean)
    }

    pub fn rand_integer(&mut self, lo: u64, hi: u64) -> u64 {
        self.rng.integer(lo, hi)
    }

    /// 撤销最近一次随机抽取；逆向处理器必须与前向的抽取次数一一配对。
    pub fn rand_reverse(&mut self) {
        self.rng.reverse();
    }

    /// 本地投递小延迟（一次随机抽取），与 `local_latency_reverse` 配对。
    pub fn local_latency(&mut self) -> f64 {
        self.lookahead + 0.1 + self.rng.uniform()
    }

    pub fn local_latency_reverse(&mut self) {
        self.rng.reverse();
    }
}

struct ProcessedEvent<M> {
    at: SimTime,
    seq: u64,
    cause: u64,
    dest: usize,
    msg: M,
}

pub struct Simulator<M> {
    now: SimTime,
    gvt: SimTime,
    lookahead: f64,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent<M>>,
    rngs: Vec<ReversibleRng>,
    record: bool,
    processed: VecDeque<ProcessedEvent<M>>,
    executed: u64,
    out_buf: Vec<(usize, f64, M)>,
}

impl<M> Simulator<M> {
    pub fn new(num_lps: usize, master_seed: u64, lookahead: f64) -> Self {
        let rngs = (0..num_lps)
            .map(|lp| ReversibleRng::new(master_seed ^ mix64(lp as u64)))
            .collect();
        Self {
            now: SimTime::ZERO,
            gvt: SimTime::ZERO,
            lookahead,
            next_seq: 0,
            q: BinaryHeap::new(),
            rngs,
            record: false,
            processed: VecDeque::new(),
            executed: 0,
            out_buf: Vec::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn executed_events(&self) -> u64 {
        self.executed
    }

    pub fn queue_len(&self) -> usize {
        self.q.len()
    }

    /// 录制模式：保留已执行事件以便回滚。
    pub fn set_record(&mut self, on: bool) {
        self.record = on;
    }

    pub fn rng_position(&self, lp: usize) -> u64 {
        self.rngs[lp].position()
    }

    /// 初始事件注入（无父事件）。
    pub fn schedule(&mut self, dest: usize, at: SimTime, msg: M) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at,
            seq,
            cause: NO_CAUSE,
            dest,
            msg,
        });
    }

    fn execute_one<Md: Model<Msg = M>>(&mut self, model: &mut Md) -> bool {
        let Some(item) = self.q.pop() else {
            return false;
        };
        let ScheduledEvent {
            at,
            seq,
            cause,
            dest,
            mut msg,
        } = item;
        self.now = at;
        if !self.record {
            // 顺序执行时提交线即当前时刻。
            self.gvt = at;
        }
        self.executed += 1;
        trace!(seq, dest, now = self.now.0, "执行事件");

        let mut ctx = EventCtx {
            now: self.now,
            gvt: self.gvt,
            lookahead: self.lookahead,
            self_lp: dest,
            rng: &mut self.rngs[dest],
            out: &mut self.out_buf,
        };
        model.forward(dest, &mut msg, &mut ctx);

        for (child_dest, delay, child_msg) in self.out_buf.drain(..) {
            let child_seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            self.q.push(ScheduledEvent {
                at: self.now + delay,
                seq: child_seq,
                cause: seq,
                dest: child_dest,
                msg: child_msg,
            });
        }

        if self.record {
            self.processed.push_back(ProcessedEvent {
                at,
                seq,
                cause,
                dest,
                msg,
            });
        }
        true
    }

    /// 运行直到事件队列为空。
    pub fn run<Md: Model<Msg = M>>(&mut self, model: &mut Md) {
        debug!(queue = self.q.len(), "仿真开始");
        while self.execute_one(model) {}
        debug!(events = self.executed, final_time = self.now.0, "仿真结束");
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until<Md: Model<Msg = M>>(&mut self, until: SimTime, model: &mut Md) {
        while let Some(top) = self.q.peek() {
            if top.at > until {
                break;
            }
            self.execute_one(model);
        }
        self.now = self.now.max(until);
    }

    /// 将 `gvt` 之后的推测执行全部撤销：按执行逆序取消其派生事件、
    /// 调用逆向处理器恢复 LP 状态，并把事件放回队列等待重放。
    pub fn rollback_to<Md: Model<Msg = M>>(&mut self, gvt: SimTime, model: &mut Md) {
        assert!(self.record, "rollback requires recording mode");
        let mut undone = 0u64;
        while self
            .processed
            .back()
            .is_some_and(|p| p.at > gvt)
        {
            let ProcessedEvent {
                at,
                seq,
                cause,
                dest,
                mut msg,
            } = self.processed.pop_back().expect("checked non-empty");

            // 该事件派生且尚未执行的事件一并取消。
            self.q.retain(|ev| ev.cause != seq);

            self.now = at;
            let mut ctx = EventCtx {
                now: at,
                gvt: self.gvt,
                lookahead: self.lookahead,
                self_lp: dest,
                rng: &mut self.rngs[dest],
                out: &mut self.out_buf,
            };
            model.reverse(dest, &mut msg, &mut ctx);
            debug_assert!(self.out_buf.is_empty(), "reverse handler scheduled events");

            self.q.push(ScheduledEvent {
                at,
                seq,
                cause,
                dest,
                msg,
            });
            undone += 1;
        }
        self.now = self
            .processed
            .back()
            .map(|p| p.at)
            .unwrap_or(SimTime::ZERO);
        debug!(undone, gvt = gvt.0, "回滚完成");
    }

    /// 推进提交线，释放已提交的事件记录。
    pub fn commit(&mut self, gvt: SimTime) {
        self.gvt = gvt;
        while self.processed.front().is_some_and(|p| p.at < gvt) {
            self.processed.pop_front();
        }
    }
}
