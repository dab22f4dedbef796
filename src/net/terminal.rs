//! 终端（计算节点网卡）
//!
//! 把一条 MPI 消息切成 chunk 注入网络，末 chunk 到达时向端点投递负载；
//! 与挂接路由器之间走信用流控。

use super::mapping::DragonflyMapping;
use super::message::{EventKind, LastHop, PathType, TerminalMsg};
use super::params::{DragonflyParams, VcState};
use super::router::CREDIT_SIZE;
use crate::sim::{EventCtx, SimTime};

type Ctx<'a> = EventCtx<'a, TerminalMsg>;

/// 端点的网卡侧状态。
#[derive(Debug)]
pub struct NicState {
    pub terminal_id: usize,
    /// 挂接路由器（全局编号）。
    pub router_id: usize,
    pub packet_counter: u64,

    pub vc_occupancy: Vec<u32>,
    pub vc_state: Vec<VcState>,
    pub terminal_available_time: SimTime,
    pub next_credit_available_time: SimTime,

    pub finished_packets: u64,
    pub total_packet_time: f64,
    pub max_packet_time: f64,
    pub minimal_count: u64,
    pub nonmin_count: u64,
}

impl NicState {
    pub fn new(terminal_id: usize, p: &DragonflyParams) -> Self {
        Self {
            terminal_id,
            router_id: terminal_id / p.num_cn,
            packet_counter: 0,
            vc_occupancy: vec![0; p.num_vcs],
            vc_state: vec![VcState::Idle; p.num_vcs],
            terminal_available_time: SimTime::ZERO,
            next_credit_available_time: SimTime::ZERO,
            finished_packets: 0,
            total_packet_time: 0.0,
            max_packet_time: 0.0,
            minimal_count: 0,
            nonmin_count: 0,
        }
    }

    pub fn quiescent(&self) -> bool {
        self.vc_occupancy.iter().all(|&o| o == 0)
            && self.vc_state.iter().all(|&s| s == VcState::Idle)
    }
}

/// T_GENERATE：为当前 chunk 占位并排出 T_SEND；还有剩余 chunk 就再排一个生成事件。
pub fn packet_generate(
    nic: &mut NicState,
    p: &DragonflyParams,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    let num_chunks = p.num_chunks(msg.packet_size);
    msg.num_chunks = num_chunks;
    msg.packet_id = ctx.rand_integer(0, u64::MAX >> 1);
    msg.travel_start_time = ctx.now();

    let ts = ctx.local_latency();

    let chan = (0..p.num_vcs)
        .find(|&j| nic.vc_occupancy[j] < p.cn_vc_size)
        .unwrap_or_else(|| {
            panic!(
                "terminal {} compute-node VCs exhausted (occupancy {})",
                nic.terminal_id, nic.vc_occupancy[0]
            )
        });
    msg.vc_index = chan as u32;

    let mut m = msg.clone();
    m.kind = EventKind::TSend;
    m.flags.clear();
    ctx.schedule_self(ts, m);

    if msg.chunk_id < num_chunks - 1 {
        msg.flags.c1 = true;
        // 生成事件略微落后于发送事件
        let ts_gen = ts + ctx.local_latency();
        let mut g = msg.clone();
        g.kind = EventKind::TGenerate;
        g.chunk_id += 1;
        g.flags.clear();
        ctx.schedule_self(ts_gen, g);
    }
}

pub fn packet_generate_rc(msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    ctx.rand_reverse();
    ctx.local_latency_reverse();
    if msg.flags.c1 {
        ctx.local_latency_reverse();
    }
}

/// T_SEND：把 chunk 发往挂接路由器；末 chunk 时给端点一个本地发出回执。
pub fn packet_send(
    nic: &mut NicState,
    p: &DragonflyParams,
    map: &DragonflyMapping,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    let vc = msg.vc_index as usize;

    msg.save.available_time = nic.terminal_available_time;
    let head_delay = (1.0 / p.cn_bandwidth) * p.chunk_size as f64;
    let ts = head_delay + ctx.rand_exponential(head_delay / 200.0);
    let t = nic.terminal_available_time.max(ctx.now()) + ts;
    nic.terminal_available_time = t;

    let mut m = msg.clone();
    m.kind = EventKind::RArrive;
    m.flags.clear();
    m.origin_router_id = nic.router_id as u32;
    m.src_terminal = ctx.self_lp();
    m.last_hop = LastHop::Terminal;
    m.local_id = nic.terminal_id as u32;
    m.intm_group_id = -1;
    m.path_type = PathType::Unset;
    m.vc_index = vc as u32;
    ctx.schedule(map.router_lp(nic.router_id), t - ctx.now(), m);

    if msg.chunk_id == msg.num_chunks - 1 {
        let mut posted = TerminalMsg::new(EventKind::MpiSendPosted);
        posted.op_kind = msg.op_kind;
        posted.src_rank = msg.src_rank;
        posted.dest_rank = msg.dest_rank;
        posted.tag = msg.tag;
        posted.bytes = msg.bytes;
        posted.req_id = msg.req_id;
        posted.sim_start_time = msg.sim_start_time;
        ctx.schedule_self(ctx.lookahead() + 0.1, posted);
    }

    nic.packet_counter += 1;
    nic.vc_occupancy[vc] += 1;
    if nic.vc_occupancy[vc] >= p.cn_vc_size {
        nic.vc_state[vc] = VcState::Credit;
    }
}

pub fn packet_send_rc(nic: &mut NicState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    nic.terminal_available_time = msg.save.available_time;
    ctx.rand_reverse();
    let vc = msg.vc_index as usize;
    nic.vc_occupancy[vc] -= 1;
    nic.packet_counter -= 1;
    nic.vc_state[vc] = VcState::Idle;
}

/// T_ARRIVE：回信用给上游路由器；末 chunk 时把 MPI 负载交给端点状态机并记延迟统计。
pub fn packet_arrive(
    nic: &mut NicState,
    p: &DragonflyParams,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    if msg.chunk_id == msg.num_chunks - 1 {
        nic.finished_packets += 1;
        match msg.path_type {
            PathType::Minimal => nic.minimal_count += 1,
            PathType::NonMinimal => nic.nonmin_count += 1,
            PathType::Unset => {}
        }
        let latency = ctx.now() - msg.travel_start_time;
        nic.total_packet_time += latency;
        if latency > nic.max_packet_time {
            msg.flags.c3 = true;
            msg.save.max_latency = nic.max_packet_time;
            nic.max_packet_time = latency;
        }

        let mut arrived = TerminalMsg::new(EventKind::MpiSendArrived);
        arrived.op_kind = msg.op_kind;
        arrived.src_rank = msg.src_rank;
        arrived.dest_rank = msg.dest_rank;
        arrived.tag = msg.tag;
        arrived.bytes = msg.bytes;
        arrived.req_id = msg.req_id;
        arrived.sim_start_time = msg.sim_start_time;
        arrived.sender_lp = msg.sender_lp;
        ctx.schedule_self(ctx.lookahead() + 0.1, arrived);
    }

    let credit_delay = (1.0 / p.cn_bandwidth) * CREDIT_SIZE;
    let ts = credit_delay + 0.1 + ctx.rand_exponential(credit_delay / 1000.0);
    msg.save.credit_time = nic.next_credit_available_time;
    let t = nic.next_credit_available_time.max(ctx.now()) + ts;
    nic.next_credit_available_time = t;

    let mut credit = TerminalMsg::new(EventKind::RBuffer);
    credit.vc_index = msg.vc_index;
    credit.packet_id = msg.packet_id;
    credit.last_hop = msg.last_hop;
    credit.origin_router_id = msg.origin_router_id;
    ctx.schedule(msg.intm_lp_id, t - ctx.now(), credit);
}

pub fn packet_arrive_rc(nic: &mut NicState, msg: &TerminalMsg, ctx: &mut Ctx<'_>) {
    ctx.rand_reverse();
    nic.next_credit_available_time = msg.save.credit_time;
    if msg.chunk_id == msg.num_chunks - 1 {
        nic.finished_packets -= 1;
        match msg.path_type {
            PathType::Minimal => nic.minimal_count -= 1,
            PathType::NonMinimal => nic.nonmin_count -= 1,
            PathType::Unset => {}
        }
        let latency = ctx.now() - msg.travel_start_time;
        nic.total_packet_time -= latency;
        if msg.flags.c3 {
            nic.max_packet_time = msg.save.max_latency;
        }
    }
}

/// T_BUFFER：路由器还回一个计算节点通道槽。
pub fn terminal_buf_update(nic: &mut NicState, p: &DragonflyParams, msg: &TerminalMsg) {
    let vc = msg.vc_index as usize;
    debug_assert!(vc < p.num_vcs);
    assert!(
        nic.vc_occupancy[vc] > 0,
        "terminal {} vc {} occupancy would go negative",
        nic.terminal_id,
        vc
    );
    nic.vc_occupancy[vc] -= 1;
    nic.vc_state[vc] = VcState::Idle;
}

pub fn terminal_buf_update_rc(nic: &mut NicState, p: &DragonflyParams, msg: &TerminalMsg) {
    let vc = msg.vc_index as usize;
    nic.vc_occupancy[vc] += 1;
    if nic.vc_occupancy[vc] >= p.cn_vc_size {
        nic.vc_state[vc] = VcState::Credit;
    }
}
