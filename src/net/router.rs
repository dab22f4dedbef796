//! 路由器 LP
//!
//! 每端口-虚拟通道的缓冲记账、信用流控与下一跳转发；
//! 每个前向处理器配一个逆向处理器。

use super::mapping::DragonflyMapping;
use super::message::{EventKind, LastHop, PathType, TerminalMsg};
use super::params::{DragonflyParams, PortClass, RoutingAlgo, VcState};
use super::routing::{NextStop, adaptive_route, global_channels, next_stop, output_port};
use crate::sim::{EventCtx, SimTime};
use tracing::warn;

/// 信用消息的字节数。
pub const CREDIT_SIZE: f64 = 8.0;
/// 路由器转发自事件的平均间隔基数。
pub const MEAN_INTERVAL: f64 = 200.0;
/// 渐进自适应历史窗口长度。
const WINDOW_LENGTH: f64 = 0.0;

type Ctx<'a> = EventCtx<'a, TerminalMsg>;

#[derive(Debug)]
pub struct RouterState {
    pub router_id: u32,
    pub group_id: u32,
    pub global_channels: Vec<u32>,

    pub vc_occupancy: Vec<u32>,
    pub vc_state: Vec<VcState>,
    pub next_output_available_time: Vec<SimTime>,
    pub next_credit_available_time: Vec<SimTime>,

    pub cur_hist_num: Vec<u32>,
    pub prev_hist_num: Vec<u32>,
    pub cur_hist_start_time: Vec<SimTime>,

    pub total_hops: u64,
}

impl RouterState {
    pub fn new(router_id: usize, p: &DragonflyParams) -> Self {
        Self {
            router_id: router_id as u32,
            group_id: (router_id / p.num_routers) as u32,
            global_channels: global_channels(router_id, p),
            vc_occupancy: vec![0; p.radix],
            vc_state: vec![VcState::Idle; p.radix],
            next_output_available_time: vec![SimTime::ZERO; p.radix],
            next_credit_available_time: vec![SimTime::ZERO; p.radix],
            cur_hist_num: vec![0; p.radix],
            prev_hist_num: vec![0; p.radix],
            cur_hist_start_time: vec![SimTime::ZERO; p.radix],
            total_hops: 0,
        }
    }

    /// 静止判据：所有 VC 空且空闲。
    pub fn quiescent(&self) -> bool {
        self.vc_occupancy.iter().all(|&o| o == 0)
            && self.vc_state.iter().all(|&s| s == VcState::Idle)
    }
}

/// 数据包进来的那个输入端口（信用记账用）。
fn sender_port(s: &RouterState, p: &DragonflyParams, msg: &TerminalMsg) -> usize {
    match msg.last_hop {
        LastHop::Terminal => {
            p.num_routers + p.num_global_channels + msg.local_id as usize % p.num_cn
        }
        LastHop::Global => {
            let i = s
                .global_channels
                .iter()
                .position(|&c| c == msg.local_id)
                .expect("global credit from unknown neighbor");
            p.num_routers + i
        }
        LastHop::Local => msg.local_id as usize % p.num_routers,
    }
}

/// 给上一跳发一个信用，释放被占的缓冲槽。
fn credit_send(s: &mut RouterState, p: &DragonflyParams, msg: &mut TerminalMsg, ctx: &mut Ctx<'_>) {
    let (dest_lp, kind, bandwidth) = match msg.last_hop {
        LastHop::Terminal => (msg.src_terminal, EventKind::TBuffer, p.cn_bandwidth),
        LastHop::Global => (msg.intm_lp_id, EventKind::RBuffer, p.global_bandwidth),
        LastHop::Local => (msg.intm_lp_id, EventKind::RBuffer, p.local_bandwidth),
    };
    let port = sender_port(s, p, msg);
    let credit_delay = CREDIT_SIZE / bandwidth;

    msg.save.credit_time = s.next_credit_available_time[port];
    let ts = credit_delay + 0.1 + ctx.rand_exponential(credit_delay / 1000.0);
    let t = s.next_credit_available_time[port].max(ctx.now()) + ts;
    s.next_credit_available_time[port] = t;

    let mut credit = TerminalMsg::new(kind);
    credit.vc_index = msg.vc_index;
    credit.last_hop = msg.last_hop;
    credit.packet_id = msg.packet_id;
    credit.origin_router_id = s.router_id;
    ctx.schedule(dest_lp, t - ctx.now(), credit);
}

/// R_ARRIVE：记跳数、回信用、调度一次转发决策。
pub fn router_packet_receive(
    s: &mut RouterState,
    p: &DragonflyParams,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    if msg.chunk_id == msg.num_chunks - 1 {
        s.total_hops += 1;
    }

    credit_send(s, p, msg, ctx);

    let ts = ctx.lookahead() + 0.1 + ctx.rand_exponential(MEAN_INTERVAL / 200.0);
    let mut m = msg.clone();
    m.kind = EventKind::RSend;
    m.flags.clear();
    ctx.schedule_self(ts, m);
}

pub fn router_packet_receive_rc(
    s: &mut RouterState,
    p: &DragonflyParams,
    msg: &TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    if msg.chunk_id == msg.num_chunks - 1 {
        s.total_hops -= 1;
    }
    ctx.rand_reverse();
    ctx.rand_reverse();
    let port = sender_port(s, p, msg);
    s.next_credit_available_time[port] = msg.save.credit_time;
}

/// R_SEND：选下一跳并占一个输出 VC 槽；输出 VC 满则整体跳过，
/// 稍后重试（粗粒度拥塞模型，不丢包）。
pub fn router_packet_send(
    s: &mut RouterState,
    p: &DragonflyParams,
    map: &DragonflyMapping,
    msg: &mut TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    let dest_router_id = msg.dest_terminal_id / p.num_cn;
    let local_grp = s.router_id as usize / p.num_routers;

    // 非最小/自适应用的候选中转组，无论走哪条分支都抽一次。
    let mut intm_id = ctx.rand_integer(0, (p.num_groups - 1) as u64) as usize;
    if intm_id == local_grp {
        intm_id = (local_grp + 2) % p.num_groups;
    }

    let next = if p.routing == RoutingAlgo::ProgAdaptive
        && msg.path_type != PathType::NonMinimal
        && local_grp == msg.origin_router_id as usize / p.num_routers
    {
        adaptive_route(s, p, msg, dest_router_id, intm_id)
    } else if p.routing == RoutingAlgo::Adaptive && msg.last_hop == LastHop::Terminal {
        adaptive_route(s, p, msg, dest_router_id, intm_id)
    } else {
        match p.routing {
            RoutingAlgo::Minimal => msg.path_type = PathType::Minimal,
            RoutingAlgo::NonMinimal => msg.path_type = PathType::NonMinimal,
            RoutingAlgo::Adaptive | RoutingAlgo::ProgAdaptive => assert!(
                matches!(msg.path_type, PathType::Minimal | PathType::NonMinimal),
                "adaptive packet without a committed path"
            ),
        }
        next_stop(s, p, msg, msg.path_type, dest_router_id, intm_id)
    };

    let port = output_port(s, p, msg, next);
    let chan = port * p.num_vcs;
    let class = p.port_class(port);
    let buf_size = p.buffer_size(class);

    if s.vc_occupancy[chan] >= buf_size {
        warn!(
            router = s.router_id,
            chan,
            occupancy = s.vc_occupancy[chan],
            "output VC full, packet forward deferred"
        );
        msg.flags.c1 = true;
        let retry = ctx.lookahead() + 0.1 + ctx.rand_exponential(MEAN_INTERVAL / 200.0);
        let mut m = msg.clone();
        m.kind = EventKind::RSend;
        m.flags.clear();
        ctx.schedule_self(retry, m);
        return;
    }

    msg.save.available_time = s.next_output_available_time[port];
    let bandwidth = p.bandwidth(class);
    let ts = ctx.lookahead()
        + 0.1
        + (1.0 / bandwidth) * p.chunk_size as f64
        + ctx.rand_exponential(p.chunk_size as f64 / 200.0);
    let t = s.next_output_available_time[port].max(ctx.now()) + ts;
    s.next_output_available_time[port] = t;

    s.vc_occupancy[chan] += 1;
    msg.vc_index = chan as u32;

    if p.routing == RoutingAlgo::ProgAdaptive {
        if ctx.now() - s.cur_hist_start_time[chan] >= WINDOW_LENGTH {
            msg.flags.c2 = true;
            msg.save.hist_num = s.prev_hist_num[chan];
            msg.save.hist_start_time = s.cur_hist_start_time[chan];
            s.prev_hist_num[chan] = s.cur_hist_num[chan];
            s.cur_hist_start_time[chan] = ctx.now();
            s.cur_hist_num[chan] = 1;
        } else {
            s.cur_hist_num[chan] += 1;
        }
    }

    if s.vc_occupancy[chan] >= buf_size {
        s.vc_state[chan] = VcState::Credit;
    }

    let mut m = msg.clone();
    m.flags.clear();
    m.intm_lp_id = ctx.self_lp();
    m.local_id = s.router_id;
    m.vc_index = chan as u32;
    match next {
        NextStop::Terminal => {
            m.kind = EventKind::TArrive;
            ctx.schedule(msg.dest_terminal_lp, t - ctx.now(), m);
        }
        NextStop::Router(r) => {
            m.kind = EventKind::RArrive;
            m.last_hop = if class == PortClass::Global {
                LastHop::Global
            } else {
                LastHop::Local
            };
            ctx.schedule(map.router_lp(r as usize), t - ctx.now(), m);
        }
    }
}

pub fn router_packet_send_rc(
    s: &mut RouterState,
    p: &DragonflyParams,
    msg: &TerminalMsg,
    ctx: &mut Ctx<'_>,
) {
    ctx.rand_reverse();
    ctx.rand_reverse();
    if msg.flags.c1 {
        return;
    }

    let chan = msg.vc_index as usize;
    let port = chan / p.num_vcs;

    if p.routing == RoutingAlgo::ProgAdaptive {
        if msg.flags.c2 {
            s.cur_hist_num[chan] = s.prev_hist_num[chan];
            s.prev_hist_num[chan] = msg.save.hist_num;
            s.cur_hist_start_time[chan] = msg.save.hist_start_time;
        } else {
            s.cur_hist_num[chan] -= 1;
        }
    }

    s.next_output_available_time[port] = msg.save.available_time;
    s.vc_occupancy[chan] -= 1;
    s.vc_state[chan] = VcState::Idle;
}

/// R_BUFFER：下游还回一个缓冲槽。
pub fn router_buf_update(s: &mut RouterState, p: &DragonflyParams, msg: &TerminalMsg) {
    let chan = msg.vc_index as usize;
    debug_assert!(chan < p.radix);
    assert!(
        s.vc_occupancy[chan] > 0,
        "router {} vc {} occupancy would go negative",
        s.router_id,
        chan
    );
    s.vc_occupancy[chan] -= 1;
    s.vc_state[chan] = VcState::Idle;
}

pub fn router_buf_update_rc(s: &mut RouterState, p: &DragonflyParams, msg: &TerminalMsg) {
    let chan = msg.vc_index as usize;
    s.vc_occupancy[chan] += 1;
    let class = p.port_class(chan / p.num_vcs);
    if s.vc_occupancy[chan] >= p.buffer_size(class) {
        s.vc_state[chan] = VcState::Credit;
    }
}
