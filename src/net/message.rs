//! 事件信封
//!
//! 终端与路由器共用的统一事件负载，含逆向执行所需的保存槽与分支标志。

use crate::mpi::OpKind;
use crate::sim::SimTime;

/// 事件种类：终端 / 路由器 / MPI 端点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TGenerate,
    TArrive,
    TSend,
    TBuffer,
    RSend,
    RArrive,
    RBuffer,
    MpiOpGetNext,
    MpiSendPosted,
    MpiSendArrived,
    MpiSendArrivedCb,
}

/// 数据包上一跳的通道类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastHop {
    Terminal,
    Local,
    Global,
}

/// 数据包已承诺的路径类别；进入网络前为 Unset。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    Unset,
    Minimal,
    NonMinimal,
}

/// 前向处理器走过的条件分支，逆向处理器按位重放。
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchFlags {
    pub c0: bool,
    pub c1: bool,
    pub c2: bool,
    pub c3: bool,
}

impl BranchFlags {
    pub fn clear(&mut self) {
        *self = BranchFlags::default();
    }
}

/// 前向处理器写入、逆向处理器读出的状态保存槽。
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveSlots {
    pub send_time: f64,
    pub recv_time: f64,
    pub wait_time: f64,
    pub delay: f64,
    pub elapsed: f64,
    pub num_bytes: u64,
    pub available_time: SimTime,
    pub credit_time: SimTime,
    pub hist_num: u32,
    pub hist_start_time: SimTime,
    pub max_latency: f64,
}

/// 统一事件信封。字段按事件种类取用；未用字段保持零值。
#[derive(Debug, Clone)]
pub struct TerminalMsg {
    pub kind: EventKind,

    // MPI 负载（作业内 rank 编号，用于匹配）
    pub op_kind: OpKind,
    pub src_rank: i32,
    pub dest_rank: i32,
    pub tag: i32,
    pub bytes: u64,
    pub req_id: i32,
    pub sim_start_time: SimTime,
    pub msg_send_time: f64,
    pub num_matched: u32,
    pub found_match: Option<usize>,
    pub wait_completed: bool,

    // 数据包负载
    pub packet_id: u64,
    pub chunk_id: u64,
    pub num_chunks: u64,
    pub packet_size: u64,
    pub travel_start_time: SimTime,

    // 寻址
    pub src_terminal: usize,
    pub sender_lp: usize,
    pub dest_terminal_id: usize,
    pub dest_terminal_lp: usize,
    pub intm_lp_id: usize,
    pub origin_router_id: u32,
    pub local_id: u32,

    // 路径
    pub path_type: PathType,
    pub intm_group_id: i32,
    pub last_hop: LastHop,
    pub vc_index: u32,

    pub save: SaveSlots,
    pub flags: BranchFlags,
}

impl TerminalMsg {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            op_kind: OpKind::End,
            src_rank: 0,
            dest_rank: 0,
            tag: 0,
            bytes: 0,
            req_id: 0,
            sim_start_time: SimTime::ZERO,
            msg_send_time: 0.0,
            num_matched: 0,
            found_match: None,
            wait_completed: false,
            packet_id: 0,
            chunk_id: 0,
            num_chunks: 0,
            packet_size: 0,
            travel_start_time: SimTime::ZERO,
            src_terminal: 0,
            sender_lp: 0,
            dest_terminal_id: 0,
            dest_terminal_lp: 0,
            intm_lp_id: 0,
            origin_router_id: 0,
            local_id: 0,
            path_type: PathType::Unset,
            intm_group_id: -1,
            last_hop: LastHop::Terminal,
            vc_index: 0,
            save: SaveSlots::default(),
            flags: BranchFlags::default(),
        }
    }
}
