//! 端点状态
//!
//! 一个被仿真 MPI rank 的全部私有状态：匹配队列、未决等待、
//! 计数器、rc-stack 与网卡（终端）侧状态。

use super::op::ReqId;
use super::queues::{MatchQueue, QueueEntry};
use super::wait::PendingWait;
use crate::net::NicState;
use crate::net::params::DragonflyParams;
use crate::sim::{RcStack, SimTime};
use std::collections::VecDeque;

/// 前向处理器摘除、可能被回滚重建的对象。
#[derive(Debug)]
pub enum ProcessedItem {
    Queued(QueueEntry),
    Wait(PendingWait),
    Completed { req_id: ReqId, index: usize },
}

#[derive(Debug)]
pub struct EndpointState {
    pub rank_id: usize,
    pub app_id: usize,
    pub local_rank: usize,
    /// 是否参与回放（超出 trace 数量的端点保持空闲）。
    pub active: bool,
    pub wrkld_end: bool,

    pub arrival_queue: MatchQueue,
    pub pending_recvs_queue: MatchQueue,
    pub completed_reqs: VecDeque<ReqId>,
    pub wait_op: Option<PendingWait>,

    pub processed_ops: RcStack<ProcessedItem>,
    pub matched_reqs: RcStack<(ReqId, usize)>,

    pub num_sends: u64,
    pub num_recvs: u64,
    pub num_cols: u64,
    pub num_delays: u64,
    pub num_wait: u64,
    pub num_waitall: u64,
    pub num_waitsome: u64,
    pub num_bytes_sent: u64,
    pub num_bytes_recvd: u64,

    pub start_time: SimTime,
    pub elapsed_time: f64,
    pub compute_time: f64,
    pub send_time: f64,
    pub recv_time: f64,
    pub wait_time: f64,

    pub nic: NicState,
}

impl EndpointState {
    pub fn new(rank_id: usize, params: &DragonflyParams) -> Self {
        Self {
            rank_id,
            app_id: 0,
            local_rank: rank_id,
            active: false,
            wrkld_end: false,
            arrival_queue: MatchQueue::new(),
            pending_recvs_queue: MatchQueue::new(),
            completed_reqs: VecDeque::new(),
            wait_op: None,
            processed_ops: RcStack::new(),
            matched_reqs: RcStack::new(),
            num_sends: 0,
            num_recvs: 0,
            num_cols: 0,
            num_delays: 0,
            num_wait: 0,
            num_waitall: 0,
            num_waitsome: 0,
            num_bytes_sent: 0,
            num_bytes_recvd: 0,
            start_time: SimTime::ZERO,
            elapsed_time: 0.0,
            compute_time: 0.0,
            send_time: 0.0,
            recv_time: 0.0,
            wait_time: 0.0,
            nic: NicState::new(rank_id, params),
        }
    }
}
