//! 调度事件
//!
//! 定义调度事件结构及其优先级比较。

use super::time::SimTime;
use std::cmp::Ordering;

/// 外部注入事件的 cause 标记（没有父事件）。
pub(crate) const NO_CAUSE: u64 = u64::MAX;

/// 调度事件：执行时间、序列号、来源事件、目标 LP 与负载。
pub struct ScheduledEvent<M> {
    pub(crate) at: SimTime,
    pub(crate) seq: u64,
    pub(crate) cause: u64,
    pub(crate) dest: usize,
    pub(crate) msg: M,
}

// BinaryHeap 是 max-heap；我们需要最小时间优先，因此反向比较。
impl<M> Ord for ScheduledEvent<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.at.cmp(&other.at) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            ord => ord,
        }
        .reverse()
    }
}

impl<M> PartialOrd for ScheduledEvent<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> PartialEq for ScheduledEvent<M> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<M> Eq for ScheduledEvent<M> {}
