use super::op::ReqId;
use crate::sim::SimTime;

/// Upper bound on the request count of a single wait group; exceeding it is a
/// configuration error and aborts the run.
pub const MAX_WAIT_REQS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    Wait,
    Waitall,
    Waitany,
    Waitsome,
}

/// The single pending wait group of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWait {
    pub kind: WaitKind,
    pub req_ids: Vec<ReqId>,
    pub count: usize,
    pub num_completed: usize,
    pub start_time: SimTime,
}

impl PendingWait {
    pub fn new(kind: WaitKind, req_ids: Vec<ReqId>, num_completed: usize, start_time: SimTime) -> Self {
        let count = req_ids.len();
        assert!(
            count < MAX_WAIT_REQS,
            "wait group of {count} requests exceeds MAX_WAIT_REQS ({MAX_WAIT_REQS})"
        );
        Self {
            kind,
            req_ids,
            count,
            num_completed,
            start_time,
        }
    }
}
