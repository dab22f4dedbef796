use serde::{Deserialize, Serialize};

/// Request handle as it appears in decoded traces.
pub type ReqId = i32;

/// Wildcard for `tag` or `src` in a posted receive.
pub const WILDCARD: i32 = -1;

/// Operation kind, as recorded in the event envelope for reverse dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Send,
    Isend,
    Recv,
    Irecv,
    Wait,
    Waitall,
    Waitany,
    Waitsome,
    Delay,
    Bcast,
    Allgather,
    Allgatherv,
    Alltoall,
    Alltoallv,
    Reduce,
    Allreduce,
    Col,
    End,
}

impl OpKind {
    pub fn is_collective(self) -> bool {
        matches!(
            self,
            OpKind::Bcast
                | OpKind::Allgather
                | OpKind::Allgatherv
                | OpKind::Alltoall
                | OpKind::Alltoallv
                | OpKind::Reduce
                | OpKind::Allreduce
                | OpKind::Col
        )
    }
}

/// One decoded trace operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MpiOp {
    Send {
        src: i32,
        dest: i32,
        #[serde(default)]
        tag: i32,
        bytes: u64,
        #[serde(default)]
        req_id: ReqId,
    },
    Isend {
        src: i32,
        dest: i32,
        #[serde(default)]
        tag: i32,
        bytes: u64,
        req_id: ReqId,
    },
    Recv {
        src: i32,
        dest: i32,
        #[serde(default)]
        tag: i32,
        bytes: u64,
        #[serde(default)]
        req_id: ReqId,
    },
    Irecv {
        src: i32,
        dest: i32,
        #[serde(default)]
        tag: i32,
        bytes: u64,
        req_id: ReqId,
    },
    Wait {
        req_id: ReqId,
    },
    Waitall {
        req_ids: Vec<ReqId>,
    },
    Waitany {
        req_ids: Vec<ReqId>,
    },
    Waitsome {
        req_ids: Vec<ReqId>,
    },
    Delay {
        seconds: f64,
    },
    Collective {
        op: OpKind,
        #[serde(default)]
        bytes: u64,
    },
    End,
}

impl MpiOp {
    pub fn kind(&self) -> OpKind {
        match self {
            MpiOp::Send { .. } => OpKind::Send,
            MpiOp::Isend { .. } => OpKind::Isend,
            MpiOp::Recv { .. } => OpKind::Recv,
            MpiOp::Irecv { .. } => OpKind::Irecv,
            MpiOp::Wait { .. } => OpKind::Wait,
            MpiOp::Waitall { .. } => OpKind::Waitall,
            MpiOp::Waitany { .. } => OpKind::Waitany,
            MpiOp::Waitsome { .. } => OpKind::Waitsome,
            MpiOp::Delay { .. } => OpKind::Delay,
            MpiOp::Collective { op, .. } => {
                debug_assert!(op.is_collective());
                *op
            }
            MpiOp::End => OpKind::End,
        }
    }
}
