//! MPI 端点模块
//!
//! trace 驱动的 MPI rank 状态机：操作分类、匹配队列、等待组与收发处理。

// 子模块声明
mod handlers;
mod op;
mod queues;
mod state;
mod wait;

// 重新导出公共接口
pub use handlers::{
    next_operation, next_operation_rc, on_send_posted, on_send_posted_rc,
    update_arrival_queue, update_arrival_queue_rc, update_completed_queue,
    update_completed_queue_rc, update_message_time, update_message_time_rc,
};
pub use op::{MpiOp, OpKind, ReqId, WILDCARD};
pub use queues::{MatchQueue, QueueEntry};
pub use state::{EndpointState, ProcessedItem};
pub use wait::{MAX_WAIT_REQS, PendingWait, WaitKind};
