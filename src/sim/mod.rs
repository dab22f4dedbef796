//! 仿真核心模块
//!
//! 事件驱动仿真的宿主层：仿真时间、事件队列、可逆随机流、rc-stack 与仿真器。

// 子模块声明
mod event;
mod rc_stack;
mod rng;
mod simulator;
mod time;

// 重新导出公共接口
pub use rc_stack::RcStack;
pub use rng::ReversibleRng;
pub use simulator::{EventCtx, Model, Simulator};
pub use time::SimTime;
