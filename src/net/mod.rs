//! 网络模块
//!
//! Dragonfly 拓扑的事件信封、参数、LP 映射、路由与终端/路由器处理器。

// 子模块声明
pub mod mapping;
pub mod message;
pub mod params;
pub mod router;
pub mod routing;
pub mod terminal;

// 重新导出公共接口
pub use mapping::DragonflyMapping;
pub use message::{BranchFlags, EventKind, LastHop, PathType, SaveSlots, TerminalMsg};
pub use params::{DragonflyConfig, DragonflyParams, ParamError, PortClass, RoutingAlgo, VcState};
pub use router::{CREDIT_SIZE, MEAN_INTERVAL, RouterState};
pub use terminal::NicState;
