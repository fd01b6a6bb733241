//! 仿真核心模块
//!
//! 此模块包含离散事件调度的核心组件：仿真时间、网络事件与 workload。

// 子模块声明
mod event;
mod scheduled_event;
mod spec;
mod time;
mod workload;

// 重新导出公共接口
pub use event::NetworkEvent;
pub use scheduled_event::ScheduledEvent;
pub use spec::{EventKindSpec, EventSpec, WorkloadSpec};
pub use time::SimTime;
pub use workload::{ExecOutcome, ExecStats, Workload, WorkloadBuilder};
