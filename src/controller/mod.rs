//! 网络控制器模块
//!
//! 对外的门面：时间、流生命周期、节点占用、workload 执行与报告。

mod clock;
mod network_controller;
mod scenario;
mod snapshot;

pub use clock::{ManualTimeSource, TimeSource};
pub use network_controller::NetworkController;
pub use scenario::{ScenarioReport, ScenarioSpec, TopologySource};
pub use snapshot::{NetworkSnapshot, NodeSnapshot};
