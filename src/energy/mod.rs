//! 能耗子系统
//!
//! 能耗组件、能耗模型、单组件监视器与全网记录器。

mod model;
mod monitor;
mod recorder;

pub use model::{EnModel, EnergyConsumer, SwitchDefaultEnModel};
pub use monitor::{EnMonitor, EnObserver};
pub use recorder::NetworkEnergyRecorder;
