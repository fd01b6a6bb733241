//! 能耗模型
//!
//! [`EnergyConsumer`] 标记一个需要统计功耗的组件，[`EnModel`] 是
//! 由组件状态计算瞬时功率的纯函数。

use std::fmt::Debug;
use std::sync::Arc;

use crate::net::NodeId;
use crate::units::{DataRate, Power};

/// 可被能耗子系统统计的组件。
pub trait EnergyConsumer {
    fn consumer_id(&self) -> NodeId;

    /// 端口的额定速率
    fn port_speed(&self) -> DataRate;

    /// 已连接的端口数
    fn num_active_ports(&self) -> usize;

    /// 所有端口的平均利用率（0..1）
    fn avg_port_utilization(&self) -> f64;

    /// 这类组件默认使用的能耗模型。
    fn default_en_model(&self) -> Arc<dyn EnModel>;
}

/// 由组件状态计算瞬时功率；无状态，可在同类组件之间共享。
pub trait EnModel: Debug + Send + Sync {
    fn compute_power(&self, consumer: &dyn EnergyConsumer) -> Power;
}

/// 交换机默认能耗模型。
///
/// 静态功率 = 机箱功率 + 端口空载功率 × 活跃端口数；
/// 动态功率 = 平均端口利用率 × 0.05 × 静态功率。
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchDefaultEnModel;

impl SwitchDefaultEnModel {
    pub const CHASSIS_PWR: f64 = 66.7;
    pub const DYNAMIC_RATIO: f64 = 0.05;

    /// 单个端口的空载功率（W）。
    pub fn idle_port_power(port_speed: DataRate) -> Power {
        let mbps = port_speed.mbps();
        let watts = if mbps == 10.0 {
            3.0 / 48.0
        } else if mbps == 100.0 {
            12.5 / 48.0
        } else if mbps == 1000.0 {
            43.8 / 48.0
        } else {
            4.0_f64.powf(mbps.log10()) * 3.0
        };
        Power::from_watts(watts)
    }

    pub fn static_power(port_speed: DataRate, active_ports: usize) -> Power {
        Power::from_watts(Self::CHASSIS_PWR) + Self::idle_port_power(port_speed) * active_ports as f64
    }

    pub fn dynamic_power(static_power: Power, avg_utilization: f64) -> Power {
        static_power * (avg_utilization.clamp(0.0, 1.0) * Self::DYNAMIC_RATIO)
    }
}

impl EnModel for SwitchDefaultEnModel {
    fn compute_power(&self, consumer: &dyn EnergyConsumer) -> Power {
        let stat = Self::static_power(consumer.port_speed(), consumer.num_active_ports());
        stat + Self::dynamic_power(stat, consumer.avg_port_utilization())
    }
}
