//! 端口类型

use super::id::{LinkId, NodeId, PortId};
use crate::units::DataRate;

/// 节点上的物理端口（全双工）。
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub speed: DataRate,
    /// 对端节点，未连接时为 `None`
    pub peer: Option<NodeId>,
    /// 从本端口发出的信道
    pub out_link: Option<LinkId>,
    /// 到达本端口的信道
    pub in_link: Option<LinkId>,
    /// 出方向当前承载的速率
    pub(crate) load_out: DataRate,
}

impl Port {
    pub fn new(id: PortId, speed: DataRate) -> Self {
        Self {
            id,
            speed,
            peer: None,
            out_link: None,
            in_link: None,
            load_out: DataRate::ZERO,
        }
    }

    /// 端口已连接即视为活跃。
    pub fn is_active(&self) -> bool {
        self.out_link.is_some()
    }

    pub fn load_out(&self) -> DataRate {
        self.load_out
    }

    /// 出方向利用率（0..1）。
    pub fn utilization(&self) -> f64 {
        self.load_out.ratio(self.speed).clamp(0.0, 1.0)
    }
}
