//! 链路类型
//!
//! 一条物理链路是全双工的，由两条方向相反的单向信道组成；
//! 这里的 `Link` 表示其中一个方向，记录其上承载的子流。

use std::collections::BTreeMap;

use super::id::{FlowId, LinkId, NodeId, PortId};
use crate::units::DataRate;

/// 网络链路（单向信道）
#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub from: NodeId,
    pub from_port: PortId,
    pub to: NodeId,
    pub to_port: PortId,
    pub capacity: DataRate,
    /// 流 id -> 该流在本链路上的子流速率
    subflows: BTreeMap<FlowId, DataRate>,
}

impl Link {
    /// 创建新链路
    pub fn new(
        id: LinkId,
        (from, from_port): (NodeId, PortId),
        (to, to_port): (NodeId, PortId),
        capacity: DataRate,
    ) -> Self {
        Self {
            id,
            from,
            from_port,
            to,
            to_port,
            capacity,
            subflows: BTreeMap::new(),
        }
    }

    /// 链路上所有子流速率之和
    pub fn load(&self) -> DataRate {
        self.subflows.values().copied().sum()
    }

    pub fn utilization(&self) -> f64 {
        self.load().ratio(self.capacity).clamp(0.0, 1.0)
    }

    /// 承载量是否超过容量（带容差）。
    pub fn is_overcommitted(&self) -> bool {
        let load = self.load();
        load > self.capacity && !load.approx_eq(self.capacity)
    }

    pub fn subflows(&self) -> &BTreeMap<FlowId, DataRate> {
        &self.subflows
    }

    pub fn subflow_rate(&self, flow: FlowId) -> Option<DataRate> {
        self.subflows.get(&flow).copied()
    }

    pub fn num_subflows(&self) -> usize {
        self.subflows.len()
    }

    pub(crate) fn push_subflow(&mut self, flow: FlowId, rate: DataRate) {
        *self.subflows.entry(flow).or_insert(DataRate::ZERO) += rate;
    }

    pub(crate) fn remove_flow(&mut self, flow: FlowId) -> Option<DataRate> {
        self.subflows.remove(&flow)
    }

    pub(crate) fn clear(&mut self) {
        self.subflows.clear();
    }
}
