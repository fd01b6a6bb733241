//! 流模型
//!
//! 定义端到端流 [`NetFlow`]、其在某条链路上的份额 [`SubFlow`]，
//! 以及每个节点的流表 [`FlowTable`]。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::id::{FlowId, LinkId, NodeId};
use crate::sim::SimTime;
use crate::units::DataRate;

/// 流的实际速率变化时调用：(流 id, 旧速率, 新速率)。
pub type RateChangeCallback = Box<dyn Fn(FlowId, DataRate, DataRate) + Send>;

/// 两个端点之间的端到端流。
pub struct NetFlow {
    id: FlowId,
    transmitter: NodeId,
    destination: NodeId,
    desired: DataRate,
    granted: DataRate,
    /// 自流启动以来传输的数据量（Kb）
    transmitted_kb: f64,
    on_rate_change: Vec<RateChangeCallback>,
}

impl NetFlow {
    pub fn new(id: FlowId, transmitter: NodeId, destination: NodeId, desired: DataRate) -> Self {
        Self {
            id,
            transmitter,
            destination,
            desired,
            granted: DataRate::ZERO,
            transmitted_kb: 0.0,
            on_rate_change: Vec::new(),
        }
    }

    pub fn with_rate_change_callback(mut self, cb: RateChangeCallback) -> Self {
        self.on_rate_change.push(cb);
        self
    }

    pub fn add_rate_change_callback(&mut self, cb: RateChangeCallback) {
        self.on_rate_change.push(cb);
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn transmitter(&self) -> NodeId {
        self.transmitter
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn desired_rate(&self) -> DataRate {
        self.desired
    }

    /// 容量分配之后实际获得的速率。
    pub fn granted_rate(&self) -> DataRate {
        self.granted
    }

    pub fn transmitted_kb(&self) -> f64 {
        self.transmitted_kb
    }

    pub fn is_satisfied(&self) -> bool {
        self.granted.approx_eq(self.desired)
    }

    pub(crate) fn set_desired_rate(&mut self, rate: DataRate) {
        self.desired = rate;
    }

    /// 更新实际速率；速率确有变化时依次调用回调。
    pub(crate) fn set_granted_rate(&mut self, new: DataRate) -> bool {
        let new = if new.approx_eq(self.desired) {
            self.desired
        } else {
            new.round_to_zero()
        };
        let old = self.granted;
        if old == new {
            return false;
        }
        self.granted = new;
        for cb in &self.on_rate_change {
            cb(self.id, old, new);
        }
        true
    }

    pub(crate) fn advance_by(&mut self, dt: SimTime) {
        self.transmitted_kb += self.granted.kbps() * dt.as_secs_f64();
    }
}

impl fmt::Debug for NetFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetFlow")
            .field("id", &self.id)
            .field("transmitter", &self.transmitter)
            .field("destination", &self.destination)
            .field("desired", &self.desired)
            .field("granted", &self.granted)
            .field("callbacks", &self.on_rate_change.len())
            .finish()
    }
}

/// 流在某个节点上经由某条链路发往某个下一跳的那一份。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubFlow {
    pub flow: FlowId,
    pub next_hop: NodeId,
    pub link: LinkId,
    pub rate: DataRate,
}

/// 节点的流表。
#[derive(Debug, Default, Clone)]
pub struct FlowTable {
    /// 由本节点发起的流
    generated: BTreeSet<FlowId>,
    /// 以本节点为目的地的流，及其到达速率
    receiving: BTreeMap<FlowId, DataRate>,
    /// 经本节点转发出去的子流
    outgoing: BTreeMap<FlowId, Vec<SubFlow>>,
}

impl FlowTable {
    pub fn generated(&self) -> &BTreeSet<FlowId> {
        &self.generated
    }

    pub fn receiving(&self) -> &BTreeMap<FlowId, DataRate> {
        &self.receiving
    }

    pub fn outgoing(&self) -> &BTreeMap<FlowId, Vec<SubFlow>> {
        &self.outgoing
    }

    pub fn subflows_of(&self, flow: FlowId) -> &[SubFlow] {
        self.outgoing.get(&flow).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 本节点对 `flow` 的总输出速率。
    pub fn out_rate_of(&self, flow: FlowId) -> DataRate {
        self.subflows_of(flow).iter().map(|s| s.rate).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.generated.is_empty() && self.receiving.is_empty() && self.outgoing.is_empty()
    }

    /// 所有经过（发起、转发或接收）本节点的流。
    pub fn transiting_flows(&self) -> BTreeSet<FlowId> {
        self.generated
            .iter()
            .chain(self.receiving.keys())
            .chain(self.outgoing.keys())
            .copied()
            .collect()
    }

    pub(crate) fn add_generated(&mut self, flow: FlowId) {
        self.generated.insert(flow);
    }

    pub(crate) fn add_receiving(&mut self, flow: FlowId) {
        self.receiving.entry(flow).or_insert(DataRate::ZERO);
    }

    pub(crate) fn set_received_rate(&mut self, flow: FlowId, rate: DataRate) {
        if let Some(r) = self.receiving.get_mut(&flow) {
            *r = rate;
        }
    }

    pub(crate) fn push_subflow(&mut self, sub: SubFlow) {
        self.outgoing.entry(sub.flow).or_default().push(sub);
    }

    /// 清空所有子流，保留发起/接收登记（用于重新分配速率）。
    pub(crate) fn clear_subflows(&mut self) {
        self.outgoing.clear();
        for r in self.receiving.values_mut() {
            *r = DataRate::ZERO;
        }
    }

    pub(crate) fn remove_flow(&mut self, flow: FlowId) {
        self.generated.remove(&flow);
        self.receiving.remove(&flow);
        self.outgoing.remove(&flow);
    }
}
