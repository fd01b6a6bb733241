//! 节点类型
//!
//! 拓扑中的顶点：主机、交换机、核心交换机与抽象的互联网节点。
//! 节点持有自己的端口、路由表与流表。

use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::flow::FlowTable;
use super::id::{NodeId, PortId};
use super::port::Port;
use super::routing::RoutingTable;
use crate::energy::{EnModel, EnergyConsumer, SwitchDefaultEnModel};
use crate::units::DataRate;

/// 节点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// 主机：可作为流的端点，不统计能耗
    Host,
    /// 交换机：只转发，统计能耗
    Switch,
    /// 核心交换机：既可作为端点，也统计能耗
    CoreSwitch,
    /// 数据中心之外的互联网：与所有核心交换机相连的唯一端点，端口按需增加，
    /// 不统计能耗
    Internet,
}

impl NodeKind {
    /// 能否作为流的发送方或目的地。
    pub fn is_endpoint(self) -> bool {
        matches!(self, NodeKind::Host | NodeKind::CoreSwitch | NodeKind::Internet)
    }

    pub fn is_energy_consumer(self) -> bool {
        matches!(self, NodeKind::Switch | NodeKind::CoreSwitch)
    }

    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Host => "host",
            NodeKind::Switch => "switch",
            NodeKind::CoreSwitch => "core_switch",
            NodeKind::Internet => "internet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
    port_speed: DataRate,
    pub(crate) ports: Vec<Port>,
    pub(crate) routing: RoutingTable,
    pub(crate) flow_table: FlowTable,
}

impl Node {
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
        port_speed: DataRate,
        num_ports: usize,
    ) -> Self {
        let ports = (0..num_ports)
            .map(|i| Port::new(PortId(i), port_speed))
            .collect();
        Self {
            id,
            name: name.into(),
            kind,
            port_speed,
            ports,
            routing: RoutingTable::new(id),
            flow_table: FlowTable::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_endpoint(&self) -> bool {
        self.kind.is_endpoint()
    }

    pub fn is_energy_consumer(&self) -> bool {
        self.kind.is_energy_consumer()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.0)
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn flow_table(&self) -> &FlowTable {
        &self.flow_table
    }

    /// 追加一个未连接的端口，速率与已有端口相同。
    pub(crate) fn add_port(&mut self) -> PortId {
        let id = PortId(self.ports.len());
        self.ports.push(Port::new(id, self.port_speed));
        id
    }

    /// 第一个尚未连接的端口。
    pub fn free_port(&self) -> Option<PortId> {
        self.ports.iter().find(|p| !p.is_active()).map(|p| p.id)
    }

    /// 所有连向 `next_hop` 的已连接端口（并行链路时不止一个）。
    pub fn ports_towards(&self, next_hop: NodeId) -> impl Iterator<Item = &Port> + '_ {
        self.ports
            .iter()
            .filter(move |p| p.is_active() && p.peer == Some(next_hop))
    }

    /// 已连接的邻居（并行链路会重复出现）。
    pub fn neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ports.iter().filter_map(|p| p.peer)
    }

    /// 节点的文本描述。
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "| ---- {} {:?} ({}) ----", self.kind.label(), self.id, self.name);
        let _ = writeln!(
            out,
            "| ports: {}/{} active @ {}",
            self.num_active_ports(),
            self.ports.len(),
            self.port_speed
        );
        let _ = writeln!(out, "| avg port utilization: {:.3}", self.avg_port_utilization());
        let ft = &self.flow_table;
        let _ = writeln!(
            out,
            "| flows: generated={} forwarded={} receiving={}",
            ft.generated().len(),
            ft.outgoing().len(),
            ft.receiving().len()
        );
        out
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({})", self.kind.label(), self.id.0, self.name)
    }
}

impl EnergyConsumer for Node {
    fn consumer_id(&self) -> NodeId {
        self.id
    }

    fn port_speed(&self) -> DataRate {
        self.port_speed
    }

    fn num_active_ports(&self) -> usize {
        self.ports.iter().filter(|p| p.is_active()).count()
    }

    fn avg_port_utilization(&self) -> f64 {
        if self.ports.is_empty() {
            return 0.0;
        }
        self.ports.iter().map(Port::utilization).sum::<f64>() / self.ports.len() as f64
    }

    fn default_en_model(&self) -> Arc<dyn EnModel> {
        Arc::new(SwitchDefaultEnModel)
    }
}
