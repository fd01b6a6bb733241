//! 网络拓扑管理
//!
//! 聚合节点、链路、路由表与转发策略，维护所有正在运行的流。
//! 每次流集合或期望速率变化后，[`Network::reallocate`] 按公平性策略
//! 重新分配一次（默认最大最小公平），并把结果物化为各节点流表与各链路上的子流。

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use tracing::{debug, info, trace, warn};

use super::fairness::{Demand, FairnessPolicy, MaxMin};
use super::flow::{NetFlow, SubFlow};
use super::forwarding::{ForwardingPolicy, StaticEcmp};
use super::id::{FlowId, LinkId, NodeId};
use super::link::Link;
use super::node::{Node, NodeKind};
use super::port_selection::{FirstAvailablePort, PortSelectionPolicy};
use super::routing::RoutingTable;
use crate::energy::{EnMonitor, EnergyConsumer};
use crate::error::{NetError, Result};
use crate::sim::SimTime;
use crate::units::DataRate;

/// 一条流按某个速率沿路由展开后的结果。
#[derive(Debug, Default)]
struct Expansion {
    /// (所在节点, 子流)
    subflows: Vec<(NodeId, SubFlow)>,
    /// 到达目的地的速率
    received: DataRate,
}

/// 网络拓扑
#[derive(Debug)]
pub struct Network {
    nodes: BTreeMap<NodeId, Node>,
    links: Vec<Link>,
    flows: BTreeMap<FlowId, NetFlow>,
    monitors: BTreeMap<NodeId, EnMonitor>,
    forwarding: Box<dyn ForwardingPolicy>,
    port_selection: Box<dyn PortSelectionPolicy>,
    fairness: Box<dyn FairnessPolicy>,
    /// 流 -> 到达序号，分配时按此顺序排列需求
    arrivals: BTreeMap<FlowId, u64>,
    next_arrival: u64,
    next_node_id: usize,
    routing_dirty: bool,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            links: Vec::new(),
            flows: BTreeMap::new(),
            monitors: BTreeMap::new(),
            forwarding: Box::new(StaticEcmp),
            port_selection: Box::new(FirstAvailablePort),
            fairness: Box::new(MaxMin),
            arrivals: BTreeMap::new(),
            next_arrival: 0,
            next_node_id: 0,
            routing_dirty: false,
        }
    }
}

impl Network {
    /// 互联网节点的保留 id，不参与自动分配
    pub const INTERNET_ID: NodeId = NodeId(usize::MAX);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(
        forwarding: Box<dyn ForwardingPolicy>,
        port_selection: Box<dyn PortSelectionPolicy>,
        fairness: Box<dyn FairnessPolicy>,
    ) -> Self {
        Self {
            forwarding,
            port_selection,
            fairness,
            ..Self::default()
        }
    }

    pub fn set_forwarding_policy(&mut self, policy: Box<dyn ForwardingPolicy>) {
        self.forwarding = policy;
        self.reallocate();
    }

    pub fn set_port_selection_policy(&mut self, policy: Box<dyn PortSelectionPolicy>) {
        self.port_selection = policy;
        self.reallocate();
    }

    pub fn set_fairness_policy(&mut self, policy: Box<dyn FairnessPolicy>) {
        debug!(?policy, "切换公平性策略");
        self.fairness = policy;
        self.reallocate();
    }

    // ------------------------------------------------------------------
    // 拓扑构建
    // ------------------------------------------------------------------

    /// 以自动分配的 id 添加节点
    ///
    /// 互联网节点全局唯一：`kind` 为 [`NodeKind::Internet`] 时忽略其余参数，
    /// 返回（必要时创建）[`Network::INTERNET_ID`]。
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        port_speed: DataRate,
        num_ports: usize,
    ) -> NodeId {
        if kind == NodeKind::Internet {
            return self.ensure_internet();
        }
        let mut id = NodeId(self.next_node_id);
        while self.nodes.contains_key(&id) {
            id = NodeId(id.0 + 1);
        }
        let mut name = name.into();
        if name.is_empty() {
            name = format!("n{}", id.0);
        }
        self.insert_node(Node::new(id, name, kind, port_speed, num_ports));
        id
    }

    /// 以指定 id 添加节点；id 已存在时报错
    pub fn add_node_with_id(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        name: impl Into<String>,
        port_speed: DataRate,
        num_ports: usize,
    ) -> Result<NodeId> {
        if id == Self::INTERNET_ID || kind == NodeKind::Internet {
            return Err(NetError::InvalidTopology(format!(
                "node id {} / kind {} is reserved for the internet node",
                id.0,
                kind.label()
            )));
        }
        if self.nodes.contains_key(&id) {
            return Err(NetError::InvalidTopology(format!(
                "duplicate node id {}",
                id.0
            )));
        }
        self.insert_node(Node::new(id, name, kind, port_speed, num_ports));
        Ok(id)
    }

    /// 添加单端口主机
    pub fn add_host(&mut self, name: impl Into<String>, port_speed: DataRate) -> NodeId {
        self.add_node(NodeKind::Host, name, port_speed, 1)
    }

    /// 添加交换机
    pub fn add_switch(
        &mut self,
        name: impl Into<String>,
        port_speed: DataRate,
        num_ports: usize,
    ) -> NodeId {
        self.add_node(NodeKind::Switch, name, port_speed, num_ports)
    }

    /// 添加核心交换机
    pub fn add_core_switch(
        &mut self,
        name: impl Into<String>,
        port_speed: DataRate,
        num_ports: usize,
    ) -> NodeId {
        self.add_node(NodeKind::CoreSwitch, name, port_speed, num_ports)
    }

    fn insert_node(&mut self, node: Node) {
        let id = node.id();
        trace!(node = ?id, kind = node.kind().label(), "添加节点");
        if node.is_energy_consumer() {
            self.monitors.insert(id, EnMonitor::for_consumer(&node));
        }
        if id != Self::INTERNET_ID {
            self.next_node_id = self.next_node_id.max(id.0 + 1);
        }
        self.nodes.insert(id, node);
        self.routing_dirty = true;
    }

    fn ensure_internet(&mut self) -> NodeId {
        if !self.nodes.contains_key(&Self::INTERNET_ID) {
            self.insert_node(Node::new(
                Self::INTERNET_ID,
                "internet",
                NodeKind::Internet,
                DataRate::from_kbps(f64::MAX),
                0,
            ));
            info!("🌐 添加互联网节点");
        }
        Self::INTERNET_ID
    }

    /// 互联网节点（若已添加）
    pub fn internet(&self) -> Option<NodeId> {
        self.contains_node(Self::INTERNET_ID)
            .then_some(Self::INTERNET_ID)
    }

    /// 添加互联网节点，并把它与每台尚未相连的核心交换机连接。
    ///
    /// 每条连接在两端各新增一个端口，链路容量即核心交换机的端口速率。
    /// 可以重复调用：之后新加入的核心交换机会被补连。
    pub fn connect_internet(&mut self) -> Result<NodeId> {
        let inet = self.ensure_internet();
        let cores: Vec<NodeId> = self
            .core_switches()
            .filter(|&c| self.links_between(c, inet).next().is_none())
            .collect();
        if self.core_switches().next().is_none() {
            warn!("⚠️ 没有核心交换机，互联网节点未与任何节点相连");
        }
        for core in cores {
            for id in [core, inet] {
                if let Some(n) = self.nodes.get_mut(&id) {
                    n.add_port();
                }
            }
            self.connect(core, inet)?;
        }
        self.rebuild_routing();
        Ok(inet)
    }

    /// 用一条全双工链路连接两个节点，容量取两端端口速率的较小值。
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> Result<(LinkId, LinkId)> {
        let speed_a = self.node(a)?.port_speed();
        let speed_b = self.node(b)?.port_speed();
        self.connect_with_capacity(a, b, speed_a.min(speed_b))
    }

    /// 以指定容量连接两个节点，返回 (a->b, b->a) 两条信道。
    #[tracing::instrument(skip(self), fields(a = ?a, b = ?b))]
    pub fn connect_with_capacity(
        &mut self,
        a: NodeId,
        b: NodeId,
        capacity: DataRate,
    ) -> Result<(LinkId, LinkId)> {
        if a == b {
            return Err(NetError::InvalidTopology(format!(
                "node {} cannot be connected to itself",
                a.0
            )));
        }
        let pa = self.node(a)?.free_port().ok_or(NetError::NoFreePort(a))?;
        let pb = self.node(b)?.free_port().ok_or(NetError::NoFreePort(b))?;

        let ab = LinkId(self.links.len());
        let ba = LinkId(self.links.len() + 1);
        self.links.push(Link::new(ab, (a, pa), (b, pb), capacity));
        self.links.push(Link::new(ba, (b, pb), (a, pa), capacity));

        if let Some(na) = self.nodes.get_mut(&a) {
            let port = &mut na.ports[pa.0];
            port.peer = Some(b);
            port.out_link = Some(ab);
            port.in_link = Some(ba);
        }
        if let Some(nb) = self.nodes.get_mut(&b) {
            let port = &mut nb.ports[pb.0];
            port.peer = Some(a);
            port.out_link = Some(ba);
            port.in_link = Some(ab);
        }
        debug!(port_a = pa.0, port_b = pb.0, capacity = %capacity, "🔗 连接节点");

        self.routing_dirty = true;
        self.update_monitors();
        Ok((ab, ba))
    }

    /// 拓扑变化后重新计算所有节点的路由表
    pub fn rebuild_routing(&mut self) {
        let adj: BTreeMap<NodeId, Vec<NodeId>> = self
            .nodes
            .iter()
            .map(|(&id, n)| (id, n.neighbours().collect()))
            .collect();
        let mut tables = RoutingTable::build_all(&adj);
        for (id, node) in self.nodes.iter_mut() {
            if let Some(t) = tables.remove(id) {
                node.routing = t;
            }
        }
        self.routing_dirty = false;
        debug!(nodes = self.nodes.len(), "🧭 路由表已重建");
    }

    fn ensure_routing(&mut self) {
        if self.routing_dirty {
            self.rebuild_routing();
        }
    }

    // ------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(NetError::NodeNotFound(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// 主机登记表
    pub fn hosts(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes_of_kind(NodeKind::Host)
    }

    pub fn core_switches(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes_of_kind(NodeKind::CoreSwitch)
    }

    /// 可作为流端点的节点集合
    pub fn endpoints(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .values()
            .filter(|n| n.is_endpoint())
            .map(Node::id)
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .values()
            .filter(move |n| n.kind() == kind)
            .map(Node::id)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    /// 从 `from` 到 `to` 的所有信道
    pub fn links_between(&self, from: NodeId, to: NodeId) -> impl Iterator<Item = &Link> + '_ {
        self.links
            .iter()
            .filter(move |l| l.from == from && l.to == to)
    }

    pub fn flows(&self) -> impl Iterator<Item = &NetFlow> + '_ {
        self.flows.values()
    }

    pub fn flow(&self, id: FlowId) -> Option<&NetFlow> {
        self.flows.get(&id)
    }

    pub(crate) fn flow_mut(&mut self, id: FlowId) -> Option<&mut NetFlow> {
        self.flows.get_mut(&id)
    }

    pub fn num_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn monitors(&self) -> impl Iterator<Item = &EnMonitor> + '_ {
        self.monitors.values()
    }

    pub fn monitor(&self, id: NodeId) -> Option<&EnMonitor> {
        self.monitors.get(&id)
    }

    pub(crate) fn monitors_mut(&mut self) -> impl Iterator<Item = &mut EnMonitor> + '_ {
        self.monitors.values_mut()
    }

    // ------------------------------------------------------------------
    // 流生命周期
    // ------------------------------------------------------------------

    /// 注册一条流并重新分配速率。
    ///
    /// 端点不存在、不是端点节点或 id 重复时返回错误且不修改任何状态；
    /// 目的地不可达时流照常注册，但获得的速率为 0。
    #[tracing::instrument(skip(self, flow), fields(flow_id = ?flow.id(), from = ?flow.transmitter(), to = ?flow.destination()))]
    pub fn start_flow(&mut self, flow: NetFlow) -> Result<FlowId> {
        let id = flow.id();
        if self.flows.contains_key(&id) {
            return Err(NetError::DuplicateFlowId(id));
        }
        for end in [flow.transmitter(), flow.destination()] {
            if !self.node(end)?.is_endpoint() {
                return Err(NetError::NotEndpoint(end));
            }
        }
        if flow.desired_rate().kbps() < 0.0 {
            return Err(NetError::NegativeRate(flow.desired_rate().kbps()));
        }

        self.ensure_routing();
        let (tx, dst) = (flow.transmitter(), flow.destination());
        if tx != dst && self.node(tx)?.routing().hops_to(dst).is_none() {
            warn!(
                error = %NetError::UnreachableDestination { from: tx, to: dst },
                "⚠️ 目的地不可达，流的速率将为 0"
            );
        }

        if let Some(n) = self.nodes.get_mut(&tx) {
            n.flow_table.add_generated(id);
        }
        if let Some(n) = self.nodes.get_mut(&dst) {
            n.flow_table.add_receiving(id);
        }
        self.flows.insert(id, flow);
        self.arrivals.insert(id, self.next_arrival);
        self.next_arrival += 1;
        info!(desired = %self.flows[&id].desired_rate(), "▶️  流已启动");

        self.reallocate();
        Ok(id)
    }

    /// 移除一条流及其在所有节点、链路上的子流。
    #[tracing::instrument(skip(self), fields(flow_id = ?id))]
    pub fn stop_flow(&mut self, id: FlowId) -> Result<NetFlow> {
        let mut flow = self.flows.remove(&id).ok_or(NetError::UnknownFlow(id))?;
        self.arrivals.remove(&id);
        for node in self.nodes.values_mut() {
            node.flow_table.remove_flow(id);
        }
        for link in self.links.iter_mut() {
            link.remove_flow(id);
        }
        flow.set_granted_rate(DataRate::ZERO);
        info!("⏹️  流已停止");

        self.reallocate();
        Ok(flow)
    }

    /// 修改流的期望速率并重新分配。
    #[tracing::instrument(skip(self), fields(flow_id = ?id, rate = %rate))]
    pub fn set_desired_rate(&mut self, id: FlowId, rate: DataRate) -> Result<()> {
        if rate.kbps() < 0.0 {
            return Err(NetError::NegativeRate(rate.kbps()));
        }
        let flow = self.flows.get_mut(&id).ok_or(NetError::UnknownFlow(id))?;
        flow.set_desired_rate(rate);
        debug!("期望速率已更新");
        self.reallocate();
        Ok(())
    }

    /// 推进时间：累计每条流的传输量与每个能耗组件的能量。
    pub fn advance_by(&mut self, dt: SimTime) {
        for flow in self.flows.values_mut() {
            flow.advance_by(dt);
        }
        for m in self.monitors.values_mut() {
            m.advance_by(dt);
        }
    }

    // ------------------------------------------------------------------
    // 速率分配
    // ------------------------------------------------------------------

    /// 沿路由把 `flow` 以速率 `rate` 展开为各节点上的子流。
    ///
    /// 节点按到目的地的跳数从远到近处理，保证一个节点被处理时，
    /// 所有上游节点流入它的速率都已累加完毕。
    fn expand(&self, flow: &NetFlow, rate: DataRate) -> Result<Expansion> {
        let dst = flow.destination();
        let mut out = Expansion::default();
        if flow.transmitter() == dst {
            out.received = rate;
            return Ok(out);
        }

        let mut pending: BTreeMap<(Reverse<u32>, NodeId), DataRate> = BTreeMap::new();
        let tx = self.node(flow.transmitter())?;
        let hops = tx.routing().hops_to(dst).ok_or(NetError::UnreachableDestination {
            from: tx.id(),
            to: dst,
        })?;
        pending.insert((Reverse(hops), tx.id()), rate);

        while let Some(((Reverse(h), at), in_rate)) = pending.pop_first() {
            if at == dst {
                out.received += in_rate;
                continue;
            }
            let node = self.node(at)?;
            let next_hops = self.forwarding.next_hops(node, flow)?;
            let parts = self.forwarding.split(in_rate, next_hops.len());
            for (nh, part) in next_hops.into_iter().zip(parts) {
                let port = self
                    .port_selection
                    .select_port(node, nh, flow.id())
                    .ok_or(NetError::NoPortTowards { node: at, next_hop: nh })?;
                let link = node
                    .port(port)
                    .and_then(|p| p.out_link)
                    .ok_or(NetError::NoPortTowards { node: at, next_hop: nh })?;
                out.subflows.push((
                    at,
                    SubFlow {
                        flow: flow.id(),
                        next_hop: nh,
                        link,
                        rate: part,
                    },
                ));
                let nh_hops = self.node(nh)?.routing().hops_to(dst).unwrap_or(h.saturating_sub(1));
                *pending
                    .entry((Reverse(nh_hops), nh))
                    .or_insert(DataRate::ZERO) += part;
            }
        }
        Ok(out)
    }

    /// 重新计算所有流的实际速率并物化子流。
    ///
    /// 速率确有变化的流会触发其回调；之后更新所有能耗监视器。
    #[tracing::instrument(skip(self), fields(flows = self.flows.len()))]
    pub fn reallocate(&mut self) {
        self.ensure_routing();

        let unit = DataRate::from_kbps(1.0);
        let mut demands = Vec::with_capacity(self.flows.len());
        for flow in self.flows.values() {
            let (routable, shares) = match self.expand(flow, unit) {
                Ok(exp) => {
                    let mut shares: BTreeMap<LinkId, f64> = BTreeMap::new();
                    for (_, sub) in &exp.subflows {
                        *shares.entry(sub.link).or_insert(0.0) += sub.rate.kbps();
                    }
                    (true, shares)
                }
                Err(e) => {
                    trace!(flow_id = ?flow.id(), error = %e, "流没有可用路径");
                    (false, BTreeMap::new())
                }
            };
            demands.push(Demand {
                flow: flow.id(),
                desired: flow.desired_rate(),
                shares,
                routable,
            });
        }
        demands.sort_by_key(|d| self.arrivals.get(&d.flow).copied().unwrap_or(u64::MAX));
        let capacity: BTreeMap<LinkId, DataRate> =
            self.links.iter().map(|l| (l.id, l.capacity)).collect();
        let granted = self.fairness.allocate(&demands, &capacity);

        let mut expansions = Vec::with_capacity(self.flows.len());
        for flow in self.flows.values() {
            let rate = granted.get(&flow.id()).copied().unwrap_or(DataRate::ZERO);
            let exp = if rate == DataRate::ZERO {
                Expansion::default()
            } else {
                self.expand(flow, rate).unwrap_or_default()
            };
            expansions.push((flow.id(), rate, exp));
        }

        for link in self.links.iter_mut() {
            link.clear();
        }
        for node in self.nodes.values_mut() {
            node.flow_table.clear_subflows();
        }

        let mut changed = 0usize;
        for (id, rate, exp) in expansions {
            for (at, sub) in exp.subflows {
                if let Some(link) = self.links.get_mut(sub.link.0) {
                    link.push_subflow(id, sub.rate);
                }
                if let Some(node) = self.nodes.get_mut(&at) {
                    node.flow_table.push_subflow(sub);
                }
            }
            if let Some(dst) = self.flows.get(&id).map(NetFlow::destination) {
                if let Some(node) = self.nodes.get_mut(&dst) {
                    node.flow_table.set_received_rate(id, exp.received);
                }
            }
            if let Some(flow) = self.flows.get_mut(&id) {
                if flow.set_granted_rate(rate) {
                    changed += 1;
                }
            }
        }

        for link in &self.links {
            let load = link.load();
            if let Some(node) = self.nodes.get_mut(&link.from) {
                if let Some(port) = node.ports.get_mut(link.from_port.0) {
                    port.load_out = load;
                }
            }
        }

        if changed > 0 {
            debug!(changed, "🔄 流速率已重新分配");
        }
        self.update_monitors();
    }

    /// 对每个能耗组件调用一次 `update`。
    pub fn update_monitors(&mut self) {
        for (id, monitor) in self.monitors.iter_mut() {
            if let Some(node) = self.nodes.get(id) {
                monitor.update(node as &dyn EnergyConsumer);
            }
        }
    }

    // ------------------------------------------------------------------
    // 检查与描述
    // ------------------------------------------------------------------

    /// 检查不变量：实际速率不超过期望速率，链路承载不超过容量，
    /// 每个节点对每条流的输出速率与其拆分前的输入一致。
    pub fn check_consistency(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for flow in self.flows.values() {
            let (g, d) = (flow.granted_rate(), flow.desired_rate());
            if g > d && !g.approx_eq(d) {
                problems.push(format!("flow {} granted {} > desired {}", flow.id().0, g, d));
            }
        }
        for link in &self.links {
            if link.is_overcommitted() {
                problems.push(format!(
                    "link {} ({} -> {}) carries {} over capacity {}",
                    link.id.0,
                    link.from.0,
                    link.to.0,
                    link.load(),
                    link.capacity
                ));
            }
        }
        for node in self.nodes.values() {
            for &fid in node.flow_table().generated() {
                let Some(flow) = self.flows.get(&fid) else {
                    problems.push(format!("node {} generates unknown flow {}", node.id().0, fid.0));
                    continue;
                };
                if flow.transmitter() == flow.destination() {
                    continue;
                }
                let out = node.flow_table().out_rate_of(fid);
                if !out.approx_eq(flow.granted_rate()) {
                    problems.push(format!(
                        "flow {} leaves {} at {} but is granted {}",
                        fid.0,
                        node.id().0,
                        out,
                        flow.granted_rate()
                    ));
                }
            }
        }
        problems
    }

    /// 所有经过 `node` 的流
    pub fn flows_through(&self, node: NodeId) -> Result<BTreeSet<FlowId>> {
        Ok(self.node(node)?.flow_table().transiting_flows())
    }

    /// 网络的文本描述
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== NETWORK ===\nnodes: {}  links: {}  flows: {}",
            self.nodes.len(),
            self.links.len() / 2,
            self.flows.len()
        );
        for node in self.nodes.values() {
            out.push_str(&node.describe());
        }
        out
    }
}
