//! 网络控制器
//!
//! 仿真时间、流登记表与节点占用状态的唯一修改者；对上层提供流生命周期
//! 操作与时间推进，内部驱动网络、转发策略与能耗记录器。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::clock::{Clock, TimeSource};
use super::snapshot::{NetworkSnapshot, NodeSnapshot};
use crate::energy::NetworkEnergyRecorder;
use crate::error::{NetError, Result};
use crate::net::{FlowId, FlowIdDispenser, NetFlow, Network, NodeId, NodeKind, RateChangeCallback};
use crate::sim::{ExecStats, SimTime, Workload};
use crate::topo::TopologySpec;
use crate::units::DataRate;

#[derive(Debug)]
pub struct NetworkController {
    network: Network,
    recorder: NetworkEnergyRecorder,
    clock: Clock,
    claimed: BTreeSet<NodeId>,
    virtual_mapping: BTreeMap<NodeId, NodeId>,
    dispenser: Arc<FlowIdDispenser>,
}

impl NetworkController {
    pub fn new(network: Network) -> Self {
        Self::with_dispenser(network, Arc::new(FlowIdDispenser::new()))
    }

    /// 使用给定的 flow id 分配器（可在多个 workload 之间共享）。
    pub fn with_dispenser(mut network: Network, dispenser: Arc<FlowIdDispenser>) -> Self {
        network.rebuild_routing();
        let recorder = NetworkEnergyRecorder::new(&mut network);
        info!(
            nodes = network.num_nodes(),
            endpoints = network.endpoints().count(),
            "🚀 网络控制器已创建"
        );
        Self {
            network,
            recorder,
            clock: Clock::default(),
            claimed: BTreeSet::new(),
            virtual_mapping: BTreeMap::new(),
            dispenser,
        }
    }

    /// 从拓扑描述文件构建。文件无法读取或解析时返回错误。
    pub fn from_topology_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let spec = TopologySpec::from_file(path).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "❌ 无法加载拓扑文件");
        })?;
        Self::from_topology_spec(&spec)
    }

    pub fn from_topology_spec(spec: &TopologySpec) -> Result<Self> {
        Ok(Self::new(spec.build()?))
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn energy_recorder(&self) -> &NetworkEnergyRecorder {
        &self.recorder
    }

    pub fn dispenser(&self) -> &Arc<FlowIdDispenser> {
        &self.dispenser
    }

    // ------------------------------------------------------------------
    // 节点占用
    // ------------------------------------------------------------------

    /// 占用第一个未被占用的端点（先主机，后核心交换机）。
    pub fn claim_next_node(&mut self) -> Option<NodeId> {
        self.claim_next_host_node()
            .or_else(|| self.claim_next_core_node())
    }

    pub fn claim_next_host_node(&mut self) -> Option<NodeId> {
        self.claim_next_of_kind(NodeKind::Host)
    }

    pub fn claim_next_core_node(&mut self) -> Option<NodeId> {
        self.claim_next_of_kind(NodeKind::CoreSwitch)
    }

    fn claim_next_of_kind(&mut self, kind: NodeKind) -> Option<NodeId> {
        let id = self
            .network
            .nodes()
            .filter(|n| n.kind() == kind)
            .map(|n| n.id())
            .find(|id| !self.claimed.contains(id))?;
        self.claimed.insert(id);
        debug!(node = ?id, kind = kind.label(), "占用节点");
        Some(id)
    }

    /// 占用指定节点；节点不存在、不是端点或已被占用时失败（记录日志）。
    pub fn claim_node(&mut self, id: NodeId) -> Result<()> {
        if let Err(e) = self.check_claimable(id) {
            error!(node = ?id, error = %e, "无法占用节点");
            return Err(e);
        }
        self.claimed.insert(id);
        debug!(node = ?id, "占用节点");
        Ok(())
    }

    fn check_claimable(&self, id: NodeId) -> Result<()> {
        if !self.network.node(id)?.is_endpoint() {
            return Err(NetError::NotEndpoint(id));
        }
        if self.claimed.contains(&id) {
            return Err(NetError::AlreadyClaimed(id));
        }
        Ok(())
    }

    pub fn claimed_nodes(&self) -> &BTreeSet<NodeId> {
        &self.claimed
    }

    pub fn is_claimed(&self, id: NodeId) -> bool {
        self.claimed.contains(&id)
    }

    // ------------------------------------------------------------------
    // 流生命周期
    // ------------------------------------------------------------------

    /// 启动一条流。
    ///
    /// 发送方必须是已占用的端点，目的地必须是端点，id 不能重复；
    /// 任一校验失败都会记录原因并返回错误，不修改任何状态。
    #[tracing::instrument(skip(self, on_rate_change), fields(from = ?transmitter, to = ?destination, rate = %rate))]
    pub fn start_flow(
        &mut self,
        transmitter: NodeId,
        destination: NodeId,
        rate: DataRate,
        flow_id: Option<FlowId>,
        on_rate_change: Option<RateChangeCallback>,
    ) -> Result<FlowId> {
        let res = self.try_start_flow(transmitter, destination, rate, flow_id, on_rate_change);
        if let Err(e) = &res {
            error!(error = %e, "❌ 无法启动流");
        }
        res
    }

    fn try_start_flow(
        &mut self,
        transmitter: NodeId,
        destination: NodeId,
        rate: DataRate,
        flow_id: Option<FlowId>,
        on_rate_change: Option<RateChangeCallback>,
    ) -> Result<FlowId> {
        if !self.claimed.contains(&transmitter) {
            // 区分“节点不存在”与“未占用”
            self.network.node(transmitter)?;
            return Err(NetError::NotClaimed(transmitter));
        }
        if !self.network.node(destination)?.is_endpoint() {
            return Err(NetError::NotEndpoint(destination));
        }
        if rate.kbps() < 0.0 {
            return Err(NetError::NegativeRate(rate.kbps()));
        }
        if let Some(id) = flow_id {
            if self.network.flow(id).is_some() {
                return Err(NetError::DuplicateFlowId(id));
            }
        }

        let id = match flow_id {
            Some(id) => {
                self.dispenser.observe(id);
                id
            }
            None => self.dispenser.next_id(),
        };
        let mut flow = NetFlow::new(id, transmitter, destination, rate);
        if let Some(cb) = on_rate_change {
            flow.add_rate_change_callback(cb);
        }
        self.network.start_flow(flow)
    }

    /// 更新 (from, to) 之间 id 最小的那条流的速率；不存在时启动一条新流。
    pub fn start_or_update_flow(
        &mut self,
        transmitter: NodeId,
        destination: NodeId,
        rate: DataRate,
    ) -> Result<FlowId> {
        let existing = self
            .network
            .flows()
            .find(|f| f.transmitter() == transmitter && f.destination() == destination)
            .map(NetFlow::id);
        match existing {
            Some(id) => self.set_flow_rate(id, rate).map(|_| id),
            None => self.start_flow(transmitter, destination, rate, None, None),
        }
    }

    /// 修改流的期望速率并重新分配。
    pub fn set_flow_rate(&mut self, id: FlowId, rate: DataRate) -> Result<()> {
        self.network
            .set_desired_rate(id, rate)
            .inspect_err(|e| error!(flow_id = ?id, error = %e, "❌ 无法修改流速率"))
    }

    /// 为已有的流追加一个速率变化回调。
    pub fn on_rate_change(&mut self, id: FlowId, cb: RateChangeCallback) -> Result<()> {
        let flow = self.network.flow_mut(id).ok_or(NetError::UnknownFlow(id))?;
        flow.add_rate_change_callback(cb);
        Ok(())
    }

    /// 停止并移除一条流；id 未知时返回 `false`。
    pub fn stop_flow(&mut self, id: FlowId) -> bool {
        match self.network.stop_flow(id) {
            Ok(_) => true,
            Err(e) => {
                debug!(flow_id = ?id, error = %e, "无法停止流");
                false
            }
        }
    }

    pub fn flow(&self, id: FlowId) -> Option<&NetFlow> {
        self.network.flow(id)
    }

    // ------------------------------------------------------------------
    // 时间
    // ------------------------------------------------------------------

    /// 当前时刻（外部时间源优先）
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// 上一次推进或同步之后的时刻
    pub fn last_update(&self) -> SimTime {
        self.clock.last_update
    }

    /// 设置外部时间源，之后应通过 [`NetworkController::sync`] 与其同步。
    pub fn set_time_source(&mut self, src: Box<dyn TimeSource>) {
        info!("⏱️  使用外部时间源");
        self.clock.set_external(src);
    }

    pub fn clear_time_source(&mut self) -> Option<Box<dyn TimeSource>> {
        self.clock.clear_external()
    }

    /// 推进仿真时间，累计流传输量与能量。
    pub fn advance_by(&mut self, dt: SimTime) {
        if self.clock.is_external() {
            warn!(
                "⚠️ 设置了外部时间源时直接推进时间可能造成歧义，应使用 sync() 与时间源同步"
            );
        }
        self.advance_internal(dt);
    }

    pub(crate) fn advance_internal(&mut self, dt: SimTime) {
        if dt == SimTime::ZERO {
            return;
        }
        self.clock.advance(dt);
        self.network.advance_by(dt);
        self.recorder.advance_by(dt);
    }

    /// 把网络推进到外部时间源的当前时刻，返回推进的时长。
    pub fn sync(&mut self) -> Result<SimTime> {
        if !self.clock.is_external() {
            error!("无法同步网络：未设置外部时间源，请改用 advance_by()");
            return Err(NetError::NoTimeSource);
        }
        let now = self.clock.now();
        let last = self.clock.last_update;
        let Some(span) = now.checked_since(last) else {
            error!(%now, %last, "无法同步网络：外部时间源早于上次更新时刻");
            return Err(NetError::TimeWentBackwards { now, last });
        };
        self.advance_internal(span);
        Ok(span)
    }

    /// 直接设置内部时刻，不积分能量（用于把时钟对齐到 workload 起点）。
    /// 时钟不会回拨：早于内部时刻的请求被忽略。
    pub(crate) fn set_internal_time(&mut self, t: SimTime) {
        if !self.clock.set_internal(t) {
            warn!(%t, now = %self.now(), "⚠️ 忽略早于当前时刻的时钟设置");
        }
    }

    // ------------------------------------------------------------------
    // workload
    // ------------------------------------------------------------------

    /// 把 workload 中的虚拟节点 id 映射为本网络的物理节点 id
    pub fn virtual_map(&mut self, from: NodeId, to: NodeId) {
        if self.virtual_mapping.insert(from, to).is_some() {
            warn!(virtual_id = from.0, "覆盖已有的虚拟节点映射");
        }
    }

    pub fn mapped_or_self(&self, id: NodeId) -> NodeId {
        self.virtual_mapping.get(&id).copied().unwrap_or(id)
    }

    pub fn virtual_mapping(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.virtual_mapping
    }

    /// 为 workload 的每个虚拟节点占用一个物理节点并建立映射。
    pub fn perform_virtual_mapping(&mut self, wl: &Workload) -> Result<()> {
        for &vid in wl.core_ids() {
            let pid = self.claim_next_core_node().ok_or_else(|| {
                NetError::InvalidWorkload(
                    "not enough claimable core switches to map the workload".to_string(),
                )
            })?;
            self.virtual_map(vid, pid);
        }
        for &vid in wl.host_ids() {
            let pid = self.claim_next_host_node().ok_or_else(|| {
                NetError::InvalidWorkload(
                    "not enough claimable host nodes to map the workload".to_string(),
                )
            })?;
            self.virtual_map(vid, pid);
        }
        let unmapped: Vec<usize> = wl
            .involved_ids()
            .into_iter()
            .filter(|id| !self.virtual_mapping.contains_key(id))
            .map(|id| id.0)
            .collect();
        if !unmapped.is_empty() {
            warn!(?unmapped, "⚠️ 部分 workload 节点 id 没有映射到物理节点");
        }
        Ok(())
    }

    /// 执行整个 workload。
    ///
    /// `virtual_mapping` 为真时先做虚拟映射；否则 workload 中的 id 即物理 id，
    /// 所有发送方在执行前被占用。
    #[tracing::instrument(skip(self, wl), fields(events = wl.len()))]
    pub fn exec_workload(&mut self, mut wl: Workload, virtual_mapping: bool) -> Result<ExecStats> {
        if virtual_mapping {
            self.perform_virtual_mapping(&wl)?;
        } else {
            for id in wl.transmitters() {
                if self.claimed.contains(&id) {
                    continue;
                }
                if let Err(e) = self.claim_node(id) {
                    debug!(node = ?id, error = %e, "发送方无法占用，相关事件将被拒绝");
                }
            }
        }
        info!("▶️  开始执行 workload\n{}", wl.describe());
        Ok(wl.exec_all(self))
    }

    // ------------------------------------------------------------------
    // 报告
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot::of(self)
    }

    /// 单个节点的快照
    pub fn node_snapshot(&self, id: NodeId) -> Result<NodeSnapshot> {
        NodeSnapshot::of(self, id)
    }

    /// 所有节点的快照，按 id 排序
    pub fn node_snapshots(&self) -> Vec<NodeSnapshot> {
        self.network
            .nodes()
            .filter_map(|n| NodeSnapshot::of(self, n.id()).ok())
            .collect()
    }

    /// 能耗报告
    pub fn fmt_report(&self) -> String {
        self.recorder.fmt_report()
    }

    /// 所有流的表格
    pub fn fmt_flows(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "| {:>8} | {:>6} | {:>6} | {:>16} | {:>16} |",
            "flow", "from", "to", "desired", "granted"
        );
        for f in self.network.flows() {
            let _ = writeln!(
                out,
                "| {:>8} | {:>6} | {:>6} | {:>16} | {:>16} |",
                f.id().0,
                f.transmitter().0,
                f.destination().0,
                f.desired_rate().to_string(),
                f.granted_rate().to_string()
            );
        }
        out
    }

    /// 检查流与链路的一致性；发现问题时逐条记录错误并返回 `false`。
    pub fn check_consistency(&self) -> bool {
        let problems = self.network.check_consistency();
        for p in &problems {
            error!(problem = %p, "❌ 网络状态不一致");
        }
        problems.is_empty()
    }
}
