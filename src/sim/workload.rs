//! 网络 workload
//!
//! 按截止时间排序、一次性消费的事件集合。事件执行前控制器时钟会被推进到
//! 事件的截止时间；若时钟已经越过截止时间，事件被丢弃。

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::event::NetworkEvent;
use super::scheduled_event::ScheduledEvent;
use super::time::SimTime;
use crate::controller::NetworkController;
use crate::error::{NetError, Result};
use crate::net::{FlowId, FlowIdDispenser, NodeId};
use crate::units::DataRate;

/// 单个事件的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Executed,
    /// 截止时间已过，事件被丢弃
    Dropped,
    /// 按时执行，但控制器拒绝了该事件（节点未占用、流不存在等）
    Rejected,
}

/// 一批事件的执行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecStats {
    pub executed: usize,
    pub dropped: usize,
    pub rejected: usize,
}

impl ExecStats {
    fn record(&mut self, outcome: ExecOutcome) {
        match outcome {
            ExecOutcome::Executed => self.executed += 1,
            ExecOutcome::Dropped => self.dropped += 1,
            ExecOutcome::Rejected => self.rejected += 1,
        }
    }

    pub fn consumed(&self) -> usize {
        self.executed + self.dropped + self.rejected
    }
}

#[derive(Debug, Clone)]
pub struct Workload {
    events: BinaryHeap<ScheduledEvent>,
    host_ids: BTreeSet<NodeId>,
    core_ids: BTreeSet<NodeId>,
    start_instant: SimTime,
    end_instant: SimTime,
    size: usize,
}

impl Workload {
    /// 由 (截止时间, 事件) 列表构建；同一时刻的事件保持给定顺序。
    ///
    /// `host_ids` 为空时，所有事件涉及的节点都视为主机（用于虚拟映射）。
    pub fn new(
        events: impl IntoIterator<Item = (SimTime, NetworkEvent)>,
        host_ids: BTreeSet<NodeId>,
        core_ids: BTreeSet<NodeId>,
    ) -> Result<Self> {
        if let Some(id) = host_ids.intersection(&core_ids).next() {
            return Err(NetError::InvalidWorkload(format!(
                "node id {} is declared both as host and as core switch",
                id.0
            )));
        }

        let heap: BinaryHeap<ScheduledEvent> = events
            .into_iter()
            .enumerate()
            .map(|(i, (at, ev))| ScheduledEvent {
                at,
                seq: i as u64,
                ev,
            })
            .collect();

        let has_update = heap
            .iter()
            .any(|e| matches!(e.ev, NetworkEvent::FlowUpdate { .. }));
        let has_other = heap
            .iter()
            .any(|e| !matches!(e.ev, NetworkEvent::FlowUpdate { .. }));
        if has_update && has_other {
            warn!(
                "⚠️ workload 同时包含 FlowUpdate 与其他事件：FlowUpdate 假设两个节点之间只有一条流，\
                 会更新找到的第一条同向流，存在多条时结果可能不符合预期"
            );
        }

        let host_ids = if host_ids.is_empty() {
            heap.iter()
                .flat_map(|e| e.ev.involved_ids())
                .filter(|id| !core_ids.contains(id))
                .collect()
        } else {
            host_ids
        };

        let start_instant = heap.iter().map(|e| e.at).min().unwrap_or(SimTime::ZERO);
        let end_instant = heap.iter().map(|e| e.at).max().unwrap_or(SimTime::ZERO);
        let size = heap.len();

        Ok(Self {
            events: heap,
            host_ids,
            core_ids,
            start_instant,
            end_instant,
            size,
        })
    }

    pub fn builder(dispenser: &FlowIdDispenser) -> WorkloadBuilder<'_> {
        WorkloadBuilder {
            dispenser,
            events: Vec::new(),
            host_ids: BTreeSet::new(),
            core_ids: BTreeSet::new(),
        }
    }

    /// 第一个事件的截止时间
    pub fn start_instant(&self) -> SimTime {
        self.start_instant
    }

    /// 最后一个事件的截止时间
    pub fn end_instant(&self) -> SimTime {
        self.end_instant
    }

    /// 构建时的事件总数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 剩余未消费的事件数
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_next(&self) -> bool {
        !self.events.is_empty()
    }

    /// 下一个事件的截止时间
    pub fn peek_deadline(&self) -> Option<SimTime> {
        self.events.peek().map(|e| e.at)
    }

    pub fn host_ids(&self) -> &BTreeSet<NodeId> {
        &self.host_ids
    }

    pub fn core_ids(&self) -> &BTreeSet<NodeId> {
        &self.core_ids
    }

    /// 所有事件涉及的节点 id
    pub fn involved_ids(&self) -> BTreeSet<NodeId> {
        self.events.iter().flat_map(|e| e.ev.involved_ids()).collect()
    }

    /// 所有事件的发送方 id
    pub fn transmitters(&self) -> BTreeSet<NodeId> {
        self.events.iter().filter_map(|e| e.ev.transmitter()).collect()
    }

    /// 执行恰好一个事件；没有剩余事件时记录错误并返回 `NoEventsRemaining`。
    pub fn exec_next(&mut self, ctrl: &mut NetworkController) -> Result<ExecOutcome> {
        let Some(next) = self.events.pop() else {
            error!("无法执行网络事件：workload 中已没有剩余事件");
            return Err(NetError::NoEventsRemaining);
        };
        Ok(exec_if_not_passed(ctrl, next))
    }

    /// 执行所有剩余事件。
    #[tracing::instrument(skip(self, ctrl), fields(remaining = self.events.len()))]
    pub fn exec_all(&mut self, ctrl: &mut NetworkController) -> ExecStats {
        let mut stats = ExecStats::default();
        while let Some(next) = self.events.pop() {
            stats.record(exec_if_not_passed(ctrl, next));
        }
        info!(
            executed = stats.executed,
            dropped = stats.dropped,
            rejected = stats.rejected,
            "✅ workload 执行完毕"
        );
        stats
    }

    /// 执行所有截止时间严格早于 `instant` 的事件，然后把时钟推进到 `instant`。
    #[tracing::instrument(skip(self, ctrl), fields(until = %instant))]
    pub fn exec_until(&mut self, ctrl: &mut NetworkController, instant: SimTime) -> ExecStats {
        let mut stats = ExecStats::default();
        while self.events.peek().is_some_and(|e| e.at < instant) {
            if let Some(next) = self.events.pop() {
                stats.record(exec_if_not_passed(ctrl, next));
            }
        }
        if let Some(dt) = instant.checked_since(ctrl.now()) {
            ctrl.advance_internal(dt);
        }
        debug!(
            executed = stats.executed,
            dropped = stats.dropped,
            rejected = stats.rejected,
            "执行到指定时刻"
        );
        stats
    }

    /// 把只由 FlowUpdate 组成的 workload 转换为 FlowStart + FlowChangeRate，
    /// 同一 (from, to) 的后续更新引用第一次启动时预留的 flow id。
    ///
    /// 含其他事件时无法转换，记录错误并原样返回。
    pub fn optimize(self, dispenser: &FlowIdDispenser) -> Workload {
        if self
            .events
            .iter()
            .any(|e| !matches!(e.ev, NetworkEvent::FlowUpdate { .. }))
        {
            error!("无法优化 workload：只有完全由 FlowUpdate 组成的 workload 可以优化");
            return self;
        }

        let mut ordered = self.events.clone().into_sorted_vec();
        ordered.reverse();

        let mut started: BTreeMap<(NodeId, NodeId), FlowId> = BTreeMap::new();
        let events: Vec<(SimTime, NetworkEvent)> = ordered
            .into_iter()
            .filter_map(|se| match se.ev {
                NetworkEvent::FlowUpdate { from, to, rate } => {
                    let ev = match started.get(&(from, to)) {
                        Some(&flow_id) => NetworkEvent::FlowChangeRate { flow_id, rate },
                        None => {
                            let flow_id = dispenser.next_id();
                            started.insert((from, to), flow_id);
                            NetworkEvent::FlowStart {
                                from,
                                to,
                                rate,
                                flow_id: Some(flow_id),
                            }
                        }
                    };
                    Some((se.at, ev))
                }
                _ => None,
            })
            .collect();

        match Workload::new(events, self.host_ids.clone(), self.core_ids.clone()) {
            Ok(wl) => wl,
            Err(e) => {
                error!(error = %e, "无法优化 workload");
                self
            }
        }
    }

    /// workload 摘要
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "| == NETWORK WORKLOAD ===");
        let _ = writeln!(out, "| start instant: {}", self.start_instant);
        let _ = writeln!(out, "| end instant: {}", self.end_instant);
        let _ = writeln!(
            out,
            "| duration: {}",
            self.end_instant.saturating_since(self.start_instant)
        );
        let _ = write!(out, "| num of network events: {}", self.events.len());
        out
    }
}

/// 截止时间未过则推进时钟并执行，否则丢弃。被控制器拒绝的事件单独计数。
fn exec_if_not_passed(ctrl: &mut NetworkController, se: ScheduledEvent) -> ExecOutcome {
    let now = ctrl.now();
    let Some(dt) = se.at.checked_since(now) else {
        error!(
            error = %NetError::StaleEvent { deadline: se.at, now },
            event = %se.ev,
            "无法执行网络事件，事件被丢弃"
        );
        return ExecOutcome::Dropped;
    };
    ctrl.advance_internal(dt);
    debug!(at = %se.at, event = %se.ev, "执行网络事件");
    if se.ev.apply(ctrl) {
        ExecOutcome::Executed
    } else {
        warn!(at = %se.at, event = %se.ev, "⚠️ 网络事件被拒绝");
        ExecOutcome::Rejected
    }
}

/// 逐个追加事件，启动事件的 flow id 在构建时即从分配器预留。
#[derive(Debug)]
pub struct WorkloadBuilder<'a> {
    dispenser: &'a FlowIdDispenser,
    events: Vec<(SimTime, NetworkEvent)>,
    host_ids: BTreeSet<NodeId>,
    core_ids: BTreeSet<NodeId>,
}

impl WorkloadBuilder<'_> {
    /// 追加一个启动事件，返回预留给该流的 id
    pub fn flow_start(&mut self, at: SimTime, from: NodeId, to: NodeId, rate: DataRate) -> FlowId {
        let flow_id = self.dispenser.next_id();
        self.events.push((
            at,
            NetworkEvent::FlowStart {
                from,
                to,
                rate,
                flow_id: Some(flow_id),
            },
        ));
        flow_id
    }

    pub fn flow_update(&mut self, at: SimTime, from: NodeId, to: NodeId, rate: DataRate) -> &mut Self {
        self.events.push((at, NetworkEvent::FlowUpdate { from, to, rate }));
        self
    }

    pub fn flow_change_rate(&mut self, at: SimTime, flow_id: FlowId, rate: DataRate) -> &mut Self {
        self.events
            .push((at, NetworkEvent::FlowChangeRate { flow_id, rate }));
        self
    }

    pub fn flow_stop(&mut self, at: SimTime, flow_id: FlowId) -> &mut Self {
        self.events.push((at, NetworkEvent::FlowStop { flow_id }));
        self
    }

    pub fn event(&mut self, at: SimTime, ev: NetworkEvent) -> &mut Self {
        if let NetworkEvent::FlowStart {
            flow_id: Some(id), ..
        } = ev
        {
            self.dispenser.observe(id);
        }
        self.events.push((at, ev));
        self
    }

    pub fn host(&mut self, id: NodeId) -> &mut Self {
        self.host_ids.insert(id);
        self
    }

    pub fn core(&mut self, id: NodeId) -> &mut Self {
        self.core_ids.insert(id);
        self
    }

    pub fn build(self) -> Result<Workload> {
        Workload::new(self.events, self.host_ids, self.core_ids)
    }
}
