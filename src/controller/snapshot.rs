//! 网络快照与单节点快照

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;

use super::network_controller::NetworkController;
use crate::error::Result;
use crate::net::{FlowId, NetFlow, NodeId, NodeKind};
use crate::sim::SimTime;
use crate::units::{DataRate, Energy, Power};

/// 流的 (实际 / 期望) 比例；期望为 0 的流视为完全满足。
fn throughput_ratio(f: &NetFlow) -> f64 {
    if f.desired_rate().kbps() > 0.0 {
        f.granted_rate().ratio(f.desired_rate())
    } else {
        1.0
    }
}

/// 某一时刻的网络统计。
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub instant: SimTime,
    pub num_nodes: usize,
    pub num_host_nodes: usize,
    pub claimed_host_nodes: usize,
    pub num_core_switches: usize,
    pub num_active_flows: usize,
    /// 所有流实际速率之和
    pub total_throughput: DataRate,
    /// 所有流期望速率之和
    pub total_demand: DataRate,
    /// 总实际速率 / 总期望速率；没有需求时为 `None`
    pub total_throughput_ratio: Option<f64>,
    /// 各流 (实际 / 期望) 的平均值；没有流时为 `None`
    pub avg_throughput_ratio: Option<f64>,
    /// 需求被完全满足的流所占比例
    pub satisfied_ratio: Option<f64>,
    pub current_power: Power,
    pub avg_power: Power,
    pub total_energy: Energy,
}

impl NetworkSnapshot {
    pub(crate) fn of(ctrl: &NetworkController) -> Self {
        let net = ctrl.network();
        let rec = ctrl.energy_recorder();

        let hosts: Vec<_> = net.hosts().collect();
        let claimed_host_nodes = hosts.iter().filter(|&&id| ctrl.is_claimed(id)).count();

        let flows: Vec<_> = net.flows().collect();
        let total_throughput: DataRate = flows.iter().map(|f| f.granted_rate()).sum();
        let total_demand: DataRate = flows.iter().map(|f| f.desired_rate()).sum();
        let total_throughput_ratio =
            (total_demand.kbps() > 0.0).then(|| total_throughput.ratio(total_demand));

        let ratios: Vec<f64> = flows.iter().map(|f| throughput_ratio(f)).collect();
        let n = ratios.len() as f64;
        let avg_throughput_ratio = (!ratios.is_empty()).then(|| ratios.iter().sum::<f64>() / n);
        let satisfied_ratio = (!flows.is_empty())
            .then(|| flows.iter().filter(|f| f.is_satisfied()).count() as f64 / n);

        Self {
            instant: ctrl.now(),
            num_nodes: net.num_nodes(),
            num_host_nodes: hosts.len(),
            claimed_host_nodes,
            num_core_switches: net
                .nodes()
                .filter(|n| n.kind() == NodeKind::CoreSwitch)
                .count(),
            num_active_flows: flows.len(),
            total_throughput,
            total_demand,
            total_throughput_ratio,
            avg_throughput_ratio,
            satisfied_ratio,
            current_power: rec.current_consumption(),
            avg_power: rec.average_power(),
            total_energy: rec.total_consumption(),
        }
    }

    /// 两行表格：表头 + 数值
    pub fn describe(&self) -> String {
        let pct = |r: Option<f64>| match r {
            Some(r) => format!("{:.5}%", r * 100.0),
            None => "N/A".to_string(),
        };
        let mut out = String::new();
        let _ = writeln!(
            out,
            "| {:<14}{:<8}{:<18}{:<15}{:<14}{:<20}{:<20}{:<20}{:<18}{:<18}{:<18}",
            "instant",
            "nodes",
            "hosts (claimed)",
            "core switches",
            "active flows",
            "tot throughput",
            "tot throughput %",
            "avg throughput %",
            "curr pwr use",
            "avg pwr use",
            "energy consumed",
        );
        let _ = write!(
            out,
            "| {:<14}{:<8}{:<18}{:<15}{:<14}{:<20}{:<20}{:<20}{:<18}{:<18}{:<18}",
            self.instant.to_string(),
            self.num_nodes,
            format!("{}({})", self.num_host_nodes, self.claimed_host_nodes),
            self.num_core_switches,
            self.num_active_flows,
            self.total_throughput.to_string(),
            pct(self.total_throughput_ratio),
            pct(self.avg_throughput_ratio),
            format!("{:.5}W", self.current_power.watts()),
            format!("{:.5}W", self.avg_power.watts()),
            format!("{:.5}J", self.total_energy.joules()),
        );
        out
    }
}

/// 某一时刻单个节点的统计。
///
/// 吞吐比例只看从该节点发出的流（自己生成的与转发的）。节点对一条流的需求
/// 按该流在此节点的输出占其实际速率的比例折算自期望速率。
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub instant: SimTime,
    pub node: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// 流入的流：本节点消费的 + 经本节点转发的
    pub flows_in: usize,
    /// 流出的流：本节点生成的 + 经本节点转发的
    pub flows_out: usize,
    pub generated: usize,
    pub consumed: usize,
    pub min_throughput_ratio: Option<f64>,
    pub max_throughput_ratio: Option<f64>,
    pub avg_throughput_ratio: Option<f64>,
    /// 输出速率之和 / 折算需求之和
    pub total_throughput_ratio: Option<f64>,
    /// 不统计能耗的节点为 0
    pub current_power: Power,
}

impl NodeSnapshot {
    pub(crate) fn of(ctrl: &NetworkController, id: NodeId) -> Result<Self> {
        let net = ctrl.network();
        let node = net.node(id)?;
        let ft = node.flow_table();

        let outgoing: BTreeSet<FlowId> = ft
            .outgoing()
            .keys()
            .chain(ft.generated())
            .copied()
            .collect();
        let forwarded = outgoing.iter().filter(|f| !ft.generated().contains(f)).count();

        let mut ratios = Vec::with_capacity(outgoing.len());
        let (mut out_sum, mut demand_sum) = (0.0, 0.0);
        for flow in outgoing.iter().filter_map(|&f| net.flow(f)) {
            let ratio = throughput_ratio(flow);
            let out = ft.out_rate_of(flow.id()).kbps();
            out_sum += out;
            demand_sum += if ratio > 0.0 {
                out / ratio
            } else {
                flow.desired_rate().kbps()
            };
            ratios.push(ratio);
        }

        let n = ratios.len() as f64;
        let nonempty = !ratios.is_empty();
        Ok(Self {
            instant: ctrl.now(),
            node: id,
            name: node.name().to_string(),
            kind: node.kind(),
            flows_in: ft.receiving().len() + forwarded,
            flows_out: outgoing.len(),
            generated: ft.generated().len(),
            consumed: ft.receiving().len(),
            min_throughput_ratio: nonempty
                .then(|| ratios.iter().copied().fold(f64::INFINITY, f64::min)),
            max_throughput_ratio: nonempty.then(|| ratios.iter().copied().fold(0.0, f64::max)),
            avg_throughput_ratio: nonempty.then(|| ratios.iter().sum::<f64>() / n),
            total_throughput_ratio: (demand_sum > 0.0).then(|| out_sum / demand_sum),
            current_power: net
                .monitor(id)
                .map(|m| m.current_consumption())
                .unwrap_or(Power::ZERO),
        })
    }

    /// 两行表格：表头 + 数值
    pub fn describe(&self) -> String {
        let pct = |r: Option<f64>| match r {
            Some(r) => format!("{:.5}%", r * 100.0),
            None => "N/A".to_string(),
        };
        let mut out = String::new();
        let _ = writeln!(
            out,
            "| {:<14}{:<22}{:<10}{:<11}{:<11}{:<18}{:<18}{:<18}{:<18}{:<18}",
            "instant",
            "node",
            "flows in",
            "flows out",
            "gen/cons",
            "min throughput %",
            "max throughput %",
            "avg throughput %",
            "tot throughput %",
            "curr pwr use",
        );
        let _ = write!(
            out,
            "| {:<14}{:<22}{:<10}{:<11}{:<11}{:<18}{:<18}{:<18}{:<18}{:<18}",
            self.instant.to_string(),
            format!("{}#{}({})", self.kind.label(), self.node.0, self.name),
            self.flows_in,
            self.flows_out,
            format!("{}/{}", self.generated, self.consumed),
            pct(self.min_throughput_ratio),
            pct(self.max_throughput_ratio),
            pct(self.avg_throughput_ratio),
            pct(self.total_throughput_ratio),
            format!("{:.5}W", self.current_power.watts()),
        );
        out
    }
}
