//! Fat-tree 拓扑构建

use tracing::info;

use crate::error::{NetError, Result};
use crate::net::{Network, NodeId};
use crate::units::DataRate;

/// 一类节点的端口配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortOpts {
    pub port_speed: DataRate,
    pub num_ports: usize,
}

impl PortOpts {
    pub fn new(port_speed: DataRate, num_ports: usize) -> Self {
        Self {
            port_speed,
            num_ports,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FatTreeOpts {
    pub core: PortOpts,
    pub aggr: PortOpts,
    pub tor: PortOpts,
    pub host: PortOpts,
}

impl FatTreeOpts {
    /// 三层交换机使用同一配置
    pub fn uniform(switch: PortOpts, host: PortOpts) -> Self {
        Self {
            core: switch,
            aggr: switch,
            tor: switch,
            host,
        }
    }

    /// 所有交换机端口数的最小值向下取偶
    pub fn k(&self) -> usize {
        self.core
            .num_ports
            .min(self.aggr.num_ports)
            .min(self.tor.num_ports)
            / 2
            * 2
    }
}

impl Default for FatTreeOpts {
    fn default() -> Self {
        Self::uniform(
            PortOpts::new(DataRate::from_mbps(1000.0), 4),
            PortOpts::new(DataRate::from_mbps(1000.0), 1),
        )
    }
}

#[derive(Debug, Clone)]
pub struct FatTreeTopology {
    pub k: usize,
    pub hosts: Vec<NodeId>,
    pub tor_switches: Vec<NodeId>,
    pub aggr_switches: Vec<NodeId>,
    pub core_switches: Vec<NodeId>,
}

impl FatTreeTopology {
    fn half(&self) -> usize {
        self.k / 2
    }

    pub fn host(&self, pod: usize, tor: usize, host: usize) -> NodeId {
        let half = self.half();
        let idx = (pod * half + tor) * half + host;
        self.hosts[idx]
    }

    pub fn tor(&self, pod: usize, tor: usize) -> NodeId {
        let half = self.half();
        self.tor_switches[pod * half + tor]
    }

    pub fn aggr(&self, pod: usize, aggr: usize) -> NodeId {
        let half = self.half();
        self.aggr_switches[pod * half + aggr]
    }

    pub fn core(&self, group: usize, index: usize) -> NodeId {
        let half = self.half();
        self.core_switches[group * half + index]
    }
}

/// 构建 k 叉 fat-tree：(k/2)^2 台核心交换机，k 个 pod，
/// 每个 pod 有 k/2 台汇聚交换机、k/2 台 ToR 交换机与 (k/2)^2 台主机。
pub fn build_fat_tree(net: &mut Network, opts: &FatTreeOpts) -> Result<FatTreeTopology> {
    let k = opts.k();
    if k <= 2 {
        return Err(NetError::InvalidTopology(format!(
            "fat-tree needs switches with an even number (> 2) of ports, got k={k}"
        )));
    }
    info!(k, "🌲 构建 fat-tree");

    let half = k / 2;

    let mut core_switches = Vec::with_capacity(half * half);
    for group in 0..half {
        for index in 0..half {
            let name = format!("c{}_{}", group, index);
            core_switches.push(net.add_core_switch(name, opts.core.port_speed, opts.core.num_ports));
        }
    }

    let mut hosts = Vec::with_capacity(k * half * half);
    let mut tor_switches = Vec::with_capacity(k * half);
    let mut aggr_switches = Vec::with_capacity(k * half);

    for pod in 0..k {
        let mut tors = Vec::with_capacity(half);
        for tor in 0..half {
            let name = format!("p{}_t{}", pod, tor);
            tors.push(net.add_switch(name, opts.tor.port_speed, opts.tor.num_ports));
        }

        for (tor_idx, &tor_id) in tors.iter().enumerate() {
            for host in 0..half {
                let name = format!("h{}_{}_{}", pod, tor_idx, host);
                let host_id = net.add_node(
                    crate::net::NodeKind::Host,
                    name,
                    opts.host.port_speed,
                    opts.host.num_ports.max(1),
                );
                net.connect(host_id, tor_id)?;
                hosts.push(host_id);
            }
        }

        for aggr in 0..half {
            let name = format!("p{}_a{}", pod, aggr);
            let aggr_id = net.add_switch(name, opts.aggr.port_speed, opts.aggr.num_ports);
            for &tor_id in &tors {
                net.connect(aggr_id, tor_id)?;
            }
            for index in 0..half {
                net.connect(aggr_id, core_switches[aggr * half + index])?;
            }
            aggr_switches.push(aggr_id);
        }

        tor_switches.extend(tors);
    }

    net.rebuild_routing();

    Ok(FatTreeTopology {
        k,
        hosts,
        tor_switches,
        aggr_switches,
        core_switches,
    })
}
