//! 拓扑描述文件
//!
//! JSON 形式的拓扑声明，解析后构建为运行时 [`Network`]。

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::fat_tree::{FatTreeOpts, PortOpts, build_fat_tree};
use crate::error::{NetError, Result};
use crate::net::{Network, NodeId, NodeKind};
use crate::units::DataRate;

fn default_port_speed_mbps() -> f64 {
    1000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// 显式列出节点与链路
    Custom {
        nodes: Vec<NodeSpec>,
        /// 每项为 `[a, b]`，表示 a 与 b 之间的一条全双工链路
        #[serde(default)]
        links: Vec<Vec<usize>>,
        /// 为真时添加互联网节点并连到所有核心交换机
        #[serde(default)]
        internet: bool,
    },
    /// 三层 fat-tree；`switch` 为三层共用配置，也可以按层分别给出
    FatTree {
        #[serde(default)]
        switch: Option<SwitchSpec>,
        #[serde(default)]
        core: Option<SwitchSpec>,
        #[serde(default)]
        aggr: Option<SwitchSpec>,
        #[serde(default)]
        tor: Option<SwitchSpec>,
        #[serde(default)]
        host: HostSpec,
        #[serde(default)]
        internet: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub id: Option<usize>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_port_speed_mbps")]
    pub port_speed_mbps: f64,
    /// 缺省时主机为 1，交换机为 48
    #[serde(default)]
    pub num_ports: Option<usize>,
}

impl NodeSpec {
    fn num_ports(&self) -> usize {
        self.num_ports.unwrap_or(match self.kind {
            NodeKind::Host => 1,
            NodeKind::Switch | NodeKind::CoreSwitch => 48,
            NodeKind::Internet => 0,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwitchSpec {
    #[serde(default = "default_port_speed_mbps")]
    pub port_speed_mbps: f64,
    pub num_ports: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HostSpec {
    #[serde(default = "default_port_speed_mbps")]
    pub port_speed_mbps: f64,
    #[serde(default = "default_host_ports")]
    pub num_ports: usize,
}

fn default_host_ports() -> usize {
    1
}

impl Default for HostSpec {
    fn default() -> Self {
        Self {
            port_speed_mbps: default_port_speed_mbps(),
            num_ports: default_host_ports(),
        }
    }
}

fn port_speed(mbps: f64) -> Result<DataRate> {
    if !(mbps >= 0.0) || !mbps.is_finite() {
        return Err(NetError::InvalidTopology(format!("invalid port speed {mbps} Mbps")));
    }
    Ok(DataRate::from_mbps(mbps))
}

impl SwitchSpec {
    fn opts(&self) -> Result<PortOpts> {
        Ok(PortOpts::new(port_speed(self.port_speed_mbps)?, self.num_ports))
    }
}

impl TopologySpec {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// 构建运行时网络；路由表在返回前已计算完毕。
    pub fn build(&self) -> Result<Network> {
        let (mut net, internet) = match self {
            TopologySpec::Custom {
                nodes,
                links,
                internet,
            } => (build_custom(nodes, links)?, *internet),
            TopologySpec::FatTree {
                switch,
                core,
                aggr,
                tor,
                host,
                internet,
            } => {
                let layer = |s: &Option<SwitchSpec>, name: &str| -> Result<PortOpts> {
                    s.or(*switch)
                        .ok_or_else(|| {
                            NetError::InvalidTopology(format!(
                                "fat-tree needs either `switch` or `{name}` specs"
                            ))
                        })?
                        .opts()
                };
                let opts = FatTreeOpts {
                    core: layer(core, "core")?,
                    aggr: layer(aggr, "aggr")?,
                    tor: layer(tor, "tor")?,
                    host: PortOpts::new(port_speed(host.port_speed_mbps)?, host.num_ports),
                };
                let mut net = Network::new();
                build_fat_tree(&mut net, &opts)?;
                (net, *internet)
            }
        };
        if internet {
            net.connect_internet()?;
        }
        info!(nodes = net.num_nodes(), links = net.links().len() / 2, "🏗️  拓扑构建完成");
        Ok(net)
    }
}

fn build_custom(nodes: &[NodeSpec], links: &[Vec<usize>]) -> Result<Network> {
    let mut net = Network::new();

    // 先放显式 id 的节点，自动分配的 id 不会与它们冲突
    let (explicit, auto): (Vec<&NodeSpec>, Vec<&NodeSpec>) =
        nodes.iter().partition(|n| n.id.is_some());
    if nodes.iter().any(|n| n.kind == NodeKind::Internet) {
        return Err(NetError::InvalidTopology(
            "the internet node cannot be declared explicitly, set `internet: true` instead"
                .to_string(),
        ));
    }

    for spec in explicit {
        let Some(id) = spec.id else { continue };
        let name = spec.name.clone().unwrap_or_else(|| format!("n{id}"));
        let speed = port_speed(spec.port_speed_mbps)?;
        if let Err(e) = net.add_node_with_id(NodeId(id), spec.kind, name, speed, spec.num_ports()) {
            warn!(error = %e, "⚠️ 忽略无效的节点");
        }
    }
    for spec in auto {
        let speed = port_speed(spec.port_speed_mbps)?;
        let name = spec.name.clone().unwrap_or_default();
        net.add_node(spec.kind, name, speed, spec.num_ports());
    }

    for link in links {
        let &[a, b] = link.as_slice() else {
            warn!(?link, "⚠️ 忽略格式错误的链路（需要恰好两个节点 id）");
            continue;
        };
        let (a, b) = (NodeId(a), NodeId(b));
        if a == b || !net.contains_node(a) || !net.contains_node(b) {
            warn!(a = a.0, b = b.0, "⚠️ 忽略无效链路（自环或节点不存在）");
            continue;
        }
        net.connect(a, b)?;
    }

    net.rebuild_routing();
    Ok(net)
}
