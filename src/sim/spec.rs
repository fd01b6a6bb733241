//! workload 描述文件
//!
//! JSON 形式的事件列表，时间单位为毫秒，速率单位为 Mbps。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::event::NetworkEvent;
use super::time::SimTime;
use super::workload::Workload;
use crate::error::{NetError, Result};
use crate::net::{FlowId, FlowIdDispenser, NodeId};
use crate::units::DataRate;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub events: Vec<EventSpec>,
    /// 虚拟映射时视为主机的节点 id；为空时由事件推断
    #[serde(default)]
    pub host_ids: Vec<usize>,
    /// 虚拟映射时视为核心交换机的节点 id
    #[serde(default)]
    pub core_ids: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSpec {
    pub deadline_ms: f64,
    #[serde(flatten)]
    pub kind: EventKindSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKindSpec {
    FlowStart {
        from: usize,
        to: usize,
        rate_mbps: f64,
        #[serde(default)]
        flow_id: Option<u64>,
    },
    FlowUpdate {
        from: usize,
        to: usize,
        rate_mbps: f64,
    },
    FlowChangeRate {
        flow_id: u64,
        rate_mbps: f64,
    },
    FlowStop {
        flow_id: u64,
    },
}

impl WorkloadSpec {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// 转换为可执行的 workload。显式给出的 flow id 先全部登记到分配器，
    /// 之后未给出 id 的启动事件才各自预留一个。
    pub fn into_workload(&self, dispenser: &FlowIdDispenser) -> Result<Workload> {
        // 先登记所有显式 id，自动分配的 id 才不会与后面的事件撞车
        for spec in &self.events {
            if let EventKindSpec::FlowStart {
                flow_id: Some(id), ..
            } = spec.kind
            {
                dispenser.observe(FlowId(id));
            }
        }

        let mut events = Vec::with_capacity(self.events.len());
        for (i, spec) in self.events.iter().enumerate() {
            if !(spec.deadline_ms >= 0.0) {
                return Err(NetError::InvalidWorkload(format!(
                    "event #{i} has an invalid deadline {}",
                    spec.deadline_ms
                )));
            }
            let at = SimTime::from_millis_f64(spec.deadline_ms);
            let ev = match spec.kind {
                EventKindSpec::FlowStart {
                    from,
                    to,
                    rate_mbps,
                    flow_id,
                } => {
                    let flow_id = flow_id.map_or_else(|| dispenser.next_id(), FlowId);
                    NetworkEvent::FlowStart {
                        from: NodeId(from),
                        to: NodeId(to),
                        rate: rate(i, rate_mbps)?,
                        flow_id: Some(flow_id),
                    }
                }
                EventKindSpec::FlowUpdate {
                    from,
                    to,
                    rate_mbps,
                } => NetworkEvent::FlowUpdate {
                    from: NodeId(from),
                    to: NodeId(to),
                    rate: rate(i, rate_mbps)?,
                },
                EventKindSpec::FlowChangeRate { flow_id, rate_mbps } => {
                    NetworkEvent::FlowChangeRate {
                        flow_id: FlowId(flow_id),
                        rate: rate(i, rate_mbps)?,
                    }
                }
                EventKindSpec::FlowStop { flow_id } => NetworkEvent::FlowStop {
                    flow_id: FlowId(flow_id),
                },
            };
            events.push((at, ev));
        }

        let ids = |v: &[usize]| v.iter().copied().map(NodeId).collect::<BTreeSet<_>>();
        Workload::new(events, ids(&self.host_ids), ids(&self.core_ids))
    }
}

fn rate(event: usize, mbps: f64) -> Result<DataRate> {
    if !(mbps >= 0.0) || !mbps.is_finite() {
        return Err(NetError::InvalidWorkload(format!(
            "event #{event} has an invalid rate {mbps} Mbps"
        )));
    }
    Ok(DataRate::from_mbps(mbps))
}
