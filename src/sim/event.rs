//! 网络事件
//!
//! 一次性的、带截止时间的流状态变更请求。引用已有流的事件
//! 使用构建 workload 时预留的稳定 flow id。

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

use crate::controller::NetworkController;
use crate::net::{FlowId, NodeId};
use crate::units::DataRate;

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// 启动一条新流；`flow_id` 为空时由控制器分配
    FlowStart {
        from: NodeId,
        to: NodeId,
        rate: DataRate,
        flow_id: Option<FlowId>,
    },
    /// 更新 (from, to) 之间已有流的速率，不存在时启动一条新流
    FlowUpdate {
        from: NodeId,
        to: NodeId,
        rate: DataRate,
    },
    /// 修改已有流的期望速率
    FlowChangeRate { flow_id: FlowId, rate: DataRate },
    /// 停止一条流
    FlowStop { flow_id: FlowId },
}

impl NetworkEvent {
    pub fn label(&self) -> &'static str {
        match self {
            NetworkEvent::FlowStart { .. } => "flow_start",
            NetworkEvent::FlowUpdate { .. } => "flow_update",
            NetworkEvent::FlowChangeRate { .. } => "flow_change_rate",
            NetworkEvent::FlowStop { .. } => "flow_stop",
        }
    }

    /// 事件涉及的节点 id（workload 中的 id，未经映射）。
    pub fn involved_ids(&self) -> BTreeSet<NodeId> {
        match *self {
            NetworkEvent::FlowStart { from, to, .. } | NetworkEvent::FlowUpdate { from, to, .. } => {
                BTreeSet::from([from, to])
            }
            _ => BTreeSet::new(),
        }
    }

    /// 发送方 id（只有启动/更新类事件有）。
    pub fn transmitter(&self) -> Option<NodeId> {
        match *self {
            NetworkEvent::FlowStart { from, .. } | NetworkEvent::FlowUpdate { from, .. } => Some(from),
            _ => None,
        }
    }

    /// 在控制器上执行。失败都是可恢复的：记录日志后返回 `false`。
    pub(crate) fn apply(&self, ctrl: &mut NetworkController) -> bool {
        match *self {
            NetworkEvent::FlowStart {
                from,
                to,
                rate,
                flow_id,
            } => {
                let (from, to) = (ctrl.mapped_or_self(from), ctrl.mapped_or_self(to));
                ctrl.start_flow(from, to, rate, flow_id, None).is_ok()
            }
            NetworkEvent::FlowUpdate { from, to, rate } => {
                let (from, to) = (ctrl.mapped_or_self(from), ctrl.mapped_or_self(to));
                ctrl.start_or_update_flow(from, to, rate).is_ok()
            }
            NetworkEvent::FlowChangeRate { flow_id, rate } => {
                ctrl.set_flow_rate(flow_id, rate).is_ok()
            }
            NetworkEvent::FlowStop { flow_id } => {
                let stopped = ctrl.stop_flow(flow_id);
                if !stopped {
                    warn!(flow_id = ?flow_id, "无法停止流：流不存在");
                }
                stopped
            }
        }
    }
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEvent::FlowStart {
                from,
                to,
                rate,
                flow_id,
            } => write!(
                f,
                "FlowStart({} -> {} @ {}, id={:?})",
                from.0,
                to.0,
                rate,
                flow_id.map(|i| i.0)
            ),
            NetworkEvent::FlowUpdate { from, to, rate } => {
                write!(f, "FlowUpdate({} -> {} @ {})", from.0, to.0, rate)
            }
            NetworkEvent::FlowChangeRate { flow_id, rate } => {
                write!(f, "FlowChangeRate(id={} @ {})", flow_id.0, rate)
            }
            NetworkEvent::FlowStop { flow_id } => write!(f, "FlowStop(id={})", flow_id.0),
        }
    }
}
