//! 转发策略
//!
//! 决定一个节点把某条流发往哪些下一跳，以及如何在它们之间分配速率。

use std::fmt::Debug;

use super::flow::NetFlow;
use super::node::Node;
use crate::error::{NetError, Result};
use crate::net::NodeId;
use crate::units::DataRate;

/// 可替换的转发策略。实现必须是无状态的纯策略对象。
pub trait ForwardingPolicy: Debug + Send + Sync {
    /// `node` 转发 `flow` 时使用的下一跳；目的地不可达时返回错误。
    fn next_hops(&self, node: &Node, flow: &NetFlow) -> Result<Vec<NodeId>>;

    /// 把 `rate` 分成 `k` 份，各份之和必须等于 `rate`。
    fn split(&self, rate: DataRate, k: usize) -> Vec<DataRate> {
        split_evenly(rate, k)
    }
}

/// 静态 ECMP：使用路由表里所有等价最短路径的下一跳，均分速率。
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEcmp;

impl ForwardingPolicy for StaticEcmp {
    fn next_hops(&self, node: &Node, flow: &NetFlow) -> Result<Vec<NodeId>> {
        let hops = node.routing().possible_paths_to(flow.destination());
        if hops.is_empty() {
            return Err(NetError::UnreachableDestination {
                from: node.id(),
                to: flow.destination(),
            });
        }
        Ok(hops.to_vec())
    }
}

/// 均分：前 `k-1` 份各为 `rate / k`，最后一份取余量，保证总和精确。
pub fn split_evenly(rate: DataRate, k: usize) -> Vec<DataRate> {
    if k == 0 {
        return Vec::new();
    }
    let part = rate / k as f64;
    let mut parts = vec![part; k - 1];
    let assigned: DataRate = parts.iter().copied().sum();
    parts.push(rate - assigned);
    parts
}
