//! 端口选择策略
//!
//! 当两个节点之间有多条并行链路时，决定某条流使用哪一个物理端口。

use std::fmt::Debug;

use super::id::{FlowId, NodeId, PortId};
use super::node::Node;

/// 可替换的端口选择策略。实现必须是无状态的纯策略对象。
pub trait PortSelectionPolicy: Debug + Send + Sync {
    /// `node` 上用于把 `flow` 发往 `next_hop` 的端口；没有连向它的端口时返回 `None`。
    fn select_port(&self, node: &Node, next_hop: NodeId, flow: FlowId) -> Option<PortId>;
}

/// 总是选择第一个连向下一跳的端口。
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailablePort;

impl PortSelectionPolicy for FirstAvailablePort {
    fn select_port(&self, node: &Node, next_hop: NodeId, _flow: FlowId) -> Option<PortId> {
        node.ports_towards(next_hop).next().map(|p| p.id)
    }
}

/// 基于 flow id 的稳定哈希选择，同一条流总是走同一个端口。
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowHashPort {
    pub salt: u64,
}

impl FlowHashPort {
    pub fn new(salt: u64) -> Self {
        Self { salt }
    }
}

impl PortSelectionPolicy for FlowHashPort {
    fn select_port(&self, node: &Node, next_hop: NodeId, flow: FlowId) -> Option<PortId> {
        let cands: Vec<PortId> = node.ports_towards(next_hop).map(|p| p.id).collect();
        if cands.is_empty() {
            return None;
        }
        let h = mix64(
            flow.0 ^ (node.id().0 as u64).wrapping_mul(0x9E3779B97F4A7C15)
                ^ (next_hop.0 as u64)
                ^ self.salt,
        );
        Some(cands[(h as usize) % cands.len()])
    }
}

/// 确定性的 64-bit mixing，避免每次运行哈希结果不同。
fn mix64(mut x: u64) -> u64 {
    // splitmix64
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
