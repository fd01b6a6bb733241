//! 标识符类型
//!
//! 定义节点、链路、端口和流的唯一标识符，以及流 id 分配器。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 节点标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// 链路（单向信道）标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub usize);

/// 端口在所属节点内的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub usize);

/// 流标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub u64);

/// 流 id 分配器。
///
/// 由控制器持有并可注入：workload 在构建时可以预先从同一个分配器里
/// 保留 id，之后的事件直接引用这些稳定的 id。
#[derive(Debug, Default)]
pub struct FlowIdDispenser {
    next: AtomicU64,
}

impl FlowIdDispenser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出下一个未使用的 id。
    pub fn next_id(&self) -> FlowId {
        FlowId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// 记录一个外部指定的 id，保证之后分配的 id 不会与它冲突。
    pub fn observe(&self, id: FlowId) {
        self.next.fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
    }

    /// 下一次 `next_id` 将返回的值（不消耗）。
    pub fn peek(&self) -> FlowId {
        FlowId(self.next.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}
