//! 调度事件
//!
//! 定义调度事件结构及其优先级比较。

use super::event::NetworkEvent;
use super::time::SimTime;
use std::cmp::Ordering;

/// 调度事件，包含截止时间、插入序号和事件本身。
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub at: SimTime,
    pub seq: u64,
    pub ev: NetworkEvent,
}

// BinaryHeap 是 max-heap；需要最早截止时间优先、同一时刻按插入顺序，因此反向比较。
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.at.cmp(&other.at) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            ord => ord,
        }
        .reverse()
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}
