//! 错误类型
//!
//! 除了拓扑/场景文件解析失败之外，这里的错误都是可恢复的：
//! 调用方记录日志后继续仿真。

use thiserror::Error;

use crate::net::{FlowId, NodeId};
use crate::sim::SimTime;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("node {0:?} does not exist")]
    NodeNotFound(NodeId),

    #[error("node {0:?} is not an end-point node")]
    NotEndpoint(NodeId),

    #[error("node {0:?} is already claimed")]
    AlreadyClaimed(NodeId),

    #[error("node {0:?} has not been claimed, it cannot transmit flows")]
    NotClaimed(NodeId),

    #[error("no unclaimed end-point node available")]
    NoNodeAvailable,

    #[error("a flow with id {0:?} already exists")]
    DuplicateFlowId(FlowId),

    #[error("flow {0:?} is not running in the network")]
    UnknownFlow(FlowId),

    #[error("data rate must be >= 0, got {0} Kbps")]
    NegativeRate(f64),

    #[error("destination {to:?} unreachable from {from:?}")]
    UnreachableDestination { from: NodeId, to: NodeId },

    #[error("node {node:?} has no port connected to {next_hop:?}")]
    NoPortTowards { node: NodeId, next_hop: NodeId },

    #[error("node {0:?} has no free port left")]
    NoFreePort(NodeId),

    #[error("event deadline {deadline} already passed (now {now})")]
    StaleEvent { deadline: SimTime, now: SimTime },

    #[error("no external time source set, use advance_by instead")]
    NoTimeSource,

    #[error("time source is at {now}, before the last update at {last}")]
    TimeWentBackwards { now: SimTime, last: SimTime },

    #[error("no events remaining in the workload")]
    NoEventsRemaining,

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("spec file could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse spec JSON: {0}")]
    SpecParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
