//! 网络模拟模块
//!
//! 此模块包含流级网络模拟的核心组件：节点、端口、链路、路由表、
//! 转发与端口选择策略，以及聚合它们的网络拓扑。

// 子模块声明
mod fairness;
mod flow;
mod forwarding;
mod id;
mod link;
mod network;
mod node;
mod port;
mod port_selection;
mod routing;

// 重新导出公共接口
pub use fairness::{Demand, FairnessPolicy, FirstComeFirstServed, MaxMin, max_min_allocate};
pub use flow::{FlowTable, NetFlow, RateChangeCallback, SubFlow};
pub use forwarding::{ForwardingPolicy, StaticEcmp, split_evenly};
pub use id::{FlowId, FlowIdDispenser, LinkId, NodeId, PortId};
pub use link::Link;
pub use network::Network;
pub use node::{Node, NodeKind};
pub use port::Port;
pub use port_selection::{FirstAvailablePort, FlowHashPort, PortSelectionPolicy};
pub use routing::{PossiblePaths, RoutingTable};
