//! 拓扑构建
//!
//! 显式声明的自定义拓扑与三层 fat-tree。

mod fat_tree;
mod spec;

pub use fat_tree::{FatTreeOpts, FatTreeTopology, PortOpts, build_fat_tree};
pub use spec::{HostSpec, NodeSpec, SwitchSpec, TopologySpec};
