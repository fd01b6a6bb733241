//! 网络场景
//!
//! 拓扑 + workload + 是否做虚拟映射，可以整体从一个 JSON 文件加载并运行。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::network_controller::NetworkController;
use super::snapshot::NetworkSnapshot;
use crate::error::Result;
use crate::sim::{ExecStats, WorkloadSpec};
use crate::topo::TopologySpec;

/// 拓扑既可以内联，也可以是指向拓扑文件的路径（相对路径以场景文件所在目录为基准）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopologySource {
    Path(PathBuf),
    Inline(TopologySpec),
}

fn default_virtual_mapping() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub topology: TopologySource,
    #[serde(default)]
    pub workload: WorkloadSpec,
    /// 为真时 workload 中的节点 id 被映射到网络中的物理节点，
    /// 否则必须与拓扑中的 id 完全对应
    #[serde(default = "default_virtual_mapping")]
    pub virtual_mapping: bool,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// 场景运行结果
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub stats: ExecStats,
    pub snapshot: NetworkSnapshot,
    pub energy_report: String,
    pub consistent: bool,
}

impl ScenarioSpec {
    pub fn new(topology: TopologySource, workload: WorkloadSpec, virtual_mapping: bool) -> Self {
        Self {
            topology,
            workload,
            virtual_mapping,
            base_dir: None,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut spec = Self::from_json(&text)?;
        spec.base_dir = path.parent().map(Path::to_path_buf);
        Ok(spec)
    }

    /// 解析拓扑并构建控制器
    pub fn controller(&self) -> Result<NetworkController> {
        match &self.topology {
            TopologySource::Inline(spec) => NetworkController::from_topology_spec(spec),
            TopologySource::Path(p) => {
                let path = match &self.base_dir {
                    Some(dir) if p.is_relative() => dir.join(p),
                    _ => p.clone(),
                };
                NetworkController::from_topology_file(path)
            }
        }
    }

    /// 构建网络、把时钟对齐到 workload 起点，然后执行全部事件。
    #[tracing::instrument(skip(self), fields(events = self.workload.events.len(), virtual_mapping = self.virtual_mapping))]
    pub fn run(&self) -> Result<ScenarioReport> {
        let mut ctrl = self.controller()?;
        let wl = self.workload.into_workload(ctrl.dispenser())?;
        ctrl.set_internal_time(wl.start_instant());

        let stats = ctrl.exec_workload(wl, self.virtual_mapping)?;
        let consistent = ctrl.check_consistency();
        let energy_report = ctrl.fmt_report();
        info!("\n{}", energy_report);

        Ok(ScenarioReport {
            stats,
            snapshot: ctrl.snapshot(),
            energy_report,
            consistent,
        })
    }
}
