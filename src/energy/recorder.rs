//! 全网能耗记录器

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::net::{Network, NodeId};
use crate::sim::SimTime;
use crate::units::{Energy, Power};

#[derive(Debug, Default)]
struct Readings {
    current: Power,
    latest: BTreeMap<NodeId, Power>,
}

/// 订阅网络中每个能耗组件的监视器，汇总瞬时功率与累计能量。
///
/// 瞬时功率由监视器推送的 (旧, 新) 差值维护；累计能量需要随仿真时间
/// 推进调用 [`NetworkEnergyRecorder::advance_by`] 积分得到。
pub struct NetworkEnergyRecorder {
    readings: Arc<Mutex<Readings>>,
    total: Energy,
    elapsed: SimTime,
}

impl NetworkEnergyRecorder {
    /// 订阅 `network` 中所有监视器，并对每个组件调用一次 `update` 作为初始值。
    pub fn new(network: &mut Network) -> Self {
        let readings = Arc::new(Mutex::new(Readings::default()));
        let mut seeded = 0usize;
        for monitor in network.monitors_mut() {
            let id = monitor.consumer();
            let now = monitor.current_consumption();
            if let Ok(mut r) = readings.lock() {
                r.current += now;
                r.latest.insert(id, now);
            }
            let shared = Arc::clone(&readings);
            monitor.subscribe(Box::new(move |id, old, new| match shared.lock() {
                Ok(mut r) => {
                    r.current += new - old;
                    r.latest.insert(id, new);
                }
                Err(_) => warn!(consumer = ?id, "能耗记录器状态已损坏，忽略本次更新"),
            }));
            seeded += 1;
        }
        network.update_monitors();
        debug!(consumers = seeded, "⚡ 能耗记录器已订阅");

        Self {
            readings,
            total: Energy::ZERO,
            elapsed: SimTime::ZERO,
        }
    }

    /// 当前全网瞬时功率
    pub fn current_consumption(&self) -> Power {
        self.readings
            .lock()
            .map(|r| r.current)
            .unwrap_or(Power::ZERO)
    }

    /// 每个组件最近一次推送的功率
    pub fn latest_readings(&self) -> BTreeMap<NodeId, Power> {
        self.readings
            .lock()
            .map(|r| r.latest.clone())
            .unwrap_or_default()
    }

    /// 自创建（或上次 `reset`）以来的累计能量
    pub fn total_consumption(&self) -> Energy {
        self.total
    }

    pub fn elapsed(&self) -> SimTime {
        self.elapsed
    }

    /// 累计期间的平均功率；尚未推进时间时等于当前功率。
    pub fn average_power(&self) -> Power {
        if self.elapsed == SimTime::ZERO {
            return self.current_consumption();
        }
        Power::from_watts(self.total.joules() / self.elapsed.as_secs_f64())
    }

    /// 以当前瞬时功率积分 `dt` 时长的能量。
    pub fn advance_by(&mut self, dt: SimTime) {
        self.total += self.current_consumption() * dt;
        self.elapsed += dt;
    }

    /// 清零累计能量与计时。
    pub fn reset(&mut self) {
        self.total = Energy::ZERO;
        self.elapsed = SimTime::ZERO;
    }

    /// 能耗报告文本
    pub fn fmt_report(&self) -> String {
        format!(
            "=== ENERGY REPORT ===\nCurrent Energy Consumption: {}W\n=====================",
            self.current_consumption().watts()
        )
    }
}

impl fmt::Debug for NetworkEnergyRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkEnergyRecorder")
            .field("current", &self.current_consumption())
            .field("total", &self.total)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}
