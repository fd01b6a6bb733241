//! 单个能耗组件的监视器

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::model::{EnModel, EnergyConsumer};
use crate::net::NodeId;
use crate::sim::SimTime;
use crate::units::{Energy, Power};

/// 功耗变化的订阅者：(组件 id, 旧功率, 新功率)。
pub type EnObserver = Box<dyn Fn(NodeId, Power, Power) + Send>;

/// 持有一个组件的当前功耗，功耗变化时通知所有订阅者。
///
/// 不会自动跟随拓扑变化：组件状态改变后由调用方调用 [`EnMonitor::update`]。
pub struct EnMonitor {
    consumer: NodeId,
    model: Arc<dyn EnModel>,
    current: Power,
    total: Energy,
    elapsed: SimTime,
    observers: Vec<EnObserver>,
}

impl EnMonitor {
    pub fn new(consumer: NodeId, model: Arc<dyn EnModel>) -> Self {
        Self {
            consumer,
            model,
            current: Power::ZERO,
            total: Energy::ZERO,
            elapsed: SimTime::ZERO,
            observers: Vec::new(),
        }
    }

    pub fn for_consumer(consumer: &dyn EnergyConsumer) -> Self {
        Self::new(consumer.consumer_id(), consumer.default_en_model())
    }

    pub fn consumer(&self) -> NodeId {
        self.consumer
    }

    pub fn model(&self) -> &Arc<dyn EnModel> {
        &self.model
    }

    pub fn current_consumption(&self) -> Power {
        self.current
    }

    pub fn total_consumption(&self) -> Energy {
        self.total
    }

    /// 至今为止的平均功率；尚未推进过时间时等于当前功率。
    pub fn average_power(&self) -> Power {
        if self.elapsed == SimTime::ZERO {
            return self.current;
        }
        Power::from_watts(self.total.joules() / self.elapsed.as_secs_f64())
    }

    pub fn subscribe(&mut self, observer: EnObserver) {
        self.observers.push(observer);
    }

    pub fn num_observers(&self) -> usize {
        self.observers.len()
    }

    /// 用模型重新计算功耗；数值变化时返回 `true` 并通知订阅者。
    pub fn update(&mut self, consumer: &dyn EnergyConsumer) -> bool {
        let new = self.model.compute_power(consumer);
        let old = self.current;
        if old == new {
            return false;
        }
        trace!(consumer = ?self.consumer, %old, %new, "功耗变化");
        self.current = new;
        for obs in &self.observers {
            obs(self.consumer, old, new);
        }
        true
    }

    pub fn advance_by(&mut self, dt: SimTime) {
        self.total += self.current * dt;
        self.elapsed += dt;
    }
}

impl fmt::Debug for EnMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnMonitor")
            .field("consumer", &self.consumer)
            .field("model", &self.model)
            .field("current", &self.current)
            .field("total", &self.total)
            .field("observers", &self.observers.len())
            .finish()
    }
}
