//! 时间源
//!
//! 控制器默认使用内部时钟；与上层仿真同步时可以注入外部时间源，
//! 之后通过 `sync` 追赶外部时间。

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sim::SimTime;

/// 外部时间源
pub trait TimeSource: Debug + Send {
    fn now(&self) -> SimTime;
}

/// 可手动推进的共享时间源，克隆之间共享同一个时刻。
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    ns: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: SimTime) -> Self {
        Self {
            ns: Arc::new(AtomicU64::new(start.0)),
        }
    }

    pub fn set(&self, t: SimTime) {
        self.ns.store(t.0, Ordering::Relaxed);
    }

    pub fn advance(&self, dt: SimTime) {
        let _ = self
            .ns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_add(dt.0))
            });
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> SimTime {
        SimTime(self.ns.load(Ordering::Relaxed))
    }
}

/// 控制器的时钟：内部时刻 + 可选外部时间源。
#[derive(Debug, Default)]
pub(crate) struct Clock {
    internal: SimTime,
    external: Option<Box<dyn TimeSource>>,
    /// 上一次 `advance_by` / `sync` 之后的时刻
    pub(crate) last_update: SimTime,
}

impl Clock {
    pub(crate) fn now(&self) -> SimTime {
        match &self.external {
            Some(src) => src.now(),
            None => self.internal,
        }
    }

    pub(crate) fn is_external(&self) -> bool {
        self.external.is_some()
    }

    pub(crate) fn set_external(&mut self, src: Box<dyn TimeSource>) {
        self.external = Some(src);
    }

    pub(crate) fn clear_external(&mut self) -> Option<Box<dyn TimeSource>> {
        self.external.take()
    }

    /// 只推进内部时刻；外部时间源由其所有者推进。
    pub(crate) fn advance(&mut self, dt: SimTime) {
        if self.external.is_none() {
            self.internal += dt;
        }
        self.last_update = self.now();
    }

    /// 设置内部时刻；早于当前内部时刻时不做任何事并返回 `false`。
    pub(crate) fn set_internal(&mut self, t: SimTime) -> bool {
        if t < self.internal {
            return false;
        }
        self.internal = t;
        if self.external.is_none() {
            self.last_update = t;
        }
        true
    }
}
