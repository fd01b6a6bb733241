//! 公平性策略
//!
//! 每条流在每条链路上占有一个比例份额（ECMP 拆分之后的份额）。
//! [`FairnessPolicy`] 在链路容量约束下决定每条流实际获得的速率：
//!
//! - [`MaxMin`]：progressive filling。所有未冻结的流同步提速，直到某条流达到
//!   期望速率或某条链路饱和，然后冻结相应的流，重复直到全部冻结。
//! - [`FirstComeFirstServed`]：按流的到达顺序逐条贪心分配。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use tracing::{debug, trace};

use super::id::{FlowId, LinkId};
use crate::units::{DataRate, EPSILON};

/// 一条流对带宽的需求。
#[derive(Debug, Clone)]
pub struct Demand {
    pub flow: FlowId,
    pub desired: DataRate,
    /// 链路 -> 该流速率中经过此链路的比例
    pub shares: BTreeMap<LinkId, f64>,
    /// 没有可用路径的流分配为 0
    pub routable: bool,
}

/// 可替换的带宽分配策略。实现必须是无状态的纯策略对象。
///
/// `demands` 按流的到达顺序排列（最早启动的流在前）。
pub trait FairnessPolicy: Debug + Send + Sync {
    fn allocate(
        &self,
        demands: &[Demand],
        capacity: &BTreeMap<LinkId, DataRate>,
    ) -> BTreeMap<FlowId, DataRate>;
}

/// 最大最小公平，见 [`max_min_allocate`]。
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMin;

impl FairnessPolicy for MaxMin {
    fn allocate(
        &self,
        demands: &[Demand],
        capacity: &BTreeMap<LinkId, DataRate>,
    ) -> BTreeMap<FlowId, DataRate> {
        max_min_allocate(demands, capacity)
    }
}

/// 先到先得：早启动的流先取走它能拿到的全部带宽，后到的流只能用剩余容量。
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstComeFirstServed;

impl FairnessPolicy for FirstComeFirstServed {
    fn allocate(
        &self,
        demands: &[Demand],
        capacity: &BTreeMap<LinkId, DataRate>,
    ) -> BTreeMap<FlowId, DataRate> {
        let mut remaining: BTreeMap<LinkId, f64> =
            capacity.iter().map(|(&l, c)| (l, c.kbps().max(0.0))).collect();

        demands
            .iter()
            .map(|d| {
                if !d.routable {
                    return (d.flow, DataRate::ZERO);
                }
                if d.shares.is_empty() {
                    return (d.flow, d.desired);
                }
                let mut rate = d.desired.kbps().max(0.0);
                for (l, &s) in &d.shares {
                    if s > EPSILON {
                        rate = rate.min(remaining.get(l).copied().unwrap_or(0.0).max(0.0) / s);
                    }
                }
                for (l, &s) in &d.shares {
                    if let Some(rem) = remaining.get_mut(l) {
                        *rem -= rate * s;
                    }
                }
                trace!(flow_id = ?d.flow, rate, "先到先得分配");
                (d.flow, DataRate::from_kbps(rate).round_to_zero())
            })
            .collect()
    }
}

/// 在 `capacity` 约束下为每条流分配速率。
///
/// 结果满足：任一流的速率不超过其期望速率；任一链路上各流速率 × 份额之和
/// 不超过该链路容量；在此前提下分配是最大最小公平的。
pub fn max_min_allocate(
    demands: &[Demand],
    capacity: &BTreeMap<LinkId, DataRate>,
) -> BTreeMap<FlowId, DataRate> {
    let mut granted: BTreeMap<FlowId, f64> = demands.iter().map(|d| (d.flow, 0.0)).collect();
    let mut remaining: BTreeMap<LinkId, f64> =
        capacity.iter().map(|(&l, c)| (l, c.kbps().max(0.0))).collect();

    let mut active: BTreeSet<usize> = demands
        .iter()
        .enumerate()
        .filter(|(_, d)| d.routable && d.desired.kbps() > 0.0)
        .map(|(i, _)| i)
        .collect();

    // 每轮至少冻结一条流
    let max_rounds = demands.len() + 1;
    let mut round = 0;
    while !active.is_empty() && round < max_rounds {
        round += 1;

        let mut load: BTreeMap<LinkId, f64> = BTreeMap::new();
        for &i in &active {
            for (&l, &s) in &demands[i].shares {
                *load.entry(l).or_insert(0.0) += s;
            }
        }

        let mut delta = f64::INFINITY;
        for &i in &active {
            let d = &demands[i];
            delta = delta.min(d.desired.kbps() - granted[&d.flow]);
        }
        for (l, &s) in &load {
            if s > EPSILON {
                let rem = remaining.get(l).copied().unwrap_or(0.0);
                delta = delta.min(rem / s);
            }
        }
        let delta = delta.max(0.0);
        trace!(round, delta, active = active.len(), "progressive filling");

        for &i in &active {
            if let Some(g) = granted.get_mut(&demands[i].flow) {
                *g += delta;
            }
        }
        for (l, s) in &load {
            if let Some(rem) = remaining.get_mut(l) {
                *rem -= delta * s;
            }
        }

        let saturated: BTreeSet<LinkId> = load
            .iter()
            .filter(|&(l, &s)| {
                let cap = capacity.get(l).map(|c| c.kbps()).unwrap_or(0.0);
                s > EPSILON && remaining.get(l).copied().unwrap_or(0.0) <= EPSILON * cap.max(1.0)
            })
            .map(|(&l, _)| l)
            .collect();

        active.retain(|&i| {
            let d = &demands[i];
            let satisfied = granted[&d.flow] >= d.desired.kbps() - EPSILON * d.desired.kbps().max(1.0);
            let bottlenecked = d
                .shares
                .iter()
                .any(|(l, &s)| s > EPSILON && saturated.contains(l));
            !(satisfied || bottlenecked)
        });
    }

    if !active.is_empty() {
        debug!(left = active.len(), "progressive filling hit the round limit");
    }

    demands
        .iter()
        .map(|d| {
            let g = granted[&d.flow].min(d.desired.kbps()).max(0.0);
            let rate = if !d.routable {
                DataRate::ZERO
            } else if d.shares.is_empty() {
                // 发送方即目的地，不占用任何链路
                d.desired
            } else {
                DataRate::from_kbps(g).round_to_zero()
            };
            (d.flow, rate)
        })
        .collect()
}
