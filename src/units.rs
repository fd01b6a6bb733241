//! 物理量类型
//!
//! 定义数据速率、功率与能量，以及仿真所需的基本运算。

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::sim::SimTime;

/// 浮点比较使用的默认容差。
pub const EPSILON: f64 = 1e-9;

/// 数据速率（内部以 Kbps 存储）。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRate(f64);

impl DataRate {
    pub const ZERO: DataRate = DataRate(0.0);

    pub fn from_kbps(kbps: f64) -> Self {
        Self(kbps)
    }
    pub fn from_mbps(mbps: f64) -> Self {
        Self(mbps * 1_000.0)
    }
    pub fn from_gbps(gbps: f64) -> Self {
        Self(gbps * 1_000_000.0)
    }

    pub fn kbps(self) -> f64 {
        self.0
    }
    pub fn mbps(self) -> f64 {
        self.0 / 1_000.0
    }

    pub fn min(self, other: DataRate) -> DataRate {
        DataRate(self.0.min(other.0))
    }

    pub fn max(self, other: DataRate) -> DataRate {
        DataRate(self.0.max(other.0))
    }

    /// 在 [`EPSILON`] 的相对/绝对容差内相等。
    pub fn approx_eq(self, other: DataRate) -> bool {
        approx_eq(self.0, other.0)
    }

    /// 把极小的舍入残差归零，避免出现 `-1e-13` 这类速率。
    pub fn round_to_zero(self) -> DataRate {
        if self.0.abs() < EPSILON { DataRate::ZERO } else { self }
    }

    /// `self / other`，`other` 为零时返回 0。
    pub fn ratio(self, other: DataRate) -> f64 {
        if other.0 == 0.0 { 0.0 } else { self.0 / other.0 }
    }
}

impl Add for DataRate {
    type Output = DataRate;
    fn add(self, rhs: DataRate) -> DataRate {
        DataRate(self.0 + rhs.0)
    }
}

impl AddAssign for DataRate {
    fn add_assign(&mut self, rhs: DataRate) {
        self.0 += rhs.0;
    }
}

impl Sub for DataRate {
    type Output = DataRate;
    fn sub(self, rhs: DataRate) -> DataRate {
        DataRate(self.0 - rhs.0)
    }
}

impl SubAssign for DataRate {
    fn sub_assign(&mut self, rhs: DataRate) {
        self.0 -= rhs.0;
    }
}

impl Mul<f64> for DataRate {
    type Output = DataRate;
    fn mul(self, rhs: f64) -> DataRate {
        DataRate(self.0 * rhs)
    }
}

impl Div<f64> for DataRate {
    type Output = DataRate;
    fn div(self, rhs: f64) -> DataRate {
        DataRate(self.0 / rhs)
    }
}

impl std::iter::Sum for DataRate {
    fn sum<I: Iterator<Item = DataRate>>(iter: I) -> DataRate {
        iter.fold(DataRate::ZERO, |acc, r| acc + r)
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}Mbps", self.mbps())
    }
}

/// 功率（瓦特）。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Power(f64);

impl Power {
    pub const ZERO: Power = Power(0.0);

    pub fn from_watts(w: f64) -> Self {
        Self(w)
    }

    pub fn watts(self) -> f64 {
        self.0
    }

    pub fn approx_eq(self, other: Power) -> bool {
        approx_eq(self.0, other.0)
    }
}

impl Add for Power {
    type Output = Power;
    fn add(self, rhs: Power) -> Power {
        Power(self.0 + rhs.0)
    }
}

impl AddAssign for Power {
    fn add_assign(&mut self, rhs: Power) {
        self.0 += rhs.0;
    }
}

impl Sub for Power {
    type Output = Power;
    fn sub(self, rhs: Power) -> Power {
        Power(self.0 - rhs.0)
    }
}

impl Neg for Power {
    type Output = Power;
    fn neg(self) -> Power {
        Power(-self.0)
    }
}

impl Mul<f64> for Power {
    type Output = Power;
    fn mul(self, rhs: f64) -> Power {
        Power(self.0 * rhs)
    }
}

/// 功率 × 时间 = 能量。
impl Mul<SimTime> for Power {
    type Output = Energy;
    fn mul(self, rhs: SimTime) -> Energy {
        Energy(self.0 * rhs.as_secs_f64())
    }
}

impl std::iter::Sum for Power {
    fn sum<I: Iterator<Item = Power>>(iter: I) -> Power {
        iter.fold(Power::ZERO, |acc, p| acc + p)
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}W", self.0)
    }
}

/// 能量（焦耳，即 W·s）。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Energy(f64);

impl Energy {
    pub const ZERO: Energy = Energy(0.0);

    pub fn from_joules(j: f64) -> Self {
        Self(j)
    }

    pub fn joules(self) -> f64 {
        self.0
    }

    pub fn kwh(self) -> f64 {
        self.0 / 3_600_000.0
    }

    pub fn approx_eq(self, other: Energy) -> bool {
        approx_eq(self.0, other.0)
    }
}

impl Add for Energy {
    type Output = Energy;
    fn add(self, rhs: Energy) -> Energy {
        Energy(self.0 + rhs.0)
    }
}

impl AddAssign for Energy {
    fn add_assign(&mut self, rhs: Energy) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}J", self.0)
    }
}

pub(crate) fn approx_eq(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    diff <= EPSILON || diff <= EPSILON * a.abs().max(b.abs())
}
