// Stability and admission filters applied to each sample
use crate::domain::history::RollingHistory;
use crate::domain::polar::PolarTable;
use crate::domain::readings::Quantity;
use crate::domain::units::angle_difference_deg;
use serde::Deserialize;
use thiserror::Error;

/// Speeds and baselines at or below this are treated as "no data".
const NEGLIGIBLE: f64 = 0.01;

/// Why a sample was not admitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("{0} reading missing")]
    Missing(Quantity),
    #[error("{quantity} reading is stale ({age_secs:.1}s old)")]
    Stale { quantity: Quantity, age_secs: f64 },
    #[error("STW {stw_kt:.2} kt is below {floor_kt:.2} kt")]
    NotMoving { stw_kt: f64, floor_kt: f64 },
    #[error("{quantity} value {value:.1} out of range")]
    OutOfRange { quantity: Quantity, value: f64 },
    #[error("{0} not stable")]
    Unstable(Quantity),
    #[error("STW to polar speed ratio {0:.2} outside limits")]
    VmgRatio(f64),
    #[error("{quantity} ratio {ratio:.2} to recent baseline outside limits")]
    AverageRatio { quantity: Quantity, ratio: f64 },
    #[error("engine running")]
    Motoring,
}

impl Rejection {
    /// The reason without its measured values: the variant and the quantity
    /// it concerns.
    fn reason(&self) -> (std::mem::Discriminant<Self>, Option<Quantity>) {
        let quantity = match self {
            Rejection::Missing(quantity)
            | Rejection::Unstable(quantity)
            | Rejection::Stale { quantity, .. }
            | Rejection::OutOfRange { quantity, .. }
            | Rejection::AverageRatio { quantity, .. } => Some(*quantity),
            Rejection::NotMoving { .. } | Rejection::VmgRatio(_) | Rejection::Motoring => None,
        };
        (std::mem::discriminant(self), quantity)
    }
}

/// True when both lists name the same reasons in the same order, whatever
/// values were measured.
pub fn same_reasons(a: &[Rejection], b: &[Rejection]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.reason() == y.reason())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Pass,
    /// Not enough data to judge; the sample is let through.
    Inconclusive,
    Reject(f64),
}

/// True when every angle in the window lies within `threshold_deg` of the
/// first one. An empty window is never stable.
pub fn is_stable_direction(history: &RollingHistory, threshold_deg: f64) -> bool {
    let Some(reference) = history.first() else {
        return false;
    };
    let max_delta = history
        .iter()
        .map(|r| angle_difference_deg(r.value, reference.value))
        .fold(0.0, f64::max);
    tracing::debug!(
        "Stability over {} samples: max delta {:.1}° (limit {:.1}°)",
        history.len(),
        max_delta,
        threshold_deg
    );
    max_delta <= threshold_deg
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StabilityFilter {
    pub enabled: bool,
    pub window_secs: f64,
    pub threshold_deg: f64,
}

impl StabilityFilter {
    pub fn new(enabled: bool, window_secs: f64, threshold_deg: f64) -> Self {
        Self {
            enabled,
            window_secs,
            threshold_deg,
        }
    }

    pub fn is_stable(&self, history: &RollingHistory) -> bool {
        !self.enabled || is_stable_direction(history, self.threshold_deg)
    }
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self::new(false, 10.0, 5.0)
    }
}

/// Compares measured STW with the speed the polar table expects.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VmgRatioFilter {
    pub enabled: bool,
    pub lower: f64,
    pub upper: f64,
}

impl VmgRatioFilter {
    pub fn evaluate(&self, stw_kt: f64, twa_deg: f64, tws_kt: f64, table: &PolarTable) -> Verdict {
        if !self.enabled {
            return Verdict::Pass;
        }
        let expected = table
            .find_closest(twa_deg.abs(), tws_kt)
            .map(|c| c.boat_speed_kt)
            .filter(|speed| *speed >= NEGLIGIBLE);
        let Some(expected) = expected else {
            tracing::debug!("No expected boat speed for TWA {:.1}° / TWS {:.1} kt", twa_deg, tws_kt);
            return Verdict::Inconclusive;
        };

        let ratio = stw_kt / expected;
        tracing::debug!(
            "STW={:.2}kt polar={:.2}kt ratio={:.2}",
            stw_kt,
            expected,
            ratio
        );
        if self.lower < ratio && ratio < self.upper {
            Verdict::Pass
        } else {
            Verdict::Reject(ratio)
        }
    }
}

impl Default for VmgRatioFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            lower: 0.5,
            upper: 1.3,
        }
    }
}

/// Compares the current value with the mean (or standard deviation) of its
/// own recent history.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AverageRatioFilter {
    pub enabled: bool,
    pub use_std_dev: bool,
    pub window_secs: f64,
    pub lower: f64,
    pub upper: f64,
}

impl AverageRatioFilter {
    /// With `magnitudes` set the ratio is taken between absolute values,
    /// which is what signed angles need.
    pub fn evaluate(&self, current: f64, history: &RollingHistory, magnitudes: bool) -> Verdict {
        if !self.enabled {
            return Verdict::Pass;
        }
        let baseline = if self.use_std_dev {
            history.standard_deviation()
        } else {
            history.mean()
        };
        let Some(baseline) = baseline.filter(|b| b.abs() > NEGLIGIBLE) else {
            return Verdict::Inconclusive;
        };

        let ratio = if magnitudes {
            current.abs() / baseline.abs()
        } else {
            current / baseline
        };
        tracing::debug!("Current={:.2} baseline={:.2} ratio={:.2}", current, baseline, ratio);
        if self.lower <= ratio && ratio < self.upper {
            Verdict::Pass
        } else {
            Verdict::Reject(ratio)
        }
    }
}

impl Default for AverageRatioFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            use_std_dev: false,
            window_secs: 30.0,
            lower: 0.8,
            upper: 1.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::polar::AxisKey;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn history_of(values: &[f64]) -> RollingHistory {
        let mut history = RollingHistory::new(60.0);
        for (i, v) in values.iter().enumerate() {
            history.record(at(i as i64), *v);
        }
        history
    }

    fn enabled_average() -> AverageRatioFilter {
        AverageRatioFilter {
            enabled: true,
            ..AverageRatioFilter::default()
        }
    }

    #[test]
    fn test_stability_threshold_is_inclusive() {
        let threshold = 2.0;
        assert!(is_stable_direction(&history_of(&[100.0, 100.0 + threshold]), threshold));
        assert!(!is_stable_direction(
            &history_of(&[100.0, 100.0 + threshold + 1e-9]),
            threshold
        ));
    }

    #[test]
    fn test_stability_across_north() {
        assert!(is_stable_direction(&history_of(&[359.0, 1.0, 0.5]), 2.0));
        assert!(!is_stable_direction(&history_of(&[359.0, 3.0]), 2.0));
    }

    #[test]
    fn test_empty_window_is_unstable() {
        let empty = RollingHistory::new(10.0);
        assert!(!is_stable_direction(&empty, 180.0));
        assert!(!StabilityFilter::new(true, 10.0, 5.0).is_stable(&empty));
        assert!(StabilityFilter::new(false, 10.0, 5.0).is_stable(&empty));
    }

    #[test]
    fn test_vmg_ratio() {
        let filter = VmgRatioFilter {
            enabled: true,
            lower: 0.5,
            upper: 1.3,
        };
        let mut table = PolarTable::new();
        assert_eq!(filter.evaluate(6.0, 45.0, 12.0, &table), Verdict::Inconclusive);

        table.insert(AxisKey::from_value(45.0), AxisKey::from_value(12.0), 0.005, at(0));
        assert_eq!(filter.evaluate(6.0, 45.0, 12.0, &table), Verdict::Inconclusive);

        table.insert(AxisKey::from_value(45.0), AxisKey::from_value(12.0), 6.0, at(0));
        assert_eq!(filter.evaluate(6.6, -45.0, 12.0, &table), Verdict::Pass);
        assert_eq!(filter.evaluate(9.0, 45.0, 12.0, &table), Verdict::Reject(1.5));
        assert_eq!(filter.evaluate(3.0, 45.0, 12.0, &table), Verdict::Reject(0.5));

        let disabled = VmgRatioFilter::default();
        assert_eq!(disabled.evaluate(50.0, 45.0, 12.0, &table), Verdict::Pass);
    }

    #[test]
    fn test_average_filters_pass_without_baseline() {
        let filter = enabled_average();
        let empty = RollingHistory::new(30.0);
        let near_zero = history_of(&[0.005, -0.004, 0.0]);

        // STW, TWA and TWS each get the permissive pass on their own.
        for (current, magnitudes) in [(6.0, false), (-40.0, true), (12.0, false)] {
            assert_eq!(filter.evaluate(current, &empty, magnitudes), Verdict::Inconclusive);
            assert_eq!(filter.evaluate(current, &near_zero, magnitudes), Verdict::Inconclusive);
        }
    }

    #[test]
    fn test_average_ratio_bounds() {
        let filter = enabled_average();
        let history = history_of(&[10.0, 10.0, 10.0]);

        assert_eq!(filter.evaluate(8.0, &history, false), Verdict::Pass);
        assert_eq!(filter.evaluate(12.0, &history, false), Verdict::Reject(1.2));
        assert_eq!(filter.evaluate(5.0, &history, false), Verdict::Reject(0.5));
    }

    #[test]
    fn test_average_ratio_uses_magnitudes_for_angles() {
        let filter = enabled_average();
        let history = history_of(&[-40.0, -42.0, -38.0]);

        assert_eq!(filter.evaluate(-41.0, &history, true), Verdict::Pass);
        // after a tack the sign flips but the angle is unchanged
        assert_eq!(filter.evaluate(41.0, &history, true), Verdict::Pass);
        assert!(matches!(filter.evaluate(41.0, &history, false), Verdict::Reject(_)));
        assert!(matches!(filter.evaluate(-90.0, &history, true), Verdict::Reject(_)));
    }

    #[test]
    fn test_average_ratio_with_std_dev_baseline() {
        let filter = AverageRatioFilter {
            use_std_dev: true,
            lower: 0.0,
            upper: 3.0,
            ..enabled_average()
        };
        // mean 5, std dev 2
        let history = history_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);

        assert_eq!(filter.evaluate(5.0, &history, false), Verdict::Pass);
        assert_eq!(filter.evaluate(7.0, &history, false), Verdict::Reject(3.5));

        let flat = history_of(&[5.0, 5.0, 5.0]);
        assert_eq!(filter.evaluate(5.0, &flat, false), Verdict::Inconclusive);
    }

    #[test]
    fn test_same_reasons_ignores_measured_values() {
        let stale = |age_secs| Rejection::Stale {
            quantity: Quantity::TrueWindSpeed,
            age_secs,
        };
        assert!(same_reasons(
            &[stale(4.0), Rejection::VmgRatio(1.4)],
            &[stale(5.0), Rejection::VmgRatio(1.6)]
        ));
        assert!(!same_reasons(
            &[stale(4.0)],
            &[Rejection::Stale {
                quantity: Quantity::SpeedThroughWater,
                age_secs: 4.0
            }]
        ));
        assert!(!same_reasons(&[stale(4.0)], &[Rejection::Missing(Quantity::TrueWindSpeed)]));
        assert!(!same_reasons(&[stale(4.0)], &[]));
    }
}
