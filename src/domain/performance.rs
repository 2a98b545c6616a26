// Live performance against the polar table
use crate::domain::polar::{ClosestPoint, PolarTable};
use serde::Serialize;

/// Latest converted sensor triplet, for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveData {
    /// Signed, degrees (negative to port).
    pub twa_deg: f64,
    pub tws_kt: f64,
    pub stw_kt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceComparison {
    pub expected_kt: f64,
    pub delta_kt: f64,
    /// Absent when there is no expected speed to compare against.
    pub delta_pct: Option<f64>,
    pub closest: Option<ClosestPoint>,
}

pub fn compare_performance(live: &LiveData, table: &PolarTable) -> PerformanceComparison {
    let closest = table.find_closest(live.twa_deg.abs(), live.tws_kt);
    let expected_kt = closest.map_or(0.0, |c| c.boat_speed_kt);
    let delta_kt = live.stw_kt - expected_kt;
    let delta_pct = (expected_kt > 0.0).then(|| delta_kt / expected_kt * 100.0);

    PerformanceComparison {
        expected_kt,
        delta_kt,
        delta_pct,
        closest,
    }
}
