// State-change events pushed to connected clients
use crate::domain::performance::{LiveData, PerformanceComparison};
use crate::domain::polar::{MergeOutcome, PolarCell};
use crate::domain::recording::{RecordingMode, RecordingState};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecorderEvent {
    #[serde(rename_all = "camelCase")]
    ChangeRecordStatus {
        recording: bool,
        mode: RecordingMode,
        file: String,
    },
    ChangeMotoringStatus { motoring: bool },
    #[serde(rename_all = "camelCase")]
    PolarUpdated {
        file: String,
        angle: f64,
        speed: f64,
        boat_speed: f64,
        timestamp: DateTime<Utc>,
        previous: Option<PolarCell>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateLivePerformance {
        twa: f64,
        tws: f64,
        stw: f64,
        expected: f64,
        delta: f64,
        delta_pct: Option<f64>,
    },
    RecordErrors { errors: Vec<String> },
}

impl RecorderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RecorderEvent::ChangeRecordStatus { .. } => "changeRecordStatus",
            RecorderEvent::ChangeMotoringStatus { .. } => "changeMotoringStatus",
            RecorderEvent::PolarUpdated { .. } => "polarUpdated",
            RecorderEvent::UpdateLivePerformance { .. } => "updateLivePerformance",
            RecorderEvent::RecordErrors { .. } => "recordErrors",
        }
    }

    pub fn record_status(state: &RecordingState) -> Self {
        RecorderEvent::ChangeRecordStatus {
            recording: state.recording_active,
            mode: state.recording_mode,
            file: state.active_file.clone(),
        }
    }

    pub fn polar_updated(file: &str, merge: &MergeOutcome) -> Self {
        RecorderEvent::PolarUpdated {
            file: file.to_string(),
            angle: merge.cell.wind_angle_deg,
            speed: merge.cell.wind_speed_kt,
            boat_speed: merge.cell.boat_speed_kt,
            timestamp: merge.cell.last_updated,
            previous: merge.previous,
        }
    }

    pub fn live_performance(live: &LiveData, performance: &PerformanceComparison) -> Self {
        RecorderEvent::UpdateLivePerformance {
            twa: live.twa_deg,
            tws: live.tws_kt,
            stw: live.stw_kt,
            expected: performance.expected_kt,
            delta: performance.delta_kt,
            delta_pct: performance.delta_pct,
        }
    }

    pub fn errors(errors: impl IntoIterator<Item = impl ToString>) -> Self {
        RecorderEvent::RecordErrors {
            errors: errors.into_iter().map(|e| e.to_string()).collect(),
        }
    }
}
