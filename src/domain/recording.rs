// Recording state machine - motoring interlock and manual/automatic modes
use crate::domain::readings::PropulsionStatus;
use crate::domain::units::rpm_to_hz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    #[default]
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub recording_active: bool,
    pub recording_mode: RecordingMode,
    pub motoring: bool,
    pub active_file: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordingError {
    #[error("recording cannot start while motoring")]
    Motoring,
    #[error("recording is automatic; switch to manual mode to control it")]
    AutomaticMode,
}

/// What changed when the motoring input was updated.
#[derive(Debug, Clone, PartialEq)]
pub struct MotoringUpdate {
    pub motoring_changed: bool,
    pub recording: Option<RecordingState>,
}

/// Owns the single [`RecordingState`].
///
/// Rules, in priority order:
/// 1. motoring forces recording off;
/// 2. automatic mode records exactly while the data is valid;
/// 3. manual mode keeps whatever the last user command set.
///
/// Every mutator returns the new state only when `recording_active`
/// actually changed, so callers can notify once per transition.
#[derive(Debug, Clone)]
pub struct RecordingMachine {
    state: RecordingState,
    manual_file: String,
    auto_file: String,
}

impl RecordingMachine {
    pub fn new(mode: RecordingMode, manual_file: String, auto_file: String) -> Self {
        let active_file = match mode {
            RecordingMode::Manual => manual_file.clone(),
            RecordingMode::Automatic => auto_file.clone(),
        };
        Self {
            state: RecordingState {
                recording_active: false,
                recording_mode: mode,
                motoring: false,
                active_file,
            },
            manual_file,
            auto_file,
        }
    }

    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    pub fn manual_file(&self) -> &str {
        &self.manual_file
    }

    pub fn auto_file(&self) -> &str {
        &self.auto_file
    }

    /// Per-tick evaluation with the tick's overall data validity.
    pub fn evaluate(&mut self, valid_data: bool) -> Option<RecordingState> {
        let active = if self.state.motoring {
            false
        } else {
            match self.state.recording_mode {
                RecordingMode::Automatic => valid_data,
                RecordingMode::Manual => self.state.recording_active,
            }
        };
        self.commit(active)
    }

    pub fn set_motoring(&mut self, motoring: bool) -> MotoringUpdate {
        let motoring_changed = self.state.motoring != motoring;
        self.state.motoring = motoring;
        let recording = if motoring { self.commit(false) } else { None };
        MotoringUpdate {
            motoring_changed,
            recording,
        }
    }

    /// Switching mode stops an active recording; automatic mode then
    /// restarts on the next valid tick.
    pub fn set_mode(&mut self, mode: RecordingMode) -> Option<RecordingState> {
        if self.state.recording_mode == mode {
            return None;
        }
        self.state.recording_mode = mode;
        self.commit(false)
    }

    /// Explicit user start/stop. Only valid in manual mode. Starting with a
    /// `file` selects it as the manual recording target.
    pub fn set_recording_active(
        &mut self,
        active: bool,
        file: Option<String>,
    ) -> Result<Option<RecordingState>, RecordingError> {
        if self.state.recording_mode == RecordingMode::Automatic {
            return Err(RecordingError::AutomaticMode);
        }
        if active && self.state.motoring {
            return Err(RecordingError::Motoring);
        }
        if let Some(file) = file {
            self.manual_file = file;
        }
        if active && self.state.recording_active && self.state.active_file != self.manual_file {
            self.state.active_file = self.manual_file.clone();
            return Ok(Some(self.state.clone()));
        }
        Ok(self.commit(active))
    }

    fn commit(&mut self, active: bool) -> Option<RecordingState> {
        if self.state.recording_active == active {
            return None;
        }
        self.state.recording_active = active;
        if active {
            self.state.active_file = match self.state.recording_mode {
                RecordingMode::Manual => self.manual_file.clone(),
                RecordingMode::Automatic => self.auto_file.clone(),
            };
        }
        Some(self.state.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotoringDetection {
    /// Any engine not reporting "stopped", or turning at all.
    #[default]
    AutoState,
    /// Any engine turning faster than `max_idle_rpm`.
    Revolutions,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MotoringConfig {
    pub detection: MotoringDetection,
    pub max_idle_rpm: f64,
}

impl Default for MotoringConfig {
    fn default() -> Self {
        Self {
            detection: MotoringDetection::AutoState,
            max_idle_rpm: 1000.0,
        }
    }
}

impl MotoringConfig {
    pub fn is_motoring(&self, engines: &[PropulsionStatus]) -> bool {
        match self.detection {
            MotoringDetection::AutoState => engines.iter().any(|e| {
                e.state.as_deref().is_some_and(|s| s != "stopped")
                    || e.revolutions_hz.is_some_and(|hz| hz > 0.0)
            }),
            MotoringDetection::Revolutions => {
                let idle_hz = rpm_to_hz(self.max_idle_rpm);
                engines
                    .iter()
                    .any(|e| e.revolutions_hz.is_some_and(|hz| hz > idle_hz))
            }
        }
    }
}
