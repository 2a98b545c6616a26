// Recorder - the sampling and admission pipeline run on every tick
use crate::domain::filters::{AverageRatioFilter, Rejection, Verdict, same_reasons};
use crate::domain::history::RollingHistory;
use crate::domain::performance::{LiveData, PerformanceComparison, compare_performance};
use crate::domain::polar::{MergeOutcome, PolarGrid, PolarTable};
use crate::domain::readings::{Quantity, Reading};
use crate::domain::recording::{
    MotoringUpdate, RecordingError, RecordingMachine, RecordingMode, RecordingState,
};
use crate::domain::units::{meters_per_second_to_knots, radians_to_degrees};
use crate::infrastructure::config::{AdmissionSettings, RecorderConfig, SamplingSettings, StabilitySettings};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Raw readings fetched for one tick, in SI units.
#[derive(Debug, Clone, Default)]
pub struct SampleInput {
    readings: HashMap<Quantity, Reading>,
}

impl SampleInput {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(mut self, quantity: Quantity, reading: Reading) -> Self {
        self.insert(quantity, reading);
        self
    }

    pub fn insert(&mut self, quantity: Quantity, reading: Reading) {
        self.readings.insert(quantity, reading);
    }

    pub fn get(&self, quantity: Quantity) -> Option<&Reading> {
        self.readings.get(&quantity)
    }
}

/// A snapshot of a table to be written after an accepted merge.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub file: String,
    pub table: PolarTable,
}

#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub rejections: Vec<Rejection>,
    /// True when the rejection reasons differ from the previous tick's.
    pub rejections_changed: bool,
    /// New state, present only when `recording_active` changed.
    pub recording: Option<RecordingState>,
    pub merge: Option<MergeOutcome>,
    pub persist: Option<PersistJob>,
    pub live: Option<(LiveData, PerformanceComparison)>,
}

impl TickOutcome {
    pub fn is_valid(&self) -> bool {
        self.rejections.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Histories {
    course: RollingHistory,
    heading: RollingHistory,
    twd: RollingHistory,
    stw: RollingHistory,
    twa: RollingHistory,
    tws: RollingHistory,
}

impl Histories {
    fn new(stability: &StabilitySettings, admission: &AdmissionSettings) -> Self {
        Self {
            course: RollingHistory::new(stability.course.window_secs),
            heading: RollingHistory::new(stability.heading.window_secs),
            twd: RollingHistory::new(stability.twd.window_secs),
            stw: RollingHistory::new(admission.stw.window_secs),
            twa: RollingHistory::new(admission.twa.window_secs),
            tws: RollingHistory::new(admission.tws.window_secs),
        }
    }

    fn get(&self, quantity: Quantity) -> &RollingHistory {
        match quantity {
            Quantity::CourseOverGround => &self.course,
            Quantity::Heading => &self.heading,
            Quantity::TrueWindDirection => &self.twd,
            Quantity::SpeedThroughWater => &self.stw,
            Quantity::TrueWindAngle => &self.twa,
            Quantity::TrueWindSpeed => &self.tws,
        }
    }

    fn get_mut(&mut self, quantity: Quantity) -> &mut RollingHistory {
        match quantity {
            Quantity::CourseOverGround => &mut self.course,
            Quantity::Heading => &mut self.heading,
            Quantity::TrueWindDirection => &mut self.twd,
            Quantity::SpeedThroughWater => &mut self.stw,
            Quantity::TrueWindAngle => &mut self.twa,
            Quantity::TrueWindSpeed => &mut self.tws,
        }
    }
}

/// Sensor value converted to the unit the filters and table work in.
fn convert(quantity: Quantity, si_value: f64) -> f64 {
    match quantity {
        Quantity::TrueWindSpeed | Quantity::SpeedThroughWater => meters_per_second_to_knots(si_value),
        Quantity::TrueWindAngle
        | Quantity::CourseOverGround
        | Quantity::Heading
        | Quantity::TrueWindDirection => radians_to_degrees(si_value),
    }
}

/// Single owner of histories, recording state and both polar tables.
///
/// All mutation happens through `&mut self`, so wrapping one instance in a
/// mutex serializes ticks, motoring changes and user commands.
#[derive(Debug)]
pub struct Recorder {
    grid: PolarGrid,
    sampling: SamplingSettings,
    stability: StabilitySettings,
    admission: AdmissionSettings,
    histories: Histories,
    machine: RecordingMachine,
    baseline: PolarTable,
    auto_table: PolarTable,
    live: Option<LiveData>,
    last_rejections: Vec<Rejection>,
}

impl Recorder {
    pub fn new(config: &RecorderConfig, baseline: PolarTable, auto_table: PolarTable) -> Self {
        Self {
            grid: config.polar,
            sampling: config.sampling,
            stability: config.stability,
            admission: config.admission,
            histories: Histories::new(&config.stability, &config.admission),
            machine: RecordingMachine::new(
                config.sampling.mode,
                config.storage.polar_file.clone(),
                config.storage.auto_recording_file.clone(),
            ),
            baseline,
            auto_table,
            live: None,
            last_rejections: Vec::new(),
        }
    }

    pub fn state(&self) -> &RecordingState {
        self.machine.state()
    }

    pub fn live(&self) -> Option<LiveData> {
        self.live
    }

    pub fn manual_file(&self) -> &str {
        self.machine.manual_file()
    }

    pub fn baseline(&self) -> &PolarTable {
        &self.baseline
    }

    pub fn compare(&self, live: &LiveData) -> PerformanceComparison {
        compare_performance(live, &self.baseline)
    }

    /// The in-memory table backing `file`, if it is one of the two live tables.
    pub fn table_for(&self, file: &str) -> Option<&PolarTable> {
        if file == self.machine.manual_file() {
            Some(&self.baseline)
        } else if file == self.machine.auto_file() {
            Some(&self.auto_table)
        } else {
            None
        }
    }

    /// Swaps in a table written to disk behind the recorder's back (import).
    /// Returns whether `file` was one of the live tables.
    pub fn replace_table(&mut self, file: &str, table: PolarTable) -> bool {
        if file == self.machine.manual_file() {
            self.baseline = table;
            true
        } else if file == self.machine.auto_file() {
            self.auto_table = table;
            true
        } else {
            false
        }
    }

    pub fn set_motoring(&mut self, motoring: bool) -> MotoringUpdate {
        self.machine.set_motoring(motoring)
    }

    pub fn set_mode(&mut self, mode: RecordingMode) -> Option<RecordingState> {
        self.machine.set_mode(mode)
    }

    /// Manual start. `selection` carries a newly chosen file together with
    /// its freshly loaded table, which becomes the baseline.
    pub fn start_manual(
        &mut self,
        selection: Option<(String, PolarTable)>,
    ) -> Result<Option<RecordingState>, RecordingError> {
        let (file, table) = match selection {
            Some((file, table)) => (Some(file), Some(table)),
            None => (None, None),
        };
        let transition = self.machine.set_recording_active(true, file)?;
        if let Some(table) = table {
            self.baseline = table;
        }
        Ok(transition)
    }

    pub fn stop_manual(&mut self) -> Result<Option<RecordingState>, RecordingError> {
        self.machine.set_recording_active(false, None)
    }

    fn is_required(&self, quantity: Quantity) -> bool {
        match quantity {
            Quantity::TrueWindAngle | Quantity::TrueWindSpeed | Quantity::SpeedThroughWater => true,
            Quantity::CourseOverGround => self.stability.course.enabled,
            Quantity::Heading => self.stability.heading.enabled,
            Quantity::TrueWindDirection => self.stability.twd.enabled,
        }
    }

    /// Runs one sampling tick: histories, filters, state machine, merge.
    pub fn sample(&mut self, input: &SampleInput, now: DateTime<Utc>) -> TickOutcome {
        let stale_after = self.sampling.stale_after();
        let mut rejections = Vec::new();
        let mut fresh: HashMap<Quantity, f64> = HashMap::new();

        for quantity in Quantity::ALL {
            let required = self.is_required(quantity);
            match input.get(quantity) {
                Some(reading) if reading.value.is_finite() => {
                    let age = now - reading.timestamp;
                    if age > stale_after {
                        if required {
                            rejections.push(Rejection::Stale {
                                quantity,
                                age_secs: age.num_milliseconds() as f64 / 1000.0,
                            });
                        }
                        continue;
                    }
                    let value = convert(quantity, reading.value);
                    self.histories.get_mut(quantity).record(now, value);
                    fresh.insert(quantity, value);
                }
                _ if required => rejections.push(Rejection::Missing(quantity)),
                _ => {}
            }
        }

        for (quantity, filter) in [
            (Quantity::CourseOverGround, self.stability.course),
            (Quantity::Heading, self.stability.heading),
            (Quantity::TrueWindDirection, self.stability.twd),
        ] {
            if fresh.contains_key(&quantity) && !filter.is_stable(self.histories.get(quantity)) {
                rejections.push(Rejection::Unstable(quantity));
            }
        }

        let triplet = match (
            fresh.get(&Quantity::TrueWindAngle),
            fresh.get(&Quantity::TrueWindSpeed),
            fresh.get(&Quantity::SpeedThroughWater),
        ) {
            (Some(&twa_deg), Some(&tws_kt), Some(&stw_kt)) => Some(LiveData {
                twa_deg,
                tws_kt,
                stw_kt,
            }),
            _ => None,
        };

        let live = triplet.map(|live| {
            self.live = Some(live);
            self.admit(&live, &mut rejections);
            (live, self.compare(&live))
        });

        if self.state().motoring {
            rejections.push(Rejection::Motoring);
        }

        let valid = rejections.is_empty();
        let recording = self.machine.evaluate(valid);

        let mut merge = None;
        let mut persist = None;
        if let (true, Some(live)) = (valid && self.state().recording_active, triplet) {
            let grid = self.grid;
            let file = self.state().active_file.clone();
            let target = match self.state().recording_mode {
                RecordingMode::Manual => &mut self.baseline,
                RecordingMode::Automatic => &mut self.auto_table,
            };
            match target.merge(&grid, live.twa_deg, live.tws_kt, live.stw_kt, now) {
                Ok(outcome) => {
                    if outcome.updated {
                        tracing::info!(
                            "Recorded {:.2} kt at TWA {}° / TWS {} kt in {}",
                            outcome.cell.boat_speed_kt,
                            outcome.cell.wind_angle_deg,
                            outcome.cell.wind_speed_kt,
                            file
                        );
                        persist = Some(PersistJob {
                            file,
                            table: target.clone(),
                        });
                    }
                    merge = Some(outcome);
                }
                Err(e) => tracing::error!("Admitted sample could not be merged: {}", e),
            }
        }

        let rejections_changed = !same_reasons(&rejections, &self.last_rejections);
        if rejections_changed {
            self.last_rejections = rejections.clone();
        }
        if !rejections.is_empty() {
            tracing::debug!(
                "Sample rejected: {}",
                rejections.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }

        TickOutcome {
            rejections,
            rejections_changed,
            recording,
            merge,
            persist,
            live,
        }
    }

    /// Sample-level admission: moving floor, range, polar ratio and the
    /// moving-average ratios. Every failing check adds its own rejection.
    fn admit(&self, live: &LiveData, rejections: &mut Vec<Rejection>) {
        if live.stw_kt < self.sampling.min_stw_kt {
            rejections.push(Rejection::NotMoving {
                stw_kt: live.stw_kt,
                floor_kt: self.sampling.min_stw_kt,
            });
        }
        if live.twa_deg.abs() > 180.0 {
            rejections.push(Rejection::OutOfRange {
                quantity: Quantity::TrueWindAngle,
                value: live.twa_deg,
            });
        }
        if live.tws_kt < 0.0 {
            rejections.push(Rejection::OutOfRange {
                quantity: Quantity::TrueWindSpeed,
                value: live.tws_kt,
            });
        }

        if let Verdict::Reject(ratio) =
            self.admission
                .vmg
                .evaluate(live.stw_kt, live.twa_deg, live.tws_kt, &self.baseline)
        {
            rejections.push(Rejection::VmgRatio(ratio));
        }

        let averages: [(Quantity, AverageRatioFilter, f64, bool); 3] = [
            (Quantity::SpeedThroughWater, self.admission.stw, live.stw_kt, false),
            (Quantity::TrueWindAngle, self.admission.twa, live.twa_deg, true),
            (Quantity::TrueWindSpeed, self.admission.tws, live.tws_kt, false),
        ];
        for (quantity, filter, current, magnitudes) in averages {
            if let Verdict::Reject(ratio) =
                filter.evaluate(current, self.histories.get(quantity), magnitudes)
            {
                rejections.push(Rejection::AverageRatio { quantity, ratio });
            }
        }
    }
}
