// Time-windowed history of recent readings, one per tracked quantity
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledReading {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Readings no older than `window` relative to the latest insert.
///
/// Pruning happens on insert only, so the buffer stays bounded by the
/// sampling rate times the window length.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    window: TimeDelta,
    readings: VecDeque<SampledReading>,
}

impl RollingHistory {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window: TimeDelta::milliseconds((window_secs * 1000.0).round() as i64),
            readings: VecDeque::new(),
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>, value: f64) {
        self.readings.push_back(SampledReading { time: now, value });
        let cutoff = now - self.window;
        while self.readings.front().is_some_and(|r| r.time < cutoff) {
            self.readings.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first(&self) -> Option<&SampledReading> {
        self.readings.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampledReading> {
        self.readings.iter()
    }

    /// Population mean, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: f64 = self.readings.iter().map(|r| r.value).sum();
        Some(sum / self.readings.len() as f64)
    }

    /// Population standard deviation, `None` when empty.
    pub fn standard_deviation(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self
            .readings
            .iter()
            .map(|r| (r.value - mean).powi(2))
            .sum::<f64>()
            / self.readings.len() as f64;
        Some(variance.sqrt())
    }
}
