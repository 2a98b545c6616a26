// Polar table domain model - best observed boat speed per (TWA, TWS) cell
use crate::domain::units::round_to_step;
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PolarError {
    #[error("sample contains a non-finite value")]
    NonFinite,
    #[error("boat speed {0} kt is negative")]
    NegativeBoatSpeed(f64),
    #[error("wind speed {0} kt is negative")]
    NegativeWindSpeed(f64),
    #[error("wind angle {0}° is outside 0..=180")]
    AngleOutOfRange(f64),
    #[error("'{0}' is not a numeric polar key")]
    InvalidKey(String),
}

/// Rounded axis value used as a table key, stored in thousandths so that
/// fractional steps (e.g. 2.5°) still order and compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AxisKey(i64);

impl AxisKey {
    pub fn from_value(value: f64) -> Self {
        Self((value * 1000.0).round() as i64)
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for AxisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}", self.0 / 1000)
        } else {
            write!(f, "{}", self.value())
        }
    }
}

impl FromStr for AxisKey {
    type Err = PolarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Self::from_value(v)),
            _ => Err(PolarError::InvalidKey(s.to_string())),
        }
    }
}

/// Rounding steps of the table grid.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolarGrid {
    pub angle_step_deg: f64,
    pub speed_step_kt: f64,
}

impl Default for PolarGrid {
    fn default() -> Self {
        Self {
            angle_step_deg: 5.0,
            speed_step_kt: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolarCell {
    pub wind_angle_deg: f64,
    pub wind_speed_kt: f64,
    pub boat_speed_kt: f64,
    pub last_updated: DateTime<Utc>,
}

/// Result of a merge attempt. When `updated` is false, `cell` is the
/// stored cell that was kept.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub updated: bool,
    pub previous: Option<PolarCell>,
    pub cell: PolarCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosestPoint {
    pub angle_deg: f64,
    pub speed_kt: f64,
    pub boat_speed_kt: f64,
    pub distance: f64,
}

/// Angle key -> speed key -> cell. Both levels iterate in ascending key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolarTable {
    angles: BTreeMap<AxisKey, BTreeMap<AxisKey, PolarCell>>,
}

impl PolarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.angles.values().map(BTreeMap::len).sum()
    }

    pub fn get(&self, angle_deg: f64, speed_kt: f64) -> Option<&PolarCell> {
        self.angles
            .get(&AxisKey::from_value(angle_deg))?
            .get(&AxisKey::from_value(speed_kt))
    }

    /// Cells ordered by angle, then speed.
    pub fn cells(&self) -> impl Iterator<Item = &PolarCell> {
        self.angles.values().flat_map(BTreeMap::values)
    }

    /// Writes a cell unconditionally. Used when building a table from an
    /// imported document; recorded samples go through [`PolarTable::merge`].
    pub fn insert(
        &mut self,
        angle: AxisKey,
        speed: AxisKey,
        boat_speed_kt: f64,
        last_updated: DateTime<Utc>,
    ) {
        let cell = PolarCell {
            wind_angle_deg: angle.value(),
            wind_speed_kt: speed.value(),
            boat_speed_kt,
            last_updated,
        };
        self.angles.entry(angle).or_default().insert(speed, cell);
    }

    /// Best-of merge of one sample into its rounded cell.
    ///
    /// The cell is replaced only when it is absent or `boat_speed_kt` is
    /// strictly greater than the stored value, so a cell never decreases.
    pub fn merge(
        &mut self,
        grid: &PolarGrid,
        angle_deg: f64,
        speed_kt: f64,
        boat_speed_kt: f64,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, PolarError> {
        if !(angle_deg.is_finite() && speed_kt.is_finite() && boat_speed_kt.is_finite()) {
            return Err(PolarError::NonFinite);
        }
        if boat_speed_kt < 0.0 {
            return Err(PolarError::NegativeBoatSpeed(boat_speed_kt));
        }

        let angle = round_to_step(angle_deg, grid.angle_step_deg).abs();
        let speed = round_to_step(speed_kt, grid.speed_step_kt);
        if angle > 180.0 {
            return Err(PolarError::AngleOutOfRange(angle));
        }
        if speed < 0.0 {
            return Err(PolarError::NegativeWindSpeed(speed));
        }

        let angle_key = AxisKey::from_value(angle);
        let speed_key = AxisKey::from_value(speed);
        let existing = self
            .angles
            .get(&angle_key)
            .and_then(|row| row.get(&speed_key))
            .copied();

        match existing {
            Some(kept) if boat_speed_kt <= kept.boat_speed_kt => Ok(MergeOutcome {
                updated: false,
                previous: None,
                cell: kept,
            }),
            previous => {
                self.insert(angle_key, speed_key, boat_speed_kt, now);
                let cell = PolarCell {
                    wind_angle_deg: angle_key.value(),
                    wind_speed_kt: speed_key.value(),
                    boat_speed_kt,
                    last_updated: now,
                };
                Ok(MergeOutcome {
                    updated: true,
                    previous,
                    cell,
                })
            }
        }
    }

    /// Nearest populated cell by Euclidean distance in (angle, speed) space.
    ///
    /// Ties resolve to the lowest angle key, then the lowest speed key.
    pub fn find_closest(&self, angle_deg: f64, speed_kt: f64) -> Option<ClosestPoint> {
        let mut best: Option<ClosestPoint> = None;
        for cell in self.cells() {
            let distance =
                (cell.wind_angle_deg - angle_deg).hypot(cell.wind_speed_kt - speed_kt);
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(ClosestPoint {
                    angle_deg: cell.wind_angle_deg,
                    speed_kt: cell.wind_speed_kt,
                    boat_speed_kt: cell.boat_speed_kt,
                    distance,
                });
            }
        }
        best
    }

    fn from_document(document: BTreeMap<String, StoredRow>) -> Self {
        let mut table = Self::new();
        let mut dropped = 0usize;

        for (angle_text, row) in document {
            let (Ok(angle), StoredRow::Cells(cells)) = (angle_text.parse::<AxisKey>(), row) else {
                dropped += 1;
                continue;
            };
            if !(0.0..=180.0).contains(&angle.value()) {
                dropped += 1;
                continue;
            }
            for (speed_text, stored) in cells {
                let Ok(speed) = speed_text.parse::<AxisKey>() else {
                    dropped += 1;
                    continue;
                };
                let (boat_speed, timestamp) = match stored {
                    StoredCellRepr::Record {
                        boat_speed,
                        timestamp,
                    } => (boat_speed, timestamp.unwrap_or(DateTime::UNIX_EPOCH)),
                    StoredCellRepr::Bare(boat_speed) => (boat_speed, DateTime::UNIX_EPOCH),
                    StoredCellRepr::Unreadable(_) => {
                        dropped += 1;
                        continue;
                    }
                };
                if speed.value() < 0.0 || !boat_speed.is_finite() {
                    dropped += 1;
                    continue;
                }
                table.insert(angle, speed, boat_speed, timestamp);
            }
        }

        if dropped > 0 {
            tracing::warn!("Dropped {} unreadable entries while loading polar table", dropped);
        }
        table
    }
}

#[derive(Serialize)]
struct StoredCell {
    #[serde(rename = "boatSpeed")]
    boat_speed: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCellRepr {
    Record {
        #[serde(rename = "boatSpeed")]
        boat_speed: f64,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Bare(f64),
    Unreadable(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRow {
    Cells(BTreeMap<String, StoredCellRepr>),
    Unreadable(IgnoredAny),
}

struct SpeedRow<'a>(&'a BTreeMap<AxisKey, PolarCell>);

impl Serialize for SpeedRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(speed, cell)| {
            (
                speed.to_string(),
                StoredCell {
                    boat_speed: cell.boat_speed_kt,
                    timestamp: cell.last_updated,
                },
            )
        }))
    }
}

impl Serialize for PolarTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.angles
                .iter()
                .filter(|(_, row)| !row.is_empty())
                .map(|(angle, row)| (angle.to_string(), SpeedRow(row))),
        )
    }
}

impl<'de> Deserialize<'de> for PolarTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = BTreeMap::<String, StoredRow>::deserialize(deserializer)?;
        Ok(Self::from_document(document))
    }
}
