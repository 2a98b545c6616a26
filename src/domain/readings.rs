// Sensor reading domain models
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A timestamped scalar value as published on the sensor bus (SI units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

/// Quantities sampled on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Quantity {
    TrueWindAngle,
    TrueWindSpeed,
    SpeedThroughWater,
    CourseOverGround,
    Heading,
    TrueWindDirection,
}

impl Quantity {
    pub const ALL: [Quantity; 6] = [
        Quantity::TrueWindAngle,
        Quantity::TrueWindSpeed,
        Quantity::SpeedThroughWater,
        Quantity::CourseOverGround,
        Quantity::Heading,
        Quantity::TrueWindDirection,
    ];

    /// Signal K path the quantity is read from.
    pub fn path(self) -> &'static str {
        match self {
            Quantity::TrueWindAngle => "environment.wind.angleTrueWater",
            Quantity::TrueWindSpeed => "environment.wind.speedTrue",
            Quantity::SpeedThroughWater => "navigation.speedThroughWater",
            Quantity::CourseOverGround => "navigation.courseOverGroundTrue",
            Quantity::Heading => "navigation.headingTrue",
            Quantity::TrueWindDirection => "environment.wind.directionTrue",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.path() == path)
    }

    pub fn label(self) -> &'static str {
        match self {
            Quantity::TrueWindAngle => "TWA",
            Quantity::TrueWindSpeed => "TWS",
            Quantity::SpeedThroughWater => "STW",
            Quantity::CourseOverGround => "COG",
            Quantity::Heading => "HDG",
            Quantity::TrueWindDirection => "TWD",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of one propulsion instance (`propulsion.<instance>.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropulsionStatus {
    pub instance: String,
    pub state: Option<String>,
    pub revolutions_hz: Option<f64>,
}

impl PropulsionStatus {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            ..Self::default()
        }
    }
}

/// Splits `propulsion.<instance>.<field>` into its instance and field.
pub fn parse_propulsion_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("propulsion.")?;
    let (instance, field) = rest.split_once('.')?;
    if instance.is_empty() || field.is_empty() {
        return None;
    }
    Some((instance, field))
}
