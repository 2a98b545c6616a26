// Unit conversions between Signal K SI values and sailing units

const KNOTS_PER_METER_PER_SECOND: f64 = 1.94384;

pub fn radians_to_degrees(rad: f64) -> f64 {
    rad.to_degrees()
}

pub fn meters_per_second_to_knots(ms: f64) -> f64 {
    ms * KNOTS_PER_METER_PER_SECOND
}

pub fn rpm_to_hz(rpm: f64) -> f64 {
    rpm / 60.0
}

/// Minimal absolute separation between two angles in degrees, in [0, 180].
pub fn angle_difference_deg(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Round to the nearest multiple of `step`, halves away from zero.
pub fn round_to_step(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}
