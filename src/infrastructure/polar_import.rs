// Polar import - JSON documents or semicolon-separated polar tables
use crate::application::polar_store::StoreError;
use crate::domain::polar::{AxisKey, PolarTable};
use chrono::{DateTime, Utc};

const CSV_CORNER: &str = "twa/tws";

/// Parses an uploaded polar. Text starting with `{` is a polar JSON
/// document, anything else a CSV grid with a `twa/tws;6;8;...` header and
/// one row per wind angle. Every imported cell is stamped with `now`.
pub fn parse_import(content: &str, now: DateTime<Utc>) -> Result<PolarTable, StoreError> {
    let table = if content.trim_start().starts_with('{') {
        restamp(parse_json(content)?, now)
    } else {
        parse_csv(content, now)?
    };
    if table.is_empty() {
        return Err(StoreError::InvalidImport("no polar cells found".to_string()));
    }
    Ok(table)
}

fn parse_json(content: &str) -> Result<PolarTable, StoreError> {
    serde_json::from_str(content).map_err(|e| StoreError::InvalidImport(e.to_string()))
}

fn restamp(table: PolarTable, now: DateTime<Utc>) -> PolarTable {
    let mut stamped = PolarTable::new();
    for cell in table.cells() {
        stamped.insert(
            AxisKey::from_value(cell.wind_angle_deg),
            AxisKey::from_value(cell.wind_speed_kt),
            cell.boat_speed_kt,
            now,
        );
    }
    stamped
}

fn parse_number(field: &str) -> Option<f64> {
    field
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn parse_csv(content: &str, now: DateTime<Utc>) -> Result<PolarTable, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| StoreError::InvalidImport(e.to_string()))?
        .clone();
    if !headers
        .get(0)
        .is_some_and(|corner| corner.eq_ignore_ascii_case(CSV_CORNER))
    {
        return Err(StoreError::InvalidImport(format!(
            "expected '{CSV_CORNER}' in the first header column"
        )));
    }
    // Column index -> wind speed; non-numeric columns are ignored.
    let speeds: Vec<(usize, f64)> = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, h)| parse_number(h).filter(|s| *s >= 0.0).map(|s| (i, s)))
        .collect();

    let mut table = PolarTable::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| StoreError::InvalidImport(e.to_string()))?;
        let Some(angle) = record
            .get(0)
            .and_then(parse_number)
            .filter(|a| (0.0..=180.0).contains(a))
        else {
            skipped += 1;
            continue;
        };
        for &(column, speed) in &speeds {
            match record.get(column).and_then(parse_number) {
                Some(boat_speed) if boat_speed >= 0.0 => {
                    table.insert(AxisKey::from_value(angle), AxisKey::from_value(speed), boat_speed, now)
                }
                _ => skipped += 1,
            }
        }
    }
    if skipped > 0 {
        tracing::debug!("Skipped {} unreadable polar import fields", skipped);
    }
    Ok(table)
}
