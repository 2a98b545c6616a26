// In-memory reading source fed over HTTP
use crate::application::reading_source::ReadingSource;
use crate::domain::readings::{PropulsionStatus, Quantity, Reading, parse_propulsion_path};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Notify, RwLock};

/// One pushed value, Signal K delta style.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingUpdate {
    pub path: String,
    pub value: Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingBatch {
    pub updates: Vec<ReadingUpdate>,
}

/// Latest pushed value per tracked path. Propulsion writes wake
/// [`ReadingSource::propulsion_changed`].
#[derive(Debug, Default)]
pub struct LiveReadings {
    readings: RwLock<HashMap<String, Reading>>,
    engines: RwLock<BTreeMap<String, PropulsionStatus>>,
    propulsion_notify: Notify,
}

impl LiveReadings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the updates and returns how many were usable.
    pub async fn ingest(&self, updates: Vec<ReadingUpdate>) -> usize {
        let mut accepted = 0;
        let mut propulsion_touched = false;

        for update in updates {
            let timestamp = update.timestamp.unwrap_or_else(Utc::now);
            if let Some((instance, field)) = parse_propulsion_path(&update.path) {
                let mut engines = self.engines.write().await;
                let engine = engines
                    .entry(instance.to_string())
                    .or_insert_with(|| PropulsionStatus::new(instance));
                match (field, &update.value) {
                    ("state", Value::String(state)) => engine.state = Some(state.clone()),
                    ("revolutions", value) if value.is_f64() || value.is_i64() || value.is_u64() => {
                        engine.revolutions_hz = value.as_f64()
                    }
                    _ => continue,
                }
                propulsion_touched = true;
                accepted += 1;
                continue;
            }

            if Quantity::from_path(&update.path).is_none() {
                tracing::debug!("Ignoring untracked path {}", update.path);
                continue;
            }
            match update.value.as_f64().filter(|v| v.is_finite()) {
                Some(value) => {
                    self.readings
                        .write()
                        .await
                        .insert(update.path, Reading::new(value, timestamp));
                    accepted += 1;
                }
                None => tracing::debug!("Ignoring non-numeric value for {}", update.path),
            }
        }

        if propulsion_touched {
            self.propulsion_notify.notify_one();
        }
        accepted
    }
}

#[async_trait]
impl ReadingSource for LiveReadings {
    async fn reading(&self, path: &str) -> anyhow::Result<Option<Reading>> {
        Ok(self.readings.read().await.get(path).copied())
    }

    async fn propulsion(&self) -> anyhow::Result<Vec<PropulsionStatus>> {
        Ok(self.engines.read().await.values().cloned().collect())
    }

    async fn propulsion_changed(&self) {
        self.propulsion_notify.notified().await;
    }
}
