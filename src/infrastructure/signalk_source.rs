// Signal K REST reading source
use crate::application::reading_source::ReadingSource;
use crate::domain::readings::{PropulsionStatus, Reading};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const SELF_API: &str = "signalk/v1/api/vessels/self";

/// Polls a Signal K server's REST API for the latest value of each path.
#[derive(Debug, Clone)]
pub struct SignalKSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    propulsion_poll: Duration,
}

/// Leaf of the Signal K full data model.
#[derive(Debug, Deserialize)]
struct ValueNode {
    value: Option<Value>,
    timestamp: Option<DateTime<Utc>>,
}

impl SignalKSource {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
        propulsion_poll: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build Signal K HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            propulsion_poll,
        })
    }

    /// `navigation.speedThroughWater` -> `.../vessels/self/navigation/speedThroughWater`
    fn url_for(&self, path: &str) -> String {
        let segments: Vec<_> = path.split('.').map(urlencoding::encode).collect();
        format!("{}/{}/{}", self.base_url, SELF_API, segments.join("/"))
    }

    /// GETs a node of the data model; `None` when the server has no data there.
    async fn fetch(&self, path: &str) -> Result<Option<Value>> {
        let url = self.url_for(path);
        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to request {}", path))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Signal K request for {} failed with status {}: {}", path, status, body);
        }

        let node = response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse Signal K response for {}", path))?;
        Ok(Some(node))
    }
}

/// A node without a timestamp cannot be aged, so it counts as missing.
fn parse_reading(node: Value) -> Option<Reading> {
    let node: ValueNode = serde_json::from_value(node).ok()?;
    let value = node.value?.as_f64()?;
    Some(Reading::new(value, node.timestamp?))
}

/// Reads `{ "<instance>": { "state": { "value": .. }, "revolutions": { "value": .. } } }`.
fn parse_propulsion(tree: &Value) -> Vec<PropulsionStatus> {
    let Some(instances) = tree.as_object() else {
        return Vec::new();
    };
    instances
        .iter()
        .filter(|(_, node)| node.is_object())
        .map(|(instance, node)| PropulsionStatus {
            instance: instance.clone(),
            state: node
                .pointer("/state/value")
                .and_then(Value::as_str)
                .map(str::to_string),
            revolutions_hz: node.pointer("/revolutions/value").and_then(Value::as_f64),
        })
        .collect()
}

#[async_trait]
impl ReadingSource for SignalKSource {
    async fn reading(&self, path: &str) -> Result<Option<Reading>> {
        Ok(self.fetch(path).await?.and_then(parse_reading))
    }

    async fn propulsion(&self) -> Result<Vec<PropulsionStatus>> {
        Ok(self
            .fetch("propulsion")
            .await?
            .map(|tree| parse_propulsion(&tree))
            .unwrap_or_default())
    }

    /// REST has no change feed, so this simply waits one poll period.
    async fn propulsion_changed(&self) {
        tokio::time::sleep(self.propulsion_poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> SignalKSource {
        SignalKSource::new(
            "http://boat.local:3000/",
            None,
            Duration::from_millis(800),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_url_for_path() {
        assert_eq!(
            source().url_for("environment.wind.angleTrueWater"),
            "http://boat.local:3000/signalk/v1/api/vessels/self/environment/wind/angleTrueWater"
        );
        assert_eq!(
            source().url_for("propulsion.port engine.state"),
            "http://boat.local:3000/signalk/v1/api/vessels/self/propulsion/port%20engine/state"
        );
    }

    #[test]
    fn test_parse_reading() {
        let reading = parse_reading(json!({
            "value": 3.4,
            "timestamp": "2024-06-01T12:00:00.000Z",
            "$source": "nmea0183.II"
        }))
        .unwrap();
        assert_eq!(reading.value, 3.4);
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-06-01T12:00:00+00:00");

        assert!(parse_reading(json!({ "value": null })).is_none());
        assert!(parse_reading(json!({ "value": { "latitude": 1.0 } })).is_none());
        assert!(parse_reading(json!({ "value": 1.0 })).is_none());
        assert!(parse_reading(json!({ "value": 1.0, "timestamp": "2024-06-01T12:00:00Z" })).is_some());
    }

    #[test]
    fn test_parse_propulsion_tree() {
        let engines = parse_propulsion(&json!({
            "main": {
                "state": { "value": "started" },
                "revolutions": { "value": 25.5 }
            },
            "aux": { "label": { "value": "generator" } },
            "meta": "ignored"
        }));

        assert_eq!(engines.len(), 2);
        let main = engines.iter().find(|e| e.instance == "main").unwrap();
        assert_eq!(main.state.as_deref(), Some("started"));
        assert_eq!(main.revolutions_hz, Some(25.5));
        let aux = engines.iter().find(|e| e.instance == "aux").unwrap();
        assert_eq!(aux.state, None);
        assert!(parse_propulsion(&json!(null)).is_empty());
    }
}
