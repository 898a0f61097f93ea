use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::{HistoryPoint, SensorSeries};

/// Home Assistant API errors
#[derive(Debug, Error)]
pub enum HaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Entity not found: {0}")]
    EntityNotFound(String),
    #[error("Authentication rejected by Home Assistant")]
    AuthenticationFailed,
    #[error("Entity {entity_id} has non-numeric state '{state}'")]
    NonNumericState { entity_id: String, state: String },
}

/// Read access to Home Assistant sensor state and history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HomeAssistant: Send + Sync {
    /// Numeric history for the last `window_minutes`, oldest first.
    /// Non-numeric records are dropped and counted, never an error.
    async fn history(&self, entity_id: &str, window_minutes: i64) -> Result<SensorSeries, HaError>;

    /// Current numeric state of an entity.
    async fn current_value(&self, entity_id: &str) -> Result<f64, HaError>;
}

/// States Home Assistant reports for sensors with no usable reading.
const SENTINEL_STATES: [&str; 3] = ["unknown", "unavailable", "None"];

/// Home Assistant REST API client.
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, HaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("battery-charge-planner/0.2"),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    fn parse_history(&self, entity_id: &str, records: Vec<RawHistoryState>) -> SensorSeries {
        let mut points = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for raw in records {
            if SENTINEL_STATES.contains(&raw.state.as_str()) {
                trace!(entity_id, state = %raw.state, "skipping sentinel state");
                skipped += 1;
                continue;
            }
            let Ok(value) = raw.state.trim().parse::<f64>() else {
                trace!(entity_id, state = %raw.state, "skipping non-numeric state");
                skipped += 1;
                continue;
            };
            // minimal_response omits last_updated on all but the first record
            let stamp = raw.last_changed.as_deref().or(raw.last_updated.as_deref());
            let Some(ts) = stamp.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) else {
                trace!(entity_id, "skipping record without parseable timestamp");
                skipped += 1;
                continue;
            };
            points.push(HistoryPoint::new(ts.with_timezone(&Utc), value));
        }

        SensorSeries::new(points, skipped)
    }
}

#[async_trait]
impl HomeAssistant for HomeAssistantClient {
    async fn history(&self, entity_id: &str, window_minutes: i64) -> Result<SensorSeries, HaError> {
        let start = Utc::now() - chrono::Duration::minutes(window_minutes);
        let url = format!(
            "{}/api/history/period/{}?filter_entity_id={}&minimal_response&no_attributes",
            self.base_url,
            start.to_rfc3339(),
            entity_id
        );
        debug!(entity_id, window_minutes, "fetching sensor history");

        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
        match response.status() {
            StatusCode::OK => {
                // One inner array per entity; we filtered to a single one.
                let history: Vec<Vec<RawHistoryState>> = response.json().await?;
                let records = history.into_iter().next().unwrap_or_default();
                let series = self.parse_history(entity_id, records);
                debug!(
                    entity_id,
                    points = series.len(),
                    skipped = series.skipped,
                    "parsed sensor history"
                );
                Ok(series)
            }
            StatusCode::NOT_FOUND => Err(HaError::EntityNotFound(entity_id.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(HaError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn current_value(&self, entity_id: &str) -> Result<f64, HaError> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!(entity_id, "fetching current state");

        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
        match response.status() {
            StatusCode::OK => {
                let state: RawEntityState = response.json().await?;
                state
                    .state
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| HaError::NonNumericState {
                        entity_id: entity_id.to_string(),
                        state: state.state,
                    })
            }
            StatusCode::NOT_FOUND => Err(HaError::EntityNotFound(entity_id.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(HaError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHistoryState {
    state: String,
    #[serde(default)]
    last_changed: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntityState {
    state: String,
}
