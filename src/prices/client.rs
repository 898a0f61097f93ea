use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use crate::domain::PricePoint;

use super::parse::parse_day_prices;
use super::{PriceError, PriceSource};

/// Client for the pstryk.pl day-ahead electricity price API.
#[derive(Clone)]
pub struct PstrykPriceClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl PstrykPriceClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PriceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("battery-charge-planner/0.2"),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl PriceSource for PstrykPriceClient {
    async fn day_prices(&self, date: NaiveDate) -> Result<Vec<PricePoint>, PriceError> {
        let url = format!("{}/prices/{}", self.base_url, date.format("%Y-%m-%d"));
        debug!(%date, "fetching day-ahead prices");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", key);
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(PriceError::RateLimited),
            status if status.is_success() => {
                let payload: serde_json::Value = response.json().await?;
                let points = parse_day_prices(&payload, date)?;
                debug!(%date, points = points.len(), "fetched hourly prices");
                Ok(points)
            }
            status => Err(PriceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    #[tokio::test]
    async fn test_day_prices_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prices/2024-01-10"))
            .and(header("Authorization", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "00:00": 0.85, "01:00": 0.70, "02:00": 0.50
            })))
            .mount(&server)
            .await;

        let client = PstrykPriceClient::new(
            server.uri(),
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let points = client.day_prices(day()).await.unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[2].hour, 2);
        assert_eq!(points[2].price, 0.50);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_dedicated_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prices/2024-01-10"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = PstrykPriceClient::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = client.day_prices(day()).await.unwrap_err();
        assert!(matches!(err, PriceError::RateLimited));
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prices/2024-01-10"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = PstrykPriceClient::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = client.day_prices(day()).await.unwrap_err();
        match err {
            PriceError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prices/2024-01-10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let client = PstrykPriceClient::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = client.day_prices(day()).await.unwrap_err();
        assert!(matches!(err, PriceError::UnrecognizedPayload));
    }
}
