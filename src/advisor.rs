use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::domain::{AdvisorVerdict, PricePoint, Priority, SocForecast, SolarSummary};

/// Advisor API errors
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Response carried no message content")]
    EmptyResponse,
    #[error("Verdict is not valid JSON: {0}")]
    MalformedVerdict(#[from] serde_json::Error),
}

/// A remote best-effort charging oracle. Callers must treat any failure
/// as "no advice" and keep their own verdict.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChargingAdvisor: Send + Sync {
    async fn advise(
        &self,
        forecast: &SocForecast,
        prices: &[PricePoint],
        solar: &Option<SolarSummary>,
    ) -> Result<AdvisorVerdict, AdvisorError>;
}

const SYSTEM_PROMPT: &str = "You are an expert energy management advisor for home battery systems.\n\
Your task is to analyze battery state of charge forecasts, electricity prices, and solar production\n\
forecasts to recommend optimal charging times from the grid.\n\
\n\
Consider:\n\
1. Battery discharge rate and forecast SOC levels\n\
2. Hourly electricity prices\n\
3. Expected solar production\n\
4. Balance between cost savings and ensuring adequate battery charge\n\
\n\
Provide practical, cost-effective recommendations.";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Charging advisor backed by an OpenAI-compatible chat completion API.
#[derive(Clone)]
pub struct OpenAiAdvisor {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiAdvisor {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AdvisorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("battery-charge-planner/0.2"),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    fn user_prompt(
        forecast: &SocForecast,
        prices: &[PricePoint],
        solar: &Option<SolarSummary>,
    ) -> String {
        let eta_line = match forecast.eta {
            Some(eta) => format!("- ETA to threshold: {}\n", eta.format("%Y-%m-%d %H:%M")),
            None => String::new(),
        };

        format!(
            "Analyze the following data and recommend charging strategy:\n\
             \n\
             Battery Status:\n\
             - Current SOC: {:.1}%\n\
             - Threshold: {}%\n\
             - Declining: {}\n\
             - Rate of change: {:.2}% per hour\n\
             {}\
             \n\
             Electricity Prices (PLN/kWh):\n\
             {}\n\
             \n\
             Solar Production Forecast (kWh):\n\
             {}\n\
             \n\
             Based on this data:\n\
             1. Should the battery be charged from the grid?\n\
             2. What are the optimal hours to charge (provide specific hours 0-23)?\n\
             3. Explain your reasoning considering cost, SOC forecast, and solar production.\n\
             4. What's the priority level (high/medium/low)?\n\
             \n\
             Respond in JSON format:\n\
             {{\n\
                 \"should_charge\": true/false,\n\
                 \"recommended_hours\": [list of hours],\n\
                 \"reasoning\": \"explanation\",\n\
                 \"priority\": \"high/medium/low\"\n\
             }}",
            forecast.current_soc,
            forecast.threshold,
            forecast.is_declining,
            forecast.trend.slope_per_hour(),
            eta_line,
            format_prices(prices),
            format_solar(solar),
        )
    }
}

fn format_prices(prices: &[PricePoint]) -> String {
    if prices.is_empty() {
        return "No price data available".to_string();
    }
    prices
        .iter()
        .take(24)
        .map(|p| format!("  {:02}:00 - {:.4} PLN/kWh", p.hour, p.price))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_solar(solar: &Option<SolarSummary>) -> String {
    let Some(summary) = solar else {
        return "No solar forecast available".to_string();
    };
    if summary.sensors.is_empty() {
        return "No solar forecast available".to_string();
    }
    summary
        .sensors
        .iter()
        .map(|s| format!("  {}: {:.2} kWh", s.entity_id, s.forecast_kwh))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fill in any field the model left out instead of rejecting the verdict.
fn repair_verdict(content: &str, prices: &[PricePoint]) -> Result<AdvisorVerdict, AdvisorError> {
    let raw: Value = serde_json::from_str(content)?;

    let should_charge = raw
        .get("should_charge")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut recommended_hours: Vec<u32> = raw
        .get("recommended_hours")
        .and_then(Value::as_array)
        .map(|hours| {
            hours
                .iter()
                .filter_map(Value::as_u64)
                .filter(|h| *h < 24)
                .map(|h| h as u32)
                .collect()
        })
        .unwrap_or_default();
    recommended_hours.sort_unstable();
    recommended_hours.dedup();

    let reasoning = raw
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("No specific reasoning provided")
        .to_string();
    let priority = raw
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(Priority::Medium);

    let estimated_savings = if should_charge && !recommended_hours.is_empty() {
        estimate_savings(&recommended_hours, prices)
    } else {
        None
    };

    Ok(AdvisorVerdict {
        should_charge,
        recommended_hours,
        reasoning,
        priority,
        estimated_savings,
    })
}

/// Average day price minus average price over the recommended hours,
/// floored at zero, in PLN/kWh.
fn estimate_savings(hours: &[u32], prices: &[PricePoint]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let recommended: Vec<f64> = prices
        .iter()
        .filter(|p| hours.contains(&p.hour))
        .map(|p| p.price)
        .collect();
    if recommended.is_empty() {
        return None;
    }

    let avg_recommended = recommended.iter().sum::<f64>() / recommended.len() as f64;
    let avg_overall = prices.iter().map(|p| p.price).sum::<f64>() / prices.len() as f64;
    Some((avg_overall - avg_recommended).max(0.0))
}

#[async_trait]
impl ChargingAdvisor for OpenAiAdvisor {
    async fn advise(
        &self,
        forecast: &SocForecast,
        prices: &[PricePoint],
        solar: &Option<SolarSummary>,
    ) -> Result<AdvisorVerdict, AdvisorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::user_prompt(forecast, prices, solar)}
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.3,
            "max_tokens": 1000
        });
        debug!(model = %self.model, "requesting advisor verdict");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AdvisorError::EmptyResponse)?;

        let verdict = repair_verdict(&content, prices)?;
        debug!(
            should_charge = verdict.should_charge,
            hours = ?verdict.recommended_hours,
            "advisor verdict"
        );
        Ok(verdict)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}
