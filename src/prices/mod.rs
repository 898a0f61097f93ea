pub mod cache;
pub mod client;
pub mod parse;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::PricePoint;

pub use cache::{CachedPriceSource, FreshnessPolicy, MemoryPriceCache, PriceCache};
pub use client::PstrykPriceClient;
pub use parse::parse_day_prices;

/// Pricing API errors
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Rate limited by pricing API")]
    RateLimited,
    #[error("Unrecognized price payload shape")]
    UnrecognizedPayload,
}

/// A source of hourly electricity prices for a calendar day.
///
/// Returns one point per delivery hour, ascending. Missing hours stay
/// missing; zero-filling a gap would corrupt window averages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn day_prices(&self, date: NaiveDate) -> Result<Vec<PricePoint>, PriceError>;
}
