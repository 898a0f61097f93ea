use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Add;
use strum_macros::{Display, EnumString};

// ============================================================================
// Telemetry Samples
// ============================================================================

/// One raw sensor sample: a timestamp and a numeric reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl HistoryPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Parsed sensor history in ascending timestamp order, plus the number of
/// raw records dropped during parsing (non-numeric or malformed states).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorSeries {
    pub points: Vec<HistoryPoint>,
    pub skipped: usize,
}

impl SensorSeries {
    pub fn new(mut points: Vec<HistoryPoint>, skipped: usize) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self { points, skipped }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// How a power sensor reports: instantaneous watts, or a lifetime
/// energy counter in kWh that only ever grows (except on meter resets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorKind {
    Instant,
    Cumulative,
}

// ============================================================================
// Trend & Forecast
// ============================================================================

/// Least-squares line fitted over a sensor history.
///
/// The x axis is seconds elapsed since `reference` (the first sample), so
/// `slope` is in value units per second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub correlation: f64,
    pub std_err: f64,
    pub reference: DateTime<Utc>,
}

impl TrendLine {
    /// Fitted value at an arbitrary instant.
    pub fn value_at(&self, t: DateTime<Utc>) -> f64 {
        let x = (t - self.reference).num_milliseconds() as f64 / 1000.0;
        self.intercept + self.slope * x
    }

    /// Slope expressed per hour instead of per second.
    pub fn slope_per_hour(&self) -> f64 {
        self.slope * 3600.0
    }
}

/// Threshold-crossing forecast for a state-of-charge sensor.
///
/// `observed_at` is the timestamp of the newest sample and acts as "now"
/// for every relative figure. `eta` is present only when the series is
/// declining or already at/below the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocForecast {
    pub current_soc: f64,
    pub threshold: f64,
    pub trend: TrendLine,
    pub is_declining: bool,
    pub eta: Option<DateTime<Utc>>,
    pub time_to_threshold_hours: Option<f64>,
    pub observed_at: DateTime<Utc>,
    pub sample_count: usize,
}

impl SocForecast {
    /// True when the battery already sits at or below the threshold.
    pub fn at_or_below_threshold(&self) -> bool {
        self.current_soc <= self.threshold
    }
}

// ============================================================================
// Prices
// ============================================================================

/// Price for one delivery hour of a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub hour: u32,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// A contiguous block of delivery hours with its price aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub hour_count: usize,
    pub average_price: f64,
    pub total_price: f64,
    pub timestamps: Vec<DateTime<Utc>>,
}

/// One maximal run of consecutive cheap hours. Shares the window shape;
/// a schedule is an ordered list of disjoint periods.
pub type ChargingPeriod = PriceWindow;

// ============================================================================
// Power Statistics
// ============================================================================

/// Summary statistics over a resampled power series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerForecast {
    pub average_power_w: f64,
    pub peak_power_w: f64,
    pub hourly_average_kwh: f64,
    pub daily_forecast_kwh: f64,
    pub next_hour_forecast_kwh: f64,
    pub sample_count: usize,
}

impl Add for PowerForecast {
    type Output = Self;

    // Sensors meter disjoint circuits, so totals add; the summed peak is
    // an upper bound on the true simultaneous peak.
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            average_power_w: self.average_power_w + rhs.average_power_w,
            peak_power_w: self.peak_power_w + rhs.peak_power_w,
            hourly_average_kwh: self.hourly_average_kwh + rhs.hourly_average_kwh,
            daily_forecast_kwh: self.daily_forecast_kwh + rhs.daily_forecast_kwh,
            next_hour_forecast_kwh: self.next_hour_forecast_kwh + rhs.next_hour_forecast_kwh,
            sample_count: self.sample_count + rhs.sample_count,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
