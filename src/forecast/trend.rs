use chrono::Duration;
use thiserror::Error;

use crate::domain::{HistoryPoint, SocForecast, TrendLine};

/// Trend fitting errors
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("insufficient history: {got} sample(s), need at least 2")]
    InsufficientData { got: usize },
    #[error("history timestamps are all identical")]
    DegenerateTimeAxis,
}

impl TrendLine {
    /// Fit an ordinary least-squares line over the samples.
    ///
    /// The x axis is seconds elapsed since the first sample, so the input
    /// must already be in ascending timestamp order. Every sample counts;
    /// there is no outlier rejection or weighting.
    pub fn fit(points: &[HistoryPoint]) -> Result<Self, TrendError> {
        let n = points.len();
        if n < 2 {
            return Err(TrendError::InsufficientData { got: n });
        }

        let reference = points[0].timestamp;
        let xs: Vec<f64> = points
            .iter()
            .map(|p| (p.timestamp - reference).num_milliseconds() as f64 / 1000.0)
            .collect();

        let x_mean = xs.iter().sum::<f64>() / n as f64;
        let y_mean = points.iter().map(|p| p.value).sum::<f64>() / n as f64;

        let mut ss_xx = 0.0;
        let mut ss_xy = 0.0;
        let mut ss_yy = 0.0;
        for (x, p) in xs.iter().zip(points) {
            let dx = x - x_mean;
            let dy = p.value - y_mean;
            ss_xx += dx * dx;
            ss_xy += dx * dy;
            ss_yy += dy * dy;
        }

        if ss_xx == 0.0 {
            return Err(TrendError::DegenerateTimeAxis);
        }

        let slope = ss_xy / ss_xx;
        let intercept = y_mean - slope * x_mean;
        let correlation = if ss_yy == 0.0 {
            0.0
        } else {
            ss_xy / (ss_xx * ss_yy).sqrt()
        };
        // Residual variance has n-2 degrees of freedom; a two-point fit is
        // exact, so its standard error is zero.
        let std_err = if n > 2 {
            let residual_ss = (ss_yy - slope * ss_xy).max(0.0);
            (residual_ss / (n - 2) as f64 / ss_xx).sqrt()
        } else {
            0.0
        };

        Ok(Self {
            slope,
            intercept,
            correlation,
            std_err,
            reference,
        })
    }
}

/// Forecasts when a state-of-charge series will cross a threshold.
#[derive(Debug, Clone, Copy)]
pub struct SocForecaster {
    threshold_percent: f64,
}

impl SocForecaster {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    /// Fit the history and project the threshold crossing.
    ///
    /// The newest sample acts as "now". A battery already at or below the
    /// threshold reports an immediate crossing; a flat or rising trend
    /// reports none. Otherwise the fitted line is solved for the threshold
    /// value, and the offset from "now" may be negative when the line
    /// crossed inside the sampled window.
    pub fn forecast(&self, history: &[HistoryPoint]) -> Result<SocForecast, TrendError> {
        let mut points = history.to_vec();
        points.sort_by_key(|p| p.timestamp);

        let trend = TrendLine::fit(&points)?;
        let last = points[points.len() - 1];
        let now = last.timestamp;
        let current_soc = last.value;
        let is_declining = trend.slope < 0.0;

        let (eta, time_to_threshold_hours) = if current_soc <= self.threshold_percent {
            (Some(now), Some(0.0))
        } else if !is_declining {
            (None, None)
        } else {
            let x_cross = (self.threshold_percent - trend.intercept) / trend.slope;
            let x_now = (now - trend.reference).num_milliseconds() as f64 / 1000.0;
            let offset_secs = x_cross - x_now;
            match now.checked_add_signed(Duration::milliseconds((offset_secs * 1000.0) as i64)) {
                Some(eta) => (Some(eta), Some(offset_secs / 3600.0)),
                // A near-flat decline can project centuries out; report no ETA
                // instead of overflowing the calendar.
                None => (None, None),
            }
        };

        Ok(SocForecast {
            current_soc,
            threshold: self.threshold_percent,
            trend,
            is_declining,
            eta,
            time_to_threshold_hours,
            observed_at: now,
            sample_count: points.len(),
        })
    }
}
