use chrono::Duration;

use crate::domain::{HistoryPoint, PowerForecast, SensorKind};

const GRID_STEP_MINUTES: i64 = 15;
const NEXT_HOUR_LOOKBACK_HOURS: i64 = 3;

/// Turn a raw power-sensor history into an instantaneous power series in
/// watts. Instant sensors pass through unchanged; cumulative energy
/// counters are differentiated onto a 15-minute grid.
pub fn resample(points: &[HistoryPoint], kind: SensorKind) -> Vec<HistoryPoint> {
    match kind {
        SensorKind::Instant => points.to_vec(),
        SensorKind::Cumulative => resample_cumulative(points),
    }
}

/// For each grid instant between the first and last reading, take the
/// nearest preceding and following raw samples and convert the energy
/// delta (kWh) into average watts, attributed to the midpoint of that raw
/// interval. Decreasing pairs are meter resets and are skipped silently.
fn resample_cumulative(raw: &[HistoryPoint]) -> Vec<HistoryPoint> {
    if raw.len() < 2 {
        return Vec::new();
    }
    let mut points = raw.to_vec();
    points.sort_by_key(|p| p.timestamp);

    let last_ts = points[points.len() - 1].timestamp;
    let mut out: Vec<HistoryPoint> = Vec::new();
    let mut t = points[0].timestamp;
    while t <= last_ts {
        let idx = points.partition_point(|p| p.timestamp <= t);
        if idx > 0 {
            if let Some(next) = points.get(idx) {
                let prev = points[idx - 1];
                let delta_kwh = next.value - prev.value;
                let delta_hours =
                    (next.timestamp - prev.timestamp).num_seconds() as f64 / 3600.0;
                if delta_kwh >= 0.0 && delta_hours > 0.0 {
                    let midpoint = prev.timestamp + (next.timestamp - prev.timestamp) / 2;
                    // Several grid instants can fall between the same raw
                    // pair; emit that interval once.
                    if out.last().map_or(true, |p| p.timestamp != midpoint) {
                        out.push(HistoryPoint::new(midpoint, delta_kwh / delta_hours * 1000.0));
                    }
                }
            }
        }
        t += Duration::minutes(GRID_STEP_MINUTES);
    }
    out
}

/// Summary statistics over a power series in watts. The next-hour figure
/// averages the trailing three hours, falling back to the overall mean
/// when that window holds no samples. An empty series summarizes to all
/// zeros rather than an error.
pub fn summarize(points: &[HistoryPoint]) -> PowerForecast {
    if points.is_empty() {
        return PowerForecast::default();
    }

    let n = points.len() as f64;
    let average_power_w = points.iter().map(|p| p.value).sum::<f64>() / n;
    let peak_power_w = points
        .iter()
        .map(|p| p.value)
        .max_by(f64::total_cmp)
        .unwrap_or(0.0);
    let hourly_average_kwh = average_power_w / 1000.0;

    let Some(last_ts) = points.iter().map(|p| p.timestamp).max() else {
        return PowerForecast::default();
    };
    let cutoff = last_ts - Duration::hours(NEXT_HOUR_LOOKBACK_HOURS);
    let recent: Vec<f64> = points
        .iter()
        .filter(|p| p.timestamp >= cutoff)
        .map(|p| p.value)
        .collect();
    let next_hour_basis = if recent.is_empty() {
        average_power_w
    } else {
        recent.iter().sum::<f64>() / recent.len() as f64
    };

    PowerForecast {
        average_power_w,
        peak_power_w,
        hourly_average_kwh,
        daily_forecast_kwh: hourly_average_kwh * 24.0,
        next_hour_forecast_kwh: next_hour_basis / 1000.0,
        sample_count: points.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
    }

    fn at(minutes: i64, value: f64) -> HistoryPoint {
        HistoryPoint::new(start() + Duration::minutes(minutes), value)
    }

    #[test]
    fn test_instant_series_passes_through() {
        let raw = vec![at(0, 450.0), at(20, 900.0)];
        assert_eq!(resample(&raw, SensorKind::Instant), raw);
    }

    #[test]
    fn test_cumulative_counter_becomes_power() {
        // 0.5 kWh in the first half hour, 1.0 kWh in the second
        let raw = vec![at(0, 10.0), at(30, 10.5), at(60, 11.5)];
        let power = resample(&raw, SensorKind::Cumulative);

        assert_eq!(power.len(), 2);
        assert_eq!(power[0].timestamp, start() + Duration::minutes(15));
        assert!((power[0].value - 1000.0).abs() < 1e-9);
        assert_eq!(power[1].timestamp, start() + Duration::minutes(45));
        assert!((power[1].value - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_counter_reset_is_skipped() {
        let raw = vec![at(0, 10.0), at(30, 11.0), at(60, 0.5), at(90, 1.5)];
        let power = resample(&raw, SensorKind::Cumulative);

        // The decreasing pair (11.0 -> 0.5) produces nothing
        assert_eq!(power.len(), 2);
        assert!((power[0].value - 2000.0).abs() < 1e-9);
        assert!((power[1].value - 2000.0).abs() < 1e-9);
        assert_eq!(power[1].timestamp, start() + Duration::minutes(75));
    }

    #[test]
    fn test_flat_counter_yields_zero_power() {
        let raw = vec![at(0, 10.0), at(30, 10.0)];
        let power = resample(&raw, SensorKind::Cumulative);

        assert_eq!(power.len(), 1);
        assert_eq!(power[0].value, 0.0);
    }

    #[test]
    fn test_resample_needs_two_readings() {
        assert!(resample(&[], SensorKind::Cumulative).is_empty());
        assert!(resample(&[at(0, 5.0)], SensorKind::Cumulative).is_empty());
    }

    #[test]
    fn test_summarize_empty_is_all_zero() {
        let forecast = summarize(&[]);
        assert_eq!(forecast, PowerForecast::default());
        assert_eq!(forecast.sample_count, 0);
    }

    #[test]
    fn test_summarize_statistics() {
        let series = vec![at(0, 1000.0), at(60, 2000.0), at(120, 3000.0)];
        let forecast = summarize(&series);

        assert!((forecast.average_power_w - 2000.0).abs() < 1e-9);
        assert_eq!(forecast.peak_power_w, 3000.0);
        assert!((forecast.hourly_average_kwh - 2.0).abs() < 1e-9);
        assert!((forecast.daily_forecast_kwh - 48.0).abs() < 1e-9);
        assert_eq!(forecast.sample_count, 3);
        // Whole series sits inside the trailing window
        assert!((forecast.next_hour_forecast_kwh - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_next_hour_uses_trailing_window() {
        let series = vec![
            at(0, 1000.0),
            at(60, 1000.0),
            at(120, 1000.0),
            at(240, 2000.0),
            at(300, 2000.0),
            at(360, 2000.0),
        ];
        let forecast = summarize(&series);

        assert!((forecast.average_power_w - 1500.0).abs() < 1e-9);
        // Trailing 3 h covers only the 2000 W samples
        assert!((forecast.next_hour_forecast_kwh - 2.0).abs() < 1e-9);
    }
}
