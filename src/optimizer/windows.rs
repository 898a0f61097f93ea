use itertools::Itertools;
use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::domain::{ChargingPeriod, PricePoint, PriceWindow};

/// Price selection errors
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("insufficient price data: need {needed} hour(s), have {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("requested a zero-hour selection")]
    NoHoursRequested,
}

/// Find the cheapest contiguous block of `hours_needed` price entries.
///
/// The input is assumed sorted by hour and hour-contiguous. Every window
/// is scored by its average price; ties go to the earliest start. Exact,
/// not heuristic: all N-k+1 windows are enumerated.
pub fn cheapest_window(
    prices: &[PricePoint],
    hours_needed: usize,
) -> Result<PriceWindow, SelectionError> {
    if hours_needed == 0 {
        return Err(SelectionError::NoHoursRequested);
    }
    if prices.len() < hours_needed {
        return Err(SelectionError::InsufficientData {
            needed: hours_needed,
            available: prices.len(),
        });
    }

    let mut best: Option<(f64, &[PricePoint])> = None;
    for window in prices.windows(hours_needed) {
        let total: f64 = window.iter().map(|p| p.price).sum();
        let average = total / hours_needed as f64;
        // Strict comparison keeps the earliest window on ties
        if best.as_ref().map_or(true, |(avg, _)| average < *avg) {
            best = Some((average, window));
        }
    }

    let Some((average_price, window)) = best else {
        return Err(SelectionError::InsufficientData {
            needed: hours_needed,
            available: prices.len(),
        });
    };
    Ok(block_from(window, average_price))
}

/// Pick the `total_hours` globally cheapest hours of the day and group
/// them into maximal consecutive-hour runs, ordered by start hour.
///
/// A zero-hour request is an empty schedule. Equal prices at the
/// selection boundary resolve by sort stability: the lower hour wins.
/// Greedy on hourly price, so the schedule may fragment into several
/// short runs when that is cheaper than one contiguous block.
pub fn cheapest_periods(
    prices: &[PricePoint],
    total_hours: usize,
) -> Result<Vec<ChargingPeriod>, SelectionError> {
    if total_hours == 0 {
        return Ok(Vec::new());
    }
    if prices.len() < total_hours {
        return Err(SelectionError::InsufficientData {
            needed: total_hours,
            available: prices.len(),
        });
    }

    let mut by_price = prices.to_vec();
    by_price.sort_by_key(|p| OrderedFloat(p.price));
    let mut selected = by_price[..total_hours].to_vec();
    selected.sort_by_key(|p| p.hour);

    // Within a consecutive run, hour minus index is constant
    let runs = selected
        .iter()
        .enumerate()
        .chunk_by(|(i, p)| p.hour as i64 - *i as i64);

    let mut periods = Vec::new();
    for (_, run) in &runs {
        let hours: Vec<&PricePoint> = run.map(|(_, p)| p).collect();
        let total: f64 = hours.iter().map(|p| p.price).sum();
        periods.push(PriceWindow {
            start_hour: hours[0].hour,
            end_hour: hours[hours.len() - 1].hour,
            hour_count: hours.len(),
            average_price: total / hours.len() as f64,
            total_price: total,
            timestamps: hours.iter().map(|p| p.timestamp).collect(),
        });
    }
    Ok(periods)
}

fn block_from(window: &[PricePoint], average_price: f64) -> PriceWindow {
    PriceWindow {
        start_hour: window[0].hour,
        end_hour: window[window.len() - 1].hour,
        hour_count: window.len(),
        average_price,
        total_price: window.iter().map(|p| p.price).sum(),
        timestamps: window.iter().map(|p| p.timestamp).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeSet;
    use proptest::prelude::*;

    fn day(prices_by_hour: &[(u32, f64)]) -> Vec<PricePoint> {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        prices_by_hour
            .iter()
            .map(|&(hour, price)| PricePoint {
                hour,
                price,
                timestamp: midnight + Duration::hours(hour as i64),
            })
            .collect()
    }

    /// Cheap night (2-5), moderate morning, expensive day, softer edges.
    fn night_cheap_day() -> Vec<PricePoint> {
        let by_hour: Vec<(u32, f64)> = (0..24)
            .map(|h| {
                let price = match h {
                    2..=5 => 0.50,
                    6..=9 => 0.75,
                    10..=20 => 0.85,
                    _ => 0.70,
                };
                (h, price)
            })
            .collect();
        day(&by_hour)
    }

    #[test]
    fn test_cheapest_window_finds_night_block() {
        let window = cheapest_window(&night_cheap_day(), 4).unwrap();

        assert_eq!(window.start_hour, 2);
        assert_eq!(window.end_hour, 5);
        assert_eq!(window.hour_count, 4);
        assert!((window.average_price - 0.50).abs() < 1e-9);
        assert!((window.total_price - 2.0).abs() < 1e-9);
        assert_eq!(window.timestamps.len(), 4);
    }

    #[test]
    fn test_cheapest_window_tie_prefers_earliest() {
        let prices = day(&[(0, 0.6), (1, 0.4), (2, 0.4), (3, 0.4), (4, 0.4), (5, 0.9)]);
        let window = cheapest_window(&prices, 2).unwrap();
        assert_eq!(window.start_hour, 1);
        assert_eq!(window.end_hour, 2);
    }

    #[test]
    fn test_cheapest_window_insufficient_data() {
        let prices = day(&[(0, 0.5), (1, 0.5)]);
        let err = cheapest_window(&prices, 3).unwrap_err();
        assert!(matches!(
            err,
            SelectionError::InsufficientData {
                needed: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_cheapest_window_zero_hours_rejected() {
        let err = cheapest_window(&night_cheap_day(), 0).unwrap_err();
        assert!(matches!(err, SelectionError::NoHoursRequested));
    }

    #[test]
    fn test_cheapest_periods_night_scenario() {
        // Six cheapest = the four 0.50 night hours plus two 0.70 hours;
        // lower-hour tie-break picks hours 0 and 1, which join the night
        // block into one consecutive run.
        let periods = cheapest_periods(&night_cheap_day(), 6).unwrap();

        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start_hour, 0);
        assert_eq!(periods[0].end_hour, 5);
        assert_eq!(periods[0].hour_count, 6);
        let expected_avg = (2.0 * 0.70 + 4.0 * 0.50) / 6.0;
        assert!((periods[0].average_price - expected_avg).abs() < 1e-9);
    }

    #[test]
    fn test_cheapest_periods_splits_into_runs() {
        // Evening tier is the runner-up here, so the selection fragments
        // into the night block plus a separate evening pair.
        let by_hour: Vec<(u32, f64)> = (0..24)
            .map(|h| {
                let price = match h {
                    2..=5 => 0.50,
                    21..=22 => 0.70,
                    _ => 0.85,
                };
                (h, price)
            })
            .collect();
        let periods = cheapest_periods(&day(&by_hour), 6).unwrap();

        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].start_hour, 2);
        assert_eq!(periods[0].end_hour, 5);
        assert_eq!(periods[0].hour_count, 4);
        assert!((periods[0].average_price - 0.50).abs() < 1e-9);
        assert_eq!(periods[1].start_hour, 21);
        assert_eq!(periods[1].end_hour, 22);
        assert_eq!(periods[1].hour_count, 2);
        assert!((periods[1].average_price - 0.70).abs() < 1e-9);
        assert_eq!(periods.iter().map(|p| p.hour_count).sum::<usize>(), 6);
    }

    #[test]
    fn test_cheapest_periods_tie_prefers_lower_hour() {
        let prices = day(&[(0, 0.7), (1, 0.5), (2, 0.7), (3, 0.7)]);
        let periods = cheapest_periods(&prices, 2).unwrap();

        // Hour 0 beats the equally priced hours 2 and 3
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start_hour, 0);
        assert_eq!(periods[0].end_hour, 1);
    }

    #[test]
    fn test_cheapest_periods_single_run_when_contiguous() {
        let prices = day(&[(0, 0.9), (1, 0.2), (2, 0.2), (3, 0.2), (4, 0.9)]);
        let periods = cheapest_periods(&prices, 3).unwrap();

        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start_hour, 1);
        assert_eq!(periods[0].end_hour, 3);
        assert_eq!(periods[0].hour_count, 3);
    }

    #[test]
    fn test_cheapest_periods_zero_hours_is_empty() {
        assert!(cheapest_periods(&night_cheap_day(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_cheapest_periods_insufficient_data() {
        let prices = day(&[(0, 0.5)]);
        assert!(matches!(
            cheapest_periods(&prices, 2).unwrap_err(),
            SelectionError::InsufficientData { .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_window_average_is_minimal(
            raw in prop::collection::vec(0.01f64..5.0, 2..=36),
            k in 1usize..=8,
        ) {
            prop_assume!(k <= raw.len());
            let by_hour: Vec<(u32, f64)> =
                raw.iter().enumerate().map(|(h, &p)| (h as u32, p)).collect();
            let prices = day(&by_hour);

            let best = cheapest_window(&prices, k).unwrap();
            for window in prices.windows(k) {
                let avg: f64 = window.iter().map(|p| p.price).sum::<f64>() / k as f64;
                prop_assert!(best.average_price <= avg + 1e-9);
            }
            prop_assert_eq!(best.end_hour - best.start_hour + 1, best.hour_count as u32);
        }

        #[test]
        fn prop_periods_cover_exactly_k_cheapest(
            raw in prop::collection::vec(0.01f64..5.0, 2..=36),
            k in 1usize..=8,
        ) {
            prop_assume!(k <= raw.len());
            let by_hour: Vec<(u32, f64)> =
                raw.iter().enumerate().map(|(h, &p)| (h as u32, p)).collect();
            let prices = day(&by_hour);

            let periods = cheapest_periods(&prices, k).unwrap();
            let total: usize = periods.iter().map(|p| p.hour_count).sum();
            prop_assert_eq!(total, k);

            // Selected hours match a stable k-cheapest selection
            let mut by_price = prices.clone();
            by_price.sort_by_key(|p| OrderedFloat(p.price));
            let expected: BTreeSet<u32> = by_price[..k].iter().map(|p| p.hour).collect();
            let selected: BTreeSet<u32> = periods
                .iter()
                .flat_map(|p| p.start_hour..=p.end_hour)
                .collect();
            prop_assert_eq!(selected, expected);

            // Runs are maximal, disjoint and ordered
            for pair in periods.windows(2) {
                prop_assert!(pair[0].end_hour + 1 < pair[1].start_hour);
            }
            for p in &periods {
                prop_assert_eq!(p.end_hour - p.start_hour + 1, p.hour_count as u32);
            }
        }
    }
}
