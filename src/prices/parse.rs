use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::domain::PricePoint;

use super::PriceError;

type ShapeParser = fn(&Value, NaiveDate) -> Option<Vec<PricePoint>>;

/// Shape detectors in priority order; the first one that recognizes the
/// payload wins. Each detector either yields the canonical point list or
/// declines by returning `None`.
const SHAPES: [(&str, ShapeParser); 3] = [
    ("hour_map", parse_hour_map),
    ("entry_list", parse_entry_list),
    ("nested", parse_nested),
];

/// Parse a price payload of any supported shape into hourly points.
pub fn parse_day_prices(payload: &Value, date: NaiveDate) -> Result<Vec<PricePoint>, PriceError> {
    for (name, parse) in SHAPES {
        if let Some(mut points) = parse(payload, date) {
            points.sort_by_key(|p| p.hour);
            debug!(shape = name, points = points.len(), "parsed price payload");
            return Ok(points);
        }
    }
    Err(PriceError::UnrecognizedPayload)
}

/// `{"00:00": 0.85, "01:00": 0.70, ...}` keyed by delivery hour.
/// Absent hours stay absent.
fn parse_hour_map(payload: &Value, date: NaiveDate) -> Option<Vec<PricePoint>> {
    let map = payload.as_object()?;
    let mut points = Vec::new();
    for hour in 0..24u32 {
        let key = format!("{hour:02}:00");
        if let Some(price) = map.get(&key).and_then(price_value) {
            points.push(PricePoint {
                hour,
                price,
                timestamp: hour_timestamp(date, hour),
            });
        }
    }
    if points.is_empty() {
        return None;
    }
    Some(points)
}

/// `[{"hour": 0, "price": 0.85}, ...]`. Every entry must parse or the
/// whole shape declines.
fn parse_entry_list(payload: &Value, date: NaiveDate) -> Option<Vec<PricePoint>> {
    let entries = payload.as_array()?;
    if entries.is_empty() {
        return None;
    }
    let mut points = Vec::with_capacity(entries.len());
    for entry in entries {
        let hour = entry_hour(entry)?;
        let price = price_value(entry.get("price")?)?;
        points.push(PricePoint {
            hour,
            price,
            timestamp: hour_timestamp(date, hour),
        });
    }
    Some(points)
}

/// Payload wrapped under a `prices` or `data` envelope, possibly more
/// than one level deep.
fn parse_nested(payload: &Value, date: NaiveDate) -> Option<Vec<PricePoint>> {
    let obj = payload.as_object()?;
    let inner = obj.get("prices").or_else(|| obj.get("data"))?;
    SHAPES.iter().find_map(|(_, parse)| parse(inner, date))
}

fn entry_hour(entry: &Value) -> Option<u32> {
    let raw = entry.get("hour")?;
    if let Some(n) = raw.as_u64() {
        return u32::try_from(n).ok();
    }
    raw.as_str()?.trim().parse().ok()
}

fn price_value(raw: &Value) -> Option<f64> {
    if let Some(n) = raw.as_f64() {
        return Some(n);
    }
    raw.as_str()?.trim().parse().ok()
}

fn hour_timestamp(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    // Addition instead of and_hms so extended hours (>= 24) spill into
    // the next day.
    date.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::hours(i64::from(hour))
}
