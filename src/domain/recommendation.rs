use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use super::types::{ChargingPeriod, PowerForecast, PricePoint, PriceWindow};

// ============================================================================
// Verdict Building Blocks
// ============================================================================

/// Urgency of a charging recommendation. Ordering matters: a decision may
/// raise the priority but never lower it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

/// Which engine produced the active verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecommendationSource {
    RuleBased,
    Advisor,
}

/// A charging verdict: whether to charge, when, how urgently and why.
///
/// `recommended_hours` is strictly increasing and duplicate-free;
/// `reasoning` keeps the clauses in the order the rules fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub should_charge: bool,
    pub recommended_hours: Vec<u32>,
    pub periods: Vec<ChargingPeriod>,
    pub priority: Priority,
    pub reasoning: Vec<String>,
    pub source: RecommendationSource,
}

/// Verdict returned by an external advisor, repaired to well-formed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorVerdict {
    pub should_charge: bool,
    pub recommended_hours: Vec<u32>,
    pub reasoning: String,
    pub priority: Priority,
    pub estimated_savings: Option<f64>,
}

// ============================================================================
// Plan Context
// ============================================================================

/// Static battery parameters the plan was computed against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatterySpec {
    pub capacity_kwh: f64,
    pub max_charge_kw: f64,
    pub current_soc: f64,
    pub target_soc: f64,
}

impl BatterySpec {
    /// Full hours of grid charging needed to reach the target SOC,
    /// rounded up. Zero when already at or above the target.
    pub fn hours_to_target(&self) -> u32 {
        let deficit_percent = self.target_soc - self.current_soc;
        if deficit_percent <= 0.0 || self.max_charge_kw <= 0.0 {
            return 0;
        }
        let energy_kwh = deficit_percent / 100.0 * self.capacity_kwh;
        (energy_kwh / self.max_charge_kw).ceil() as u32
    }
}

/// Price context the optimizer worked from: the single cheapest block,
/// the multi-period selection, and the raw day prices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub window: Option<PriceWindow>,
    pub periods: Vec<ChargingPeriod>,
    pub prices: Vec<PricePoint>,
}

/// Per-sensor solar forecast reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarSensorReading {
    pub entity_id: String,
    pub forecast_kwh: f64,
}

/// Aggregated solar production forecast across all configured sensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarSummary {
    pub sensors: Vec<SolarSensorReading>,
    pub total_kwh: f64,
}

// ============================================================================
// Assembled Plan
// ============================================================================

/// The fully assembled charging plan: the active verdict plus every piece
/// of context it was derived from. Always well-formed, even on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingPlan {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub should_charge: bool,
    pub recommended_hours: Vec<u32>,
    pub start_hour: Option<u32>,
    pub end_hour: Option<u32>,
    pub hours_needed: u32,
    pub priority: Priority,
    pub reasoning: Vec<String>,
    pub source: RecommendationSource,
    pub periods: Vec<ChargingPeriod>,
    pub price_analysis: Option<PriceAnalysis>,
    pub solar: Option<SolarSummary>,
    pub power: Option<PowerForecast>,
    pub advisor: Option<AdvisorVerdict>,
    pub battery: BatterySpec,
}

impl ChargingPlan {
    /// Build a plan carrying a verdict; contextual fields start empty and
    /// are filled in by the planner.
    pub fn from_recommendation(
        recommendation: Recommendation,
        battery: BatterySpec,
        hours_needed: u32,
    ) -> Self {
        let start_hour = recommendation.recommended_hours.first().copied();
        let end_hour = recommendation.recommended_hours.last().copied();
        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            should_charge: recommendation.should_charge,
            recommended_hours: recommendation.recommended_hours,
            start_hour,
            end_hour,
            hours_needed,
            priority: recommendation.priority,
            reasoning: recommendation.reasoning,
            source: recommendation.source,
            periods: recommendation.periods,
            price_analysis: None,
            solar: None,
            power: None,
            advisor: None,
            battery,
        }
    }

    /// Fallback plan when a required computation failed: no charging,
    /// low priority, the failure spelled out in the reasoning.
    pub fn degraded(battery: BatterySpec, hours_needed: u32, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            should_charge: false,
            recommended_hours: Vec::new(),
            start_hour: None,
            end_hour: None,
            hours_needed,
            priority: Priority::Low,
            reasoning: vec![format!("Error: {}", message.into())],
            source: RecommendationSource::RuleBased,
            periods: Vec::new(),
            price_analysis: None,
            solar: None,
            power: None,
            advisor: None,
            battery,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn battery(current_soc: f64) -> BatterySpec {
        BatterySpec {
            capacity_kwh: 10.0,
            max_charge_kw: 5.0,
            current_soc,
            target_soc: 100.0,
        }
    }

    #[rstest]
    #[case(50.0, 1)] // 5 kWh deficit on a 5 kW charger
    #[case(20.0, 2)] // 8 kWh deficit rounds up to 2 h
    #[case(100.0, 0)]
    #[case(95.0, 1)] // 0.5 kWh still needs a full hour
    fn test_hours_to_target(#[case] soc: f64, #[case] expected: u32) {
        assert_eq!(battery(soc).hours_to_target(), expected);
    }

    #[test]
    fn test_hours_to_target_above_target() {
        let full = BatterySpec {
            target_soc: 80.0,
            ..battery(90.0)
        };
        assert_eq!(full.hours_to_target(), 0);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert_eq!(Priority::Medium.max(Priority::High), Priority::High);
        assert_eq!(Priority::default(), Priority::Low);
        assert_eq!(Priority::High.to_string(), "high");
    }

    #[test]
    fn test_degraded_plan_is_well_formed() {
        let plan = ChargingPlan::degraded(battery(50.0), 1, "prices unavailable");

        assert!(!plan.should_charge);
        assert_eq!(plan.priority, Priority::Low);
        assert_eq!(plan.reasoning, vec!["Error: prices unavailable"]);
        assert!(plan.recommended_hours.is_empty());
        assert!(plan.periods.is_empty());
        assert_eq!(plan.hours_needed, 1);
    }

    #[test]
    fn test_plan_derives_start_and_end_hours() {
        let rec = Recommendation {
            should_charge: true,
            recommended_hours: vec![2, 3, 4, 21],
            periods: Vec::new(),
            priority: Priority::Medium,
            reasoning: vec!["cheap hours".into()],
            source: RecommendationSource::RuleBased,
        };

        let plan = ChargingPlan::from_recommendation(rec, battery(40.0), 4);
        assert_eq!(plan.start_hour, Some(2));
        assert_eq!(plan.end_hour, Some(21));
        assert!(plan.should_charge);
    }
}
