use chrono::{DateTime, Utc};

use crate::domain::{ChargingPeriod, Priority, Recommendation, RecommendationSource, SocForecast};

/// Rule-based charging decision engine.
///
/// Rules fire in a fixed order and may raise the priority but never lower
/// it: critical SOC first, then forecast urgency, then the solar check,
/// then price context. No remote calls happen here.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    /// Charge unconditionally at or below this multiple of the threshold
    pub critical_soc_multiplier: f64,
    /// Solar days expecting less than this many kWh count as poor
    pub low_solar_threshold_kwh: f64,
    /// On a poor solar day, consider charging below this multiple of the threshold
    pub low_solar_soc_multiplier: f64,
    /// Crossing the threshold sooner than this many hours is urgent
    pub urgent_horizon_hours: f64,
    /// Crossing sooner than this many hours is worth scheduling
    pub medium_horizon_hours: f64,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self {
            critical_soc_multiplier: 2.0,
            low_solar_threshold_kwh: 5.0,
            low_solar_soc_multiplier: 4.0,
            urgent_horizon_hours: 12.0,
            medium_horizon_hours: 24.0,
        }
    }
}

impl DecisionEngine {
    pub fn decide(
        &self,
        forecast: &SocForecast,
        periods: &[ChargingPeriod],
        total_solar_kwh: Option<f64>,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let mut should_charge = false;
        let mut priority = Priority::Low;
        let mut reasoning: Vec<String> = Vec::new();

        if forecast.current_soc <= forecast.threshold * self.critical_soc_multiplier {
            should_charge = true;
            priority = Priority::High;
            reasoning.push(format!(
                "Battery is critically low at {:.1}%",
                forecast.current_soc
            ));
        } else if forecast.is_declining {
            if let Some(eta) = forecast.eta {
                let hours_to_threshold = (eta - now).num_milliseconds() as f64 / 3_600_000.0;
                if hours_to_threshold < self.urgent_horizon_hours {
                    should_charge = true;
                    priority = Priority::High;
                    reasoning.push(format!(
                        "Battery will reach threshold in {:.1} hours",
                        hours_to_threshold
                    ));
                } else if hours_to_threshold < self.medium_horizon_hours {
                    should_charge = true;
                    priority = Priority::Medium;
                    reasoning.push(format!(
                        "Battery forecast shows decline reaching threshold in {:.1} hours",
                        hours_to_threshold
                    ));
                }
            }
        }

        if let Some(total_solar) = total_solar_kwh {
            if total_solar < self.low_solar_threshold_kwh {
                reasoning.push(format!("Low solar forecast: {:.1} kWh expected", total_solar));
                // Escalates an idle verdict to medium, never touches an
                // existing high or medium decision.
                if !should_charge
                    && forecast.current_soc < forecast.threshold * self.low_solar_soc_multiplier
                {
                    should_charge = true;
                    priority = Priority::Medium;
                }
            } else {
                reasoning.push(format!(
                    "Good solar forecast: {:.1} kWh expected",
                    total_solar
                ));
            }
        }

        if let [period] = periods {
            reasoning.push(format!(
                "Cheapest charging window: {:02}:00-{:02}:00 ({}h at avg {:.4} PLN/kWh)",
                period.start_hour, period.end_hour, period.hour_count, period.average_price
            ));
        } else if !periods.is_empty() {
            let total_hours: usize = periods.iter().map(|p| p.hour_count).sum();
            let avg_price =
                periods.iter().map(|p| p.total_price).sum::<f64>() / total_hours as f64;
            reasoning.push(format!(
                "Cheapest charging: {} period(s), {}h total at avg {:.4} PLN/kWh",
                periods.len(),
                total_hours,
                avg_price
            ));
        }

        let mut recommended_hours: Vec<u32> = Vec::new();
        if should_charge && !periods.is_empty() {
            for period in periods {
                recommended_hours.extend(period.start_hour..=period.end_hour);
            }
            recommended_hours.sort_unstable();
            recommended_hours.dedup();
        }

        if reasoning.is_empty() {
            reasoning.push("No charging needed".to_string());
        }

        Recommendation {
            should_charge,
            recommended_hours,
            periods: periods.to_vec(),
            priority,
            reasoning,
            source: RecommendationSource::RuleBased,
        }
    }
}
