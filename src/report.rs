use std::fmt::Write;

use crate::domain::{ChargingPlan, SocForecast, SolarSummary};

const BANNER_WIDTH: usize = 60;
const SOLAR_ENTITY_PREFIX: &str = "sensor.energy_production_today_";

fn banner(title: &str) -> String {
    let line = "=".repeat(BANNER_WIDTH);
    format!("{line}\n{title}\n{line}")
}

/// Render the SOC forecast block. Output is plain ASCII so it survives
/// any terminal or log shipper.
pub fn format_forecast(forecast: &SocForecast) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", banner("Battery SOC Forecast"));
    let _ = writeln!(out, "Current SOC: {:.2}%", forecast.current_soc);
    let _ = writeln!(out, "Threshold: {}%", forecast.threshold);
    let _ = writeln!(out, "Trend Analysis:");
    let _ = writeln!(
        out,
        "  Rate of change: {:.4}% per hour",
        forecast.trend.slope_per_hour()
    );
    let _ = writeln!(out, "  Correlation (R): {:.4}", forecast.trend.correlation);
    let _ = writeln!(
        out,
        "  Declining: {}",
        if forecast.is_declining { "Yes" } else { "No" }
    );

    if forecast.at_or_below_threshold() {
        let _ = writeln!(out, "WARNING: SOC is already at or below threshold!");
    } else if let (Some(eta), Some(hours)) = (forecast.eta, forecast.time_to_threshold_hours) {
        let _ = writeln!(out, "Forecast:");
        let _ = writeln!(
            out,
            "  ETA to {}%: {}",
            forecast.threshold,
            eta.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "  Time remaining: {}", format_remaining(hours));
    } else {
        let _ = writeln!(
            out,
            "SOC is stable or increasing - no threshold crossing expected"
        );
    }
    out
}

fn format_remaining(hours: f64) -> String {
    if hours >= 1.0 {
        let whole = hours as i64;
        let minutes = ((hours - whole as f64) * 60.0) as i64;
        format!("{whole} hours {minutes} minutes")
    } else {
        format!("{} minutes", (hours * 60.0) as i64)
    }
}

/// Render the charging recommendation block.
pub fn format_plan(plan: &ChargingPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", banner("Battery Charging Recommendation"));
    let _ = writeln!(
        out,
        "Battery: {}kWh capacity, {}kW max charging power",
        plan.battery.capacity_kwh, plan.battery.max_charge_kw
    );
    let _ = writeln!(out, "Current SOC: {:.1}%", plan.battery.current_soc);
    let _ = writeln!(out, "Charging hours needed: {}h", plan.hours_needed);
    let _ = writeln!(out);

    if plan.should_charge {
        let _ = writeln!(
            out,
            "Charging RECOMMENDED (Priority: {})",
            plan.priority.to_string().to_uppercase()
        );
        if !plan.periods.is_empty() {
            let _ = writeln!(out, "Charging periods:");
            for (i, period) in plan.periods.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  Period {}: {:02}:00-{:02}:00 ({}h at avg {:.4} PLN/kWh)",
                    i + 1,
                    period.start_hour,
                    period.end_hour,
                    period.hour_count,
                    period.average_price
                );
            }
        }
        if !plan.recommended_hours.is_empty() && plan.recommended_hours.len() <= 10 {
            let hours: Vec<String> = plan
                .recommended_hours
                .iter()
                .map(u32::to_string)
                .collect();
            let _ = writeln!(out, "All hours: {}", hours.join(", "));
        }
    } else {
        let _ = writeln!(out, "Charging NOT recommended at this time");
    }

    if !plan.reasoning.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Reasoning:");
        for line in &plan.reasoning {
            let _ = writeln!(out, "  - {line}");
        }
    }

    if let Some(solar) = &plan.solar {
        let _ = writeln!(out);
        let _ = writeln!(out, "Solar Production Forecast:");
        let _ = writeln!(out, "  Total: {:.2} kWh", solar.total_kwh);
        for sensor in &solar.sensors {
            let _ = writeln!(
                out,
                "  {}: {:.2} kWh",
                solar_sensor_name(&sensor.entity_id),
                sensor.forecast_kwh
            );
        }
    }

    if let Some(power) = &plan.power {
        let _ = writeln!(out);
        let _ = writeln!(out, "Household Power (recent history):");
        let _ = writeln!(out, "  Average: {:.0} W", power.average_power_w);
        let _ = writeln!(out, "  Peak: {:.0} W", power.peak_power_w);
        let _ = writeln!(out, "  Daily estimate: {:.2} kWh", power.daily_forecast_kwh);
        let _ = writeln!(out, "  Next hour: {:.2} kWh", power.next_hour_forecast_kwh);
    }

    if let Some(analysis) = &plan.price_analysis {
        if !analysis.prices.is_empty() {
            let day_avg = analysis.prices.iter().map(|p| p.price).sum::<f64>()
                / analysis.prices.len() as f64;
            let day_min = analysis
                .prices
                .iter()
                .map(|p| p.price)
                .fold(f64::INFINITY, f64::min);
            let day_max = analysis
                .prices
                .iter()
                .map(|p| p.price)
                .fold(f64::NEG_INFINITY, f64::max);
            let _ = writeln!(out);
            let _ = writeln!(out, "Price Analysis:");
            let _ = writeln!(out, "  Day average: {day_avg:.4} PLN/kWh");
            let _ = writeln!(out, "  Day range: {day_min:.4} - {day_max:.4} PLN/kWh");
            if let Some(window) = &analysis.window {
                let _ = writeln!(
                    out,
                    "  Cheapest single block: {:02}:00-{:02}:00 (avg {:.4} PLN/kWh)",
                    window.start_hour, window.end_hour, window.average_price
                );
            }
        }
    }

    if let Some(savings) = plan.advisor.as_ref().and_then(|v| v.estimated_savings) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Estimated savings: {savings:.4} PLN/kWh vs. average");
    }

    out
}

/// Short display name for a solar forecast sensor. The conventional
/// Forecast.Solar entity prefix is stripped; the unsuffixed entity is
/// the main plane.
fn solar_sensor_name(entity_id: &str) -> &str {
    match entity_id.strip_prefix(SOLAR_ENTITY_PREFIX) {
        Some("") => "main",
        Some(rest) => rest,
        None => entity_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AdvisorVerdict, BatterySpec, PriceAnalysis, PricePoint, Priority, PriceWindow,
        Recommendation, RecommendationSource, SolarSensorReading, TrendLine,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    fn forecast(soc: f64, declining: bool, eta_hours: Option<f64>) -> SocForecast {
        SocForecast {
            current_soc: soc,
            threshold: 20.0,
            trend: TrendLine {
                slope: if declining { -0.0014 } else { 0.0002 },
                intercept: soc,
                correlation: if declining { -0.9876 } else { 0.42 },
                std_err: 0.1,
                reference: now() - Duration::hours(3),
            },
            is_declining: declining,
            eta: eta_hours.map(|h| now() + Duration::minutes((h * 60.0) as i64)),
            time_to_threshold_hours: eta_hours,
            observed_at: now(),
            sample_count: 12,
        }
    }

    fn battery(soc: f64) -> BatterySpec {
        BatterySpec {
            capacity_kwh: 10.0,
            max_charge_kw: 5.0,
            current_soc: soc,
            target_soc: 100.0,
        }
    }

    fn window() -> PriceWindow {
        PriceWindow {
            start_hour: 2,
            end_hour: 5,
            hour_count: 4,
            average_price: 0.50,
            total_price: 2.0,
            timestamps: Vec::new(),
        }
    }

    fn charging_plan() -> ChargingPlan {
        let rec = Recommendation {
            should_charge: true,
            recommended_hours: vec![2, 3, 4, 5],
            periods: vec![window()],
            priority: Priority::High,
            reasoning: vec!["Battery is critically low at 8.0%".to_string()],
            source: RecommendationSource::RuleBased,
        };
        let mut plan = ChargingPlan::from_recommendation(rec, battery(8.0), 2);
        plan.price_analysis = Some(PriceAnalysis {
            window: Some(window()),
            periods: vec![window()],
            prices: (0..4)
                .map(|hour| PricePoint {
                    hour,
                    price: 0.5 + hour as f64 * 0.1,
                    timestamp: now(),
                })
                .collect(),
        });
        plan
    }

    #[test]
    fn test_forecast_report_with_eta() {
        let text = format_forecast(&forecast(45.0, true, Some(5.5)));

        assert!(text.contains("Battery SOC Forecast"));
        assert!(text.contains("Current SOC: 45.00%"));
        assert!(text.contains("Threshold: 20%"));
        assert!(text.contains("Declining: Yes"));
        assert!(text.contains("ETA to 20%: 2024-01-10 17:30:00"));
        assert!(text.contains("Time remaining: 5 hours 30 minutes"));
        assert!(text.is_ascii());
    }

    #[test]
    fn test_forecast_report_minutes_only() {
        let text = format_forecast(&forecast(45.0, true, Some(0.75)));
        assert!(text.contains("Time remaining: 45 minutes"));
    }

    #[test]
    fn test_forecast_report_below_threshold_warns() {
        let text = format_forecast(&forecast(15.0, true, Some(0.0)));
        assert!(text.contains("WARNING: SOC is already at or below threshold!"));
        assert!(!text.contains("Time remaining"));
    }

    #[test]
    fn test_forecast_report_stable() {
        let text = format_forecast(&forecast(80.0, false, None));
        assert!(text.contains("Declining: No"));
        assert!(text.contains("SOC is stable or increasing"));
    }

    #[test]
    fn test_plan_report_recommended() {
        let text = format_plan(&charging_plan());

        assert!(text.contains("Battery Charging Recommendation"));
        assert!(text.contains("Battery: 10kWh capacity, 5kW max charging power"));
        assert!(text.contains("Charging hours needed: 2h"));
        assert!(text.contains("Charging RECOMMENDED (Priority: HIGH)"));
        assert!(text.contains("Period 1: 02:00-05:00 (4h at avg 0.5000 PLN/kWh)"));
        assert!(text.contains("All hours: 2, 3, 4, 5"));
        assert!(text.contains("  - Battery is critically low at 8.0%"));
        assert!(text.contains("Day average: 0.6500 PLN/kWh"));
        assert!(text.contains("Day range: 0.5000 - 0.8000 PLN/kWh"));
        assert!(text.contains("Cheapest single block: 02:00-05:00"));
        assert!(text.is_ascii());
    }

    #[test]
    fn test_plan_report_not_recommended() {
        let rec = Recommendation {
            should_charge: false,
            recommended_hours: Vec::new(),
            periods: Vec::new(),
            priority: Priority::Low,
            reasoning: vec!["No charging needed".to_string()],
            source: RecommendationSource::RuleBased,
        };
        let plan = ChargingPlan::from_recommendation(rec, battery(80.0), 0);
        let text = format_plan(&plan);

        assert!(text.contains("Charging NOT recommended at this time"));
        assert!(!text.contains("Charging periods"));
        assert!(!text.contains("All hours"));
    }

    #[test]
    fn test_plan_report_long_hour_list_is_elided() {
        let mut plan = charging_plan();
        plan.recommended_hours = (0..=11).collect();
        let text = format_plan(&plan);
        assert!(!text.contains("All hours"));
    }

    #[test]
    fn test_plan_report_solar_and_savings() {
        let mut plan = charging_plan();
        plan.solar = Some(SolarSummary {
            sensors: vec![
                SolarSensorReading {
                    entity_id: "sensor.energy_production_today_east".to_string(),
                    forecast_kwh: 3.5,
                },
                SolarSensorReading {
                    entity_id: "sensor.energy_production_today".to_string(),
                    forecast_kwh: 2.5,
                },
            ],
            total_kwh: 6.0,
        });
        plan.advisor = Some(AdvisorVerdict {
            should_charge: true,
            recommended_hours: vec![2, 3],
            reasoning: "cheap".to_string(),
            priority: Priority::High,
            estimated_savings: Some(0.1234),
        });
        let text = format_plan(&plan);

        assert!(text.contains("Solar Production Forecast:"));
        assert!(text.contains("  Total: 6.00 kWh"));
        assert!(text.contains("  east: 3.50 kWh"));
        assert!(text.contains("  sensor.energy_production_today: 2.50 kWh"));
        assert!(text.contains("Estimated savings: 0.1234 PLN/kWh vs. average"));
    }

    #[test]
    fn test_solar_sensor_names() {
        assert_eq!(
            solar_sensor_name("sensor.energy_production_today_roof"),
            "roof"
        );
        assert_eq!(solar_sensor_name("sensor.energy_production_today_"), "main");
        assert_eq!(solar_sensor_name("sensor.pv_east"), "sensor.pv_east");
    }

    #[test]
    fn test_degraded_plan_report_shows_error() {
        let plan = ChargingPlan::degraded(battery(50.0), 1, "prices unavailable");
        let text = format_plan(&plan);

        assert!(text.contains("Charging NOT recommended at this time"));
        assert!(text.contains("  - Error: prices unavailable"));
    }
}
