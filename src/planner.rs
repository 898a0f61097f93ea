use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::advisor::ChargingAdvisor;
use crate::config::{Config, PowerSensorConfig};
use crate::domain::{
    AdvisorVerdict, BatterySpec, ChargingPeriod, ChargingPlan, PowerForecast, PriceAnalysis,
    Recommendation, RecommendationSource, SocForecast, SolarSensorReading, SolarSummary,
};
use crate::forecast::{consumption, SocForecaster};
use crate::ha::HomeAssistant;
use crate::optimizer::{cheapest_periods, cheapest_window, DecisionEngine};
use crate::prices::PriceSource;

/// Planner inputs distilled from the configuration file.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub soc_sensor: String,
    pub history_minutes: i64,
    pub threshold_percent: f64,
    pub solar_sensors: Vec<String>,
    pub power_sensors: Vec<PowerSensorConfig>,
    pub capacity_kwh: f64,
    pub max_charge_kw: f64,
    pub target_soc: f64,
    pub allow_multiple_periods: bool,
}

impl PlanSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            soc_sensor: cfg.sensors.soc.clone(),
            history_minutes: cfg.sensors.history_minutes,
            threshold_percent: cfg.forecast.threshold_percent,
            solar_sensors: cfg.sensors.solar.clone(),
            power_sensors: cfg.sensors.power.clone(),
            capacity_kwh: cfg.battery.capacity_kwh,
            max_charge_kw: cfg.battery.max_charge_kw,
            target_soc: cfg.battery.target_soc,
            allow_multiple_periods: cfg.charging.allow_multiple_periods,
        }
    }
}

/// Orchestrates one planning cycle: SOC forecast, price optimization,
/// solar and power context, rule engine, optional advisor override.
pub struct ChargePlanner {
    ha: Arc<dyn HomeAssistant>,
    prices: Arc<dyn PriceSource>,
    advisor: Option<Arc<dyn ChargingAdvisor>>,
    engine: DecisionEngine,
    settings: PlanSettings,
}

impl ChargePlanner {
    pub fn new(
        ha: Arc<dyn HomeAssistant>,
        prices: Arc<dyn PriceSource>,
        advisor: Option<Arc<dyn ChargingAdvisor>>,
        settings: PlanSettings,
    ) -> Self {
        Self {
            ha,
            prices,
            advisor,
            engine: DecisionEngine::default(),
            settings,
        }
    }

    /// Fetch SOC history and fit the threshold-crossing forecast.
    pub async fn forecast_soc(&self) -> Result<SocForecast> {
        let series = self
            .ha
            .history(&self.settings.soc_sensor, self.settings.history_minutes)
            .await?;
        if series.is_empty() {
            anyhow::bail!(
                "no historical data available for sensor {}",
                self.settings.soc_sensor
            );
        }
        info!(
            points = series.len(),
            skipped = series.skipped,
            "fetched SOC history"
        );

        let forecaster = SocForecaster::new(self.settings.threshold_percent);
        Ok(forecaster.forecast(&series.points)?)
    }

    /// Produce the charging plan for `now`. Never fails: any error inside
    /// the pipeline yields a degraded no-charge plan instead.
    pub async fn optimize(&self, forecast: &SocForecast, now: DateTime<Utc>) -> ChargingPlan {
        let battery = BatterySpec {
            capacity_kwh: self.settings.capacity_kwh,
            max_charge_kw: self.settings.max_charge_kw,
            current_soc: forecast.current_soc,
            target_soc: self.settings.target_soc,
        };
        let hours_needed = battery.hours_to_target();

        match self
            .optimize_inner(forecast, battery, hours_needed, now)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "charging optimization failed");
                ChargingPlan::degraded(battery, hours_needed, e.to_string())
            }
        }
    }

    async fn optimize_inner(
        &self,
        forecast: &SocForecast,
        battery: BatterySpec,
        hours_needed: u32,
        now: DateTime<Utc>,
    ) -> Result<ChargingPlan> {
        info!(
            hours_needed,
            current_soc = forecast.current_soc,
            target_soc = battery.target_soc,
            "calculated charging hours needed"
        );

        info!("fetching electricity prices");
        let day_prices = self.prices.day_prices(now.date_naive()).await?;

        let (window, periods) = if hours_needed == 0 {
            (None, Vec::new())
        } else if self.settings.allow_multiple_periods {
            let periods = cheapest_periods(&day_prices, hours_needed as usize)?;
            // The single block is only for comparison in the report.
            let window = cheapest_window(&day_prices, hours_needed as usize).ok();
            (window, periods)
        } else {
            let window = cheapest_window(&day_prices, hours_needed as usize)?;
            (Some(window.clone()), vec![window])
        };

        let solar = if self.settings.solar_sensors.is_empty() {
            None
        } else {
            info!("fetching solar production forecast");
            Some(self.solar_summary().await)
        };
        let power = self.power_summary().await;

        let rule_verdict = self.engine.decide(
            forecast,
            &periods,
            solar.as_ref().map(|s| s.total_kwh),
            now,
        );

        let mut advisor_verdict: Option<AdvisorVerdict> = None;
        let active = match &self.advisor {
            Some(advisor) => {
                info!("requesting advisor recommendation");
                match advisor.advise(forecast, &day_prices, &solar).await {
                    Ok(verdict) => {
                        let rec = advisor_recommendation(&verdict, &periods, now);
                        advisor_verdict = Some(verdict);
                        rec
                    }
                    Err(e) => {
                        warn!(error = %e, "advisor failed, falling back to rule-based verdict");
                        rule_verdict
                    }
                }
            }
            None => rule_verdict,
        };

        let mut plan = ChargingPlan::from_recommendation(active, battery, hours_needed);
        plan.price_analysis = Some(PriceAnalysis {
            window,
            periods,
            prices: day_prices,
        });
        plan.solar = solar;
        plan.power = power;
        plan.advisor = advisor_verdict;
        Ok(plan)
    }

    /// Read every solar forecast sensor; a failed read counts as 0 kWh.
    async fn solar_summary(&self) -> SolarSummary {
        let reads = self.settings.solar_sensors.iter().map(|entity| async move {
            match self.ha.current_value(entity).await {
                Ok(value) => {
                    info!(entity, kwh = value, "solar forecast reading");
                    SolarSensorReading {
                        entity_id: entity.clone(),
                        forecast_kwh: value,
                    }
                }
                Err(e) => {
                    warn!(entity, error = %e, "solar forecast read failed, assuming 0 kWh");
                    SolarSensorReading {
                        entity_id: entity.clone(),
                        forecast_kwh: 0.0,
                    }
                }
            }
        });
        let sensors = join_all(reads).await;
        let total_kwh = sensors.iter().map(|s| s.forecast_kwh).sum();
        SolarSummary { sensors, total_kwh }
    }

    /// Summed power statistics across all consumption sensors. A sensor
    /// whose history cannot be fetched is skipped, not fatal.
    async fn power_summary(&self) -> Option<PowerForecast> {
        if self.settings.power_sensors.is_empty() {
            return None;
        }

        let mut total = PowerForecast::default();
        for sensor in &self.settings.power_sensors {
            match self
                .ha
                .history(&sensor.entity, self.settings.history_minutes)
                .await
            {
                Ok(series) => {
                    let resampled = consumption::resample(&series.points, sensor.kind);
                    total = total + consumption::summarize(&resampled);
                }
                Err(e) => {
                    warn!(entity = %sensor.entity, error = %e, "power history fetch failed, skipping sensor");
                }
            }
        }
        Some(total)
    }
}

/// Accept an advisor verdict, dropping hours that already passed today.
/// When every hour has passed the charge flag is withdrawn as well.
fn advisor_recommendation(
    verdict: &AdvisorVerdict,
    periods: &[ChargingPeriod],
    now: DateTime<Utc>,
) -> Recommendation {
    let current_hour = now.hour();
    let kept: Vec<u32> = verdict
        .recommended_hours
        .iter()
        .copied()
        .filter(|h| *h >= current_hour)
        .collect();
    let dropped = verdict.recommended_hours.len() - kept.len();

    let mut should_charge = verdict.should_charge;
    let mut reasoning = vec![verdict.reasoning.clone()];
    if dropped > 0 && kept.is_empty() {
        should_charge = false;
        reasoning.push(format!(
            "All {dropped} recommended hour(s) have already passed today"
        ));
    } else if dropped > 0 {
        debug!(dropped, "dropped past hours from advisor recommendation");
    }

    Recommendation {
        should_charge,
        recommended_hours: kept,
        periods: periods.to_vec(),
        priority: verdict.priority,
        reasoning,
        source: RecommendationSource::Advisor,
    }
}
