use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use battery_charge_planner::{advisor, config, ha, planner, prices, report, telemetry};

use advisor::{ChargingAdvisor, OpenAiAdvisor};
use chrono::Utc;
use clap::Parser;
use config::Config;
use ha::HomeAssistantClient;
use planner::{ChargePlanner, PlanSettings};
use prices::{CachedPriceSource, FreshnessPolicy, MemoryPriceCache, PstrykPriceClient};
use tracing::info;

/// Forecast battery SOC drain and plan the cheapest grid charging hours.
#[derive(Debug, Parser)]
#[command(name = "battery-charge-planner", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the SOC forecast only, skipping charging optimization
    #[arg(long)]
    forecast_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    telemetry::init_tracing(cli.verbose);

    let cfg = Config::load(&cli.config)?;
    let planner = build_planner(&cfg)?;

    let forecast = planner.forecast_soc().await?;
    println!("{}", report::format_forecast(&forecast));

    if cfg.charging.enabled && !cli.forecast_only {
        let plan = planner.optimize(&forecast, Utc::now()).await;
        println!("{}", report::format_plan(&plan));
    } else {
        info!("charging optimization skipped");
    }

    // Exit code mirrors forecast severity for cron and scripting:
    // 0 stable, 1 crossing forecast, 2 already at or below the threshold.
    let code = if forecast.at_or_below_threshold() {
        2
    } else if forecast.eta.is_some() {
        1
    } else {
        0
    };
    std::process::exit(code);
}

fn build_planner(cfg: &Config) -> Result<ChargePlanner> {
    let ha = Arc::new(HomeAssistantClient::new(
        &cfg.home_assistant.url,
        &cfg.home_assistant.token,
    )?);

    let client = PstrykPriceClient::new(
        &cfg.prices.base_url,
        cfg.prices.api_key.clone(),
        Duration::from_secs(cfg.prices.http_timeout_seconds),
    )?;
    let prices = Arc::new(CachedPriceSource::new(
        client,
        Arc::new(MemoryPriceCache::new()),
        FreshnessPolicy::new(Duration::from_secs(cfg.prices.cache_ttl_seconds)),
    ));

    Ok(ChargePlanner::new(
        ha,
        prices,
        build_advisor(cfg)?,
        PlanSettings::from_config(cfg),
    ))
}

fn build_advisor(cfg: &Config) -> Result<Option<Arc<dyn ChargingAdvisor>>> {
    let Some(api_key) = cfg.advisor.api_key.as_deref().filter(|k| !k.is_empty()) else {
        info!("no advisor API key configured, rule-based decisions only");
        return Ok(None);
    };
    let advisor = OpenAiAdvisor::new(&cfg.advisor.base_url, api_key, &cfg.advisor.model)?;
    Ok(Some(Arc::new(advisor) as Arc<dyn ChargingAdvisor>))
}
