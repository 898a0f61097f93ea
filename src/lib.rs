pub mod advisor;
pub mod config;
pub mod domain;
pub mod forecast;
pub mod ha;
pub mod optimizer;
pub mod planner;
pub mod prices;
pub mod report;
pub mod telemetry;
