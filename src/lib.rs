//! cexpulse Library
//!
//! Multi-exchange market data aggregation (funding rates, fund flow,
//! volume, open interest) served over a JSON HTTP API

pub mod aggregation;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod sources;
pub mod types;
