//! Personal asthma risk evaluation from air quality readings.
//!
//! A reading and a sensitivity profile flow one way through three pure
//! stages: [`threshold::evaluate`] finds breaches, [`risk::aggregate`] turns
//! them into a risk level, and [`guidance::compose`] maps that level to
//! ordered recommendations and actions. The remaining modules (storage,
//! reporting, notification decisions) sit around that core.

pub mod aqi;
pub mod config;
pub mod db;
pub mod error;
pub mod guidance;
pub mod models;
pub mod notify;
pub mod report;
pub mod risk;
pub mod threshold;
pub mod wire;

pub use error::{GuardianError, Result};
pub use guidance::{compose, guidance_for};
pub use risk::{aggregate, aggregate_with, RiskPolicy};
pub use threshold::evaluate;
