//! Runtime configuration.
//!
//! The database URL comes from `DATABASE_URL`. Score breakpoints can be
//! overridden with a JSON policy file passed via `--config`; every field is
//! optional and missing fields keep their defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::risk::RiskPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardianConfig {
    #[serde(default)]
    pub breakpoints: Option<BreakpointConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakpointConfig {
    /// Highest score still rated low (default: 1.0)
    pub low_max: Option<f64>,
    /// Highest score still rated moderate (default: 1.5)
    pub moderate_max: Option<f64>,
    /// Highest score still rated high (default: 2.5)
    pub high_max: Option<f64>,
}

impl GuardianConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: GuardianConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Resolved policy with defaults filled in.
    pub fn policy(&self) -> Result<RiskPolicy> {
        let defaults = RiskPolicy::default();
        let policy = match &self.breakpoints {
            None => defaults,
            Some(b) => RiskPolicy {
                low_max: b.low_max.unwrap_or(defaults.low_max),
                moderate_max: b.moderate_max.unwrap_or(defaults.moderate_max),
                high_max: b.high_max.unwrap_or(defaults.high_max),
            },
        };
        if !policy.is_well_formed() {
            anyhow::bail!(
                "breakpoints must be positive and strictly increasing, got low_max={} moderate_max={} high_max={}",
                policy.low_max,
                policy.moderate_max,
                policy.high_max
            );
        }
        Ok(policy)
    }
}

pub fn database_url() -> Result<String> {
    std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")
}
