use serde::{Deserialize, Serialize};

use crate::models::{BreachSet, RiskAssessment, RiskLevel, SeverityTier};

/// Additional weight contributed by each simultaneous breach after the first.
pub const BREACH_WEIGHT_STEP: f64 = 0.15;

/// Extra breaches beyond this count add no further weight.
pub const MAX_WEIGHTED_EXTRA_BREACHES: usize = 4;

/// Score breakpoints separating the four risk levels.
///
/// A score equal to a breakpoint belongs to the lower level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub low_max: f64,
    pub moderate_max: f64,
    pub high_max: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy {
            low_max: 1.0,
            moderate_max: 1.5,
            high_max: 2.5,
        }
    }
}

impl RiskPolicy {
    pub fn level_for_score(&self, score: f64) -> RiskLevel {
        if score <= self.low_max {
            RiskLevel::Low
        } else if score <= self.moderate_max {
            RiskLevel::Moderate
        } else if score <= self.high_max {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }

    /// Breakpoints must be finite, positive and strictly increasing so the
    /// levels partition the positive reals into four contiguous intervals.
    pub fn is_well_formed(&self) -> bool {
        let points = [self.low_max, self.moderate_max, self.high_max];
        points.iter().all(|p| p.is_finite() && *p > 0.0) && points.windows(2).all(|w| w[0] < w[1])
    }
}

pub fn breach_weight(breach_count: usize) -> f64 {
    let extra = breach_count.saturating_sub(1).min(MAX_WEIGHTED_EXTRA_BREACHES);
    1.0 + BREACH_WEIGHT_STEP * extra as f64
}

pub fn severity_multiplier(severity: SeverityTier) -> f64 {
    match severity {
        SeverityTier::Mild => 1.0,
        SeverityTier::Moderate => 1.25,
        SeverityTier::Severe => 1.5,
    }
}

/// Weighted score for a breach set. Saturates at `f64::MAX` so it always
/// stays finite and serializable.
pub fn severity_score(breaches: &BreachSet, severity: SeverityTier) -> f64 {
    match breaches.max_excess() {
        None => 0.0,
        Some(max_excess) => (max_excess
            * breach_weight(breaches.len())
            * severity_multiplier(severity))
        .min(f64::MAX),
    }
}

/// Combine breaches and asthma severity into a single assessment using the
/// default breakpoints.
pub fn aggregate(breaches: BreachSet, severity: SeverityTier) -> RiskAssessment {
    aggregate_with(&RiskPolicy::default(), breaches, severity)
}

pub fn aggregate_with(
    policy: &RiskPolicy,
    breaches: BreachSet,
    severity: SeverityTier,
) -> RiskAssessment {
    if breaches.is_empty() {
        return RiskAssessment {
            risk_level: RiskLevel::Low,
            severity_score: 0.0,
            severity,
            breaches,
        };
    }

    let score = severity_score(&breaches, severity);
    RiskAssessment {
        risk_level: policy.level_for_score(score),
        severity_score: score,
        severity,
        breaches,
    }
}
