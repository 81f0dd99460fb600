use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GuardianError, Result};
use crate::notify::NotificationPreferences;

/// Pollutants tracked by the monitoring network.
///
/// Declaration order is the final tie-break wherever output ordering matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    Ozone,
    No2,
    So2,
}

impl Pollutant {
    pub const ALL: [Pollutant; 5] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::Ozone,
        Pollutant::No2,
        Pollutant::So2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::Ozone => "ozone",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
        }
    }

    /// Human readable name used in guidance text.
    pub fn label(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::Ozone => "ozone",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported asthma severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Mild,
    Moderate,
    Severe,
}

impl SeverityTier {
    pub const ALL: [SeverityTier; 3] = [
        SeverityTier::Mild,
        SeverityTier::Moderate,
        SeverityTier::Severe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Mild => "mild",
            SeverityTier::Moderate => "moderate",
            SeverityTier::Severe => "severe",
        }
    }

    /// Factor applied to the mild default thresholds when a profile is created.
    pub fn threshold_scale(&self) -> f64 {
        match self {
            SeverityTier::Mild => 1.0,
            SeverityTier::Moderate => 0.8,
            SeverityTier::Severe => 0.6,
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityTier {
    type Err = GuardianError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mild" => Ok(SeverityTier::Mild),
            "moderate" => Ok(SeverityTier::Moderate),
            "severe" => Ok(SeverityTier::Severe),
            _ => Err(GuardianError::InvalidSeverityTier {
                value: value.to_string(),
            }),
        }
    }
}

/// Ordered risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::VeryHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = GuardianError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "low" => Ok(RiskLevel::Low),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            "very_high" => Ok(RiskLevel::VeryHigh),
            _ => Err(GuardianError::UnknownRiskLevel {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where a reading was captured. At least one of the two identifiers is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub postcode: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Location {
    pub fn postcode(postcode: impl Into<String>) -> Self {
        Location {
            postcode: Some(postcode.into()),
            coordinates: None,
        }
    }

    pub fn label(&self) -> String {
        match (&self.postcode, &self.coordinates) {
            (Some(postcode), _) => postcode.clone(),
            (None, Some(c)) => format!("{:.4},{:.4}", c.latitude, c.longitude),
            (None, None) => "unknown location".to_string(),
        }
    }
}

/// Snapshot of pollutant concentrations, in each pollutant's native unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantReading {
    pub concentrations: BTreeMap<Pollutant, f64>,
    pub captured_at: DateTime<Utc>,
    pub location: Location,
}

impl PollutantReading {
    pub fn validate(&self) -> Result<()> {
        if self.concentrations.is_empty() {
            return Err(GuardianError::invalid_reading("no pollutant concentrations"));
        }
        for (pollutant, value) in &self.concentrations {
            if !value.is_finite() || *value < 0.0 {
                return Err(GuardianError::invalid_reading(format!(
                    "{pollutant} concentration must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn concentration(&self, pollutant: Pollutant) -> Option<f64> {
        self.concentrations.get(&pollutant).copied()
    }
}

/// Mild-tier default thresholds assigned to new profiles.
pub const DEFAULT_THRESHOLDS: [(Pollutant, f64); 5] = [
    (Pollutant::Pm25, 25.0),
    (Pollutant::Pm10, 50.0),
    (Pollutant::Ozone, 0.1),
    (Pollutant::No2, 0.1),
    (Pollutant::So2, 0.05),
];

/// Per-user exposure thresholds. Values are final; severity scaling has
/// already been applied by whoever created the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityProfile {
    pub severity: SeverityTier,
    pub thresholds: BTreeMap<Pollutant, f64>,
}

impl SensitivityProfile {
    /// Default thresholds scaled once for the given tier.
    pub fn with_defaults(severity: SeverityTier) -> Self {
        let scale = severity.threshold_scale();
        let thresholds = DEFAULT_THRESHOLDS
            .iter()
            .map(|(pollutant, base)| (*pollutant, base * scale))
            .collect();
        SensitivityProfile {
            severity,
            thresholds,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(GuardianError::invalid_profile("no thresholds configured"));
        }
        for (pollutant, value) in &self.thresholds {
            if !value.is_finite() || *value <= 0.0 {
                return Err(GuardianError::invalid_profile(format!(
                    "{pollutant} threshold must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn threshold(&self, pollutant: Pollutant) -> Option<f64> {
        self.thresholds.get(&pollutant).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub pollutant: Pollutant,
    pub observed: f64,
    pub threshold: f64,
    pub excess_ratio: f64,
}

/// Breaches ordered worst offender first.
///
/// Ordering is by descending excess ratio, then pollutant declaration order,
/// so it never depends on how the inputs were iterated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Breach>", into = "Vec<Breach>")]
pub struct BreachSet {
    breaches: Vec<Breach>,
}

impl BreachSet {
    pub fn empty() -> Self {
        BreachSet::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Breach> {
        self.breaches.iter()
    }

    pub fn len(&self) -> usize {
        self.breaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaches.is_empty()
    }

    /// Largest excess ratio, if any pollutant is in breach.
    pub fn max_excess(&self) -> Option<f64> {
        self.breaches.first().map(|b| b.excess_ratio)
    }

    pub fn contains(&self, pollutant: Pollutant) -> bool {
        self.breaches.iter().any(|b| b.pollutant == pollutant)
    }
}

impl From<Vec<Breach>> for BreachSet {
    /// Keeps one breach per pollutant, the one with the worst excess ratio.
    fn from(breaches: Vec<Breach>) -> Self {
        let mut worst: BTreeMap<Pollutant, Breach> = BTreeMap::new();
        for breach in breaches {
            worst
                .entry(breach.pollutant)
                .and_modify(|current| {
                    if breach.excess_ratio > current.excess_ratio {
                        *current = breach;
                    }
                })
                .or_insert(breach);
        }

        let mut breaches: Vec<Breach> = worst.into_values().collect();
        breaches.sort_by(|a, b| {
            b.excess_ratio
                .total_cmp(&a.excess_ratio)
                .then(a.pollutant.cmp(&b.pollutant))
        });
        BreachSet { breaches }
    }
}

impl From<BreachSet> for Vec<Breach> {
    fn from(set: BreachSet) -> Self {
        set.breaches
    }
}

impl<'a> IntoIterator for &'a BreachSet {
    type Item = &'a Breach;
    type IntoIter = std::slice::Iter<'a, Breach>;

    fn into_iter(self) -> Self::IntoIter {
        self.breaches.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub severity_score: f64,
    pub severity: SeverityTier,
    pub breaches: BreachSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Immediate,
    Preventive,
    LongTerm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub category: RecommendationCategory,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    StayIndoors,
    LimitExercise,
    UseInhaler,
    SeekMedicalHelp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    WhenPossible,
    Soon,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub description: String,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidancePayload {
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub recommendations: Vec<Recommendation>,
    pub actions: Vec<Action>,
    pub explanation: String,
}

impl GuidancePayload {
    pub fn risk_level(&self) -> RiskLevel {
        self.assessment.risk_level
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub postcode: String,
    pub profile: SensitivityProfile,
    pub preferences: NotificationPreferences,
}

#[derive(Debug, Clone)]
pub struct StoredReading {
    pub id: Uuid,
    pub reading: PollutantReading,
    pub aqi: i32,
    pub quality_rating: String,
}

#[derive(Debug, Clone)]
pub struct GuidanceRecord {
    pub user_name: String,
    pub user_email: String,
    pub postcode: String,
    pub risk_level: RiskLevel,
    pub severity_score: f64,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RiskLevelSummary {
    pub risk_level: RiskLevel,
    pub count: usize,
    pub avg_score: f64,
}
