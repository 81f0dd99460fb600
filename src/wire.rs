//! JSON shapes exchanged with the ingestion and user-profile services.
//!
//! Every shape is converted into a validated domain record with `TryFrom`
//! before it reaches evaluation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GuardianError, Result};
use crate::models::{
    Coordinates, Location, Pollutant, PollutantReading, SensitivityProfile, SeverityTier,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollutantLevels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ozone: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so2: Option<f64>,
}

impl PollutantLevels {
    fn entries(&self) -> [(Pollutant, Option<f64>); 5] {
        [
            (Pollutant::Pm25, self.pm25),
            (Pollutant::Pm10, self.pm10),
            (Pollutant::Ozone, self.ozone),
            (Pollutant::No2, self.no2),
            (Pollutant::So2, self.so2),
        ]
    }

    pub fn to_map(&self) -> BTreeMap<Pollutant, f64> {
        self.entries()
            .into_iter()
            .filter_map(|(pollutant, value)| value.map(|v| (pollutant, v)))
            .collect()
    }

    pub fn from_map(map: &BTreeMap<Pollutant, f64>) -> Self {
        PollutantLevels {
            pm25: map.get(&Pollutant::Pm25).copied(),
            pm10: map.get(&Pollutant::Pm10).copied(),
            ozone: map.get(&Pollutant::Ozone).copied(),
            no2: map.get(&Pollutant::No2).copied(),
            so2: map.get(&Pollutant::So2).copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingInput {
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub pollutants: PollutantLevels,
}

impl TryFrom<ReadingInput> for PollutantReading {
    type Error = GuardianError;

    fn try_from(input: ReadingInput) -> Result<Self> {
        let postcode = input
            .postcode
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let coordinates = match (input.latitude, input.longitude) {
            (Some(latitude), Some(longitude)) => {
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err(GuardianError::invalid_reading(format!(
                        "coordinates out of range: {latitude},{longitude}"
                    )));
                }
                Some(Coordinates {
                    latitude,
                    longitude,
                })
            }
            (None, None) => None,
            _ => {
                return Err(GuardianError::invalid_reading(
                    "latitude and longitude must be supplied together",
                ))
            }
        };

        if postcode.is_none() && coordinates.is_none() {
            return Err(GuardianError::invalid_reading(
                "reading has neither a postcode nor coordinates",
            ));
        }

        let reading = PollutantReading {
            concentrations: input.pollutants.to_map(),
            captured_at: input.timestamp,
            location: Location {
                postcode,
                coordinates,
            },
        };
        reading.validate()?;
        Ok(reading)
    }
}

impl From<&PollutantReading> for ReadingInput {
    fn from(reading: &PollutantReading) -> Self {
        ReadingInput {
            postcode: reading.location.postcode.clone(),
            latitude: reading.location.coordinates.map(|c| c.latitude),
            longitude: reading.location.coordinates.map(|c| c.longitude),
            timestamp: reading.captured_at,
            pollutants: PollutantLevels::from_map(&reading.concentrations),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ozone_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no2_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so2_threshold: Option<f64>,
}

impl ThresholdSettings {
    pub fn to_map(&self) -> BTreeMap<Pollutant, f64> {
        [
            (Pollutant::Pm25, self.pm25_threshold),
            (Pollutant::Pm10, self.pm10_threshold),
            (Pollutant::Ozone, self.ozone_threshold),
            (Pollutant::No2, self.no2_threshold),
            (Pollutant::So2, self.so2_threshold),
        ]
        .into_iter()
        .filter_map(|(pollutant, value)| value.map(|v| (pollutant, v)))
        .collect()
    }

    pub fn from_map(map: &BTreeMap<Pollutant, f64>) -> Self {
        ThresholdSettings {
            pm25_threshold: map.get(&Pollutant::Pm25).copied(),
            pm10_threshold: map.get(&Pollutant::Pm10).copied(),
            ozone_threshold: map.get(&Pollutant::Ozone).copied(),
            no2_threshold: map.get(&Pollutant::No2).copied(),
            so2_threshold: map.get(&Pollutant::So2).copied(),
        }
    }
}

/// Profile as stored by the user-profile service. Severity stays a string so
/// an unknown tier surfaces as `InvalidSeverityTier` rather than a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInput {
    pub asthma_severity: String,
    #[serde(default)]
    pub sensitivity_settings: ThresholdSettings,
}

impl TryFrom<ProfileInput> for SensitivityProfile {
    type Error = GuardianError;

    fn try_from(input: ProfileInput) -> Result<Self> {
        let severity: SeverityTier = input.asthma_severity.parse()?;
        let profile = SensitivityProfile {
            severity,
            thresholds: input.sensitivity_settings.to_map(),
        };
        profile.validate()?;
        Ok(profile)
    }
}

impl ProfileInput {
    /// Profile for a new or re-tiered user. Without any explicit thresholds
    /// the tier's scaled defaults are used.
    pub fn into_profile(self) -> Result<SensitivityProfile> {
        if self.sensitivity_settings.to_map().is_empty() {
            let severity: SeverityTier = self.asthma_severity.parse()?;
            return Ok(SensitivityProfile::with_defaults(severity));
        }
        SensitivityProfile::try_from(self)
    }
}

impl From<&SensitivityProfile> for ProfileInput {
    fn from(profile: &SensitivityProfile) -> Self {
        ProfileInput {
            asthma_severity: profile.severity.as_str().to_string(),
            sensitivity_settings: ThresholdSettings::from_map(&profile.thresholds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_json_converts_partial_pollutants() {
        let json = r#"{
            "postcode": "2000",
            "timestamp": "2026-03-01T09:00:00Z",
            "pollutants": {"pm25": 12.5, "ozone": 0.04}
        }"#;
        let input: ReadingInput = serde_json::from_str(json).unwrap();
        let reading = PollutantReading::try_from(input).unwrap();
        assert_eq!(reading.concentrations.len(), 2);
        assert_eq!(reading.concentration(Pollutant::Pm25), Some(12.5));
        assert_eq!(reading.concentration(Pollutant::No2), None);
        assert_eq!(reading.location.postcode.as_deref(), Some("2000"));
    }

    #[test]
    fn reading_without_pollutants_is_invalid() {
        let json = r#"{"postcode":"2000","timestamp":"2026-03-01T09:00:00Z","pollutants":{}}"#;
        let input: ReadingInput = serde_json::from_str(json).unwrap();
        assert!(matches!(
            PollutantReading::try_from(input),
            Err(GuardianError::InvalidReading { .. })
        ));
    }

    #[test]
    fn reading_without_location_is_invalid() {
        let json = r#"{"postcode":"  ","timestamp":"2026-03-01T09:00:00Z","pollutants":{"pm10":4.0}}"#;
        let input: ReadingInput = serde_json::from_str(json).unwrap();
        assert!(matches!(
            PollutantReading::try_from(input),
            Err(GuardianError::InvalidReading { .. })
        ));
    }

    #[test]
    fn reading_with_coordinates_only_is_accepted() {
        let json = r#"{"latitude":-33.87,"longitude":151.21,"timestamp":"2026-03-01T09:00:00Z","pollutants":{"no2":0.02}}"#;
        let input: ReadingInput = serde_json::from_str(json).unwrap();
        let reading = PollutantReading::try_from(input).unwrap();
        assert!(reading.location.postcode.is_none());
        assert!(reading.location.coordinates.is_some());
    }

    #[test]
    fn half_a_coordinate_pair_is_invalid() {
        let json = r#"{"postcode":"2000","latitude":-33.87,"timestamp":"2026-03-01T09:00:00Z","pollutants":{"no2":0.02}}"#;
        let input: ReadingInput = serde_json::from_str(json).unwrap();
        assert!(PollutantReading::try_from(input).is_err());
    }

    #[test]
    fn profile_json_converts_and_validates() {
        let json = r#"{
            "asthma_severity": "moderate",
            "sensitivity_settings": {"pm25_threshold": 20.0, "ozone_threshold": 0.08}
        }"#;
        let input: ProfileInput = serde_json::from_str(json).unwrap();
        let profile = SensitivityProfile::try_from(input).unwrap();
        assert_eq!(profile.severity, SeverityTier::Moderate);
        assert_eq!(profile.threshold(Pollutant::Ozone), Some(0.08));
        assert_eq!(profile.threshold(Pollutant::So2), None);
    }

    #[test]
    fn profile_with_unknown_tier_fails_on_tier() {
        let input = ProfileInput {
            asthma_severity: "brittle".to_string(),
            sensitivity_settings: ThresholdSettings {
                pm25_threshold: Some(25.0),
                ..ThresholdSettings::default()
            },
        };
        assert_eq!(
            SensitivityProfile::try_from(input),
            Err(GuardianError::InvalidSeverityTier {
                value: "brittle".to_string()
            })
        );
    }

    #[test]
    fn profile_without_thresholds_is_invalid() {
        let input = ProfileInput {
            asthma_severity: "mild".to_string(),
            sensitivity_settings: ThresholdSettings::default(),
        };
        assert!(matches!(
            SensitivityProfile::try_from(input),
            Err(GuardianError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn registration_without_thresholds_uses_tier_defaults() {
        let input = ProfileInput {
            asthma_severity: "severe".to_string(),
            sensitivity_settings: ThresholdSettings::default(),
        };
        let profile = input.into_profile().unwrap();
        assert_eq!(profile, SensitivityProfile::with_defaults(SeverityTier::Severe));
        assert!((profile.threshold(Pollutant::Pm25).unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn registration_keeps_explicit_thresholds() {
        let input = ProfileInput {
            asthma_severity: "mild".to_string(),
            sensitivity_settings: ThresholdSettings {
                no2_threshold: Some(0.05),
                ..ThresholdSettings::default()
            },
        };
        let profile = input.into_profile().unwrap();
        assert_eq!(profile.thresholds.len(), 1);
        assert_eq!(profile.threshold(Pollutant::No2), Some(0.05));
    }

    #[test]
    fn registration_rejects_bad_tier_and_thresholds() {
        let unknown = ProfileInput {
            asthma_severity: "brittle".to_string(),
            sensitivity_settings: ThresholdSettings::default(),
        };
        assert!(matches!(
            unknown.into_profile(),
            Err(GuardianError::InvalidSeverityTier { .. })
        ));
        let negative = ProfileInput {
            asthma_severity: "mild".to_string(),
            sensitivity_settings: ThresholdSettings {
                pm25_threshold: Some(-1.0),
                ..ThresholdSettings::default()
            },
        };
        assert!(matches!(
            negative.into_profile(),
            Err(GuardianError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn domain_profile_renders_back_to_wire_shape() {
        let profile = SensitivityProfile::with_defaults(SeverityTier::Mild);
        let input = ProfileInput::from(&profile);
        assert_eq!(input.asthma_severity, "mild");
        assert_eq!(input.sensitivity_settings.pm10_threshold, Some(50.0));
    }
}
