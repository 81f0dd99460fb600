use crate::error::{GuardianError, Result};
use crate::models::{Breach, BreachSet, PollutantReading, SensitivityProfile};

/// Compare every pollutant present in both the reading and the profile
/// against its threshold.
///
/// Pollutants missing from either side are skipped. A pollutant breaches
/// only when its excess ratio is strictly above 1.0.
pub fn evaluate(reading: &PollutantReading, profile: &SensitivityProfile) -> Result<BreachSet> {
    reading.validate()?;
    profile.validate()?;

    let mut breaches = Vec::new();
    for (pollutant, observed) in &reading.concentrations {
        let Some(threshold) = profile.threshold(*pollutant) else {
            continue;
        };
        let excess_ratio = observed / threshold;
        if !excess_ratio.is_finite() {
            return Err(GuardianError::invalid_reading(format!(
                "{pollutant} concentration {observed} is out of range for threshold {threshold}"
            )));
        }
        if excess_ratio > 1.0 {
            breaches.push(Breach {
                pollutant: *pollutant,
                observed: *observed,
                threshold,
                excess_ratio,
            });
        }
    }

    Ok(BreachSet::from(breaches))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::models::{Location, Pollutant, SeverityTier};

    fn reading(values: &[(Pollutant, f64)]) -> PollutantReading {
        PollutantReading {
            concentrations: values.iter().copied().collect(),
            captured_at: Utc::now(),
            location: Location::postcode("2000"),
        }
    }

    fn profile(values: &[(Pollutant, f64)]) -> SensitivityProfile {
        SensitivityProfile {
            severity: SeverityTier::Mild,
            thresholds: values.iter().copied().collect(),
        }
    }

    #[test]
    fn clean_air_against_mild_defaults_has_no_breaches() {
        let reading = reading(&[
            (Pollutant::Pm25, 10.0),
            (Pollutant::Pm10, 15.0),
            (Pollutant::Ozone, 0.02),
            (Pollutant::No2, 0.01),
            (Pollutant::So2, 0.005),
        ]);
        let profile = SensitivityProfile::with_defaults(SeverityTier::Mild);
        let breaches = evaluate(&reading, &profile).unwrap();
        assert!(breaches.is_empty());
    }

    #[test]
    fn reports_excess_ratio_for_breaching_pollutant() {
        let breaches = evaluate(
            &reading(&[(Pollutant::Pm25, 60.0), (Pollutant::Pm10, 20.0)]),
            &profile(&[(Pollutant::Pm25, 25.0), (Pollutant::Pm10, 50.0)]),
        )
        .unwrap();
        assert_eq!(breaches.len(), 1);
        let breach = breaches.iter().next().unwrap();
        assert_eq!(breach.pollutant, Pollutant::Pm25);
        assert_eq!(breach.observed, 60.0);
        assert_eq!(breach.threshold, 25.0);
        assert!((breach.excess_ratio - 2.4).abs() < 1e-9);
    }

    #[test]
    fn value_equal_to_threshold_is_not_a_breach() {
        let breaches = evaluate(
            &reading(&[(Pollutant::Ozone, 0.1)]),
            &profile(&[(Pollutant::Ozone, 0.1)]),
        )
        .unwrap();
        assert!(breaches.is_empty());
    }

    #[test]
    fn pollutants_missing_from_profile_are_skipped() {
        let breaches = evaluate(
            &reading(&[(Pollutant::So2, 9.0), (Pollutant::No2, 0.3)]),
            &profile(&[(Pollutant::No2, 0.1)]),
        )
        .unwrap();
        assert_eq!(breaches.len(), 1);
        assert!(breaches.contains(Pollutant::No2));
        assert!(!breaches.contains(Pollutant::So2));
    }

    #[test]
    fn pollutants_missing_from_reading_are_skipped() {
        let breaches = evaluate(
            &reading(&[(Pollutant::Pm10, 10.0)]),
            &SensitivityProfile::with_defaults(SeverityTier::Severe),
        )
        .unwrap();
        assert!(breaches.is_empty());
    }

    #[test]
    fn negative_concentration_is_rejected() {
        let result = evaluate(
            &reading(&[(Pollutant::Pm25, -0.5)]),
            &profile(&[(Pollutant::Pm25, 25.0)]),
        );
        assert!(matches!(result, Err(GuardianError::InvalidReading { .. })));
    }

    #[test]
    fn empty_reading_is_rejected() {
        let result = evaluate(&reading(&[]), &profile(&[(Pollutant::Pm25, 25.0)]));
        assert!(matches!(result, Err(GuardianError::InvalidReading { .. })));
    }

    #[test]
    fn profile_without_thresholds_is_rejected() {
        let empty = SensitivityProfile {
            severity: SeverityTier::Moderate,
            thresholds: BTreeMap::new(),
        };
        let result = evaluate(&reading(&[(Pollutant::Pm25, 5.0)]), &empty);
        assert!(matches!(result, Err(GuardianError::InvalidProfile { .. })));
    }

    #[test]
    fn ratio_overflowing_to_infinity_is_rejected() {
        let result = evaluate(
            &reading(&[(Pollutant::Pm25, 1e300)]),
            &profile(&[(Pollutant::Pm25, 1e-10)]),
        );
        assert!(matches!(result, Err(GuardianError::InvalidReading { .. })));
    }

    #[test]
    fn breaches_come_back_worst_first() {
        let breaches = evaluate(
            &reading(&[
                (Pollutant::Pm25, 30.0),
                (Pollutant::Ozone, 0.3),
                (Pollutant::No2, 0.2),
            ]),
            &profile(&[
                (Pollutant::Pm25, 25.0),
                (Pollutant::Ozone, 0.1),
                (Pollutant::No2, 0.1),
            ]),
        )
        .unwrap();
        let order: Vec<Pollutant> = breaches.iter().map(|b| b.pollutant).collect();
        assert_eq!(order, vec![Pollutant::Ozone, Pollutant::No2, Pollutant::Pm25]);
    }
}
