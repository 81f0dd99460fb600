//! Maps a risk assessment to ordered recommendations and actions.
//!
//! Output order is fixed: level recommendations first, then one
//! pollutant-specific recommendation per breach, worst offender first.

use crate::error::{GuardianError, Result};
use crate::models::{
    Action, ActionKind, Breach, GuidancePayload, Pollutant, PollutantReading, Priority,
    Recommendation, RecommendationCategory, RiskAssessment, RiskLevel, SensitivityProfile,
    Urgency,
};
use crate::risk::{self, RiskPolicy};
use crate::threshold;

/// Excess ratio at which a pollutant recommendation is raised to high priority.
pub const HIGH_PRIORITY_EXCESS: f64 = 2.0;

struct RecommendationTemplate {
    category: RecommendationCategory,
    title: &'static str,
    description: &'static str,
    priority: Priority,
}

struct ActionTemplate {
    kind: ActionKind,
    description: &'static str,
    urgency: Urgency,
}

struct LevelGuidance {
    level: RiskLevel,
    recommendations: &'static [RecommendationTemplate],
    actions: &'static [ActionTemplate],
}

const LEVEL_TABLE: &[LevelGuidance] = &[
    LevelGuidance {
        level: RiskLevel::Low,
        recommendations: &[RecommendationTemplate {
            category: RecommendationCategory::Preventive,
            title: "Good Air Quality",
            description: "Air quality is within your limits. Continue normal activities.",
            priority: Priority::Low,
        }],
        actions: &[],
    },
    LevelGuidance {
        level: RiskLevel::Moderate,
        recommendations: &[
            RecommendationTemplate {
                category: RecommendationCategory::Preventive,
                title: "Moderate Air Quality",
                description: "Air quality is above some of your limits. Consider reducing prolonged outdoor activities if you experience symptoms.",
                priority: Priority::Medium,
            },
            RecommendationTemplate {
                category: RecommendationCategory::Preventive,
                title: "Keep Your Reliever Handy",
                description: "Carry your reliever inhaler when you go out today.",
                priority: Priority::Low,
            },
        ],
        actions: &[ActionTemplate {
            kind: ActionKind::LimitExercise,
            description: "Reduce prolonged or heavy outdoor exertion",
            urgency: Urgency::WhenPossible,
        }],
    },
    LevelGuidance {
        level: RiskLevel::High,
        recommendations: &[
            RecommendationTemplate {
                category: RecommendationCategory::Immediate,
                title: "Poor Air Quality",
                description: "Air quality is poor for you. Limit outdoor activities and stay indoors when possible.",
                priority: Priority::High,
            },
            RecommendationTemplate {
                category: RecommendationCategory::Preventive,
                title: "Follow Your Asthma Action Plan",
                description: "Take your preventer medication as prescribed and watch for early symptoms.",
                priority: Priority::Medium,
            },
        ],
        actions: &[
            ActionTemplate {
                kind: ActionKind::StayIndoors,
                description: "Stay indoors with windows closed",
                urgency: Urgency::Soon,
            },
            ActionTemplate {
                kind: ActionKind::LimitExercise,
                description: "Postpone outdoor exercise until air quality improves",
                urgency: Urgency::Soon,
            },
        ],
    },
    LevelGuidance {
        level: RiskLevel::VeryHigh,
        recommendations: &[
            RecommendationTemplate {
                category: RecommendationCategory::Immediate,
                title: "Very Poor Air Quality",
                description: "Air quality is very poor for you. Stay indoors with windows and doors closed.",
                priority: Priority::High,
            },
            RecommendationTemplate {
                category: RecommendationCategory::Immediate,
                title: "Avoid Outdoor Exertion",
                description: "Avoid all outdoor exertion, including walking to work or school where you can.",
                priority: Priority::High,
            },
            RecommendationTemplate {
                category: RecommendationCategory::LongTerm,
                title: "Review Your Action Plan",
                description: "Book a review with your doctor if poor air days keep triggering symptoms.",
                priority: Priority::Medium,
            },
        ],
        actions: &[
            ActionTemplate {
                kind: ActionKind::SeekMedicalHelp,
                description: "Seek medical help if your reliever is not helping or breathing becomes difficult",
                urgency: Urgency::Immediate,
            },
            ActionTemplate {
                kind: ActionKind::StayIndoors,
                description: "Stay indoors with windows closed and air conditioning on recirculate",
                urgency: Urgency::Soon,
            },
            ActionTemplate {
                kind: ActionKind::UseInhaler,
                description: "Use your reliever inhaler if you have symptoms",
                urgency: Urgency::Soon,
            },
        ],
    },
];

fn pollutant_advice(pollutant: Pollutant) -> (&'static str, &'static str) {
    match pollutant {
        Pollutant::Pm25 => (
            "Fine Particles Elevated",
            "PM2.5 is above your limit. Keep windows closed and run an air purifier indoors if you have one.",
        ),
        Pollutant::Pm10 => (
            "Coarse Particles Elevated",
            "PM10 is above your limit. Avoid dusty areas, roadworks and roadside activity.",
        ),
        Pollutant::Ozone => (
            "Ozone Elevated",
            "Ozone is above your limit. Avoid outdoor exercise during peak sun hours.",
        ),
        Pollutant::No2 => (
            "Nitrogen Dioxide Elevated",
            "NO2 is above your limit. Avoid busy roads and heavy traffic areas.",
        ),
        Pollutant::So2 => (
            "Sulphur Dioxide Elevated",
            "SO2 is above your limit. Stay away from industrial sites and keep your reliever close.",
        ),
    }
}

fn pollutant_recommendation(breach: &Breach) -> Recommendation {
    let (title, description) = pollutant_advice(breach.pollutant);
    let priority = if breach.excess_ratio >= HIGH_PRIORITY_EXCESS {
        Priority::High
    } else {
        Priority::Medium
    };
    Recommendation {
        category: RecommendationCategory::Preventive,
        title: title.to_string(),
        description: description.to_string(),
        priority,
    }
}

fn explanation(assessment: &RiskAssessment) -> String {
    let severity = assessment.severity;
    if assessment.breaches.is_empty() {
        return format!(
            "All measured pollutants are within the thresholds set for your {severity} asthma."
        );
    }
    let pollutants: Vec<&str> = assessment
        .breaches
        .iter()
        .map(|b| b.pollutant.label())
        .collect();
    format!(
        "With {severity} asthma, {} above your thresholds gives a risk score of {:.2} ({}).",
        pollutants.join(", "),
        assessment.severity_score,
        assessment.risk_level
    )
}

/// Build the guidance payload for an assessment.
pub fn compose(assessment: RiskAssessment) -> Result<GuidancePayload> {
    let table = LEVEL_TABLE
        .iter()
        .find(|entry| entry.level == assessment.risk_level)
        .ok_or_else(|| GuardianError::UnknownRiskLevel {
            value: assessment.risk_level.to_string(),
        })?;

    let recommendations = table
        .recommendations
        .iter()
        .map(|t| Recommendation {
            category: t.category,
            title: t.title.to_string(),
            description: t.description.to_string(),
            priority: t.priority,
        })
        .chain(assessment.breaches.iter().map(pollutant_recommendation))
        .collect();

    let actions = table
        .actions
        .iter()
        .map(|t| Action {
            kind: t.kind,
            description: t.description.to_string(),
            urgency: t.urgency,
        })
        .collect();

    let explanation = explanation(&assessment);
    Ok(GuidancePayload {
        assessment,
        recommendations,
        actions,
        explanation,
    })
}

/// Run the full evaluate, aggregate, compose pipeline for one reading.
pub fn guidance_for(
    policy: &RiskPolicy,
    reading: &PollutantReading,
    profile: &SensitivityProfile,
) -> Result<GuidancePayload> {
    let breaches = threshold::evaluate(reading, profile)?;
    let assessment = risk::aggregate_with(policy, breaches, profile.severity);
    compose(assessment)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::models::{BreachSet, Location, SeverityTier};

    fn breach(pollutant: Pollutant, excess_ratio: f64) -> Breach {
        Breach {
            pollutant,
            observed: excess_ratio,
            threshold: 1.0,
            excess_ratio,
        }
    }

    fn assessment(level: RiskLevel, breaches: Vec<Breach>) -> RiskAssessment {
        RiskAssessment {
            risk_level: level,
            severity_score: 3.0,
            severity: SeverityTier::Moderate,
            breaches: BreachSet::from(breaches),
        }
    }

    #[test]
    fn every_level_has_a_table_entry() {
        for level in RiskLevel::ALL {
            let payload = compose(assessment(level, Vec::new())).unwrap();
            assert!(!payload.recommendations.is_empty());
        }
    }

    #[test]
    fn low_level_has_no_actions() {
        let payload = compose(assessment(RiskLevel::Low, Vec::new())).unwrap();
        assert!(payload.actions.is_empty());
        assert_eq!(payload.recommendations[0].title, "Good Air Quality");
    }

    #[test]
    fn very_high_ozone_advice_follows_base_recommendations() {
        let payload = compose(assessment(
            RiskLevel::VeryHigh,
            vec![breach(Pollutant::Ozone, 2.5)],
        ))
        .unwrap();

        let base_count = 3;
        assert_eq!(payload.recommendations.len(), base_count + 1);
        assert_eq!(payload.recommendations[base_count].title, "Ozone Elevated");
        assert!(payload.recommendations[base_count]
            .description
            .contains("peak sun hours"));

        let immediate: Vec<&Action> = payload
            .actions
            .iter()
            .filter(|a| a.urgency == Urgency::Immediate)
            .collect();
        assert_eq!(immediate.len(), 1);
        assert_eq!(immediate[0].kind, ActionKind::SeekMedicalHelp);
    }

    #[test]
    fn pollutant_advice_follows_worst_offender_first() {
        let payload = compose(assessment(
            RiskLevel::High,
            vec![
                breach(Pollutant::Pm25, 1.3),
                breach(Pollutant::No2, 2.2),
                breach(Pollutant::Pm10, 1.8),
            ],
        ))
        .unwrap();
        let titles: Vec<&str> = payload.recommendations[2..]
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec![
                "Nitrogen Dioxide Elevated",
                "Coarse Particles Elevated",
                "Fine Particles Elevated"
            ]
        );
        assert_eq!(payload.recommendations[2].priority, Priority::High);
        assert_eq!(payload.recommendations[3].priority, Priority::Medium);
    }

    #[test]
    fn payload_serializes_to_guidance_endpoint_shape() {
        let payload = compose(assessment(
            RiskLevel::VeryHigh,
            vec![breach(Pollutant::Ozone, 2.5)],
        ))
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["risk_level"], "very_high");
        assert_eq!(value["recommendations"][0]["type"], "immediate");
        assert_eq!(value["recommendations"][0]["priority"], "high");
        assert_eq!(value["actions"][0]["action"], "seek_medical_help");
        assert_eq!(value["actions"][0]["urgency"], "immediate");
        assert_eq!(value["breaches"][0]["pollutant"], "ozone");
    }

    #[test]
    fn payload_survives_a_json_round_trip() {
        let payload = compose(assessment(
            RiskLevel::Moderate,
            vec![breach(Pollutant::So2, 1.2)],
        ))
        .unwrap();
        let json = serde_json::to_string(&payload).unwrap();
        let back: GuidancePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn pipeline_matches_scenario_for_severe_pm25() {
        let reading = PollutantReading {
            concentrations: BTreeMap::from([(Pollutant::Pm25, 60.0)]),
            captured_at: Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0).unwrap(),
            location: Location::postcode("2750"),
        };
        let profile = SensitivityProfile {
            severity: SeverityTier::Severe,
            thresholds: BTreeMap::from([(Pollutant::Pm25, 25.0)]),
        };
        let payload = guidance_for(&RiskPolicy::default(), &reading, &profile).unwrap();
        assert_eq!(payload.risk_level(), RiskLevel::VeryHigh);
        assert!((payload.assessment.severity_score - 3.6).abs() < 1e-9);
        assert!(payload.explanation.contains("severe"));
        assert!(payload.explanation.contains("PM2.5"));
    }

    #[test]
    fn pipeline_surfaces_invalid_reading() {
        let reading = PollutantReading {
            concentrations: BTreeMap::new(),
            captured_at: Utc::now(),
            location: Location::postcode("2000"),
        };
        let profile = SensitivityProfile::with_defaults(SeverityTier::Mild);
        assert!(matches!(
            guidance_for(&RiskPolicy::default(), &reading, &profile),
            Err(GuardianError::InvalidReading { .. })
        ));
    }

    proptest! {
        #[test]
        fn composing_twice_is_byte_identical(
            ratios in proptest::collection::vec(1.0001f64..6.0, 5),
            take in 0usize..=5,
            level in proptest::sample::select(RiskLevel::ALL.to_vec()),
        ) {
            let breaches: Vec<Breach> = Pollutant::ALL
                .iter()
                .zip(ratios)
                .take(take)
                .map(|(p, r)| breach(*p, r))
                .collect();
            let mut reversed = breaches.clone();
            reversed.reverse();

            let first = serde_json::to_string(&compose(assessment(level, breaches)).unwrap()).unwrap();
            let second = serde_json::to_string(&compose(assessment(level, reversed)).unwrap()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn re_evaluating_a_reading_is_idempotent(
            pm25 in 0.0f64..120.0,
            ozone in 0.0f64..0.4,
            severity in proptest::sample::select(SeverityTier::ALL.to_vec()),
        ) {
            let reading = PollutantReading {
                concentrations: BTreeMap::from([(Pollutant::Pm25, pm25), (Pollutant::Ozone, ozone)]),
                captured_at: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
                location: Location::postcode("2000"),
            };
            let profile = SensitivityProfile::with_defaults(severity);
            let policy = RiskPolicy::default();
            let first = guidance_for(&policy, &reading, &profile).unwrap();
            let second = guidance_for(&policy, &reading, &profile).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
