use std::fmt::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{GuidancePayload, RiskAssessment, RiskLevel, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Immediate,
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Daily => "daily",
        }
    }
}

impl FromStr for Frequency {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "immediate" => Ok(Frequency::Immediate),
            "daily" => Ok(Frequency::Daily),
            other => anyhow::bail!("unknown notification frequency {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    #[serde(default)]
    pub frequency: Frequency,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        NotificationPreferences {
            email_enabled: true,
            sms_enabled: false,
            push_enabled: true,
            frequency: Frequency::Immediate,
        }
    }
}

impl NotificationPreferences {
    /// Enabled channels in delivery order.
    pub fn channels(&self) -> Vec<Channel> {
        [
            (Channel::Email, self.email_enabled),
            (Channel::Sms, self.sms_enabled),
            (Channel::Push, self.push_enabled),
        ]
        .into_iter()
        .filter_map(|(channel, enabled)| enabled.then_some(channel))
        .collect()
    }
}

/// Partial change to a user's preferences. Unset fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub frequency: Option<Frequency>,
}

impl PreferencesUpdate {
    pub fn is_empty(&self) -> bool {
        *self == PreferencesUpdate::default()
    }

    pub fn apply(&self, current: &NotificationPreferences) -> NotificationPreferences {
        NotificationPreferences {
            email_enabled: self.email_enabled.unwrap_or(current.email_enabled),
            sms_enabled: self.sms_enabled.unwrap_or(current.sms_enabled),
            push_enabled: self.push_enabled.unwrap_or(current.push_enabled),
            frequency: self.frequency.unwrap_or(current.frequency),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Suppress,
    Now(Vec<Channel>),
    Digest(Vec<Channel>),
}

/// Decide whether an assessment warrants a notification.
///
/// `previous_level` is the level of the user's preceding assessment, whether
/// or not it was sent. An alert goes out only when the level has risen since
/// then, so a drop in risk resets the baseline.
pub fn decide(
    previous_level: Option<RiskLevel>,
    assessment: &RiskAssessment,
    preferences: &NotificationPreferences,
) -> Dispatch {
    if assessment.risk_level == RiskLevel::Low {
        return Dispatch::Suppress;
    }
    if let Some(previous) = previous_level {
        if assessment.risk_level <= previous {
            return Dispatch::Suppress;
        }
    }
    let channels = preferences.channels();
    if channels.is_empty() {
        return Dispatch::Suppress;
    }
    match preferences.frequency {
        Frequency::Immediate => Dispatch::Now(channels),
        Frequency::Daily => Dispatch::Digest(channels),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
}

impl NotificationMessage {
    pub fn from_payload(location: &str, payload: &GuidancePayload) -> Self {
        let level = payload.risk_level();
        let subject = match level {
            RiskLevel::Low => format!("Air quality is fine in {location}"),
            RiskLevel::Moderate => format!("Air quality alert for {location}"),
            RiskLevel::High => format!("High asthma risk in {location}"),
            RiskLevel::VeryHigh => format!("URGENT: very high asthma risk in {location}"),
        };

        let mut body = String::new();
        let _ = writeln!(body, "{}", payload.explanation);
        let _ = writeln!(body);
        for recommendation in &payload.recommendations {
            let _ = writeln!(
                body,
                "- {}: {}",
                recommendation.title, recommendation.description
            );
        }
        let urgent: Vec<_> = payload
            .actions
            .iter()
            .filter(|a| a.urgency == Urgency::Immediate)
            .collect();
        if !urgent.is_empty() {
            let _ = writeln!(body);
            let _ = writeln!(body, "Act now:");
            for action in urgent {
                let _ = writeln!(body, "- {}", action.description);
            }
        }

        NotificationMessage { subject, body }
    }
}
