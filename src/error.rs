/// Failures surfaced by the risk evaluation core.
///
/// All variants are data-contract violations; none of them are retryable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GuardianError {
    #[error("invalid reading: {reason}")]
    InvalidReading { reason: String },

    #[error("invalid profile: {reason}")]
    InvalidProfile { reason: String },

    #[error("invalid severity tier: {value:?}")]
    InvalidSeverityTier { value: String },

    #[error("unknown risk level: {value:?}")]
    UnknownRiskLevel { value: String },
}

impl GuardianError {
    pub fn invalid_reading(reason: impl Into<String>) -> Self {
        GuardianError::InvalidReading {
            reason: reason.into(),
        }
    }

    pub fn invalid_profile(reason: impl Into<String>) -> Self {
        GuardianError::InvalidProfile {
            reason: reason.into(),
        }
    }

    /// HTTP status class a handler should answer with.
    ///
    /// Malformed upstream data is a client problem; severity and risk level
    /// failures mean an internal contract was broken.
    pub fn status_code(&self) -> u16 {
        match self {
            GuardianError::InvalidReading { .. } | GuardianError::InvalidProfile { .. } => 400,
            GuardianError::InvalidSeverityTier { .. } | GuardianError::UnknownRiskLevel { .. } => {
                500
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;
