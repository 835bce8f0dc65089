use crate::agent::AgentId;
use crate::clock::ClockState;
use std::time::Duration;
use thiserror::Error;

// Raised before any loop starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown fault model: {0}")]
    UnknownFaultModel(String),

    #[error("fault model {tag} expects {expected} parameter(s), got {got}")]
    ParameterCount {
        tag: String,
        expected: usize,
        got: usize,
    },

    #[error("drop probability must lie in [0, 1], got {0}")]
    Probability(f64),

    #[error("{name} must be a finite, non-negative number, got {value}")]
    NonNegative { name: &'static str, value: f64 },

    #[error("{name} must be a finite, positive number, got {value}")]
    Positive { name: &'static str, value: f64 },

    #[error("trial has no agents")]
    NoAgents,

    #[error("agent {0} is registered twice")]
    DuplicateAgent(AgentId),
}

impl ConfigError {
    pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(Self::NonNegative { name, value })
        }
    }

    pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(Self::Positive { name, value })
        }
    }

    // Seconds that fit a Duration. Huge values pass the sign checks above but
    // would overflow the conversion.
    pub(crate) fn duration(name: &'static str, secs: f64) -> Result<Duration, Self> {
        Self::check_non_negative(name, secs)?;
        Duration::try_from_secs_f64(secs).map_err(|_| Self::NonNegative { name, value: secs })
    }

    pub(crate) fn tick_period(tick_rate_hz: f64) -> Result<Duration, Self> {
        let invalid = Self::Positive {
            name: "tick rate",
            value: tick_rate_hz,
        };
        if !(tick_rate_hz.is_finite() && tick_rate_hz > 0.0) {
            return Err(invalid);
        }
        Duration::try_from_secs_f64(1.0 / tick_rate_hz).map_err(|_| invalid)
    }
}

// One failed publish to one agent. Logged by callers, never fatal.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("agent {0} is unreachable")]
    Unreachable(AgentId),

    #[error("channel to agent {0} is closed")]
    Closed(AgentId),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TrialError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("scenario clock cannot go from {from:?} to {to:?}")]
    Transition { from: ClockState, to: ClockState },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type TrialResult<T> = Result<T, TrialError>;
