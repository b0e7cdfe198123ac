//! Custom error types for the downscaler
//!
//! Provides structured error handling with context for different failure scenarios.

use std::fmt;

/// Main error type for the downscaler
#[derive(Debug)]
pub enum DownscalerError {
    /// Policy validation errors
    Policy(PolicyError),

    /// Time window and recurrence parsing errors
    Window(WindowError),

    /// Persisted state errors
    State(StateError),

    /// Kubernetes API errors
    Cluster(ClusterError),

    /// Other errors with context
    Other(String),
}

/// Policy validation error variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// `timeZone` is empty
    TimeZoneNotFound,

    /// `timeZone` is not a known IANA zone
    InvalidTimeZone { timezone: String },

    /// `recurrence` is empty
    RecurrenceNotFound,

    /// `recurrence` names no weekday
    InvalidRecurrence { recurrence: String },

    /// Match expression key other than `namespace`
    InvalidExpressionKey { key: String },

    /// Match expression operator other than `exclude`/`notExclude`
    InvalidExpressionOperator { operator: String },

    /// The policy document could not be decoded
    ParseError { reason: String },

    /// The policy document is missing from its ConfigMap
    MissingDocument { key: String },
}

/// Window and recurrence error variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The window does not have exactly two `-` separated parts
    MalformedWindow { window: String },

    /// One side of the window is not a valid time of day
    InvalidTime { time: String },

    /// Both sides of the window are the same time of day
    EmptyWindow { window: String },

    /// The local time does not exist in the timezone
    NonexistentLocalTime { time: String, timezone: String },
}

/// Persisted state error variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A fingerprint does not have the expected fields
    MalformedFingerprint { fingerprint: String },

    /// A numeric fingerprint field failed to parse
    InvalidNumber { fingerprint: String, field: String },

    /// None of the task namespaces has a tracked deployment
    NoTrackedDeployments,

    /// The average state code matches no known state
    UnclassifiedAverage { average: i64 },

    /// A state record could not be decoded
    DecodeFailed { key: String, reason: String },
}

/// Kubernetes API error variants
#[derive(Debug)]
pub enum ClusterError {
    /// API request failed
    RequestFailed { operation: String, reason: String },

    /// API request timed out
    Timeout { operation: String },
}

// Implement Display for all error types
impl fmt::Display for DownscalerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownscalerError::Policy(e) => write!(f, "Policy error: {}", e),
            DownscalerError::Window(e) => write!(f, "Window error: {}", e),
            DownscalerError::State(e) => write!(f, "State error: {}", e),
            DownscalerError::Cluster(e) => write!(f, "Cluster error: {}", e),
            DownscalerError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::TimeZoneNotFound => write!(f, "time zone is missing"),
            PolicyError::InvalidTimeZone { timezone } => {
                write!(f, "time zone '{}' could not be loaded", timezone)
            }
            PolicyError::RecurrenceNotFound => write!(f, "recurrence time is missing"),
            PolicyError::InvalidRecurrence { recurrence } => {
                write!(f, "recurrence '{}' names no weekday", recurrence)
            }
            PolicyError::InvalidExpressionKey { key } => {
                write!(f, "not valid expression key '{}'", key)
            }
            PolicyError::InvalidExpressionOperator { operator } => {
                write!(f, "not valid expression operator '{}'", operator)
            }
            PolicyError::ParseError { reason } => {
                write!(f, "failed to parse policy: {}", reason)
            }
            PolicyError::MissingDocument { key } => {
                write!(f, "policy key '{}' not found", key)
            }
        }
    }
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowError::MalformedWindow { window } => {
                write!(f, "window '{}' must look like HH:MM-HH:MM", window)
            }
            WindowError::InvalidTime { time } => {
                write!(f, "'{}' is not a valid time of day", time)
            }
            WindowError::EmptyWindow { window } => {
                write!(f, "window '{}' starts and ends at the same time", window)
            }
            WindowError::NonexistentLocalTime { time, timezone } => {
                write!(f, "local time {} does not exist in {}", time, timezone)
            }
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::MalformedFingerprint { fingerprint } => {
                write!(f, "malformed fingerprint '{}'", fingerprint)
            }
            StateError::InvalidNumber { fingerprint, field } => {
                write!(f, "invalid {} in fingerprint '{}'", field, fingerprint)
            }
            StateError::NoTrackedDeployments => {
                write!(f, "no tracked deployments to classify")
            }
            StateError::UnclassifiedAverage { average } => {
                write!(f, "average state code {} matches no known state", average)
            }
            StateError::DecodeFailed { key, reason } => {
                write!(f, "failed to decode state record '{}': {}", key, reason)
            }
        }
    }
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::RequestFailed { operation, reason } => {
                write!(f, "{} failed: {}", operation, reason)
            }
            ClusterError::Timeout { operation } => {
                write!(f, "{} timed out", operation)
            }
        }
    }
}

// Implement std::error::Error
impl std::error::Error for DownscalerError {}
impl std::error::Error for PolicyError {}
impl std::error::Error for WindowError {}
impl std::error::Error for StateError {}
impl std::error::Error for ClusterError {}

impl From<anyhow::Error> for DownscalerError {
    fn from(err: anyhow::Error) -> Self {
        DownscalerError::Other(err.to_string())
    }
}

impl From<PolicyError> for DownscalerError {
    fn from(err: PolicyError) -> Self {
        DownscalerError::Policy(err)
    }
}

impl From<WindowError> for DownscalerError {
    fn from(err: WindowError) -> Self {
        DownscalerError::Window(err)
    }
}

impl From<StateError> for DownscalerError {
    fn from(err: StateError) -> Self {
        DownscalerError::State(err)
    }
}

impl From<ClusterError> for DownscalerError {
    fn from(err: ClusterError) -> Self {
        DownscalerError::Cluster(err)
    }
}
