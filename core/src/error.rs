use thiserror::Error;

/// Faults in data received from the metrics backend or typed in by a user.
///
/// These are surfaced to callers instead of being papered over with a default,
/// so corrupted server data shows up as an error rather than as "today".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("Invalid timestamp '{0}'. Must be ISO-8601 / RFC 3339")]
    InvalidTimestamp(String),
    #[error("Invalid date '{0}'. Must be YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Unknown metric '{0}'. Must be one of: {1}")]
    UnknownMetric(String, String),
    #[error("Invalid unit '{0}'. Use 'kg' or 'lbs'")]
    UnknownUnit(String),
    #[error("Unknown range '{0}'. Must be one of: 1week, 1month, ytd, max")]
    UnknownRange(String),
    #[error("Unknown goal status '{0}'. Must be one of: active, completed, canceled")]
    UnknownStatus(String),
    #[error("Unknown verification method '{0}'. Must be one of: dexa, calipers, scale, other")]
    UnknownVerifyMethod(String),
    #[error("{0} must be a finite number")]
    NonFiniteValue(&'static str),
    #[error("Weight must be greater than 0, got {0}")]
    InvalidWeight(f64),
    #[error(
        "Fat {fat:.1}% plus muscle {muscle:.1}% is more than 120%. Please double-check the values"
    )]
    ImplausibleComposition { fat: f64, muscle: f64 },
}
