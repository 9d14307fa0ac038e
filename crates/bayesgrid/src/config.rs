//! Configuration validation errors shared by the option builders.
//!
//! Every option struct in the crate ([`PeakFitConfig`](crate::PeakFitConfig),
//! [`MixtureConfig`](crate::MixtureConfig),
//! [`CloughTocherOptions`](crate::CloughTocherOptions),
//! [`MinimumCurvatureConfig`](crate::MinimumCurvatureConfig)) is built with
//! a `bon` builder whose `build()` validates and returns [`ConfigError`].

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A strictly positive value was required.
    #[error("{field} must be > 0, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    /// A non-negative value was required.
    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// A `(low, high)` pair was out of order or not finite.
    #[error("{field} must satisfy low <= high, got ({low}, {high})")]
    InvalidBounds {
        field: &'static str,
        low: f64,
        high: f64,
    },

    /// An integer range was empty.
    #[error("{field} must satisfy min <= max, got ({min}, {max})")]
    InvalidRange {
        field: &'static str,
        min: usize,
        max: usize,
    },

    /// A value fell outside a closed interval.
    #[error("{field} must lie in [{low}, {high}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        low: f64,
        high: f64,
    },

    /// A count that must be at least one was zero.
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

pub(crate) fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

pub(crate) fn check_bounds(field: &'static str, bounds: Option<(f64, f64)>) -> Result<(), ConfigError> {
    match bounds {
        Some((low, high)) if !(low <= high) => Err(ConfigError::InvalidBounds { field, low, high }),
        _ => Ok(()),
    }
}

pub(crate) fn check_in_range(field: &'static str, value: f64, low: f64, high: f64) -> Result<(), ConfigError> {
    if (low..=high).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, low, high })
    }
}
