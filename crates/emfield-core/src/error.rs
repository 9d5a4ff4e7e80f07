//! Structured error kinds surfaced at the engine boundary.
//!
//! The compute core itself never fails on numerics (ε floors guard every
//! degenerate ratio); everything here describes a rejected request or a
//! point query that cannot be answered. An empty grid is not an error.

use thiserror::Error;

/// EngineError subtypes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Structural or semantic violation of the request contract. `field` is
    /// the path of the offending field, reported verbatim to the caller.
    #[error("invalid request: {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    /// A policy-locked option (temporal aggregation, combine mode, metric)
    /// was asked to change.
    #[error("unsupported option: {option} = {value:?}")]
    UnsupportedOption { option: String, value: String },

    /// A point query's altitude does not match the computed slice. The
    /// service boundary translates this to a not-found response.
    #[error("query mismatch: requested altitude {requested_m} m, grid slice is {grid_m} m")]
    QueryMismatch { requested_m: f64, grid_m: f64 },

    /// A point query named a band the result does not carry.
    #[error("unknown band {0:?}")]
    UnknownBand(String),

    /// The queried cell is masked or below the no-data threshold.
    #[error("no data at the queried cell")]
    NoData,
}

impl EngineError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(option: impl Into<String>, value: impl Into<String>) -> Self {
        EngineError::UnsupportedOption {
            option: option.into(),
            value: value.into(),
        }
    }
}
