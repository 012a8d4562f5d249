//! Error types for the kymospot analytical core.
//!
//! Only contract violations surface as errors. Per-frame irregularities —
//! a fit rejected on a noisy frame, a frame the provider cannot supply —
//! are absorbed as `None` slots in the output arrays and never reach this
//! module. Cancellation is a partial-success result carried on
//! [`Trajectory`](crate::types::Trajectory), not an error either.
//!
//! # Example
//!
//! ```rust
//! use kymospot_core::error::CoreError;
//!
//! fn validate_anchor_count(n: usize) -> Result<(), CoreError> {
//!     if n < 2 {
//!         return Err(CoreError::InsufficientPoints { required: 2, available: n });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Contract-violation errors for the kymospot core.
///
/// Every variant corresponds to invalid *input*, never to ordinary data
/// irregularities such as noise or missing frames.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Too few anchor points to define a trajectory
    #[error("Insufficient anchor points: need at least {required}, got {available}")]
    InsufficientPoints {
        /// Minimum required anchors
        required: usize,
        /// Anchors actually supplied
        available: usize,
    },

    /// Anchor frames out of order or duplicated
    #[error("Anchor frames must be strictly increasing (violation at index {index})")]
    NonIncreasingFrames {
        /// Index of the offending anchor
        index: usize,
    },

    /// A kymograph path with fewer than two vertices
    #[error("Degenerate ROI: a kymograph path needs at least 2 vertices, got {vertices}")]
    DegenerateRoi {
        /// Vertices actually supplied
        vertices: usize,
    },

    /// Invalid configuration parameters
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Validation error for input data
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what validation failed
        message: String,
    },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl CoreError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
