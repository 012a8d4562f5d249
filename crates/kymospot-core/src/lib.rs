//! # Kymospot Core
//!
//! Core types, errors, and traits for the kymospot particle analysis
//! system.
//!
//! This crate provides the foundational building blocks used throughout
//! the kymospot ecosystem, including:
//!
//! - **Core Data Types**: [`SearchPoint`], [`FittedSpot`], [`Trajectory`],
//!   and [`TrajectoryRecord`] for representing sub-pixel localizations and
//!   per-frame particle histories.
//!
//! - **Error Types**: contract-violation errors via the [`error`] module.
//!   Ordinary data irregularities (failed fits, missing frames) never
//!   surface as errors — they are absorbed as `None` slots.
//!
//! - **Traits**: the [`FrameProvider`] abstraction that supplies frames
//!   to the fitter, tracker, kymograph sampler, and colocalization engine.
//!
//! ## Example
//!
//! ```rust
//! use kymospot_core::{CancelToken, ChannelId, SearchPoint};
//!
//! let anchors = vec![
//!     SearchPoint::new(0, 12.0, 30.5),
//!     SearchPoint::new(10, 18.0, 31.0),
//! ];
//! let cancel = CancelToken::new();
//!
//! assert_eq!(anchors[0].center(), (12.0, 30.5));
//! assert!(!cancel.is_cancelled());
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use error::{CoreError, CoreResult};
pub use traits::{FrameProvider, MapFrameProvider};
pub use types::{
    CancelToken, ChannelId, FittedSpot, SearchPoint, StepSegment, Trajectory, TrajectoryId,
    TrajectoryRecord,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default side length of the square spot-fitting crop, in pixels
pub const DEFAULT_CROP_SIZE: usize = 16;

/// Nominal FWHM of the optical point-spread function, in nanometres
pub const PSF_FWHM_NM: f64 = 250.0;

/// Conversion factor between a Gaussian FWHM and its sigma
pub const FWHM_TO_SIGMA: f64 = 2.355;

/// Prelude module for convenient imports.
///
/// ```rust
/// use kymospot_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::traits::{FrameProvider, MapFrameProvider};
    pub use crate::types::{
        CancelToken, ChannelId, FittedSpot, SearchPoint, StepSegment, Trajectory, TrajectoryId,
        TrajectoryRecord,
    };
}
