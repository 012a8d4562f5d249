//! Kymospot Analysis Library
//!
//! The analytical core for time-lapse fluorescence microscopy: sub-pixel
//! particle localization, multi-strategy trajectory tracking, ROI
//! kymograph sampling, intensity step detection, and cross-channel
//! colocalization.
//!
//! # Features
//!
//! - **Spot Fitting**: weighted Levenberg–Marquardt 2-D Gaussian fits
//!   with noise gating and bounded refinement
//! - **Tracking**: Independent / Tracked / Smooth / SameCenter strategies
//!   over ordered anchor streams, with cooperative cancellation
//! - **Kymographs**: batched bilinear ROI sampling into space-time images
//! - **Step Detection**: edge-preserving filtering and piecewise-constant
//!   segmentation of intensity series
//! - **Colocalization**: per-point cross-channel spot correspondence
//!
//! # Example
//!
//! ```rust,no_run
//! use kymospot_analysis::{
//!     GaussianSpotFitter, SpotFitterConfig, TrackerConfig, TrackingMode, TrajectoryTracker,
//! };
//! use kymospot_core::{CancelToken, ChannelId, MapFrameProvider, SearchPoint};
//!
//! let fitter = GaussianSpotFitter::new(
//!     SpotFitterConfig::builder().crop_size(16).pixel_size_nm(107.0).build(),
//! );
//! let tracker = TrajectoryTracker::new(
//!     fitter,
//!     TrackerConfig::builder().mode(TrackingMode::Tracked).build(),
//! );
//!
//! let provider = MapFrameProvider::new();
//! let anchors = vec![
//!     SearchPoint::new(0, 24.0, 30.0),
//!     SearchPoint::new(100, 80.0, 32.0),
//! ];
//! let trajectory = tracker
//!     .track(&anchors, &provider, ChannelId::new(0), &CancelToken::new(), None)
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]

pub mod coloc;
pub mod fit;
pub mod kymograph;
pub mod savgol;
pub mod steps;
pub mod track;

// Re-export main types for convenience
pub use coloc::{
    ChannelColocalization, ColocalizationConfig, ColocalizationEngine, ColocalizationSummary,
};
pub use fit::{GaussianSpotFitter, SpotFitterConfig, SpotFitterConfigBuilder};
pub use kymograph::{
    log_enhance, sample_kymograph, Kymograph, KymographConfig, ReduceMethod, Roi,
};
pub use savgol::{savgol_coefficients, savgol_smooth};
pub use steps::{detect_steps, edge_filter, StepDetection, StepDetectorConfig};
pub use track::{
    DuplicateGuard, TrackerConfig, TrackerConfigBuilder, TrackingMode, TrajectoryTracker,
};

// The error surface is the core contract-violation taxonomy; per-frame
// irregularities never become errors.
pub use kymospot_core::{CoreError, CoreResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coloc::{ColocalizationConfig, ColocalizationEngine};
    pub use crate::fit::{GaussianSpotFitter, SpotFitterConfig};
    pub use crate::kymograph::{sample_kymograph, Kymograph, KymographConfig, ReduceMethod, Roi};
    pub use crate::steps::{detect_steps, StepDetection, StepDetectorConfig};
    pub use crate::track::{DuplicateGuard, TrackerConfig, TrackingMode, TrajectoryTracker};
    pub use crate::{CoreError, CoreResult};
    pub use kymospot_core::prelude::*;
}
