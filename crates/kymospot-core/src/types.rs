//! Core data types for the kymospot analysis system.
//!
//! # Type Categories
//!
//! - **Identity**: [`TrajectoryId`], [`ChannelId`]
//! - **Localization**: [`SearchPoint`], [`FittedSpot`]
//! - **Trajectories**: [`Trajectory`], [`StepSegment`], [`TrajectoryRecord`]
//! - **Control**: [`CancelToken`]
//!
//! "No detection" is always an explicit `None`, never a sentinel value —
//! a trajectory slot holding `None` is an expected outcome that keeps
//! failed fits distinguishable from legitimate zero or negative values.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Identity types
// =============================================================================

/// Zero-based index of an acquisition channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ChannelId(u16);

impl ChannelId {
    /// Creates a channel ID from a zero-based index.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the zero-based channel index.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Stable identifier for a trajectory, surviving recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrajectoryId(Uuid);

impl TrajectoryId {
    /// Allocates a new random trajectory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a trajectory ID from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrows the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TrajectoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Localization types
// =============================================================================

/// An approximate seed location for spot fitting: (frame, x, y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchPoint {
    /// Frame index within the stack
    pub frame: usize,
    /// Approximate x (column) coordinate in pixels
    pub x: f64,
    /// Approximate y (row) coordinate in pixels
    pub y: f64,
}

impl SearchPoint {
    /// Creates a new search point.
    #[must_use]
    pub fn new(frame: usize, x: f64, y: f64) -> Self {
        Self { frame, x, y }
    }

    /// Returns the (x, y) coordinate pair.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// A successful sub-pixel Gaussian fit.
///
/// A rejected or failed fit is represented as `Option::<FittedSpot>::None`;
/// every field of a constructed `FittedSpot` is therefore always defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedSpot {
    /// Sub-pixel x (column) coordinate of the fitted center
    pub x: f64,
    /// Sub-pixel y (row) coordinate of the fitted center
    pub y: f64,
    /// Mean of the fitted σx and σy, in pixels
    pub sigma: f64,
    /// Fitted amplitude above background
    pub peak: f64,
    /// Fitted (or measured) background level
    pub background: f64,
    /// Integrated intensity: 2π·A·σx·σy
    pub intensity: f64,
}

impl FittedSpot {
    /// Returns the fitted center as an (x, y) pair.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Euclidean distance from the fitted center to `other`.
    #[must_use]
    pub fn distance_to(&self, other: (f64, f64)) -> f64 {
        ((self.x - other.0).powi(2) + (self.y - other.1).powi(2)).sqrt()
    }
}

// =============================================================================
// Trajectory types
// =============================================================================

/// A constant-intensity segment between two step boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSegment {
    /// First frame of the segment (inclusive)
    pub start_frame: usize,
    /// Last frame of the segment (inclusive)
    pub end_frame: usize,
    /// Median of the smoothed intensity over the segment
    pub median: f64,
}

/// Per-frame particle history built by the trajectory tracker.
///
/// All arrays have the same length and `frames` is strictly increasing;
/// any non-frame element may independently be `None`. The struct is
/// mutated only by full recomputation (atomic array replacement) or by
/// single-point invalidation via [`Trajectory::set_spot`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// Stable identifier
    pub id: TrajectoryId,
    /// Channel the trajectory was tracked in
    pub channel: ChannelId,
    /// Strictly increasing frame indices
    pub frames: Vec<usize>,
    /// Seed center actually used for fitting at each frame
    pub search_centers: Vec<(f64, f64)>,
    /// Per-frame fit results; `None` = rejected / unavailable
    pub spots: Vec<Option<FittedSpot>>,
    /// Frame-to-frame displacement; `None` if either endpoint is undefined
    pub velocities: Vec<Option<f64>>,
    /// Whether tracking was cancelled; arrays then hold the computed prefix
    pub cancelled: bool,
    /// Detected intensity-step segments, when step detection has run
    pub step_segments: Option<Vec<StepSegment>>,
    /// Per-target-channel colocalization flags, when colocalization has run
    pub coloc: BTreeMap<ChannelId, Vec<Option<bool>>>,
}

impl Trajectory {
    /// Creates an empty trajectory for `channel` with a fresh ID.
    #[must_use]
    pub fn new(channel: ChannelId) -> Self {
        Self {
            id: TrajectoryId::new(),
            channel,
            frames: Vec::new(),
            search_centers: Vec::new(),
            spots: Vec::new(),
            velocities: Vec::new(),
            cancelled: false,
            step_segments: None,
            coloc: BTreeMap::new(),
        }
    }

    /// Number of frames in the trajectory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the trajectory holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames with a defined fit.
    #[must_use]
    pub fn defined_spot_count(&self) -> usize {
        self.spots.iter().filter(|s| s.is_some()).count()
    }

    /// Per-frame fitted centers.
    #[must_use]
    pub fn spot_centers(&self) -> Vec<Option<(f64, f64)>> {
        self.spots.iter().map(|s| s.map(|s| s.center())).collect()
    }

    /// Per-frame integrated intensities.
    #[must_use]
    pub fn intensities(&self) -> Vec<Option<f64>> {
        self.spots.iter().map(|s| s.map(|s| s.intensity)).collect()
    }

    /// Per-frame fitted sigmas.
    #[must_use]
    pub fn sigmas(&self) -> Vec<Option<f64>> {
        self.spots.iter().map(|s| s.map(|s| s.sigma)).collect()
    }

    /// Mean sigma over defined fits, or `None` if no fit succeeded.
    #[must_use]
    pub fn mean_sigma(&self) -> Option<f64> {
        let defined: Vec<f64> = self.spots.iter().flatten().map(|s| s.sigma).collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    }

    /// Recomputes the full velocity array from the current spots.
    ///
    /// `velocities[i]` is the Euclidean displacement from frame `i−1` to
    /// frame `i`; the first entry and any entry with an undefined endpoint
    /// are `None`.
    pub fn recompute_velocities(&mut self) {
        let n = self.spots.len();
        let mut velocities = vec![None; n];
        for i in 1..n {
            if let (Some(prev), Some(curr)) = (&self.spots[i - 1], &self.spots[i]) {
                velocities[i] = Some(curr.distance_to(prev.center()));
            }
        }
        self.velocities = velocities;
    }

    /// Replaces (or invalidates, with `None`) the fit at `frame`, updating
    /// the two adjacent velocities. Returns `false` if the frame is not
    /// part of the trajectory.
    pub fn set_spot(&mut self, frame: usize, spot: Option<FittedSpot>) -> bool {
        let Some(i) = self.frames.iter().position(|&f| f == frame) else {
            return false;
        };
        self.spots[i] = spot;
        for j in [i, i + 1] {
            if j == 0 || j >= self.spots.len() {
                continue;
            }
            self.velocities[j] = match (&self.spots[j - 1], &self.spots[j]) {
                (Some(prev), Some(curr)) => Some(curr.distance_to(prev.center())),
                _ => None,
            };
        }
        true
    }

    /// Converts the trajectory to its persistable record form.
    #[must_use]
    pub fn to_record(&self) -> TrajectoryRecord {
        TrajectoryRecord {
            id: self.id,
            channel: self.channel,
            frames: self.frames.clone(),
            search_centers: self.search_centers.clone(),
            spot_centers: self.spot_centers(),
            sigmas: self.sigmas(),
            peaks: self.spots.iter().map(|s| s.map(|s| s.peak)).collect(),
            backgrounds: self.spots.iter().map(|s| s.map(|s| s.background)).collect(),
            intensities: self.intensities(),
            coloc_flags: self.coloc.clone(),
            step_segments: self.step_segments.clone(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Rebuilds a trajectory from its record form.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the record's parallel arrays have
    /// mismatched lengths, its frames are not strictly increasing, or a
    /// spot is only partially defined.
    pub fn from_record(record: &TrajectoryRecord) -> CoreResult<Self> {
        let n = record.frames.len();
        if record.search_centers.len() != n
            || record.spot_centers.len() != n
            || record.sigmas.len() != n
            || record.peaks.len() != n
            || record.backgrounds.len() != n
            || record.intensities.len() != n
        {
            return Err(CoreError::validation("record arrays have mismatched lengths"));
        }
        if record.frames.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CoreError::validation("record frames are not strictly increasing"));
        }

        let mut spots = Vec::with_capacity(n);
        for i in 0..n {
            let spot = match (
                record.spot_centers[i],
                record.sigmas[i],
                record.peaks[i],
                record.backgrounds[i],
                record.intensities[i],
            ) {
                (Some((x, y)), Some(sigma), Some(peak), Some(background), Some(intensity)) => {
                    Some(FittedSpot {
                        x,
                        y,
                        sigma,
                        peak,
                        background,
                        intensity,
                    })
                }
                (None, None, None, None, None) => None,
                _ => {
                    return Err(CoreError::validation(format!(
                        "partially defined spot at index {i}"
                    )))
                }
            };
            spots.push(spot);
        }

        let mut trajectory = Self {
            id: record.id,
            channel: record.channel,
            frames: record.frames.clone(),
            search_centers: record.search_centers.clone(),
            spots,
            velocities: Vec::new(),
            cancelled: false,
            step_segments: record.step_segments.clone(),
            coloc: record.coloc_flags.clone(),
        };
        trajectory.recompute_velocities();
        Ok(trajectory)
    }
}

/// Persisted form of a [`Trajectory`], designed for lossless round-trip
/// through the external serialization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Stable trajectory identifier
    pub id: TrajectoryId,
    /// Channel the trajectory was tracked in
    pub channel: ChannelId,
    /// Strictly increasing frame indices
    pub frames: Vec<usize>,
    /// Seed centers used for fitting
    pub search_centers: Vec<(f64, f64)>,
    /// Fitted sub-pixel centers
    pub spot_centers: Vec<Option<(f64, f64)>>,
    /// Fitted sigmas
    pub sigmas: Vec<Option<f64>>,
    /// Fitted peak amplitudes
    pub peaks: Vec<Option<f64>>,
    /// Fitted background levels
    pub backgrounds: Vec<Option<f64>>,
    /// Integrated intensities
    pub intensities: Vec<Option<f64>>,
    /// Per-target-channel colocalization flags
    #[serde(default)]
    pub coloc_flags: BTreeMap<ChannelId, Vec<Option<bool>>>,
    /// Detected step segments, if step detection has run
    pub step_segments: Option<Vec<StepSegment>>,
    /// When the record was produced
    pub created_at: DateTime<Utc>,
    /// Additional custom metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Control types
// =============================================================================

/// Cooperative cancellation token for long-running loops.
///
/// Checked once per outer loop iteration by the tracker and the
/// colocalization engine; cancellation preserves already-computed prefix
/// results as valid partial output. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
