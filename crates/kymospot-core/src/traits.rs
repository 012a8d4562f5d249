//! Core trait definitions for the kymospot system.
//!
//! # Traits
//!
//! - [`FrameProvider`]: Supply 2-D intensity frames by (frame index, channel)
//!
//! The provider is the single external resource shared by every
//! computational unit. Its own caching and thread-safety are outside the
//! core's responsibility; the core only requires determinism.

use std::collections::HashMap;

use ndarray::Array2;

use crate::types::ChannelId;

/// Source of 2-D intensity frames, keyed by (frame index, channel).
///
/// Implementations must be deterministic and idempotent: repeated calls
/// with the same arguments return the same image. `None` means the frame
/// is unavailable — callers absorb this per point exactly like a rejected
/// fit, never as an error.
///
/// # Example
///
/// ```rust
/// use kymospot_core::{ChannelId, FrameProvider, MapFrameProvider};
/// use ndarray::Array2;
///
/// let mut provider = MapFrameProvider::new();
/// provider.insert(0, ChannelId::new(0), Array2::zeros((8, 8)));
///
/// assert!(provider.has_frame(0, ChannelId::new(0)));
/// assert!(!provider.has_frame(1, ChannelId::new(0)));
/// ```
pub trait FrameProvider: Send + Sync {
    /// Returns the (H×W) intensity image for `frame` in `channel`, or
    /// `None` if the frame is unavailable.
    fn frame(&self, frame: usize, channel: ChannelId) -> Option<Array2<f64>>;

    /// Whether the provider can supply the given frame.
    fn has_frame(&self, frame: usize, channel: ChannelId) -> bool {
        self.frame(frame, channel).is_some()
    }
}

/// In-memory [`FrameProvider`] backed by a hash map.
///
/// Used throughout the test suites and useful as a small-stack adapter
/// when the caller already holds all frames.
#[derive(Debug, Clone, Default)]
pub struct MapFrameProvider {
    frames: HashMap<(usize, ChannelId), Array2<f64>>,
}

impl MapFrameProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a frame.
    pub fn insert(&mut self, frame: usize, channel: ChannelId, image: Array2<f64>) {
        self.frames.insert((frame, channel), image);
    }

    /// Number of stored frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the provider holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameProvider for MapFrameProvider {
    fn frame(&self, frame: usize, channel: ChannelId) -> Option<Array2<f64>> {
        self.frames.get(&(frame, channel)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_provider_round_trip() {
        let mut provider = MapFrameProvider::new();
        let image = Array2::from_elem((4, 6), 3.5);
        provider.insert(7, ChannelId::new(1), image.clone());

        assert_eq!(provider.frame(7, ChannelId::new(1)), Some(image));
        assert_eq!(provider.frame(7, ChannelId::new(0)), None);
        assert_eq!(provider.frame(8, ChannelId::new(1)), None);
    }

    #[test]
    fn test_map_provider_is_idempotent() {
        let mut provider = MapFrameProvider::new();
        provider.insert(0, ChannelId::new(0), Array2::zeros((2, 2)));

        let a = provider.frame(0, ChannelId::new(0));
        let b = provider.frame(0, ChannelId::new(0));
        assert_eq!(a, b);
    }
}
