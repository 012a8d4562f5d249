//! Cross-channel colocalization.
//!
//! Tests, per trajectory point, whether a corresponding spot exists in
//! other channels: the reference center is re-fit in each target channel
//! and flagged `Some(true)` when the re-fit center lies within the
//! threshold, `Some(false)` when a fit succeeds farther away, and `None`
//! when either the reference or the re-fit is undefined.
//!
//! Per-channel percentages count Yes / (Yes + No) over defined flags only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kymospot_core::{CancelToken, ChannelId, FrameProvider, Trajectory};

use crate::fit::GaussianSpotFitter;

/// Configuration for the colocalization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColocalizationConfig {
    /// Maximum center distance, in pixels, for a "Yes" flag
    pub threshold_px: f64,
    /// Channels to test; the trajectory's own channel is skipped
    pub channels: Vec<ChannelId>,
}

impl Default for ColocalizationConfig {
    fn default() -> Self {
        Self {
            threshold_px: 2.0,
            channels: Vec::new(),
        }
    }
}

/// Per-channel colocalization counts and percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelColocalization {
    /// Points whose re-fit landed within the threshold
    pub yes: usize,
    /// Points whose re-fit succeeded but landed farther away
    pub no: usize,
    /// Points where either fit was undefined
    pub undefined: usize,
    /// Yes / (Yes + No) as a percentage, `None` with no defined flags
    pub percentage: Option<f64>,
}

/// Summary of a trajectory-level colocalization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColocalizationSummary {
    /// One entry per tested target channel
    pub per_channel: BTreeMap<ChannelId, ChannelColocalization>,
}

/// Tests spots against their counterparts in other channels.
pub struct ColocalizationEngine {
    fitter: GaussianSpotFitter,
    config: ColocalizationConfig,
}

impl ColocalizationEngine {
    /// Creates an engine around an existing fitter.
    #[must_use]
    pub fn new(fitter: GaussianSpotFitter, config: ColocalizationConfig) -> Self {
        Self { fitter, config }
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &ColocalizationConfig {
        &self.config
    }

    /// Tests one point against one target channel.
    ///
    /// `None` means undefined: the frame was unavailable or the re-fit
    /// was rejected.
    #[must_use]
    pub fn colocalize_point(
        &self,
        provider: &dyn FrameProvider,
        frame: usize,
        reference: (f64, f64),
        channel: ChannelId,
    ) -> Option<bool> {
        let image = provider.frame(frame, channel)?;
        let spot = self.fitter.fit(&image, reference)?;
        Some(spot.distance_to(reference) <= self.config.threshold_px)
    }

    /// Tests one point against every configured channel.
    #[must_use]
    pub fn colocalize_frame(
        &self,
        provider: &dyn FrameProvider,
        frame: usize,
        reference: (f64, f64),
    ) -> BTreeMap<ChannelId, Option<bool>> {
        self.config
            .channels
            .iter()
            .map(|&ch| (ch, self.colocalize_point(provider, frame, reference, ch)))
            .collect()
    }

    /// Runs colocalization over a whole trajectory, storing per-channel
    /// flag arrays on the trajectory and returning the summary.
    ///
    /// The trajectory's own channel is excluded from the targets.
    /// Cancellation is cooperative, checked once per frame; flags past the
    /// cancellation point stay `None`.
    pub fn colocalize_trajectory(
        &self,
        provider: &dyn FrameProvider,
        trajectory: &mut Trajectory,
        cancel: &CancelToken,
    ) -> ColocalizationSummary {
        let targets: Vec<ChannelId> = self
            .config
            .channels
            .iter()
            .copied()
            .filter(|&ch| ch != trajectory.channel)
            .collect();

        let n = trajectory.len();
        let mut flags: BTreeMap<ChannelId, Vec<Option<bool>>> =
            targets.iter().map(|&ch| (ch, vec![None; n])).collect();

        for i in 0..n {
            if cancel.is_cancelled() {
                debug!(frame = trajectory.frames[i], "colocalization cancelled");
                break;
            }
            let Some(reference) = trajectory.spots[i].map(|s| s.center()) else {
                continue; // undefined reference stays None in every channel
            };
            for &channel in &targets {
                let flag =
                    self.colocalize_point(provider, trajectory.frames[i], reference, channel);
                flags.get_mut(&channel).expect("target channel")[i] = flag;
            }
        }

        let mut summary = ColocalizationSummary::default();
        for (channel, channel_flags) in &flags {
            let yes = channel_flags.iter().filter(|f| **f == Some(true)).count();
            let no = channel_flags.iter().filter(|f| **f == Some(false)).count();
            let undefined = n - yes - no;
            let percentage = if yes + no > 0 {
                Some(100.0 * yes as f64 / (yes + no) as f64)
            } else {
                None
            };
            summary.per_channel.insert(
                *channel,
                ChannelColocalization {
                    yes,
                    no,
                    undefined,
                    percentage,
                },
            );
        }

        trajectory.coloc = flags;
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::SpotFitterConfig;
    use crate::track::{TrackerConfig, TrajectoryTracker};
    use kymospot_core::{MapFrameProvider, SearchPoint};
    use ndarray::Array2;

    const CH0: ChannelId = ChannelId::new(0);
    const CH1: ChannelId = ChannelId::new(1);

    fn frame_with_spot(x0: f64, y0: f64) -> Array2<f64> {
        Array2::from_shape_fn((48, 48), |(row, col)| {
            let dx = col as f64 - x0;
            let dy = row as f64 - y0;
            100.0 * (-(dx * dx + dy * dy) / (2.0 * 1.5 * 1.5)).exp() + 10.0
        })
    }

    fn engine(threshold: f64, channels: Vec<ChannelId>) -> ColocalizationEngine {
        ColocalizationEngine::new(
            GaussianSpotFitter::new(SpotFitterConfig::default()),
            ColocalizationConfig {
                threshold_px: threshold,
                channels,
            },
        )
    }

    #[test]
    fn test_same_position_is_yes() {
        let mut provider = MapFrameProvider::new();
        provider.insert(0, CH1, frame_with_spot(20.0, 20.0));

        let engine = engine(2.0, vec![CH1]);
        let flag = engine.colocalize_point(&provider, 0, (20.0, 20.0), CH1);
        assert_eq!(flag, Some(true));
    }

    #[test]
    fn test_offset_beyond_threshold_is_no() {
        let mut provider = MapFrameProvider::new();
        provider.insert(0, CH1, frame_with_spot(23.0, 20.0)); // 3 px off

        let engine = engine(1.0, vec![CH1]);
        let flag = engine.colocalize_point(&provider, 0, (20.0, 20.0), CH1);
        assert_eq!(flag, Some(false));
    }

    #[test]
    fn test_missing_frame_is_undefined() {
        let provider = MapFrameProvider::new();
        let engine = engine(2.0, vec![CH1]);
        assert_eq!(engine.colocalize_point(&provider, 0, (20.0, 20.0), CH1), None);
    }

    #[test]
    fn test_empty_channel_image_is_undefined() {
        let mut provider = MapFrameProvider::new();
        provider.insert(0, CH1, Array2::from_elem((48, 48), 10.0));

        let engine = engine(2.0, vec![CH1]);
        assert_eq!(engine.colocalize_point(&provider, 0, (20.0, 20.0), CH1), None);
    }

    fn two_channel_movie(n: usize, ch1_offset: f64) -> MapFrameProvider {
        let mut provider = MapFrameProvider::new();
        for f in 0..n {
            let x = 15.0 + f as f64;
            provider.insert(f, CH0, frame_with_spot(x, 24.0));
            provider.insert(f, CH1, frame_with_spot(x + ch1_offset, 24.0));
        }
        provider
    }

    fn tracked(provider: &MapFrameProvider, n: usize) -> Trajectory {
        let tracker =
            TrajectoryTracker::new(GaussianSpotFitter::with_defaults(), TrackerConfig::default());
        let points = vec![
            SearchPoint::new(0, 15.0, 24.0),
            SearchPoint::new(n - 1, 15.0 + (n - 1) as f64, 24.0),
        ];
        tracker
            .track(&points, provider, CH0, &CancelToken::new(), None)
            .unwrap()
    }

    #[test]
    fn test_trajectory_level_colocalization() {
        let n = 6;
        let provider = two_channel_movie(n, 0.0);
        let mut trajectory = tracked(&provider, n);

        // Reference channel in the target list is skipped.
        let engine = engine(2.0, vec![CH0, CH1]);
        let summary = engine.colocalize_trajectory(&provider, &mut trajectory, &CancelToken::new());

        assert_eq!(summary.per_channel.len(), 1);
        let ch1 = &summary.per_channel[&CH1];
        assert_eq!(ch1.yes, n);
        assert_eq!(ch1.no, 0);
        assert_eq!(ch1.percentage, Some(100.0));
        assert_eq!(trajectory.coloc[&CH1].len(), n);
        assert!(trajectory.coloc[&CH1].iter().all(|f| *f == Some(true)));
    }

    #[test]
    fn test_offset_channel_scores_zero_percent() {
        let n = 5;
        let provider = two_channel_movie(n, 3.0);
        let mut trajectory = tracked(&provider, n);

        let engine = engine(1.0, vec![CH1]);
        let summary = engine.colocalize_trajectory(&provider, &mut trajectory, &CancelToken::new());

        let ch1 = &summary.per_channel[&CH1];
        assert_eq!(ch1.yes, 0);
        assert_eq!(ch1.no, n);
        assert_eq!(ch1.percentage, Some(0.0));
    }

    #[test]
    fn test_cancelled_run_leaves_flags_undefined() {
        let n = 5;
        let provider = two_channel_movie(n, 0.0);
        let mut trajectory = tracked(&provider, n);

        let cancel = CancelToken::new();
        cancel.cancel();
        let engine = engine(2.0, vec![CH1]);
        let summary = engine.colocalize_trajectory(&provider, &mut trajectory, &cancel);

        let ch1 = &summary.per_channel[&CH1];
        assert_eq!(ch1.yes, 0);
        assert_eq!(ch1.no, 0);
        assert_eq!(ch1.undefined, n);
        assert_eq!(ch1.percentage, None);
    }

    #[test]
    fn test_undefined_reference_stays_undefined() {
        let n = 5;
        let provider = two_channel_movie(n, 0.0);
        let mut trajectory = tracked(&provider, n);
        trajectory.set_spot(2, None); // invalidate one reference point

        let engine = engine(2.0, vec![CH1]);
        engine.colocalize_trajectory(&provider, &mut trajectory, &CancelToken::new());

        assert_eq!(trajectory.coloc[&CH1][2], None);
        assert_eq!(trajectory.coloc[&CH1][1], Some(true));
    }
}
