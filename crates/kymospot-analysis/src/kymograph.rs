//! Kymograph sampling.
//!
//! Converts a polyline ROI plus a frame stack into a 2-D space-time
//! intensity image: rows are frames, columns are equally spaced positions
//! along the path. Intensity at each position integrates a band of
//! bilinear samples taken along the local unit normal, reduced by max or
//! average.
//!
//! The coordinate lookup is batched across all (position × offset) pairs
//! per frame. Output is purely derived from (ROI, frames, width, method)
//! and is identical across repeated calls.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use kymospot_core::{ChannelId, CoreError, CoreResult, FrameProvider};

/// Ordered polyline path along which a kymograph is sampled.
///
/// Immutable once constructed; construction rejects paths with fewer
/// than two vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    vertices: Vec<(f64, f64)>,
}

impl Roi {
    /// Creates an ROI from ordered (x, y) vertices.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DegenerateRoi`] for fewer than two vertices.
    pub fn new(vertices: Vec<(f64, f64)>) -> CoreResult<Self> {
        if vertices.len() < 2 {
            return Err(CoreError::DegenerateRoi {
                vertices: vertices.len(),
            });
        }
        Ok(Self { vertices })
    }

    /// Borrows the vertex list.
    #[must_use]
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Total arclength of the polyline.
    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|w| segment_length(w[0], w[1]))
            .sum()
    }

    /// Equally spaced sample positions along the path and the unit normal
    /// at each, derived from finite-difference tangents.
    ///
    /// `num_samples = max(round(total_length), 2)`.
    fn sample_points(&self) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        let total = self.total_length();
        let num_samples = (total.round() as usize).max(2);

        // Cumulative arclength per vertex.
        let mut cumulative = Vec::with_capacity(self.vertices.len());
        let mut acc = 0.0;
        cumulative.push(0.0);
        for w in self.vertices.windows(2) {
            acc += segment_length(w[0], w[1]);
            cumulative.push(acc);
        }

        let mut positions = Vec::with_capacity(num_samples);
        let mut segment = 0;
        for i in 0..num_samples {
            let target = total * i as f64 / (num_samples - 1) as f64;
            while segment + 2 < cumulative.len() && cumulative[segment + 1] < target {
                segment += 1;
            }
            let (a, b) = (self.vertices[segment], self.vertices[segment + 1]);
            let span = cumulative[segment + 1] - cumulative[segment];
            let t = if span > 0.0 {
                ((target - cumulative[segment]) / span).clamp(0.0, 1.0)
            } else {
                0.0 // zero-length segment
            };
            positions.push((a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1)));
        }

        let normals = (0..num_samples)
            .map(|i| {
                let prev = positions[i.saturating_sub(1)];
                let next = positions[(i + 1).min(num_samples - 1)];
                let (tx, ty) = (next.0 - prev.0, next.1 - prev.1);
                let norm = (tx * tx + ty * ty).sqrt();
                if norm > 1e-12 {
                    (-ty / norm, tx / norm)
                } else {
                    (0.0, 1.0) // fallback for a degenerate tangent
                }
            })
            .collect();

        (positions, normals)
    }
}

fn segment_length(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// How the integration band reduces to one value per position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReduceMethod {
    /// Maximum over the band
    #[default]
    Max,
    /// Mean over the band
    Average,
}

/// Configuration for kymograph sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KymographConfig {
    /// Half-width of the integration band: offsets run in
    /// `[-integration_width, +integration_width]` along the normal.
    pub integration_width: usize,
    /// Band reduction method
    pub method: ReduceMethod,
    /// Channel to sample
    pub channel: ChannelId,
}

impl Default for KymographConfig {
    fn default() -> Self {
        Self {
            integration_width: 1,
            method: ReduceMethod::Max,
            channel: ChannelId::new(0),
        }
    }
}

/// Space-time intensity image: rows are frames, columns are positions
/// along the ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct Kymograph {
    /// Intensity values, shape (n_frames × n_samples)
    pub data: Array2<f64>,
    /// Number of frame rows
    pub n_frames: usize,
    /// Number of position columns
    pub n_samples: usize,
    /// First sampled frame index
    pub start_frame: usize,
    /// Total arclength of the ROI
    pub path_length: f64,
}

/// Samples a kymograph over `frames` from the provider.
///
/// Frames the provider cannot supply produce a zero row, so the output
/// shape is always (frame count × num samples).
///
/// # Errors
///
/// Fails fast on an empty frame range; a degenerate ROI is already
/// rejected at [`Roi::new`].
pub fn sample_kymograph(
    roi: &Roi,
    provider: &dyn FrameProvider,
    frames: std::ops::Range<usize>,
    config: &KymographConfig,
) -> CoreResult<Kymograph> {
    if frames.is_empty() {
        return Err(CoreError::validation("kymograph frame range is empty"));
    }

    let (positions, normals) = roi.sample_points();
    let n_samples = positions.len();
    let n_offsets = 2 * config.integration_width + 1;

    // One flat coordinate batch reused for every frame.
    let mut coords = Vec::with_capacity(n_samples * n_offsets);
    for (pos, normal) in positions.iter().zip(normals.iter()) {
        for k in 0..n_offsets {
            let offset = k as f64 - config.integration_width as f64;
            coords.push((pos.0 + normal.0 * offset, pos.1 + normal.1 * offset));
        }
    }

    let start_frame = frames.start;
    let n_frames = frames.len();
    let mut data = Array2::zeros((n_frames, n_samples));
    let mut band = vec![0.0f64; coords.len()];

    for (row, frame) in frames.enumerate() {
        let Some(image) = provider.frame(frame, config.channel) else {
            continue; // unavailable frame stays a zero row
        };
        for (value, &(x, y)) in band.iter_mut().zip(coords.iter()) {
            *value = bilinear_reflect(&image, x, y);
        }
        for (s, chunk) in band.chunks(n_offsets).enumerate() {
            data[[row, s]] = match config.method {
                ReduceMethod::Max => chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                ReduceMethod::Average => chunk.iter().sum::<f64>() / n_offsets as f64,
            };
        }
    }

    Ok(Kymograph {
        data,
        n_frames,
        n_samples,
        start_frame,
        path_length: roi.total_length(),
    })
}

/// Bilinear sample with reflective boundary handling.
fn bilinear_reflect(image: &Array2<f64>, x: f64, y: f64) -> f64 {
    let (height, width) = image.dim();
    let x = reflect(x, width);
    let y = reflect(y, height);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    image[[y0, x0]] * (1.0 - fx) * (1.0 - fy)
        + image[[y0, x1]] * fx * (1.0 - fy)
        + image[[y1, x0]] * (1.0 - fx) * fy
        + image[[y1, x1]] * fx * fy
}

/// Reflects a continuous coordinate into `[0, n−1]`.
fn reflect(coord: f64, n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let limit = (n - 1) as f64;
    let period = 2.0 * limit;
    let mut t = ((coord % period) + period) % period;
    if t > limit {
        t = period - t;
    }
    t
}

/// Laplacian-of-Gaussian edge enhancement, normalized into 1–255.
///
/// A display/analysis variant, explicitly separate from the core
/// [`sample_kymograph`] output.
///
/// # Errors
///
/// `sigma` must be positive.
pub fn log_enhance(data: &Array2<f64>, sigma: f64) -> CoreResult<Array2<f64>> {
    if sigma <= 0.0 {
        return Err(CoreError::configuration("LoG sigma must be positive"));
    }

    let radius = (3.0 * sigma).ceil() as i64;
    let size = (2 * radius + 1) as usize;

    // Zero-mean LoG kernel.
    let mut kernel = Array2::zeros((size, size));
    for row in 0..size {
        for col in 0..size {
            let dy = row as f64 - radius as f64;
            let dx = col as f64 - radius as f64;
            let r2 = dx * dx + dy * dy;
            let s2 = sigma * sigma;
            kernel[[row, col]] =
                -(1.0 - r2 / (2.0 * s2)) * (-r2 / (2.0 * s2)).exp() / (std::f64::consts::PI * s2 * s2);
        }
    }
    let mean = kernel.sum() / (size * size) as f64;
    kernel.mapv_inplace(|v| v - mean);

    // Direct convolution with replicated edges.
    let (height, width) = data.dim();
    let mut filtered = Array2::zeros((height, width));
    for row in 0..height {
        for col in 0..width {
            let mut acc = 0.0;
            for krow in 0..size {
                for kcol in 0..size {
                    let sy = (row as i64 + krow as i64 - radius).clamp(0, height as i64 - 1);
                    let sx = (col as i64 + kcol as i64 - radius).clamp(0, width as i64 - 1);
                    acc += kernel[[krow, kcol]] * data[[sy as usize, sx as usize]];
                }
            }
            filtered[[row, col]] = acc;
        }
    }

    // Normalize into 1..=255.
    let min = filtered.iter().copied().fold(f64::INFINITY, f64::min);
    let max = filtered.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max - min < f64::EPSILON {
        return Ok(Array2::from_elem((height, width), 1.0));
    }
    Ok(filtered.mapv(|v| 1.0 + 254.0 * (v - min) / (max - min)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kymospot_core::MapFrameProvider;

    const CH: ChannelId = ChannelId::new(0);

    /// Image whose value equals the row (y) coordinate.
    fn gradient_provider(n_frames: usize) -> MapFrameProvider {
        let mut provider = MapFrameProvider::new();
        for f in 0..n_frames {
            provider.insert(f, CH, Array2::from_shape_fn((24, 24), |(row, _)| row as f64));
        }
        provider
    }

    fn horizontal_roi() -> Roi {
        Roi::new(vec![(2.0, 5.0), (12.0, 5.0)]).unwrap()
    }

    #[test]
    fn test_degenerate_roi_rejected() {
        assert!(matches!(
            Roi::new(vec![(1.0, 1.0)]),
            Err(CoreError::DegenerateRoi { vertices: 1 })
        ));
        assert!(Roi::new(vec![]).is_err());
    }

    #[test]
    fn test_shape_follows_path_length() {
        let provider = gradient_provider(4);
        let kymo = sample_kymograph(&horizontal_roi(), &provider, 0..4, &KymographConfig::default())
            .unwrap();
        assert_eq!(kymo.n_frames, 4);
        assert_eq!(kymo.n_samples, 10); // round(length 10)
        assert_eq!(kymo.data.dim(), (4, 10));
        assert!((kymo.path_length - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_sampling_is_identical() {
        let provider = gradient_provider(3);
        let config = KymographConfig::default();
        let a = sample_kymograph(&horizontal_roi(), &provider, 0..3, &config).unwrap();
        let b = sample_kymograph(&horizontal_roi(), &provider, 0..3, &config).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_average_and_max_reduction() {
        // Values equal y; a horizontal path at y = 5 with width 1 samples
        // y = 4, 5, 6 → average 5, max 6.
        let provider = gradient_provider(1);
        let average = sample_kymograph(
            &horizontal_roi(),
            &provider,
            0..1,
            &KymographConfig {
                integration_width: 1,
                method: ReduceMethod::Average,
                channel: CH,
            },
        )
        .unwrap();
        let max = sample_kymograph(
            &horizontal_roi(),
            &provider,
            0..1,
            &KymographConfig {
                integration_width: 1,
                method: ReduceMethod::Max,
                channel: CH,
            },
        )
        .unwrap();

        for s in 0..average.n_samples {
            assert!((average.data[[0, s]] - 5.0).abs() < 1e-9);
            assert!((max.data[[0, s]] - 6.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_frame_yields_zero_row() {
        let mut provider = MapFrameProvider::new();
        provider.insert(0, CH, Array2::from_elem((24, 24), 7.0));
        provider.insert(2, CH, Array2::from_elem((24, 24), 7.0));

        let kymo = sample_kymograph(&horizontal_roi(), &provider, 0..3, &KymographConfig::default())
            .unwrap();
        assert!(kymo.data.row(0).iter().all(|&v| (v - 7.0).abs() < 1e-12));
        assert!(kymo.data.row(1).iter().all(|&v| v == 0.0));
        assert!(kymo.data.row(2).iter().all(|&v| (v - 7.0).abs() < 1e-12));
    }

    #[test]
    fn test_empty_frame_range_rejected() {
        let provider = gradient_provider(2);
        let err = sample_kymograph(&horizontal_roi(), &provider, 2..2, &KymographConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_reflective_boundary() {
        // Path hugging the top edge: the band reaches y = −1, which
        // reflects onto y = 1 instead of reading out of bounds.
        let provider = gradient_provider(1);
        let roi = Roi::new(vec![(4.0, 0.0), (14.0, 0.0)]).unwrap();
        let kymo = sample_kymograph(
            &roi,
            &provider,
            0..1,
            &KymographConfig {
                integration_width: 1,
                method: ReduceMethod::Average,
                channel: CH,
            },
        )
        .unwrap();
        // Band y values reflect to 1, 0, 1 → average 2/3.
        for s in 0..kymo.n_samples {
            assert!((kymo.data[[0, s]] - 2.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_log_enhance_normalizes_into_display_range() {
        let mut data = Array2::from_elem((20, 20), 10.0);
        for col in 0..20 {
            data[[10, col]] = 200.0; // bright line
        }
        let enhanced = log_enhance(&data, 1.5).unwrap();
        let min = enhanced.iter().copied().fold(f64::INFINITY, f64::min);
        let max = enhanced.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min >= 1.0 - 1e-9);
        assert!(max <= 255.0 + 1e-9);
        assert!((max - 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_log_enhance_rejects_bad_sigma() {
        let data = Array2::zeros((4, 4));
        assert!(log_enhance(&data, 0.0).is_err());
        assert!(log_enhance(&data, -1.0).is_err());
    }

    #[test]
    fn test_zero_length_segment_gets_fallback_normal() {
        // Duplicate vertex produces a zero-length segment; sampling must
        // still succeed with finite output.
        let provider = gradient_provider(1);
        let roi = Roi::new(vec![(2.0, 5.0), (2.0, 5.0), (12.0, 5.0)]).unwrap();
        let kymo =
            sample_kymograph(&roi, &provider, 0..1, &KymographConfig::default()).unwrap();
        assert!(kymo.data.iter().all(|v| v.is_finite()));
    }
}
