//! Savitzky–Golay smoothing.
//!
//! Computes center-point smoothing weights by least-squares polynomial
//! fitting over the integer offsets of an odd window, and applies them
//! with edge replication. Used by the Smooth tracking strategy to build a
//! reference path that raw fits are compared against.
//!
//! # References
//! - Savitzky & Golay (1964), "Smoothing and Differentiation of Data by
//!   Simplified Least Squares Procedures"

use kymospot_core::{CoreError, CoreResult};

/// Center-point Savitzky–Golay weights for `window` samples and a
/// polynomial of degree `order`.
///
/// The smoothed value at a sample is the dot product of these weights
/// with the surrounding window.
///
/// # Errors
///
/// The window must be odd, at least 3, and larger than the polynomial
/// order.
pub fn savgol_coefficients(window: usize, order: usize) -> CoreResult<Vec<f64>> {
    if window < 3 || window % 2 == 0 {
        return Err(CoreError::configuration(format!(
            "Savitzky-Golay window must be odd and >= 3, got {window}"
        )));
    }
    if order >= window {
        return Err(CoreError::configuration(format!(
            "polynomial order {order} must be smaller than window {window}"
        )));
    }

    let half = (window / 2) as i64;
    let terms = order + 1;

    // Normal matrix G[a][b] = Σ_k k^(a+b) over offsets k ∈ [−half, half].
    let mut normal = vec![vec![0.0f64; terms]; terms];
    for a in 0..terms {
        for b in 0..terms {
            normal[a][b] = (-half..=half)
                .map(|k| (k as f64).powi((a + b) as i32))
                .sum();
        }
    }

    // Solve G z = e0; the center-point weight for offset k is then
    // w_k = Σ_j z_j k^j (polynomial evaluation at the window center).
    let mut rhs = vec![0.0f64; terms];
    rhs[0] = 1.0;
    let z = solve_linear(&mut normal, &mut rhs).ok_or_else(|| {
        CoreError::internal("Savitzky-Golay normal equations are singular")
    })?;

    Ok((-half..=half)
        .map(|k| {
            (0..terms)
                .map(|j| z[j] * (k as f64).powi(j as i32))
                .sum()
        })
        .collect())
}

/// Applies a Savitzky–Golay filter to `series` with replicated edges.
///
/// # Errors
///
/// Same constraints as [`savgol_coefficients`]; the series must be at
/// least as long as the window.
pub fn savgol_smooth(series: &[f64], window: usize, order: usize) -> CoreResult<Vec<f64>> {
    let weights = savgol_coefficients(window, order)?;
    if series.len() < window {
        return Err(CoreError::validation(format!(
            "series of {} samples is shorter than window {window}",
            series.len()
        )));
    }

    let n = series.len();
    let half = window / 2;
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let mut acc = 0.0;
        for (j, &w) in weights.iter().enumerate() {
            // Replicate the first/last samples beyond the ends.
            let k = (i + j).saturating_sub(half).min(n - 1);
            acc += w * series[k];
        }
        smoothed.push(acc);
    }
    Ok(smoothed)
}

/// In-place Gaussian elimination with partial pivoting on a small dense
/// system. Returns `None` when the matrix is singular.
fn solve_linear(matrix: &mut [Vec<f64>], rhs: &mut [f64]) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if matrix[row][col].abs() > matrix[pivot][col].abs() {
                pivot = row;
            }
        }
        if matrix[pivot][col].abs() < 1e-300 {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..n {
            let factor = matrix[row][col] / matrix[col][col];
            for k in col..n {
                matrix[row][k] -= factor * matrix[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut solution = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in i + 1..n {
            sum -= matrix[i][j] * solution[j];
        }
        solution[i] = sum / matrix[i][i];
    }
    Some(solution)
}
