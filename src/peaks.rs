//! Widescan peak finding.
//!
//! A widescan sweeps far wider than any one resonance, so instead of fitting
//! anything the strongest bins are picked out and grouped: the top fraction
//! of bins by power is selected, runs of adjacent bins are merged into one
//! cluster, and each cluster is reported at its midpoint frequency.
//!
//! ```
//! use resonance_fit::peaks::find_peaks;
//!
//! let mut powers = vec![0.0; 100];
//! powers[40] = 5.0;
//! powers[41] = 6.0;
//! let peaks = find_peaks(&powers, 0.02, 0.0, 100.0)?;
//! assert_eq!(peaks, vec![40.0]);
//! # Ok::<(), resonance_fit::FitError>(())
//! ```

use crate::error::{FitError, FitResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A run of consecutive selected bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakCluster {
    /// First bin of the run.
    pub first: usize,
    /// Last bin of the run, inclusive.
    pub last: usize,
}

impl PeakCluster {
    /// Midpoint bin, rounded down for runs of even length.
    #[must_use]
    pub fn centroid(&self) -> usize {
        (self.first + self.last) / 2
    }

    /// Number of bins in the run.
    #[must_use]
    pub fn width(&self) -> usize {
        self.last - self.first + 1
    }

    /// Centroid mapped from `[0, n_bins)` onto `[start, stop]`.
    #[must_use]
    pub fn frequency(&self, n_bins: usize, start: f64, stop: f64) -> f64 {
        start + self.centroid() as f64 * (stop - start) / n_bins as f64
    }
}

fn check_fraction(fraction: f64) -> FitResult<()> {
    if fraction.is_finite() && fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(FitError::InvalidInput(format!(
            "peak fraction must be in (0, 1], got {fraction}"
        )))
    }
}

/// Groups the top `floor(fraction · N)` bins into runs of adjacent indices.
///
/// Ties in power are resolved in favour of the higher index. An empty
/// selection (too small a fraction, or no data) gives no clusters.
///
/// # Errors
///
/// `InvalidInput` when `fraction` is outside `(0, 1]` or any power is NaN.
pub fn find_peak_clusters(powers: &[f64], fraction: f64) -> FitResult<Vec<PeakCluster>> {
    check_fraction(fraction)?;
    if powers.iter().any(|p| p.is_nan()) {
        return Err(FitError::InvalidInput("widescan powers contain NaN".into()));
    }

    let count = (fraction * powers.len() as f64).floor() as usize;
    if count == 0 {
        debug!(n_bins = powers.len(), fraction, "no bins selected");
        return Ok(Vec::new());
    }

    let mut order: Vec<usize> = (0..powers.len()).collect();
    order.sort_by(|&a, &b| powers[a].total_cmp(&powers[b]).then(a.cmp(&b)));
    let mut selected = order.split_off(powers.len() - count);
    selected.sort_unstable();

    let mut clusters = Vec::new();
    let mut run = PeakCluster {
        first: selected[0],
        last: selected[0],
    };
    for &idx in &selected[1..] {
        if idx == run.last + 1 {
            run.last = idx;
        } else {
            clusters.push(run);
            run = PeakCluster {
                first: idx,
                last: idx,
            };
        }
    }
    clusters.push(run);
    Ok(clusters)
}

/// Centroid frequencies of the widescan peaks, in ascending order.
///
/// Bin `i` of `N` maps to `start + i · (stop − start) / N`.
///
/// # Errors
///
/// See [`find_peak_clusters`].
pub fn find_peaks(powers: &[f64], fraction: f64, start: f64, stop: f64) -> FitResult<Vec<f64>> {
    let clusters = find_peak_clusters(powers, fraction)?;
    let peaks: Vec<f64> = clusters
        .iter()
        .map(|c| c.frequency(powers.len(), start, stop))
        .collect();
    debug!(n_peaks = peaks.len(), "widescan peaks");
    Ok(peaks)
}
