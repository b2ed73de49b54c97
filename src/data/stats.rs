//! Small numeric helpers shared by the guesses, the solver and the
//! deconvolution path.
//!
//! Conventions the fitting code relies on:
//! `argmin`/`argmax` return the first extremum, `std_dev` is the population
//! standard deviation, `interp_linear` clamps outside the grid.

/// Which tail of a sorted sample to cut off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Drop the smallest values.
    Low,
    /// Drop the largest values.
    High,
}

/// Index of the first minimum, `None` on empty input.
#[must_use]
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_nan() && best.map_or(true, |(_, b)| v < b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the first maximum, `None` on empty input.
#[must_use]
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_nan() && best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Arithmetic mean; `NaN` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0); `NaN` for an empty slice.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Median of the values; `NaN` for an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Sorts the sample and drops `floor(proportion * n)` values from one tail.
#[must_use]
pub fn trim_tail(values: &[f64], proportion: f64, tail: Tail) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let cut = ((proportion * sorted.len() as f64).floor() as usize).min(sorted.len());
    match tail {
        Tail::Low => sorted.split_off(cut),
        Tail::High => {
            sorted.truncate(sorted.len() - cut);
            sorted
        }
    }
}

/// Index of the element closest to `target`, `None` on empty input.
#[must_use]
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    let distances: Vec<f64> = values.iter().map(|v| (v - target).abs()).collect();
    argmin(&distances)
}

/// First and last `count` elements concatenated.
#[must_use]
pub fn ends(values: &[f64], count: usize) -> Vec<f64> {
    let count = count.min(values.len());
    let mut out = Vec::with_capacity(2 * count);
    out.extend_from_slice(&values[..count]);
    out.extend_from_slice(&values[values.len() - count..]);
    out
}

/// `ceil(fraction * n)` clamped to `[1, n]`: the size of each outer band.
#[must_use]
pub fn outer_band_len(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).ceil() as usize).clamp(1, n.max(1))
}

/// Least-squares straight line through the points, as `(slope, intercept)`.
///
/// Returns `None` with fewer than two points or when all `x` coincide.
#[must_use]
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let sxx: f64 = x.iter().map(|xi| (xi - mx) * (xi - mx)).sum();
    if sxx <= 0.0 || !sxx.is_finite() {
        return None;
    }
    let sxy: f64 = x.iter().zip(y).map(|(xi, yi)| (xi - mx) * (yi - my)).sum();
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

/// Piecewise-linear interpolation of `(xs, ys)` at `x`, clamped to the end values.
///
/// `xs` must be increasing.
#[must_use]
pub fn interp_linear(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let hi = xs[..n].partition_point(|&v| v <= x).min(n - 1);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    if span <= 0.0 {
        return ys[lo];
    }
    ys[lo] + (ys[hi] - ys[lo]) * (x - xs[lo]) / span
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
#[must_use]
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Removes 2π jumps between consecutive phase samples.
#[must_use]
pub fn unwrap_phase(phases: &[f64]) -> Vec<f64> {
    use std::f64::consts::PI;

    let mut out = Vec::with_capacity(phases.len());
    let mut offset = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phases {
        if let Some(last) = prev {
            let diff = p - last;
            if diff.abs() >= PI {
                let mut wrapped = (diff + PI).rem_euclid(2.0 * PI) - PI;
                if wrapped == -PI && diff > 0.0 {
                    wrapped = PI;
                }
                offset += wrapped - diff;
            }
        }
        out.push(p + offset);
        prev = Some(p);
    }
    out
}
