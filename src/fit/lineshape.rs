//! Closed-form resonance lineshapes.
//!
//! Every function here is a pure function of frequency and parameters. The
//! scalar shapes are evaluated pointwise; the JPA shapes take the whole
//! frequency axis because the image-frequency fold mirrors the response
//! across the band by index.

use num_complex::Complex64;

/// Normalised detuning `δ = Q (f − f0) / f0`.
#[inline]
#[must_use]
pub fn detuning(f: f64, f0: f64, q: f64) -> f64 {
    q * (f - f0) / f0
}

/// The canonical Lorentzian `1 / (1 + 4δ²)`.
#[inline]
#[must_use]
pub fn lorentzian(delta: f64) -> f64 {
    1.0 / (1.0 + 4.0 * delta * delta)
}

/// Transmitted power with a noise floor expressed as a fraction of `norm`.
///
/// At resonance this is `norm * (1 + noise)`.
#[must_use]
pub fn transmission_power_shape(f: f64, norm: f64, f0: f64, q: f64, noise: f64) -> f64 {
    norm * (lorentzian(detuning(f, f0, q)) + noise)
}

/// Transmitted power through a bare cavity.
#[must_use]
pub fn transmission_power_shape_cavity(f: f64, norm: f64, f0: f64, q: f64) -> f64 {
    norm * lorentzian(detuning(f, f0, q))
}

/// Reflected power off a bare cavity: a dip that reaches zero at `f0`.
#[must_use]
pub fn reflection_power_shape_cavity(f: f64, norm: f64, f0: f64, q: f64) -> f64 {
    norm * (1.0 - lorentzian(detuning(f, f0, q)))
}

/// Cavity Lorentzian folded about the band centre: at each index the larger
/// of the forward response and the response at the mirrored index.
fn folded_cavity(frequencies: &[f64], f0: f64, q: f64) -> Vec<f64> {
    let forward: Vec<f64> = frequencies
        .iter()
        .map(|&f| lorentzian(detuning(f, f0, q)))
        .collect();
    forward
        .iter()
        .zip(forward.iter().rev())
        .map(|(a, b)| a.max(*b))
        .collect()
}

fn jpa_band(f: f64, f_jpa: f64, q_jpa: f64) -> f64 {
    lorentzian(detuning(f, f_jpa, q_jpa))
}

/// Transmitted power of a cavity seen through a JPA gain band.
#[must_use]
pub fn transmission_power_shape_jpa(
    frequencies: &[f64],
    norm: f64,
    f0: f64,
    q: f64,
    f_jpa: f64,
    q_jpa: f64,
) -> Vec<f64> {
    folded_cavity(frequencies, f0, q)
        .into_iter()
        .zip(frequencies)
        .map(|(cavity, &f)| norm * cavity * jpa_band(f, f_jpa, q_jpa))
        .collect()
}

/// Reflected power of a cavity seen through a JPA gain band.
#[must_use]
pub fn reflection_power_shape_jpa(
    frequencies: &[f64],
    norm: f64,
    f0: f64,
    q: f64,
    f_jpa: f64,
    q_jpa: f64,
) -> Vec<f64> {
    folded_cavity(frequencies, f0, q)
        .into_iter()
        .zip(frequencies)
        .map(|(cavity, &f)| norm * (1.0 - cavity) * jpa_band(f, f_jpa, q_jpa))
        .collect()
}

fn line_phase(f: f64, f0: f64, phase: f64, delay_time: f64) -> Complex64 {
    Complex64::from_polar(1.0, phase + delay_time * (f - f0))
}

/// Complex reflection with the coupling `beta` entering directly.
///
/// Agrees exactly with [`reflection_iq_shape_unloaded`] for the same `q` at
/// critical coupling (`beta = 1`).
#[must_use]
pub fn reflection_iq_shape(
    f: f64,
    norm: f64,
    phase: f64,
    f0: f64,
    q: f64,
    beta: f64,
    delay_time: f64,
) -> Complex64 {
    let delta = detuning(f, f0, q);
    let denom = lorentzian(delta);
    let response = Complex64::new(
        denom * ((beta - 1.0) - 4.0 * delta * delta),
        -denom * 2.0 * beta * delta,
    ) * norm;
    response * line_phase(f, f0, phase, delay_time)
}

/// Complex reflection parameterised through the unloaded `Q0 = Q (1 + beta)`.
///
/// `|Γ|²` of this form is a Lorentzian dip whose half width is set by the
/// loaded `Q`, which is what the network-analyzer reflection fit uses.
#[must_use]
pub fn reflection_iq_shape_unloaded(
    f: f64,
    norm: f64,
    phase: f64,
    f0: f64,
    q: f64,
    beta: f64,
    delay_time: f64,
) -> Complex64 {
    let q0 = q * (1.0 + beta);
    let two_delta = 2.0 * detuning(f, f0, q0);
    let gamma = Complex64::new(beta - 1.0, -two_delta) / Complex64::new(beta + 1.0, two_delta);
    gamma * norm * line_phase(f, f0, phase, delay_time)
}

fn half_width_lorentzian(f: f64, f0: f64, q: f64) -> f64 {
    let hw = f0 / (2.0 * q);
    hw * hw / ((f - f0) * (f - f0) + hw * hw)
}

/// Lorentzian dip below a baseline `offset` with the given `depth`.
#[must_use]
pub fn lorentzian_dip(f: f64, f0: f64, q: f64, depth: f64, offset: f64) -> f64 {
    offset - depth * half_width_lorentzian(f, f0, q)
}

/// Lorentzian peak above a baseline `offset` with the given `depth`.
#[must_use]
pub fn lorentzian_peak(f: f64, f0: f64, q: f64, depth: f64, offset: f64) -> f64 {
    offset + depth * half_width_lorentzian(f, f0, q)
}
