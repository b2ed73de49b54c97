//! Conversions between interleaved IQ series and power spectra.
//!
//! Instruments report complex sweeps as a flat `[re, im, re, im, ...]` array
//! of length `2N`. The fits work either on that layout directly (reflection IQ)
//! or on the magnitude-squared power per point.

use crate::error::{FitError, FitResult};
use num_complex::Complex64;

fn ensure_even(len: usize) -> FitResult<()> {
    if len % 2 != 0 {
        return Err(FitError::InvalidInput(format!(
            "IQ series must have even length, got {len}"
        )));
    }
    Ok(())
}

/// Turns an IQ series into per-point powers, `p[i] = re² + im²`.
///
/// # Errors
///
/// `InvalidInput` when the series has odd length.
pub fn pack_to_powers(iq: &[f64]) -> FitResult<Vec<f64>> {
    ensure_even(iq.len())?;
    Ok(iq
        .chunks_exact(2)
        .map(|pair| pair[0] * pair[0] + pair[1] * pair[1])
        .collect())
}

/// Splits an IQ series into its real and imaginary parts.
///
/// # Errors
///
/// `InvalidInput` when the series has odd length.
pub fn unpack_iq(iq: &[f64]) -> FitResult<(Vec<f64>, Vec<f64>)> {
    ensure_even(iq.len())?;
    Ok(iq.chunks_exact(2).map(|pair| (pair[0], pair[1])).unzip())
}

/// Interleaves separate real and imaginary parts back into an IQ series.
///
/// # Errors
///
/// `InvalidInput` when the two parts differ in length.
pub fn repack_iq(re: &[f64], im: &[f64]) -> FitResult<Vec<f64>> {
    if re.len() != im.len() {
        return Err(FitError::InvalidInput(format!(
            "Real and imaginary vectors should be the same length ({} vs {})",
            re.len(),
            im.len()
        )));
    }
    Ok(re.iter().zip(im).flat_map(|(&r, &i)| [r, i]).collect())
}

/// Reads an IQ series as complex samples.
///
/// # Errors
///
/// `InvalidInput` when the series has odd length.
pub fn to_complex(iq: &[f64]) -> FitResult<Vec<Complex64>> {
    ensure_even(iq.len())?;
    Ok(iq
        .chunks_exact(2)
        .map(|pair| Complex64::new(pair[0], pair[1]))
        .collect())
}

/// Flattens complex samples into an IQ series.
#[must_use]
pub fn from_complex(samples: &[Complex64]) -> Vec<f64> {
    samples.iter().flat_map(|z| [z.re, z.im]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_single_pair() {
        assert_eq!(pack_to_powers(&[3.0, 4.0]).unwrap(), vec![25.0]);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(
            pack_to_powers(&[1.0, 2.0, 3.0]),
            Err(FitError::InvalidInput(_))
        ));
        assert!(unpack_iq(&[1.0]).is_err());
        assert!(to_complex(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_unpack_repack_is_lossless() {
        let iq = [0.1, -0.2, 1e-300, 7.5, -0.0, f64::MAX];
        let (re, im) = unpack_iq(&iq).unwrap();
        assert_eq!(re, vec![0.1, 1e-300, -0.0]);
        assert_eq!(im, vec![-0.2, 7.5, f64::MAX]);
        let back = repack_iq(&re, &im).unwrap();
        assert_eq!(back.len(), iq.len());
        for (a, b) in back.iter().zip(&iq) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_repack_length_mismatch() {
        assert!(matches!(
            repack_iq(&[1.0, 2.0], &[1.0]),
            Err(FitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_complex_round_trip() {
        let iq = [1.0, 2.0, -3.0, 0.5];
        let z = to_complex(&iq).unwrap();
        assert_eq!(z[1], Complex64::new(-3.0, 0.5));
        assert_eq!(from_complex(&z), iq.to_vec());
    }
}
