//! Spectrum data handling: IQ conversions and numeric helpers.
pub mod iq;
pub mod stats;

pub use iq::{from_complex, pack_to_powers, repack_iq, to_complex, unpack_iq};
