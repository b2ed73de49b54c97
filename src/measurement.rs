//! Closed selectors for measurement topology and cavity model.
//!
//! The instrument layer hands these over as strings (`"reflection"`,
//! `"transmission"`, `"cavity"`, `"jpa"`). They are parsed once at the edge
//! and matched on everywhere else.

use crate::error::FitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which port relationship a spectrum was measured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    /// Reflected power: the resonance shows up as a dip.
    Reflection,
    /// Transmitted power: the resonance shows up as a peak.
    Transmission,
}

impl MeasurementType {
    /// The wire name used by the instrument layer.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::Reflection => "reflection",
            MeasurementType::Transmission => "transmission",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementType {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reflection" => Ok(MeasurementType::Reflection),
            "transmission" => Ok(MeasurementType::Transmission),
            other => Err(FitError::InvalidInput(format!(
                "not a valid measurement type: '{other}'"
            ))),
        }
    }
}

/// Lineshape family used by the RFSoC fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CavityModel {
    /// A single cavity Lorentzian.
    #[serde(rename = "cavity")]
    CavityOnly,
    /// Cavity response folded about the band centre and shaped by a JPA gain band.
    #[serde(rename = "jpa")]
    WithJpa,
}

impl CavityModel {
    /// The wire name used by the instrument layer.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CavityModel::CavityOnly => "cavity",
            CavityModel::WithJpa => "jpa",
        }
    }
}

impl fmt::Display for CavityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CavityModel {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cavity" => Ok(CavityModel::CavityOnly),
            "jpa" => Ok(CavityModel::WithJpa),
            other => Err(FitError::InvalidInput(format!(
                "not a valid fit type: '{other}'"
            ))),
        }
    }
}
