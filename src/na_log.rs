//! Fitting network-analyzer log rows.
//!
//! The network-analyzer logger stores each sweep as one row: the start and
//! stop frequency, the IQ payload as a `{re,im,re,im,...}` string, and a
//! free-text measurement name. [`fit_na_log`] picks the fit from that name.

use crate::config::FitSettings;
use crate::data::{pack_to_powers, stats};
use crate::error::{FitError, FitResult};
use crate::fit::network_analyzer::{
    fit_reflection_with, fit_transmission_with, ReflectionIqParams, TransmissionParams,
};
use crate::fit::outcome::{shape_value, FitOutcome, FitRecord};
use crate::peaks::find_peaks;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, instrument};

/// Column positions in a logged row.
const START_COLUMN: usize = 1;
const STOP_COLUMN: usize = 2;
const IQ_COLUMN: usize = 4;
const NAME_COLUMN: usize = 6;

/// Kind of sweep a log row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NaMeasurement {
    /// Reflection sweep, fitted in IQ.
    Reflection,
    /// Transmission sweep, fitted in power.
    Transmission,
    /// Wide survey sweep, searched for peaks.
    Widescan,
}

impl NaMeasurement {
    /// Finds the measurement kind named anywhere in a free-text label.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the label names none of them.
    pub fn detect(label: &str) -> FitResult<Self> {
        let label = label.to_lowercase();
        if label.contains("reflection") {
            Ok(NaMeasurement::Reflection)
        } else if label.contains("transmission") {
            Ok(NaMeasurement::Transmission)
        } else if label.contains("widescan") {
            Ok(NaMeasurement::Widescan)
        } else {
            Err(FitError::InvalidInput(format!(
                "unrecognized measurement type: '{label}'"
            )))
        }
    }
}

impl fmt::Display for NaMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NaMeasurement::Reflection => "Reflection",
            NaMeasurement::Transmission => "Transmission",
            NaMeasurement::Widescan => "Widescan",
        };
        f.write_str(name)
    }
}

/// Parses the numbers between the first `{` and the following `}`.
///
/// A payload without braces is parsed whole.
///
/// # Errors
///
/// `InvalidInput` when the payload is empty or holds a non-number.
pub fn parse_iq_payload(payload: &str) -> FitResult<Vec<f64>> {
    let body = match payload.split_once('{') {
        Some((_, rest)) => rest.split('}').next().unwrap_or(rest),
        None => payload,
    };
    if body.trim().is_empty() {
        return Err(FitError::InvalidInput("empty IQ payload".into()));
    }
    body.split(',')
        .map(|field| {
            let field = field.trim();
            field.parse::<f64>().map_err(|e| {
                FitError::InvalidInput(format!("bad IQ value '{field}': {e}"))
            })
        })
        .collect()
}

/// One logged network-analyzer sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaLogEntry {
    /// Interleaved IQ samples.
    pub iq_data: Vec<f64>,
    /// Kind of sweep.
    pub measurement: NaMeasurement,
    /// First frequency of the sweep.
    pub start_frequency: f64,
    /// Last frequency of the sweep.
    pub stop_frequency: f64,
}

fn column<'a>(row: &'a [Value], idx: usize) -> FitResult<&'a Value> {
    row.get(idx).ok_or_else(|| {
        FitError::InvalidInput(format!(
            "log row has {} columns, column {idx} missing",
            row.len()
        ))
    })
}

fn number_column(row: &[Value], idx: usize) -> FitResult<f64> {
    let value = column(row, idx)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FitError::InvalidInput(format!("column {idx} is not a number: {value}")))
}

fn text_column(row: &[Value], idx: usize) -> FitResult<&str> {
    let value = column(row, idx)?;
    value
        .as_str()
        .ok_or_else(|| FitError::InvalidInput(format!("column {idx} is not text: {value}")))
}

impl NaLogEntry {
    /// Reads a log row laid out as the logger writes it: start frequency in
    /// column 1, stop in 2, IQ payload in 4 and measurement name in 6.
    pub fn from_row(row: &[Value]) -> FitResult<Self> {
        Ok(Self {
            iq_data: parse_iq_payload(text_column(row, IQ_COLUMN)?)?,
            measurement: NaMeasurement::detect(text_column(row, NAME_COLUMN)?)?,
            start_frequency: number_column(row, START_COLUMN)?,
            stop_frequency: number_column(row, STOP_COLUMN)?,
        })
    }

    /// Frequency of each IQ pair, evenly spaced from start to stop.
    #[must_use]
    pub fn frequencies(&self) -> Vec<f64> {
        stats::linspace(self.start_frequency, self.stop_frequency, self.iq_data.len() / 2)
    }
}

/// Result of fitting one log row.
#[derive(Debug, Clone, PartialEq)]
pub enum NaFit {
    /// IQ reflection fit plus its shape converted to power.
    Reflection {
        /// The IQ fit.
        outcome: FitOutcome<ReflectionIqParams>,
        /// `|fit_shape|²` per frequency.
        power_shape: Vec<f64>,
    },
    /// Power transmission fit.
    Transmission(FitOutcome<TransmissionParams>),
    /// Widescan peak frequencies.
    Widescan {
        /// Centroid frequencies.
        peaks: Vec<f64>,
    },
}

impl NaFit {
    /// Flat record of the fit.
    ///
    /// Reflection records carry the IQ shape under `iq_fit_shape` and the
    /// power shape under `fit_shape`.
    #[must_use]
    pub fn to_record(&self) -> FitRecord {
        match self {
            NaFit::Reflection {
                outcome,
                power_shape,
            } => {
                let mut record = outcome.to_record();
                record.insert("iq_fit_shape", shape_value(&outcome.fit_shape));
                record.insert("fit_shape", shape_value(power_shape));
                record.insert("type", Value::from(NaMeasurement::Reflection.to_string()));
                record
            }
            NaFit::Transmission(outcome) => {
                let mut record = outcome.to_record();
                record.insert("type", Value::from(NaMeasurement::Transmission.to_string()));
                record
            }
            NaFit::Widescan { peaks } => {
                let mut record = FitRecord::new();
                record.insert("peaks", shape_value(peaks));
                record
            }
        }
    }
}

/// Fits a log row with the fit its measurement name calls for.
#[instrument(skip_all, fields(measurement = %entry.measurement, n_values = entry.iq_data.len()))]
pub fn fit_na_log(entry: &NaLogEntry, settings: &FitSettings) -> FitResult<NaFit> {
    let freqs = entry.frequencies();
    let fit = match entry.measurement {
        NaMeasurement::Reflection => {
            let outcome = fit_reflection_with(&entry.iq_data, &freqs, settings)?;
            let power_shape = pack_to_powers(&outcome.fit_shape)?;
            NaFit::Reflection {
                outcome,
                power_shape,
            }
        }
        NaMeasurement::Transmission => {
            let powers = pack_to_powers(&entry.iq_data)?;
            NaFit::Transmission(fit_transmission_with(&powers, &freqs, settings)?)
        }
        NaMeasurement::Widescan => {
            let powers = pack_to_powers(&entry.iq_data)?;
            NaFit::Widescan {
                peaks: find_peaks(
                    &powers,
                    settings.widescan.data_fraction,
                    entry.start_frequency,
                    entry.stop_frequency,
                )?,
            }
        }
    };
    info!("log entry fitted");
    Ok(fit)
}
