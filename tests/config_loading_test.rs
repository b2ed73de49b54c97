//! Loading `FitSettings` from TOML files and the environment.

use resonance_fit::config::SolverSettings;
use resonance_fit::data::stats::linspace;
use resonance_fit::fit::lineshape::transmission_power_shape;
use resonance_fit::{fit_transmission, FitError, FitSettings};
use std::io::Write;

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
    let file = write_toml(
        r#"
[guards]
min_points = 32

[tones]
n_tones = 16
"#,
    );
    let settings = FitSettings::load_from(file.path())?;
    settings.validate()?;
    assert_eq!(settings.guards.min_points, 32);
    assert_eq!(settings.tones.n_tones, 16);
    assert_eq!(settings.tones.window_len, 10);
    assert_eq!(settings.solver, SolverSettings::default());
    Ok(())
}

#[test]
fn test_loaded_guard_applies_to_fits() -> anyhow::Result<()> {
    let file = write_toml("[guards]\nmin_points = 200\n");
    let settings = FitSettings::load_from(file.path())?;

    let freqs = linspace(600e6, 700e6, 101);
    let powers: Vec<f64> = freqs
        .iter()
        .map(|&f| transmission_power_shape(f, 1.0, 650e6, 50.0, 0.0))
        .collect();
    assert!(fit_transmission(&powers, &freqs).is_ok());
    let result = resonance_fit::fit::fit_transmission_with(&powers, &freqs, &settings);
    assert!(matches!(
        result,
        Err(FitError::InsufficientData { needed: 200, got: 101 })
    ));
    Ok(())
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = write_toml("[solver]\nmax_iterations = \"many\"\n");
    assert!(matches!(
        FitSettings::load_from(file.path()),
        Err(FitError::Config(_))
    ));
}

#[test]
fn test_inconsistent_values_fail_validation() -> anyhow::Result<()> {
    let file = write_toml("[rfsoc]\nq_min = 5000.0\nq_guess = 2000.0\n");
    let settings = FitSettings::load_from(file.path())?;
    let err = settings.validate().unwrap_err();
    assert!(matches!(err, FitError::Configuration(_)));
    assert!(err.to_string().contains("rfsoc.q_guess"));
    Ok(())
}

#[test]
fn test_shipped_config_matches_defaults() -> anyhow::Result<()> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/fits.toml");
    let settings = FitSettings::load_from(path)?;
    assert_eq!(settings, FitSettings::default());
    Ok(())
}
