//! Fit results and the flat record handed to the instrument layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named parameters of one lineshape model.
pub trait FitParams {
    /// `(key, value)` pairs written into a [`FitRecord`], `fit_*` keys first.
    fn record_fields(&self) -> Vec<(&'static str, f64)>;
}

/// Result of a successful fit.
///
/// `fit_shape` is the model evaluated at every input frequency; for the IQ
/// fits it is interleaved `[re, im, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome<P> {
    /// Fitted parameters and model-specific derived quantities.
    pub params: P,
    /// Sum of squared weighted data residuals over `n_points − n_params`.
    pub reduced_chisq: f64,
    /// Model evaluated at the input frequencies.
    pub fit_shape: Vec<f64>,
    /// Solver iterations used.
    pub iterations: usize,
}

impl<P: FitParams> FitOutcome<P> {
    /// Flattens the outcome into the `fit_*` record the caller serializes.
    #[must_use]
    pub fn to_record(&self) -> FitRecord {
        let mut record = FitRecord::new();
        for (key, value) in self.params.record_fields() {
            record.insert_f64(key, value);
        }
        record.insert_f64("fit_chisq", self.reduced_chisq);
        record.insert("fit_shape", shape_value(&self.fit_shape));
        record
    }
}

pub(crate) fn shape_value(shape: &[f64]) -> Value {
    Value::Array(shape.iter().map(|&v| float_value(v)).collect())
}

fn float_value(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Flat `name -> value` mapping, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FitRecord(Map<String, Value>);

impl FitRecord {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A record with every key set to `-1`.
    ///
    /// Callers that prefer a placeholder over an error build this themselves
    /// after a failed fit; nothing in this crate substitutes it.
    #[must_use]
    pub fn sentinel<'k>(keys: impl IntoIterator<Item = &'k str>) -> Self {
        let mut record = Self::new();
        for key in keys {
            record.insert(key, Value::from(-1));
        }
        record
    }

    /// Sets a numeric field. Non-finite values become `null`.
    pub fn insert_f64(&mut self, key: &str, value: f64) {
        self.insert(key, float_value(value));
    }

    /// Sets an arbitrary field.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a numeric field.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// True when the field is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the record holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying JSON map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        a: f64,
        b: f64,
    }

    impl FitParams for Pair {
        fn record_fields(&self) -> Vec<(&'static str, f64)> {
            vec![("fit_a", self.a), ("fit_b", self.b)]
        }
    }

    #[test]
    fn test_record_holds_params_chisq_and_shape() {
        let outcome = FitOutcome {
            params: Pair { a: 1.5, b: -2.0 },
            reduced_chisq: 0.25,
            fit_shape: vec![1.0, 2.0],
            iterations: 7,
        };
        let record = outcome.to_record();
        assert_eq!(record.len(), 4);
        assert_eq!(record.get_f64("fit_a"), Some(1.5));
        assert_eq!(record.get_f64("fit_b"), Some(-2.0));
        assert_eq!(record.get_f64("fit_chisq"), Some(0.25));
        assert_eq!(record.get("fit_shape"), Some(&serde_json::json!([1.0, 2.0])));
    }

    #[test]
    fn test_sentinel_record() {
        let record = FitRecord::sentinel(["fit_f0", "fit_Q"]);
        assert_eq!(record.get_f64("fit_f0"), Some(-1.0));
        assert_eq!(record.get_f64("fit_Q"), Some(-1.0));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"fit_Q\":-1"));
    }

    #[test]
    fn test_non_finite_becomes_null() {
        let mut record = FitRecord::new();
        record.insert_f64("fit_chisq", f64::NAN);
        assert_eq!(record.get("fit_chisq"), Some(&Value::Null));
    }
}
