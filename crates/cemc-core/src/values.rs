//! Named scalar/vector value maps used for thermodynamic conditions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CemcError, ErrorInfo};

/// Mapping from name to scalar or vector real value.
///
/// Conditions dictionaries use the reserved keys `temperature` (scalar, K),
/// `mol_composition` (vector over components, species per unit cell),
/// `param_composition` and `param_chem_pot` (vectors over independent
/// composition axes). The same keys serve both absolute values and
/// increments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueMap {
    /// Scalar-valued entries.
    #[serde(default)]
    pub scalar_values: BTreeMap<String, f64>,
    /// Vector-valued entries.
    #[serde(default)]
    pub vector_values: BTreeMap<String, Vec<f64>>,
}

impl ValueMap {
    /// Creates an empty value map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named scalar, or a `Consistency` error naming the key.
    pub fn require_scalar(&self, key: &str) -> Result<f64, CemcError> {
        self.scalar_values.get(key).copied().ok_or_else(|| {
            CemcError::Consistency(
                ErrorInfo::new("missing-condition", "required scalar condition not set")
                    .with_context("key", key),
            )
        })
    }

    /// Returns the named vector, or a `Consistency` error naming the key.
    pub fn require_vector(&self, key: &str) -> Result<&[f64], CemcError> {
        self.vector_values.get(key).map(Vec::as_slice).ok_or_else(|| {
            CemcError::Consistency(
                ErrorInfo::new("missing-condition", "required vector condition not set")
                    .with_context("key", key),
            )
        })
    }

    /// Returns the named vector after checking its length.
    pub fn require_vector_of_len(&self, key: &str, len: usize) -> Result<&[f64], CemcError> {
        let values = self.require_vector(key)?;
        if values.len() != len {
            return Err(CemcError::Consistency(
                ErrorInfo::new("condition-shape", "vector condition has wrong length")
                    .with_context("key", key)
                    .with_context("expected", len.to_string())
                    .with_context("found", values.len().to_string()),
            ));
        }
        Ok(values)
    }

    /// Returns `base + n * increment` for every entry present in `increment`.
    ///
    /// Entries of `base` absent from `increment` are carried unchanged.
    /// Vector entries must agree in length.
    pub fn incremented(base: &ValueMap, increment: &ValueMap, n: u64) -> Result<Self, CemcError> {
        let factor = n as f64;
        let mut out = base.clone();
        for (key, delta) in &increment.scalar_values {
            let entry = out.scalar_values.entry(key.clone()).or_insert(0.0);
            *entry += factor * delta;
        }
        for (key, delta) in &increment.vector_values {
            let entry = out
                .vector_values
                .entry(key.clone())
                .or_insert_with(|| vec![0.0; delta.len()]);
            if entry.len() != delta.len() {
                return Err(CemcError::Consistency(
                    ErrorInfo::new("increment-shape", "increment length does not match base")
                        .with_context("key", key.clone())
                        .with_context("base_len", entry.len().to_string())
                        .with_context("increment_len", delta.len().to_string()),
                ));
            }
            for (value, delta) in entry.iter_mut().zip(delta) {
                *value += factor * delta;
            }
        }
        Ok(out)
    }

    /// Returns true if every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.scalar_values.values().all(|v| v.is_finite())
            && self
                .vector_values
                .values()
                .all(|v| v.iter().all(|x| x.is_finite()))
    }
}
