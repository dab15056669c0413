//! Monte Carlo state: supercell, occupation and conditions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo, ValueMap, KB};
use cemc_lattice::{CompositionConverter, Conversions, Mat3};

/// Supercell, occupation and conditions: everything that evolves or
/// parameterizes one run.
///
/// The occupation vector is the only mutable quantity during a run; it is
/// owned exclusively by the occupant tracker while the kernel executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Supercell transformation matrix applied to the prim lattice.
    pub transformation_matrix: Mat3,
    /// Occupant index per site, length `n_sublattices * det(T)`.
    pub occupation: Vec<u8>,
    /// Thermodynamic conditions.
    pub conditions: ValueMap,
}

impl State {
    /// Checks the identity invariant `occupation.len() == b * det(T)` and
    /// the per-site occupant ranges.
    pub fn validate_shape(&self, convert: &Conversions) -> Result<(), CemcError> {
        if self.occupation.len() != convert.n_sites() {
            return Err(CemcError::Consistency(
                ErrorInfo::new("occupation-length", "occupation length does not match supercell")
                    .with_context("expected", convert.n_sites().to_string())
                    .with_context("found", self.occupation.len().to_string()),
            ));
        }
        for (l, &occ) in self.occupation.iter().enumerate() {
            let asym = convert.l_to_asym(l);
            if occ as usize >= convert.asym_n_occupants(asym) {
                return Err(CemcError::Consistency(
                    ErrorInfo::new("occupant-range", "occupant index exceeds the allowed list")
                        .with_context("site", l.to_string())
                        .with_context("occupant", occ.to_string()),
                ));
            }
        }
        Ok(())
    }
}

/// Conditions resolved into an efficient-to-use form.
///
/// Built once per run from the state's [`ValueMap`]; evaluation never
/// fails afterwards.
#[derive(Debug, Clone)]
pub struct Conditions {
    /// Temperature in K.
    pub temperature: f64,
    /// `1 / (KB * temperature)`.
    pub beta: f64,
    /// Requested species per unit cell, if set.
    pub mol_composition: Option<Vec<f64>>,
    /// Chemical potential conjugate to the parametric composition, if set.
    pub param_chem_pot: Option<Vec<f64>>,
    /// Exchange-potential table `xi[new_species][curr_species]` derived
    /// from `param_chem_pot`.
    pub exchange_chem_pot: Option<Vec<Vec<f64>>>,
}

impl Conditions {
    /// Resolves `map` against the composition axes.
    ///
    /// `temperature` is always required. `mol_composition` may be given
    /// directly or derived from `param_composition`. `param_chem_pot` is
    /// resolved into the exchange-potential table when present.
    pub fn from_value_map(
        map: &ValueMap,
        converter: &CompositionConverter,
    ) -> Result<Self, CemcError> {
        let temperature = map.require_scalar("temperature")?;
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(CemcError::Numeric(
                ErrorInfo::new("temperature-range", "temperature must be positive and finite")
                    .with_context("temperature", temperature.to_string()),
            ));
        }
        let beta = 1.0 / (KB * temperature);

        let mol_composition = if map.vector_values.contains_key("mol_composition") {
            Some(
                map.require_vector_of_len("mol_composition", converter.n_components())?
                    .to_vec(),
            )
        } else if map.vector_values.contains_key("param_composition") {
            let param =
                map.require_vector_of_len("param_composition", converter.n_independent())?;
            Some(converter.mol_from_param(param))
        } else {
            None
        };

        let param_chem_pot = if map.vector_values.contains_key("param_chem_pot") {
            Some(
                map.require_vector_of_len("param_chem_pot", converter.n_independent())?
                    .to_vec(),
            )
        } else {
            None
        };
        let exchange_chem_pot = param_chem_pot
            .as_deref()
            .map(|mu| converter.exchange_chem_pot(mu));

        Ok(Self {
            temperature,
            beta,
            mol_composition,
            param_chem_pot,
            exchange_chem_pot,
        })
    }
}

/// Builds a conditions value map from a temperature and a composition map.
///
/// `comp` may be keyed by component names (interpreted as
/// `mol_composition`) or by axis names (interpreted as
/// `param_composition` and converted). Mixing the two is an error.
pub fn make_conditions(
    temperature: f64,
    converter: &CompositionConverter,
    comp: &BTreeMap<String, f64>,
) -> Result<ValueMap, CemcError> {
    let mut conditions = ValueMap::new();
    conditions
        .scalar_values
        .insert("temperature".to_string(), temperature);
    conditions.vector_values.insert(
        "mol_composition".to_string(),
        resolve_composition_map(converter, comp, false)?,
    );
    Ok(conditions)
}

/// Builds a conditions increment value map.
///
/// Increments given by axis name are converted through the end-member
/// deltas without the origin offset.
pub fn make_conditions_increment(
    temperature: f64,
    converter: &CompositionConverter,
    comp: &BTreeMap<String, f64>,
) -> Result<ValueMap, CemcError> {
    let mut conditions = ValueMap::new();
    conditions
        .scalar_values
        .insert("temperature".to_string(), temperature);
    conditions.vector_values.insert(
        "mol_composition".to_string(),
        resolve_composition_map(converter, comp, true)?,
    );
    Ok(conditions)
}

fn resolve_composition_map(
    converter: &CompositionConverter,
    comp: &BTreeMap<String, f64>,
    increment: bool,
) -> Result<Vec<f64>, CemcError> {
    let components = converter.components();
    let axes = converter.axis_names();
    let by_component = comp.keys().all(|key| components.contains(key));
    let by_axis = comp.keys().all(|key| axes.contains(key));
    if by_component && !comp.is_empty() {
        let mut mol = vec![0.0; components.len()];
        for (i, name) in components.iter().enumerate() {
            if let Some(&value) = comp.get(name) {
                mol[i] = value;
            }
        }
        return Ok(mol);
    }
    if by_axis && !comp.is_empty() {
        let mut param = vec![0.0; axes.len()];
        for (a, name) in axes.iter().enumerate() {
            if let Some(&value) = comp.get(name) {
                param[a] = value;
            }
        }
        let mol = if increment {
            // increments transform without the origin offset
            let at_param = converter.mol_from_param(&param);
            let at_zero = converter.mol_from_param(&vec![0.0; axes.len()]);
            at_param.iter().zip(&at_zero).map(|(a, b)| a - b).collect()
        } else {
            converter.mol_from_param(&param)
        };
        return Ok(mol);
    }
    Err(CemcError::Config(
        ErrorInfo::new(
            "composition-keys",
            "composition must be keyed entirely by component names or entirely by axis names",
        )
        .with_context("keys", comp.keys().cloned().collect::<Vec<_>>().join(",")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cemc_lattice::CompositionAxes;

    fn converter() -> CompositionConverter {
        CompositionConverter::from_axes(&CompositionAxes {
            components: vec!["A".into(), "B".into()],
            origin: vec![1.0, 0.0],
            end_members: vec![vec![0.0, 1.0]],
        })
        .unwrap()
    }

    #[test]
    fn conditions_require_temperature() {
        let map = ValueMap::new();
        let err = Conditions::from_value_map(&map, &converter()).unwrap_err();
        assert_eq!(err.info().code, "missing-condition");
    }

    #[test]
    fn param_composition_is_converted() {
        let mut map = ValueMap::new();
        map.scalar_values.insert("temperature".into(), 800.0);
        map.vector_values
            .insert("param_composition".into(), vec![0.5]);
        let conditions = Conditions::from_value_map(&map, &converter()).unwrap();
        let mol = conditions.mol_composition.unwrap();
        assert!((mol[0] - 0.5).abs() < 1e-12);
        assert!((mol[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mixed_composition_keys_are_rejected() {
        let comp: BTreeMap<String, f64> =
            [("A".to_string(), 0.5), ("a".to_string(), 0.5)].into();
        let err = make_conditions(600.0, &converter(), &comp).unwrap_err();
        assert_eq!(err.info().code, "composition-keys");
    }

    #[test]
    fn increment_by_axis_excludes_origin() {
        let comp: BTreeMap<String, f64> = [("a".to_string(), 0.1)].into();
        let increment = make_conditions_increment(0.0, &converter(), &comp).unwrap();
        let mol = &increment.vector_values["mol_composition"];
        assert!((mol[0] + 0.1).abs() < 1e-12);
        assert!((mol[1] - 0.1).abs() < 1e-12);
    }
}
