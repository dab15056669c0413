//! Results analysis functions.
//!
//! Derived quantities computed from a completed run's sampled series:
//! heat capacity and the chemical / thermo-chemical susceptibilities.

use std::collections::BTreeMap;

use cemc_core::{CemcError, ErrorInfo, KB};
use cemc_lattice::det;

use crate::sampling::Sampler;
use crate::state::State;

/// Data handed to analysis functions after a run completes.
pub struct RunResults<'a> {
    /// The run's initial state (preserved for `T` and `N`).
    pub initial_state: &'a State,
    /// The fixture's observations.
    pub sampler: &'a Sampler,
}

/// A named function deriving values from a completed run.
pub struct ResultsAnalysisFunction {
    /// Result name.
    pub name: String,
    /// One-line description for result summaries.
    pub description: String,
    /// Component names, fixing the output shape.
    pub component_names: Vec<String>,
    /// The function itself.
    pub function: Box<dyn Fn(&RunResults<'_>) -> Result<Vec<f64>, CemcError>>,
}

/// Name-keyed analysis function table.
pub type AnalysisFunctionMap = BTreeMap<String, ResultsAnalysisFunction>;

fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

fn covariance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / a.len() as f64
}

fn temperature_of(results: &RunResults<'_>, name: &str) -> Result<f64, CemcError> {
    results
        .initial_state
        .conditions
        .require_scalar("temperature")
        .map_err(|_| {
            CemcError::Consistency(
                ErrorInfo::new("analysis-requires", "analysis requires the temperature condition")
                    .with_context("analysis", name),
            )
        })
}

fn n_unitcells_of(results: &RunResults<'_>) -> f64 {
    det(&results.initial_state.transformation_matrix).unsigned_abs() as f64
}

fn require_column(
    results: &RunResults<'_>,
    quantity: &str,
    component: usize,
    name: &str,
) -> Result<Vec<f64>, CemcError> {
    let trace = results.sampler.trace(quantity).ok_or_else(|| {
        CemcError::Consistency(
            ErrorInfo::new("analysis-requires", "analysis requires a sampled quantity")
                .with_context("analysis", name)
                .with_context("quantity", quantity),
        )
    })?;
    if component >= trace.component_names.len() {
        return Err(CemcError::Consistency(
            ErrorInfo::new("analysis-requires", "sampled quantity is missing a component")
                .with_context("analysis", name)
                .with_context("component", component.to_string()),
        ));
    }
    Ok(trace.component_column(component))
}

/// Heat capacity per unit cell:
/// `var(potential_energy) * n_unitcells / (KB * T^2)`.
///
/// Requires sampling `potential_energy` (per unit cell).
pub fn make_heat_capacity_f() -> ResultsAnalysisFunction {
    ResultsAnalysisFunction {
        name: "heat_capacity".to_string(),
        description:
            "Heat capacity (per unit cell) = var(potential_energy)*n_unitcells/(kB*T*T)"
                .to_string(),
        component_names: vec!["0".to_string()],
        function: Box::new(|results| {
            let temperature = temperature_of(results, "heat_capacity")?;
            let series = require_column(results, "potential_energy", 0, "heat_capacity")?;
            let normalization = n_unitcells_of(results) / (KB * temperature * temperature);
            Ok(vec![covariance(&series, &series) * normalization])
        }),
    }
}

fn pair_names(first: &[String], second: &[String]) -> Vec<String> {
    let mut names = Vec::with_capacity(first.len() * second.len());
    for a in first {
        for b in second {
            names.push(format!("{a},{b}"));
        }
    }
    names
}

fn make_covariance_f(
    name: &str,
    description: &str,
    first_quantity: &str,
    second_quantity: &str,
    first_components: Vec<String>,
    second_components: Vec<String>,
) -> ResultsAnalysisFunction {
    let component_names = pair_names(&first_components, &second_components);
    let name_owned = name.to_string();
    let first_quantity = first_quantity.to_string();
    let second_quantity = second_quantity.to_string();
    let n_first = first_components.len();
    let n_second = second_components.len();
    ResultsAnalysisFunction {
        name: name_owned.clone(),
        description: description.to_string(),
        component_names,
        function: Box::new(move |results| {
            let temperature = temperature_of(results, &name_owned)?;
            let normalization = n_unitcells_of(results) / (KB * temperature);
            let mut values = Vec::with_capacity(n_first * n_second);
            for i in 0..n_first {
                let a = require_column(results, &first_quantity, i, &name_owned)?;
                for j in 0..n_second {
                    let b = require_column(results, &second_quantity, j, &name_owned)?;
                    values.push(covariance(&a, &b) * normalization);
                }
            }
            Ok(values)
        }),
    }
}

/// Chemical susceptibility over species:
/// `cov(mol_composition_i, mol_composition_j) * n_unitcells / (KB * T)`.
pub fn make_mol_susc_f(components: &[String]) -> ResultsAnalysisFunction {
    make_covariance_f(
        "mol_susc",
        "Chemical susceptibility (per unit cell) = \
         cov(mol_composition_i, mol_composition_j)*n_unitcells/(kB*T)",
        "mol_composition",
        "mol_composition",
        components.to_vec(),
        components.to_vec(),
    )
}

/// Chemical susceptibility over composition axes.
pub fn make_param_susc_f(axes: &[String]) -> ResultsAnalysisFunction {
    make_covariance_f(
        "param_susc",
        "Chemical susceptibility (per unit cell) = \
         cov(param_composition_a, param_composition_b)*n_unitcells/(kB*T)",
        "param_composition",
        "param_composition",
        axes.to_vec(),
        axes.to_vec(),
    )
}

/// Thermo-chemical susceptibility over species:
/// `cov(potential_energy, mol_composition) * n_unitcells / (KB * T)`.
pub fn make_mol_thermochem_susc_f(components: &[String]) -> ResultsAnalysisFunction {
    make_covariance_f(
        "mol_thermochem_susc",
        "Thermo-chemical susceptibility (per unit cell) = \
         cov(potential_energy, mol_composition)*n_unitcells/(kB*T)",
        "potential_energy",
        "mol_composition",
        vec!["S".to_string()],
        components.to_vec(),
    )
}

/// Thermo-chemical susceptibility over composition axes.
pub fn make_param_thermochem_susc_f(axes: &[String]) -> ResultsAnalysisFunction {
    make_covariance_f(
        "param_thermochem_susc",
        "Thermo-chemical susceptibility (per unit cell) = \
         cov(potential_energy, param_composition)*n_unitcells/(kB*T)",
        "potential_energy",
        "param_composition",
        vec!["S".to_string()],
        axes.to_vec(),
    )
}

/// Builds the standard analysis table: heat capacity plus the chemical
/// and thermo-chemical susceptibilities.
pub fn standard_analysis_functions(
    components: &[String],
    axes: &[String],
) -> AnalysisFunctionMap {
    let mut map = AnalysisFunctionMap::new();
    for function in [
        make_heat_capacity_f(),
        make_mol_susc_f(components),
        make_param_susc_f(axes),
        make_mol_thermochem_susc_f(components),
        make_param_thermochem_susc_f(axes),
    ] {
        map.insert(function.name.clone(), function);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covariance_of_identical_series_is_variance() {
        let series = [1.0, 2.0, 3.0, 4.0];
        let variance = covariance(&series, &series);
        assert!((variance - 1.25).abs() < 1e-12);
    }
}
