//! Composition axes: conversion between species-per-unit-cell counts
//! (`mol_composition`) and parametric composition (`param_composition`).

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};

use crate::supercell::Conversions;

/// Serialized form of the composition axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionAxes {
    /// Component (species) names, fixing the `mol_composition` ordering.
    pub components: Vec<String>,
    /// Species-per-unit-cell composition at the axes origin.
    pub origin: Vec<f64>,
    /// Species-per-unit-cell composition of each end member, one per
    /// independent axis.
    pub end_members: Vec<Vec<f64>>,
}

/// Linear converter between `mol_composition` and `param_composition`.
///
/// `mol = origin + E * param`, where column `k` of `E` is
/// `end_member_k - origin`. The reverse direction uses the Moore-Penrose
/// pseudo-inverse of `E`, so `param_from_mol . mol_from_param` is the
/// identity whenever the end members are independent.
#[derive(Debug, Clone)]
pub struct CompositionConverter {
    components: Vec<String>,
    origin: DVector<f64>,
    delta: DMatrix<f64>,
    pinv: DMatrix<f64>,
}

impl CompositionConverter {
    /// Builds a converter, validating shapes and axis independence.
    pub fn from_axes(axes: &CompositionAxes) -> Result<Self, CemcError> {
        let n = axes.components.len();
        if axes.origin.len() != n {
            return Err(CemcError::Config(
                ErrorInfo::new("axes-shape", "origin length must match component count")
                    .with_context("components", n.to_string())
                    .with_context("origin_len", axes.origin.len().to_string()),
            ));
        }
        if axes.end_members.is_empty() {
            return Err(CemcError::Config(ErrorInfo::new(
                "axes-shape",
                "at least one end member is required",
            )));
        }
        for (k, member) in axes.end_members.iter().enumerate() {
            if member.len() != n {
                return Err(CemcError::Config(
                    ErrorInfo::new("axes-shape", "end member length must match component count")
                        .with_context("end_member", k.to_string()),
                ));
            }
        }
        let k = axes.end_members.len();
        let origin = DVector::from_column_slice(&axes.origin);
        let mut delta = DMatrix::zeros(n, k);
        for (col, member) in axes.end_members.iter().enumerate() {
            for (row, value) in member.iter().enumerate() {
                delta[(row, col)] = value - axes.origin[row];
            }
        }
        // pinv = (E^T E)^-1 E^T; fails when end members are dependent.
        let gram = delta.transpose() * &delta;
        let gram_inv = gram.try_inverse().ok_or_else(|| {
            CemcError::Config(ErrorInfo::new(
                "dependent-axes",
                "composition end members are linearly dependent",
            ))
        })?;
        let pinv = gram_inv * delta.transpose();
        Ok(Self {
            components: axes.components.clone(),
            origin,
            delta,
            pinv,
        })
    }

    /// Component (species) names.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Number of independent composition axes.
    pub fn n_independent(&self) -> usize {
        self.delta.ncols()
    }

    /// Axis names `a`, `b`, ... in order.
    pub fn axis_names(&self) -> Vec<String> {
        (0..self.n_independent())
            .map(|k| {
                char::from_u32('a' as u32 + k as u32)
                    .map(String::from)
                    .unwrap_or_else(|| format!("x{k}"))
            })
            .collect()
    }

    /// `mol_composition` for a parametric composition.
    pub fn mol_from_param(&self, param: &[f64]) -> Vec<f64> {
        let x = DVector::from_column_slice(param);
        (&self.origin + &self.delta * x).iter().copied().collect()
    }

    /// Parametric composition for a `mol_composition`.
    pub fn param_from_mol(&self, mol: &[f64]) -> Vec<f64> {
        let n = DVector::from_column_slice(mol);
        (&self.pinv * (n - &self.origin)).iter().copied().collect()
    }

    /// Per-component chemical potential induced by `param_chem_pot`.
    ///
    /// Component `i` carries `sum_a param_chem_pot[a] * d(param_a)/d(mol_i)`.
    pub fn component_chem_pot(&self, param_chem_pot: &[f64]) -> Vec<f64> {
        let mu = DVector::from_column_slice(param_chem_pot);
        (self.pinv.transpose() * mu).iter().copied().collect()
    }

    /// Exchange-potential table `xi[new][curr]` used by the semi-grand
    /// delta: the potential change of replacing one `curr` atom by `new`.
    pub fn exchange_chem_pot(&self, param_chem_pot: &[f64]) -> Vec<Vec<f64>> {
        let per_component = self.component_chem_pot(param_chem_pot);
        per_component
            .iter()
            .map(|new| per_component.iter().map(|curr| new - curr).collect())
            .collect()
    }
}

/// Computes species-per-unit-cell counts from an occupation vector.
#[derive(Debug, Clone)]
pub struct CompositionCalculator {
    n_components: usize,
}

impl CompositionCalculator {
    /// Creates a calculator for `n_components` species.
    pub fn new(n_components: usize) -> Self {
        Self { n_components }
    }

    /// Mean number of each component per unit cell.
    pub fn mean_num_each_component(&self, occupation: &[u8], convert: &Conversions) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_components];
        for (l, &occ) in occupation.iter().enumerate() {
            counts[convert.species_index(convert.l_to_sublattice(l), occ)] += 1.0;
        }
        let volume = convert.volume() as f64;
        for count in &mut counts {
            *count /= volume;
        }
        counts
    }

    /// Raw number of each component in the supercell.
    pub fn num_each_component(&self, occupation: &[u8], convert: &Conversions) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_components];
        for (l, &occ) in occupation.iter().enumerate() {
            counts[convert.species_index(convert.l_to_sublattice(l), occ)] += 1;
        }
        counts
    }
}
