//! Cluster expansions: a basis evaluator paired with coefficient vectors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};
use cemc_lattice::SuperNeighborList;

use crate::basis::Clexulator;
use crate::view::OccView;

/// Sparse expansion coefficients: `value[i]` multiplies basis function
/// `index[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseCoefficients {
    /// Basis-function indices with nonzero coefficients.
    pub index: Vec<usize>,
    /// Coefficient values, parallel to `index`.
    pub value: Vec<f64>,
}

impl SparseCoefficients {
    /// Builds sparse coefficients from a dense vector, dropping zeros.
    pub fn from_dense(dense: &[f64]) -> Self {
        let mut index = Vec::new();
        let mut value = Vec::new();
        for (i, &v) in dense.iter().enumerate() {
            if v != 0.0 {
                index.push(i);
                value.push(v);
            }
        }
        Self { index, value }
    }

    /// Largest referenced basis-function index, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.index.iter().copied().max()
    }

    /// Dot product with a correlation vector.
    #[inline]
    pub fn dot(&self, corr: &[f64]) -> f64 {
        self.index
            .iter()
            .zip(&self.value)
            .map(|(&i, &v)| v * corr[i])
            .sum()
    }
}

fn check_shapes(
    clexulator: &dyn Clexulator,
    neighbor_list: &SuperNeighborList,
    coefficients: &SparseCoefficients,
) -> Result<(), CemcError> {
    if clexulator.window_size() != neighbor_list.window_size() {
        return Err(CemcError::Consistency(
            ErrorInfo::new("window-mismatch", "evaluator and neighbor list window sizes differ")
                .with_context("evaluator", clexulator.window_size().to_string())
                .with_context("neighbor_list", neighbor_list.window_size().to_string()),
        ));
    }
    if let Some(max) = coefficients.max_index() {
        if max >= clexulator.n_functions() {
            return Err(CemcError::Consistency(
                ErrorInfo::new("coefficient-index", "coefficient references unknown basis function")
                    .with_context("index", max.to_string())
                    .with_context("n_functions", clexulator.n_functions().to_string()),
            ));
        }
    }
    Ok(())
}

/// A cluster expansion bound to one supercell.
///
/// Stateless with respect to the occupation: every evaluation takes the
/// occupation by reference. Delta evaluation requires that the supercell be
/// large enough that no cluster instance wraps onto itself; the delta then
/// equals the difference of extensive values to within round-off.
#[derive(Clone)]
pub struct ClusterExpansion {
    clexulator: Arc<dyn Clexulator>,
    neighbor_list: Arc<SuperNeighborList>,
    coefficients: SparseCoefficients,
    volume: usize,
}

impl std::fmt::Debug for ClusterExpansion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterExpansion")
            .field("clexulator", &"<dyn Clexulator>")
            .field("neighbor_list", &self.neighbor_list)
            .field("coefficients", &self.coefficients)
            .field("volume", &self.volume)
            .finish()
    }
}

impl ClusterExpansion {
    /// Binds `clexulator` and `coefficients` to one supercell.
    pub fn new(
        clexulator: Arc<dyn Clexulator>,
        neighbor_list: Arc<SuperNeighborList>,
        coefficients: SparseCoefficients,
    ) -> Result<Self, CemcError> {
        check_shapes(clexulator.as_ref(), &neighbor_list, &coefficients)?;
        let volume = neighbor_list.volume();
        Ok(Self {
            clexulator,
            neighbor_list,
            coefficients,
            volume,
        })
    }

    /// The bound coefficients.
    pub fn coefficients(&self) -> &SparseCoefficients {
        &self.coefficients
    }

    /// Extensive expansion value: sum over unit cells of the coefficient
    /// contraction of the per-cell correlation contribution.
    pub fn extensive_value(&self, occupation: &[u8]) -> f64 {
        let occ = OccView::new(occupation);
        let mut contribution = vec![0.0; self.clexulator.n_functions()];
        let mut total = 0.0;
        for u in 0..self.volume {
            contribution.fill(0.0);
            self.clexulator
                .corr_contribution(&mut contribution, self.neighbor_list.sites(u), &occ);
            total += self.coefficients.dot(&contribution);
        }
        total
    }

    /// Change in extensive value after writing `new_occ[i]` at `sites[i]`,
    /// without mutating `occupation`.
    ///
    /// Changes are layered sequentially so overlapping clusters among the
    /// changed sites are counted exactly once. Contributions accumulate in
    /// canonical order (given site order, then basis-function index).
    pub fn occ_delta_value(&self, occupation: &[u8], sites: &[usize], new_occ: &[u8]) -> f64 {
        debug_assert_eq!(sites.len(), new_occ.len());
        if sites.is_empty() {
            return 0.0;
        }
        let mut occ = OccView::new(occupation);
        let mut point = vec![0.0; self.clexulator.n_functions()];
        let mut delta = 0.0;
        for (&l, &new) in sites.iter().zip(new_occ) {
            let unitcell = self.neighbor_list.home_unitcell(l);
            let window = self.neighbor_list.sites(unitcell);
            let neighbor_index = self.neighbor_list.neighbor_index(l);

            point.fill(0.0);
            self.clexulator
                .point_corr(&mut point, neighbor_index, window, &occ);
            delta -= self.coefficients.dot(&point);

            occ.set(l, new);

            point.fill(0.0);
            self.clexulator
                .point_corr(&mut point, neighbor_index, window, &occ);
            delta += self.coefficients.dot(&point);
        }
        delta
    }
}

/// Several expansions sharing one basis evaluator.
#[derive(Clone)]
pub struct MultiClusterExpansion {
    clexulator: Arc<dyn Clexulator>,
    neighbor_list: Arc<SuperNeighborList>,
    coefficients: Vec<SparseCoefficients>,
    volume: usize,
}

impl MultiClusterExpansion {
    /// Binds `clexulator` and each coefficient vector to one supercell.
    pub fn new(
        clexulator: Arc<dyn Clexulator>,
        neighbor_list: Arc<SuperNeighborList>,
        coefficients: Vec<SparseCoefficients>,
    ) -> Result<Self, CemcError> {
        for coeffs in &coefficients {
            check_shapes(clexulator.as_ref(), &neighbor_list, coeffs)?;
        }
        let volume = neighbor_list.volume();
        Ok(Self {
            clexulator,
            neighbor_list,
            coefficients,
            volume,
        })
    }

    /// Number of expansions.
    pub fn n_expansions(&self) -> usize {
        self.coefficients.len()
    }

    /// Extensive value of each expansion.
    pub fn extensive_values(&self, occupation: &[u8]) -> Vec<f64> {
        let occ = OccView::new(occupation);
        let mut contribution = vec![0.0; self.clexulator.n_functions()];
        let mut totals = vec![0.0; self.coefficients.len()];
        for u in 0..self.volume {
            contribution.fill(0.0);
            self.clexulator
                .corr_contribution(&mut contribution, self.neighbor_list.sites(u), &occ);
            for (total, coeffs) in totals.iter_mut().zip(&self.coefficients) {
                *total += coeffs.dot(&contribution);
            }
        }
        totals
    }

    /// Change in each extensive value for the given occupation changes.
    pub fn occ_delta_values(&self, occupation: &[u8], sites: &[usize], new_occ: &[u8]) -> Vec<f64> {
        let mut deltas = vec![0.0; self.coefficients.len()];
        if sites.is_empty() {
            return deltas;
        }
        let mut occ = OccView::new(occupation);
        let mut point = vec![0.0; self.clexulator.n_functions()];
        for (&l, &new) in sites.iter().zip(new_occ) {
            let unitcell = self.neighbor_list.home_unitcell(l);
            let window = self.neighbor_list.sites(unitcell);
            let neighbor_index = self.neighbor_list.neighbor_index(l);

            point.fill(0.0);
            self.clexulator
                .point_corr(&mut point, neighbor_index, window, &occ);
            for (delta, coeffs) in deltas.iter_mut().zip(&self.coefficients) {
                *delta -= coeffs.dot(&point);
            }

            occ.set(l, new);

            point.fill(0.0);
            self.clexulator
                .point_corr(&mut point, neighbor_index, window, &occ);
            for (delta, coeffs) in deltas.iter_mut().zip(&self.coefficients) {
                *delta += coeffs.dot(&point);
            }
        }
        deltas
    }
}
