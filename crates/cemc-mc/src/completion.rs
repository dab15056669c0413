//! Convergence estimation and run completion checks.
//!
//! Means are estimated with batch means; the batch-mean variance yields an
//! autocorrelation-aware effective sample size, so the reported precision
//! is honest for correlated Monte Carlo series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sampling::{SampleClock, SampleMode, Sampler};

/// Hard lower and upper bounds on run length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutoffParams {
    /// Completion requires at least this counter value.
    #[serde(default)]
    pub min_count: Option<f64>,
    /// The run stops unconditionally at this counter value.
    #[serde(default)]
    pub max_count: Option<f64>,
    /// Completion requires at least this simulated time.
    #[serde(default)]
    pub min_time: Option<f64>,
    /// The run stops unconditionally at this simulated time.
    #[serde(default)]
    pub max_time: Option<f64>,
}

/// Requested precision on the estimated mean of one sampled component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedPrecision {
    /// Sampled quantity name.
    pub quantity: String,
    /// Component index; every component when absent.
    #[serde(default)]
    pub component_index: Option<usize>,
    /// Absolute half-width target on the mean.
    #[serde(default)]
    pub abs_precision: Option<f64>,
    /// Relative half-width target on the mean.
    #[serde(default)]
    pub rel_precision: Option<f64>,
}

/// Completion check configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionCheckParams {
    /// Hard bounds.
    #[serde(default)]
    pub cutoff: CutoffParams,
    /// Per-quantity convergence criteria.
    #[serde(default)]
    pub convergence: Vec<RequestedPrecision>,
    /// Samples between completion checks.
    #[serde(default = "default_check_period")]
    pub check_period: u64,
}

fn default_check_period() -> u64 {
    10
}

/// Mean, precision and effective sample size of one observation series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicStatistics {
    /// Sample mean.
    pub mean: f64,
    /// Estimated 95% half-width of the mean.
    pub calculated_precision: f64,
    /// Autocorrelation-adjusted effective sample size.
    pub effective_sample_size: f64,
}

/// Convergence state of one requested component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualConvergenceResult {
    /// Estimated statistics.
    pub statistics: BasicStatistics,
    /// Requested absolute precision, if any.
    pub abs_precision: Option<f64>,
    /// Requested relative precision, if any.
    pub rel_precision: Option<f64>,
    /// True once the estimate meets its target.
    pub converged: bool,
}

/// Result of one completion check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionCheckResult {
    /// True when the run should stop.
    pub complete: bool,
    /// True when every requested quantity is converged.
    pub all_converged: bool,
    /// True when a hard cap forced completion.
    pub hard_cap: bool,
    /// Per-component convergence, keyed `quantity(component)`.
    pub individual: BTreeMap<String, IndividualConvergenceResult>,
}

/// Estimates statistics for one scalar observation series.
///
/// Batch count is fixed at 32 once enough samples exist; below 16 samples
/// the precision is reported as infinite so short runs never converge
/// spuriously.
pub fn estimate_statistics(observations: &[f64]) -> BasicStatistics {
    let n = observations.len();
    if n < 16 {
        return BasicStatistics {
            mean: if n == 0 {
                0.0
            } else {
                observations.iter().sum::<f64>() / n as f64
            },
            calculated_precision: f64::INFINITY,
            effective_sample_size: n as f64,
        };
    }
    let n_f = n as f64;
    let mean = observations.iter().sum::<f64>() / n_f;
    let variance =
        observations.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n_f - 1.0);
    if variance == 0.0 {
        return BasicStatistics {
            mean,
            calculated_precision: 0.0,
            effective_sample_size: n_f,
        };
    }

    let n_batches = if n >= 64 { 32 } else { n / 2 };
    let batch_size = n / n_batches;
    let used = n_batches * batch_size;
    // use the trailing samples so start-up transients weigh least
    let tail = &observations[n - used..];
    let batch_means: Vec<f64> = tail
        .chunks_exact(batch_size)
        .map(|batch| batch.iter().sum::<f64>() / batch_size as f64)
        .collect();
    let grand = batch_means.iter().sum::<f64>() / n_batches as f64;
    let batch_variance = batch_means
        .iter()
        .map(|x| (x - grand) * (x - grand))
        .sum::<f64>()
        / (n_batches as f64 - 1.0);

    let se_mean = (batch_variance / n_batches as f64).sqrt();
    let tau = (batch_size as f64 * batch_variance / variance).max(1.0);
    BasicStatistics {
        mean,
        calculated_precision: 1.96 * se_mean,
        effective_sample_size: n_f / tau,
    }
}

fn is_converged(
    statistics: &BasicStatistics,
    abs_precision: Option<f64>,
    rel_precision: Option<f64>,
) -> bool {
    let abs_ok = abs_precision.is_some_and(|target| statistics.calculated_precision <= target);
    let rel_ok = rel_precision
        .is_some_and(|target| statistics.calculated_precision <= target * statistics.mean.abs());
    abs_ok || rel_ok
}

/// Runs the completion check against the sampler contents. Count cutoffs
/// are interpreted in the fixture's schedule units (`mode`).
pub fn check_completion(
    sampler: &Sampler,
    clock: &SampleClock,
    mode: SampleMode,
    params: &CompletionCheckParams,
) -> CompletionCheckResult {
    let mut individual = BTreeMap::new();
    let mut all_converged = !params.convergence.is_empty();
    for requested in &params.convergence {
        let Some(trace) = sampler.trace(&requested.quantity) else {
            all_converged = false;
            continue;
        };
        let components: Vec<usize> = match requested.component_index {
            Some(i) => vec![i],
            None => (0..trace.component_names.len()).collect(),
        };
        for component in components {
            if component >= trace.component_names.len() {
                all_converged = false;
                continue;
            }
            let statistics = estimate_statistics(&trace.component_column(component));
            let converged =
                is_converged(&statistics, requested.abs_precision, requested.rel_precision);
            all_converged &= converged;
            individual.insert(
                format!("{}({})", requested.quantity, trace.component_names[component]),
                IndividualConvergenceResult {
                    statistics,
                    abs_precision: requested.abs_precision,
                    rel_precision: requested.rel_precision,
                    converged,
                },
            );
        }
    }

    let counter = clock.counter(mode);
    let hard_cap = params.cutoff.max_count.is_some_and(|max| counter >= max)
        || clock
            .time
            .zip(params.cutoff.max_time)
            .is_some_and(|(time, max)| time >= max);

    let min_reached = params.cutoff.min_count.map_or(true, |min| counter >= min)
        && params
            .cutoff
            .min_time
            .map_or(true, |min| clock.time.unwrap_or(0.0) >= min);

    CompletionCheckResult {
        complete: hard_cap || (all_converged && min_reached),
        all_converged,
        hard_cap,
        individual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncorrelated_series_has_full_sample_size() {
        // deterministic low-discrepancy series, effectively uncorrelated
        let observations: Vec<f64> = (0..4096)
            .map(|i| ((i as f64 * 0.618_033_988_749_895).fract()) - 0.5)
            .collect();
        let stats = estimate_statistics(&observations);
        assert!(stats.mean.abs() < 0.01);
        assert!(stats.effective_sample_size > 1000.0);
    }

    #[test]
    fn constant_series_is_exact() {
        let observations = vec![2.5; 100];
        let stats = estimate_statistics(&observations);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.calculated_precision, 0.0);
    }

    #[test]
    fn short_series_never_converges() {
        let stats = estimate_statistics(&[1.0, 2.0, 3.0]);
        assert!(stats.calculated_precision.is_infinite());
    }
}
