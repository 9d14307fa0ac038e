//! Gaussian mixture models fitted to histogram samples.
//!
//! [`Histogram1D::fit_mixture`] draws samples from the histogram, fits
//! mixtures with an increasing number of components by expectation
//! maximization, and keeps the one with the lowest BIC.

use std::f64::consts::PI;

use bon::Builder;
use rand::Rng;

use super::{maybe_log, FitError, Histogram1D, LogBase};
use crate::config::{check_bounds, check_non_negative, check_positive, ConfigError};
use crate::distribution::Normal;

// =============================================================================
// MixtureConfig
// =============================================================================

/// Options for [`Histogram1D::fit_mixture`].
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct MixtureConfig {
    /// Samples drawn from the histogram to fit against. Default: 100000.
    #[builder(default = 100_000)]
    pub n_samples: usize,

    /// Log applied to the samples before fitting.
    pub log: Option<LogBase>,

    /// Components whose mean falls outside `[low, high]` are inactive.
    pub mean_bounds: Option<(f64, f64)>,

    /// Components whose variance falls outside `[low, high]` are inactive.
    pub variance_bounds: Option<(f64, f64)>,

    /// Fewest components tried. Default: 1.
    #[builder(default = 1)]
    pub k_min: usize,

    /// Component count the search stops before. Default: 5.
    #[builder(default = 5)]
    pub k_max: usize,

    /// Relative BIC change below which the search stops. Default: 0.05.
    #[builder(default = 0.05)]
    pub tolerance: f64,

    /// EM iterations per fit. Default: 100.
    #[builder(default = 100)]
    pub max_iter: usize,

    /// EM convergence threshold on the mean log-likelihood. Default: 1e-3.
    #[builder(default = 1e-3)]
    pub em_tolerance: f64,

    /// Added to every variance to keep components from collapsing. Default: 1e-6.
    #[builder(default = 1e-6)]
    pub reg_variance: f64,
}

impl<S: mixture_config_builder::IsComplete> MixtureConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<MixtureConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            n_samples: 100_000,
            log: None,
            mean_bounds: None,
            variance_bounds: None,
            k_min: 1,
            k_max: 5,
            tolerance: 0.05,
            max_iter: 100,
            em_tolerance: 1e-3,
            reg_variance: 1e-6,
        }
    }
}

impl MixtureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_samples == 0 {
            return Err(ConfigError::Zero("n_samples"));
        }
        if self.k_min == 0 {
            return Err(ConfigError::Zero("k_min"));
        }
        if self.k_min > self.k_max {
            return Err(ConfigError::InvalidRange {
                field: "k_min..k_max",
                min: self.k_min,
                max: self.k_max,
            });
        }
        if self.max_iter == 0 {
            return Err(ConfigError::Zero("max_iter"));
        }
        check_bounds("mean_bounds", self.mean_bounds)?;
        check_bounds("variance_bounds", self.variance_bounds)?;
        check_non_negative("tolerance", self.tolerance)?;
        check_positive("em_tolerance", self.em_tolerance)?;
        check_non_negative("reg_variance", self.reg_variance)
    }
}

// =============================================================================
// GaussianMixture
// =============================================================================

/// One-dimensional Gaussian mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    weights: Vec<f64>,
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl GaussianMixture {
    /// Fit `k` components to `data` by expectation maximization.
    ///
    /// Means start at evenly spaced quantiles of the data, variances at the
    /// data variance and weights uniform.
    pub fn fit(data: &[f64], k: usize, config: &MixtureConfig) -> Result<Self, FitError> {
        if data.is_empty() || k == 0 {
            return Err(FitError::NoData);
        }
        let n = data.len();
        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mean = data.iter().sum::<f64>() / n as f64;
        let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

        let mut model = Self {
            weights: vec![1.0 / k as f64; k],
            means: (0..k)
                .map(|j| sorted[(((j as f64 + 0.5) / k as f64) * n as f64) as usize % n])
                .collect(),
            variances: vec![var + config.reg_variance; k],
        };

        let mut resp = vec![0.0; n * k];
        let mut previous = f64::NEG_INFINITY;
        for iter in 0..config.max_iter {
            let ll = model.expectation(data, &mut resp);
            model.maximization(data, &resp, config.reg_variance);
            if (ll - previous).abs() < config.em_tolerance {
                log::debug!("EM with {k} components converged after {} iterations", iter + 1);
                break;
            }
            previous = ll;
        }
        Ok(model)
    }

    /// Fill `resp` (row-major `n x k`) with responsibilities and return the
    /// mean log-likelihood.
    fn expectation(&self, data: &[f64], resp: &mut [f64]) -> f64 {
        let k = self.n_components();
        let mut total = 0.0;
        for (i, &x) in data.iter().enumerate() {
            let row = &mut resp[i * k..(i + 1) * k];
            for (j, r) in row.iter_mut().enumerate() {
                *r = self.weights[j].ln() + ln_gaussian(x, self.means[j], self.variances[j]);
            }
            let ln_sum = log_sum_exp(row);
            for r in row.iter_mut() {
                *r = (*r - ln_sum).exp();
            }
            total += ln_sum;
        }
        total / data.len() as f64
    }

    fn maximization(&mut self, data: &[f64], resp: &[f64], reg: f64) {
        let k = self.n_components();
        let n = data.len() as f64;
        for j in 0..k {
            let nk: f64 = (0..data.len()).map(|i| resp[i * k + j]).sum::<f64>() + 10.0 * f64::EPSILON;
            let mean = data
                .iter()
                .enumerate()
                .map(|(i, &x)| resp[i * k + j] * x)
                .sum::<f64>()
                / nk;
            let var = data
                .iter()
                .enumerate()
                .map(|(i, &x)| resp[i * k + j] * (x - mean).powi(2))
                .sum::<f64>()
                / nk;
            self.weights[j] = nk / n;
            self.means[j] = mean;
            self.variances[j] = var + reg;
        }
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    #[inline]
    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Mixture density at `x`.
    pub fn pdf(&self, x: f64) -> f64 {
        (0..self.n_components())
            .map(|j| self.weights[j] * ln_gaussian(x, self.means[j], self.variances[j]).exp())
            .sum()
    }

    /// Total log-likelihood of `data`.
    pub fn log_likelihood(&self, data: &[f64]) -> f64 {
        let mut row = vec![0.0; self.n_components()];
        data.iter()
            .map(|&x| {
                for (j, r) in row.iter_mut().enumerate() {
                    *r = self.weights[j].ln() + ln_gaussian(x, self.means[j], self.variances[j]);
                }
                log_sum_exp(&row)
            })
            .sum()
    }

    /// Bayesian information criterion of the model on `data`.
    pub fn bic(&self, data: &[f64]) -> f64 {
        let n_params = (3 * self.n_components() - 1) as f64;
        -2.0 * self.log_likelihood(data) + n_params * (data.len() as f64).ln()
    }

    /// Components as standalone distributions.
    pub fn components(&self) -> Vec<Normal> {
        self.means
            .iter()
            .zip(&self.variances)
            .filter_map(|(&m, &v)| Normal::new(m, v.sqrt()).ok())
            .collect()
    }
}

fn ln_gaussian(x: f64, mean: f64, variance: f64) -> f64 {
    -0.5 * ((x - mean).powi(2) / variance + variance.ln() + (2.0 * PI).ln())
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

// =============================================================================
// MixtureFit
// =============================================================================

/// Result of [`Histogram1D::fit_mixture`].
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureFit {
    pub model: GaussianMixture,
    /// Per component, whether its mean and variance sit inside the bounds.
    pub active: Vec<bool>,
    pub bic: f64,
}

impl Histogram1D {
    /// Fit a Gaussian mixture to samples drawn from this histogram.
    ///
    /// Component counts from `k_min` upward are tried while each larger
    /// model lowers the BIC, the relative BIC change exceeds `tolerance`,
    /// and the count stays below `k_max`.
    pub fn fit_mixture<R: Rng>(&self, config: &MixtureConfig, rng: &mut R) -> Result<MixtureFit, FitError> {
        let data: Vec<f64> = self
            .sample(config.n_samples, rng)?
            .into_iter()
            .map(|v| maybe_log(v, config.log))
            .filter(|v| v.is_finite())
            .collect();
        if data.is_empty() {
            return Err(FitError::NoData);
        }

        let mut best = GaussianMixture::fit(&data, config.k_min, config)?;
        let mut best_bic = best.bic(&data);
        let mut k = config.k_min + 1;

        while k < config.k_max {
            let candidate = GaussianMixture::fit(&data, k, config)?;
            let bic = candidate.bic(&data);
            let change = ((bic - best_bic) / best_bic).abs();
            log::debug!("mixture k={k}: bic {bic:.4e} (best {best_bic:.4e})");

            if bic >= best_bic {
                break;
            }
            best = candidate;
            best_bic = bic;
            if change < config.tolerance {
                break;
            }
            k += 1;
        }

        let within = |bounds: Option<(f64, f64)>, v: f64| bounds.map_or(true, |(lo, hi)| lo <= v && v <= hi);
        let active = best
            .means
            .iter()
            .zip(&best.variances)
            .map(|(&m, &v)| within(config.mean_bounds, m) && within(config.variance_bounds, v))
            .collect();

        Ok(MixtureFit {
            model: best,
            active,
            bic: best_bic,
        })
    }
}
