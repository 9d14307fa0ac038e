//! Fitting a sum of Gaussians to the major peaks of a histogram.
//!
//! The peak detector runs at decreasing minimum widths. Each time the
//! number of admitted peaks grows, a sum of Gaussians seeded at the peaks
//! is fitted to the estimated density with a bounded Levenberg-Marquardt
//! solve, and the search continues while the residual norm keeps improving
//! by more than the configured tolerance.

use bon::Builder;
use nalgebra::{DMatrix, DVector};

use super::{maybe_log, Histogram1D, HistogramError, LogBase};
use crate::config::{check_bounds, check_non_negative, check_positive, ConfigError};
use crate::distribution::{gaussian_pdf, DistributionError, Normal};

/// Smallest standard deviation the solver may reach.
const MIN_STD: f64 = 1e-9;
/// Half-width of the box a constrained mean may move in.
const LOC_SLACK: f64 = 1e-6;
const MAX_ITER: usize = 200;
const FTOL: f64 = 1e-10;
const LAMBDA_MAX: f64 = 1e12;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while fitting a histogram.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    /// No peak was found at any width.
    #[error("no peaks found in the histogram")]
    NoPeaks,

    /// Nothing with positive density to fit against.
    #[error("histogram has no populated bins to fit")]
    NoData,

    /// The least-squares normal equations could not be solved.
    #[error("least-squares system is singular")]
    Singular,

    #[error(transparent)]
    Histogram(#[from] HistogramError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

// =============================================================================
// PeakFitConfig
// =============================================================================

/// Options for [`Histogram1D::fit_major_peaks`].
///
/// # Example
///
/// ```
/// use bayesgrid::{LogBase, PeakFitConfig};
///
/// let config = PeakFitConfig::builder()
///     .log(LogBase::TEN)
///     .max_distributions(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.tolerance, 0.05);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct PeakFitConfig {
    /// Log applied to bin centres before fitting.
    pub log: Option<LogBase>,

    /// Only peaks strictly inside `(low, high)` are considered.
    pub mean_bounds: Option<(f64, f64)>,

    /// Pin each mean to its peak location. Default: true.
    #[builder(default = true)]
    pub constrain_loc: bool,

    /// Upper bound on each component's standard deviation.
    pub variance_upper_bound: Option<f64>,

    /// Stop adding components beyond this many.
    pub max_distributions: Option<usize>,

    /// Minimum relative residual improvement to keep adding peaks. Default: 0.05.
    #[builder(default = 0.05)]
    pub tolerance: f64,
}

impl<S: peak_fit_config_builder::IsComplete> PeakFitConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for inverted mean bounds, a non-positive
    /// variance bound, a zero component cap or a negative tolerance.
    pub fn build(self) -> Result<PeakFitConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for PeakFitConfig {
    fn default() -> Self {
        Self {
            log: None,
            mean_bounds: None,
            constrain_loc: true,
            variance_upper_bound: None,
            max_distributions: None,
            tolerance: 0.05,
        }
    }
}

impl PeakFitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_bounds("mean_bounds", self.mean_bounds)?;
        if let Some(v) = self.variance_upper_bound {
            check_positive("variance_upper_bound", v)?;
        }
        if self.max_distributions == Some(0) {
            return Err(ConfigError::Zero("max_distributions"));
        }
        check_non_negative("tolerance", self.tolerance)
    }
}

// =============================================================================
// PeakFit
// =============================================================================

/// Result of [`Histogram1D::fit_major_peaks`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeakFit {
    /// One Gaussian per fitted peak, in the (optionally logged) bin frame.
    pub distributions: Vec<Normal>,
    /// Amplitude of each Gaussian against the normalized counts.
    pub weights: Vec<f64>,
    /// L2 norm of the residual between model and estimated density.
    pub residual_norm: f64,
}

impl PeakFit {
    /// Evaluate the fitted sum at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.distributions
            .iter()
            .zip(&self.weights)
            .map(|(d, w)| w * d.pdf(x))
            .sum()
    }
}

/// Evaluate `sum_k w_k * N(x; mu_k, sigma_k)` for parameters packed as
/// `[mu_0, sigma_0, w_0, mu_1, ...]`.
pub fn sum_of_gaussians(x: f64, params: &[f64]) -> f64 {
    params
        .chunks_exact(3)
        .map(|c| c[2] * gaussian_pdf(x, c[0], c[1]))
        .sum()
}

impl Histogram1D {
    /// Fit a sum of Gaussians to the major peaks of the estimated density.
    ///
    /// Starting at the widest detector width that admits a peak, the width
    /// shrinks until more peaks appear and the model is refitted. A refit is
    /// kept when it improves the residual norm by more than `tolerance`
    /// (relative) and stays within `max_distributions`; the search ends at
    /// the first rejected refit, at width 1, or once the cap is reached.
    pub fn fit_major_peaks(&self, config: &PeakFitConfig) -> Result<PeakFit, FitError> {
        let x: Vec<f64> = self
            .bin_centres()
            .into_iter()
            .map(|c| maybe_log(c, config.log))
            .collect();
        let y = self.estimate_pdf()?;

        let peaks_at = |width: usize| -> Vec<usize> {
            crate::signal::find_peaks(&y, width as f64)
                .into_iter()
                .map(|p| p.index)
                .filter(|&i| match config.mean_bounds {
                    Some((lo, hi)) => lo < x[i] && x[i] < hi,
                    None => true,
                })
                .collect()
        };

        let mut width = self.n_bins();
        let mut peaks = peaks_at(width);
        while peaks.is_empty() {
            if width == 0 {
                return Err(FitError::NoPeaks);
            }
            width -= 1;
            peaks = peaks_at(width);
        }

        let (xd, yd): (Vec<f64>, Vec<f64>) = x
            .iter()
            .zip(&y)
            .filter(|&(_, &yi)| yi > 0.0)
            .map(|(&xi, &yi)| (xi, yi))
            .unzip();

        let mut model = fit_peaks(&xd, &yd, &x, &peaks, config)?;
        let mut norm = residual_norm(&x, &y, &model);
        log::debug!("initial fit: {} peaks at width {width}, residual {norm:.3e}", peaks.len());

        while width > 1 {
            let n_peaks = peaks.len();
            let mut new_peaks = peaks.clone();
            while new_peaks.len() == n_peaks && width > 1 {
                width -= 1;
                new_peaks = peaks_at(width);
            }

            let within_cap = config.max_distributions.map_or(true, |m| new_peaks.len() <= m);
            if !within_cap {
                break;
            }

            let candidate = fit_peaks(&xd, &yd, &x, &new_peaks, config)?;
            let candidate_norm = residual_norm(&x, &y, &candidate);
            let change = if norm > 0.0 {
                (norm - candidate_norm).abs() / norm
            } else {
                0.0
            };
            log::debug!(
                "width {width}: {} peaks, residual {candidate_norm:.3e}, change {change:.3}",
                new_peaks.len()
            );
            if !(change > config.tolerance) {
                break;
            }

            model = candidate;
            norm = candidate_norm;
            peaks = new_peaks;
            if config.max_distributions.is_some_and(|m| peaks.len() >= m) {
                break;
            }
        }

        let distributions = model
            .chunks_exact(3)
            .map(|c| Normal::new(c[0], c[1]))
            .collect::<Result<Vec<_>, _>>()?;
        let weights = model.chunks_exact(3).map(|c| c[2]).collect();
        Ok(PeakFit {
            distributions,
            weights,
            residual_norm: norm,
        })
    }
}

fn residual_norm(x: &[f64], y: &[f64], params: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| (sum_of_gaussians(xi, params) - yi).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Seed and fit one Gaussian per peak.
fn fit_peaks(
    xd: &[f64],
    yd: &[f64],
    x: &[f64],
    peaks: &[usize],
    config: &PeakFitConfig,
) -> Result<Vec<f64>, FitError> {
    let n = 3 * peaks.len();
    let mut guess = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);
    let mut upper = Vec::with_capacity(n);

    let (std_guess, std_upper) = match config.variance_upper_bound {
        Some(v) => (0.5 * v, v),
        None => (1.0, f64::INFINITY),
    };

    for &p in peaks {
        let loc = x[p];
        guess.extend([loc, std_guess, 1.0]);
        if config.constrain_loc {
            lower.push(loc - LOC_SLACK);
            upper.push(loc + LOC_SLACK);
        } else {
            lower.push(f64::NEG_INFINITY);
            upper.push(f64::INFINITY);
        }
        lower.extend([MIN_STD, 0.0]);
        upper.extend([std_upper.max(MIN_STD), f64::INFINITY]);
    }

    levenberg_marquardt(xd, yd, guess, &lower, &upper)
}

// =============================================================================
// Bounded Levenberg-Marquardt
// =============================================================================

fn project(params: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((p, &lo), &hi) in params.iter_mut().zip(lower).zip(upper) {
        *p = p.max(lo).min(hi);
    }
}

fn residuals(x: &[f64], y: &[f64], params: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| sum_of_gaussians(xi, params) - yi)
        .collect()
}

/// `J^T J` and `J^T r` for the Gaussian sum at `params`.
fn normal_equations(x: &[f64], params: &[f64], r: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    let m = params.len();
    let mut jtj = DMatrix::<f64>::zeros(m, m);
    let mut jtr = DVector::<f64>::zeros(m);
    let mut row = vec![0.0; m];

    for (&xi, &ri) in x.iter().zip(r) {
        for (k, c) in params.chunks_exact(3).enumerate() {
            let (mu, sigma, w) = (c[0], c[1], c[2]);
            let phi = gaussian_pdf(xi, mu, sigma);
            let d = xi - mu;
            row[3 * k] = w * phi * d / (sigma * sigma);
            row[3 * k + 1] = w * phi * (d * d / sigma.powi(3) - 1.0 / sigma);
            row[3 * k + 2] = phi;
        }
        for a in 0..m {
            jtr[a] += row[a] * ri;
            for b in a..m {
                jtj[(a, b)] += row[a] * row[b];
            }
        }
    }
    for a in 0..m {
        for b in 0..a {
            jtj[(a, b)] = jtj[(b, a)];
        }
    }
    (jtj, jtr)
}

fn solve(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    match a.clone().cholesky() {
        Some(chol) => Some(chol.solve(b)),
        None => a.lu().solve(b),
    }
}

/// Minimize `sum (f(x) - y)^2` within box bounds.
///
/// Each trial step is projected onto the bounds and accepted only if it
/// lowers the cost; the damping adapts by factors of ten.
fn levenberg_marquardt(
    x: &[f64],
    y: &[f64],
    mut params: Vec<f64>,
    lower: &[f64],
    upper: &[f64],
) -> Result<Vec<f64>, FitError> {
    if x.is_empty() {
        return Err(FitError::NoData);
    }
    project(&mut params, lower, upper);
    let mut r = residuals(x, y, &params);
    let mut cost: f64 = r.iter().map(|v| v * v).sum();
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITER {
        let (jtj, jtr) = normal_equations(x, &params, &r);
        let rhs = -jtr;
        let mut improved = false;

        while lambda <= LAMBDA_MAX {
            let mut a = jtj.clone();
            for i in 0..a.nrows() {
                a[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(step) = solve(a, &rhs) else {
                lambda *= 10.0;
                continue;
            };

            let mut trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
            project(&mut trial, lower, upper);
            let trial_r = residuals(x, y, &trial);
            let trial_cost: f64 = trial_r.iter().map(|v| v * v).sum();

            if trial_cost < cost {
                let rel = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                params = trial;
                r = trial_r;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;
                if rel < FTOL {
                    return Ok(params);
                }
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            break;
        }
    }

    if params.iter().any(|p| !p.is_finite()) {
        return Err(FitError::Singular);
    }
    Ok(params)
}
