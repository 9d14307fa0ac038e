//! Univariate distributions returned by peak fitting and mixture models.
//!
//! - [`Normal`] - a Gaussian parameterized by mean and standard deviation
//! - [`LogNormal`] - a Gaussian in log space that can report in linear space

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal as Gaussian};

use crate::utils::linspace;

/// Errors raised by distribution construction and evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DistributionError {
    /// Standard deviation or variance must be finite and positive.
    #[error("{field} must be finite and > 0, got {value}")]
    InvalidScale { field: &'static str, value: f64 },

    /// Only the first two moments have derivatives.
    #[error("derivative moment must be 0 or 1, got {0}")]
    InvalidMoment(u32),
}

fn check_scale(field: &'static str, value: f64) -> Result<(), DistributionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DistributionError::InvalidScale { field, value })
    }
}

// =============================================================================
// Normal
// =============================================================================

/// Gaussian distribution `N(mean, std^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    mean: f64,
    std: f64,
}

impl Normal {
    /// Create a normal distribution.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::InvalidScale`] if `std` is not positive.
    pub fn new(mean: f64, std: f64) -> Result<Self, DistributionError> {
        check_scale("std", std)?;
        Ok(Self { mean, std })
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    #[inline]
    pub fn std(&self) -> f64 {
        self.std
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.std * self.std
    }

    /// Probability density at `x`.
    #[inline]
    pub fn pdf(&self, x: f64) -> f64 {
        gaussian_pdf(x, self.mean, self.std)
    }

    /// Natural log of the density at `x`.
    #[inline]
    pub fn ln_pdf(&self, x: f64) -> f64 {
        gaussian(self.mean, self.std).map_or(f64::NAN, |g| g.ln_pdf(x))
    }

    /// Cumulative probability at `x`.
    #[inline]
    pub fn cdf(&self, x: f64) -> f64 {
        gaussian_cdf(x, self.mean, self.std)
    }

    /// Draw `n` samples.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n)
            .map(|_| self.mean + self.std * rng.sample::<f64, _>(rand_distr::StandardNormal))
            .collect()
    }
}

impl fmt::Display for Normal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Normal Distribution:")?;
        writeln!(f, "    Mean: {}", self.mean)?;
        write!(f, "     Std: {}", self.std)
    }
}

#[inline]
fn gaussian(mean: f64, std: f64) -> Option<Gaussian> {
    Gaussian::new(mean, std).ok()
}

/// Density of `N(mean, std^2)` at `x`; NaN when the parameters are invalid.
#[inline]
pub fn gaussian_pdf(x: f64, mean: f64, std: f64) -> f64 {
    gaussian(mean, std).map_or(f64::NAN, |g| g.pdf(x))
}

/// Cumulative probability of `N(mean, std^2)` at `x`; NaN when the
/// parameters are invalid.
#[inline]
pub fn gaussian_cdf(x: f64, mean: f64, std: f64) -> f64 {
    gaussian(mean, std).map_or(f64::NAN, |g| g.cdf(x))
}

// =============================================================================
// LogNormal
// =============================================================================

/// Gaussian in log space.
///
/// The mean is always held in log space. When `linear_space` is set, the
/// constructor takes a linear-space mean, evaluations take linear-space
/// arguments and random draws are returned in linear space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogNormal {
    log_mean: f64,
    variance: f64,
    linear_space: bool,
}

impl LogNormal {
    /// Create a log-normal distribution.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::InvalidScale`] if `variance` is not
    /// positive, or if `linear_space` is set and `mean` is not positive.
    pub fn new(mean: f64, variance: f64, linear_space: bool) -> Result<Self, DistributionError> {
        check_scale("variance", variance)?;
        let log_mean = if linear_space {
            check_scale("mean", mean)?;
            mean.ln()
        } else {
            mean
        };
        Ok(Self {
            log_mean,
            variance,
            linear_space,
        })
    }

    /// Create from a mean that is already in log space.
    pub fn from_log_mean(log_mean: f64, variance: f64, linear_space: bool) -> Result<Self, DistributionError> {
        check_scale("variance", variance)?;
        Ok(Self {
            log_mean,
            variance,
            linear_space,
        })
    }

    /// Mean, reported in linear space when `linear_space` is set.
    pub fn mean(&self) -> f64 {
        if self.linear_space {
            self.log_mean.exp()
        } else {
            self.log_mean
        }
    }

    /// Mean in log space.
    #[inline]
    pub fn log_mean(&self) -> f64 {
        self.log_mean
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }

    #[inline]
    pub fn linear_space(&self) -> bool {
        self.linear_space
    }

    #[inline]
    fn std(&self) -> f64 {
        self.variance.sqrt()
    }

    #[inline]
    fn to_log(&self, x: f64) -> f64 {
        if self.linear_space { x.ln() } else { x }
    }

    /// Cumulative probability at `x`.
    pub fn cdf(&self, x: f64) -> f64 {
        gaussian_cdf(self.to_log(x), self.log_mean, self.std())
    }

    /// Density (or log density when `log` is set) at `x`.
    pub fn probability(&self, x: f64, log: bool) -> f64 {
        let normal = Normal {
            mean: self.log_mean,
            std: self.std(),
        };
        let x = self.to_log(x);
        if log { normal.ln_pdf(x) } else { normal.pdf(x) }
    }

    /// Derivative of the negative log-likelihood at `x`.
    ///
    /// Moment 0 is with respect to the mean, moment 1 with respect to the
    /// variance.
    pub fn derivative(&self, x: f64, moment: u32) -> Result<f64, DistributionError> {
        let x = self.to_log(x);
        let d = x - self.log_mean;
        match moment {
            0 => Ok(d / self.variance),
            1 => Ok((0.5 / (self.variance * self.variance)) * (d * d - self.variance)),
            m => Err(DistributionError::InvalidMoment(m)),
        }
    }

    /// Draw `n` samples.
    pub fn rng<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        let std = self.std();
        (0..n)
            .map(|_| {
                let v = self.log_mean + std * rng.sample::<f64, _>(rand_distr::StandardNormal);
                if self.linear_space { v.exp() } else { v }
            })
            .collect()
    }

    /// `n_bins + 1` edges spanning `n_std` standard deviations either side
    /// of the mean.
    pub fn bins(&self, n_bins: usize, n_std: f64) -> Vec<f64> {
        let half = n_std * self.std();
        let edges = linspace(self.log_mean - half, self.log_mean + half, n_bins + 1);
        if self.linear_space {
            edges.into_iter().map(f64::exp).collect()
        } else {
            edges
        }
    }
}

impl fmt::Display for LogNormal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LogNormal Distribution:")?;
        writeln!(f, "    Mean: {}", self.mean())?;
        write!(f, "Variance: {}", self.variance)
    }
}
