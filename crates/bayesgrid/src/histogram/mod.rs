//! Incrementally updated 1D histograms over fixed bins.
//!
//! A [`Histogram1D`] counts posterior samples into the cells of a
//! [`BinAxis`]. Bins are fixed for the lifetime of the histogram so each
//! update is a single locate-and-increment pass.
//!
//! # Summaries
//!
//! - [`Histogram1D::credible_intervals`] - median and tails from the CDF
//! - [`Histogram1D::estimate_pdf`] / [`Histogram1D::cdf`]
//! - [`Histogram1D::find_peaks`] - local maxima of the density
//! - [`Histogram1D::fit_major_peaks`] - Gaussian sum fitted to the peaks
//! - [`Histogram1D::fit_mixture`] - Gaussian mixture chosen by BIC
//!
//! # Example
//!
//! ```
//! use bayesgrid::Histogram1D;
//!
//! let mut h = Histogram1D::from_edges(&[0.0, 1.0, 2.0, 3.0, 4.0], None, 0.0).unwrap();
//! h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
//! assert_eq!(h.counts(), &[1, 2, 0, 1]);
//! assert_eq!(h.estimate_pdf().unwrap(), vec![0.25, 0.5, 0.0, 0.25]);
//! ```

mod axis;
mod fit;
mod mixture;

use std::fmt;
use std::ops::Range;

use rand::Rng;

pub use axis::{maybe_log, maybe_power, BinAxis, LogBase};
pub(crate) use axis::edges_from_centres;
pub use fit::{sum_of_gaussians, FitError, PeakFit, PeakFitConfig};
pub use mixture::{GaussianMixture, MixtureConfig, MixtureFit};

use crate::signal::{self, Peak};
use crate::utils::{interp, search_sorted_left};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by histogram construction and queries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistogramError {
    /// An axis needs at least two edges (or two centres).
    #[error("need at least 2 edges, got {0}")]
    TooFewEdges(usize),

    /// Edges must be finite in internal space.
    #[error("edge {index} is not finite in internal space: {value}")]
    NonFiniteEdge { index: usize, value: f64 },

    /// Edges must be strictly increasing.
    #[error("edges must be strictly increasing (violated at index {index})")]
    NotIncreasing { index: usize },

    /// A value fell outside the axis with neither clip nor trim enabled.
    #[error("value {value} lies outside the bins [{low}, {high}]")]
    OutOfRange { value: f64, low: f64, high: f64 },

    /// NaN (or a value whose transform is NaN) cannot be binned.
    #[error("value {0} cannot be binned")]
    NotBinnable(f64),

    /// Count vector does not match the number of bins.
    #[error("expected {expected} counts, got {actual}")]
    CountsMismatch { expected: usize, actual: usize },

    /// Counts must be non-negative.
    #[error("count at bin {index} is negative: {value}")]
    NegativeCount { index: usize, value: i64 },

    /// The operation needs at least one ingested sample.
    #[error("histogram is empty")]
    Empty,

    /// Credible interval percentages live in [0, 100].
    #[error("percent must be in [0, 100], got {0}")]
    InvalidPercent(f64),

    /// Bin range for slicing is empty or out of bounds.
    #[error("invalid bin range {start}..{end} for {n_bins} bins")]
    InvalidRange { start: usize, end: usize, n_bins: usize },
}

// ============================================================================
// CredibleInterval
// ============================================================================

/// Median and tail quantiles read off a histogram's CDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CredibleInterval {
    pub median: f64,
    pub low: f64,
    pub high: f64,
}

// ============================================================================
// Histogram1D
// ============================================================================

/// 1D histogram with fixed bins and incremental updates.
///
/// Invariant: `counts.len() == axis.n_cells()` and every count is
/// non-negative. The sum of counts equals the number of values ingested,
/// minus values dropped under `trim`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram1D {
    axis: BinAxis,
    counts: Vec<i64>,
}

impl Histogram1D {
    /// Empty histogram over an axis.
    pub fn new(axis: BinAxis) -> Self {
        let counts = vec![0; axis.n_cells()];
        Self { axis, counts }
    }

    /// Empty histogram over linear-space edges.
    pub fn from_edges(
        edges: &[f64],
        log: Option<LogBase>,
        relative_to: f64,
    ) -> Result<Self, HistogramError> {
        Ok(Self::new(BinAxis::from_edges(edges, log, relative_to)?))
    }

    /// Empty histogram over linear-space bin centres.
    pub fn from_centres(
        centres: &[f64],
        log: Option<LogBase>,
        relative_to: f64,
    ) -> Result<Self, HistogramError> {
        Ok(Self::new(BinAxis::from_centres(centres, log, relative_to)?))
    }

    /// Histogram from an axis and existing counts.
    pub fn from_parts(axis: BinAxis, counts: Vec<i64>) -> Result<Self, HistogramError> {
        if counts.len() != axis.n_cells() {
            return Err(HistogramError::CountsMismatch {
                expected: axis.n_cells(),
                actual: counts.len(),
            });
        }
        if let Some(index) = counts.iter().position(|&c| c < 0) {
            return Err(HistogramError::NegativeCount {
                index,
                value: counts[index],
            });
        }
        Ok(Self { axis, counts })
    }

    /// Ingest `values` with clipping, returning `self`.
    pub fn with_values(mut self, values: &[f64]) -> Result<Self, HistogramError> {
        self.update(values, true, false)?;
        Ok(self)
    }

    #[inline]
    pub fn axis(&self) -> &BinAxis {
        &self.axis
    }

    #[inline]
    pub fn counts(&self) -> &[i64] {
        &self.counts
    }

    /// Bin edges in internal space.
    #[inline]
    pub fn bins(&self) -> &[f64] {
        self.axis.edges()
    }

    /// Bin centres in internal space.
    pub fn bin_centres(&self) -> Vec<f64> {
        self.axis.centres()
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.axis.n_cells()
    }

    #[inline]
    pub fn log(&self) -> Option<LogBase> {
        self.axis.log()
    }

    #[inline]
    pub fn relative_to(&self) -> f64 {
        self.axis.relative_to()
    }

    /// Total number of counted samples.
    pub fn n_samples(&self) -> i64 {
        self.counts.iter().sum()
    }

    /// Count `values` into the bins.
    ///
    /// With `clip`, values outside the axis land in the first or last bin.
    /// With `trim`, they are skipped (trim takes precedence over clip). If
    /// any value cannot be placed, nothing is counted.
    pub fn update(&mut self, values: &[f64], clip: bool, trim: bool) -> Result<(), HistogramError> {
        let mut increments = vec![0i64; self.n_bins()];
        for &v in values {
            if let Some(i) = self.axis.cell_index(v, clip, trim)? {
                increments[i] += 1;
            }
        }
        for (c, inc) in self.counts.iter_mut().zip(increments) {
            *c += inc;
        }
        Ok(())
    }

    fn total(&self) -> Result<f64, HistogramError> {
        match self.n_samples() {
            0 => Err(HistogramError::Empty),
            n => Ok(n as f64),
        }
    }

    /// Cumulative distribution over bins, ending at exactly 1.
    pub fn cdf(&self) -> Result<Vec<f64>, HistogramError> {
        let total = self.total()?;
        let mut running = 0i64;
        Ok(self
            .counts
            .iter()
            .map(|&c| {
                running += c;
                running as f64 / total
            })
            .collect())
    }

    /// Counts normalized to sum to one.
    pub fn estimate_pdf(&self) -> Result<Vec<f64>, HistogramError> {
        let total = self.total()?;
        Ok(self.counts.iter().map(|&c| c as f64 / total).collect())
    }

    /// Median and `percent`% credible interval.
    ///
    /// Each quantile is the upper edge of the first bin whose cumulative
    /// probability reaches the threshold: `0.5` for the median, `1 - p` for
    /// `low` and `p` for `high`, with `p = percent / 100`. With `log`, the
    /// results are additionally logged to that base.
    pub fn credible_intervals(
        &self,
        percent: f64,
        log: Option<LogBase>,
    ) -> Result<CredibleInterval, HistogramError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(HistogramError::InvalidPercent(percent));
        }
        let cs = self.cdf()?;
        let p = 0.01 * percent;
        let edges = self.axis.edges();
        let quantile = |threshold: f64| {
            let ix = search_sorted_left(&cs, threshold).min(cs.len() - 1);
            maybe_log(edges[ix + 1], log)
        };
        Ok(CredibleInterval {
            median: quantile(0.5),
            low: quantile(1.0 - p),
            high: quantile(p),
        })
    }

    /// Peaks of the estimated density at least `width` bins wide.
    pub fn find_peaks(&self, width: f64) -> Result<Vec<Peak>, HistogramError> {
        Ok(signal::find_peaks(&self.estimate_pdf()?, width))
    }

    /// Draw `n` continuous samples in internal space by inverse-CDF lookup.
    ///
    /// Samples are uniform within each bin, so the sample density follows
    /// the histogram shape.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Vec<f64>, HistogramError> {
        let mut cdf = Vec::with_capacity(self.n_bins() + 1);
        cdf.push(0.0);
        cdf.extend(self.cdf()?);
        let top = cdf[cdf.len() - 1];
        let edges = self.axis.edges();
        Ok((0..n)
            .map(|_| interp(rng.r#gen::<f64>() * top, &cdf, edges))
            .collect())
    }

    /// Add the counts of `other` into this histogram.
    ///
    /// Each of `other`'s bin centres is mapped back to raw space and located
    /// on this axis (clipped). Differing bin layouts are allowed at the
    /// cost of discretization error.
    pub fn combine(&mut self, other: &Histogram1D) -> Result<(), HistogramError> {
        for (centre, &count) in other.bin_centres().into_iter().zip(&other.counts) {
            let raw = other.axis.inverse(centre);
            if let Some(i) = self.axis.cell_index(raw, true, false)? {
                self.counts[i] += count;
            }
        }
        Ok(())
    }

    /// Independent histogram over the bins in `range`.
    pub fn slice(&self, range: Range<usize>) -> Result<Histogram1D, HistogramError> {
        let axis = self.axis.slice(range.start, range.end)?;
        Ok(Self {
            axis,
            counts: self.counts[range].to_vec(),
        })
    }
}

impl fmt::Display for Histogram1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Histogram1D")?;
        writeln!(f, "Bins: {} cells", self.n_bins())?;
        writeln!(
            f,
            "  edges: [{} .. {}]",
            self.bins()[0],
            self.bins()[self.n_bins()]
        )?;
        writeln!(f, "Counts: {} samples", self.n_samples())?;
        match self.log() {
            Some(b) => writeln!(f, "Values are logged to base {}", b.base())?,
            None => writeln!(f, "Values are not logged")?,
        }
        write!(f, "Relative to: {}", self.relative_to())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn four_bins() -> Histogram1D {
        Histogram1D::from_edges(&[0.0, 1.0, 2.0, 3.0, 4.0], None, 0.0).unwrap()
    }

    #[test]
    fn update_counts_values() {
        let mut h = four_bins();
        h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
        assert_eq!(h.counts(), &[1, 2, 0, 1]);
        assert_eq!(h.estimate_pdf().unwrap(), vec![0.25, 0.5, 0.0, 0.25]);
    }

    #[test]
    fn update_accumulates() {
        let mut h = four_bins();
        h.update(&[0.5], true, false).unwrap();
        h.update(&[0.5, 2.5], true, false).unwrap();
        assert_eq!(h.counts(), &[2, 0, 1, 0]);
        assert_eq!(h.n_samples(), 3);
    }

    #[test]
    fn update_clip_keeps_everything() {
        let mut h = four_bins();
        h.update(&[-10.0, 0.5, 100.0], true, false).unwrap();
        assert_eq!(h.counts(), &[2, 0, 0, 1]);
    }

    #[test]
    fn update_trim_drops_out_of_range() {
        let mut h = four_bins();
        h.update(&[-10.0, 0.5, 4.0, 100.0], true, true).unwrap();
        assert_eq!(h.counts(), &[1, 0, 0, 1]);
    }

    #[test]
    fn update_is_atomic_on_error() {
        let mut h = four_bins();
        let err = h.update(&[0.5, 99.0], false, false).unwrap_err();
        assert!(matches!(err, HistogramError::OutOfRange { .. }));
        assert_eq!(h.n_samples(), 0);
    }

    #[test]
    fn from_parts_validates() {
        let axis = BinAxis::from_edges(&[0.0, 1.0, 2.0], None, 0.0).unwrap();
        assert!(matches!(
            Histogram1D::from_parts(axis.clone(), vec![1]),
            Err(HistogramError::CountsMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            Histogram1D::from_parts(axis, vec![1, -1]),
            Err(HistogramError::NegativeCount { index: 1, value: -1 })
        ));
    }

    #[test]
    fn empty_histogram_queries_fail() {
        let h = four_bins();
        assert_eq!(h.estimate_pdf(), Err(HistogramError::Empty));
        assert_eq!(h.credible_intervals(95.0, None), Err(HistogramError::Empty));
    }

    #[test]
    fn credible_intervals_use_upper_edges() {
        let mut h = four_bins();
        h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
        let ci = h.credible_intervals(95.0, None).unwrap();
        assert_eq!(ci.median, 2.0);
        assert_eq!(ci.low, 1.0);
        assert_eq!(ci.high, 4.0);

        let logged = h.credible_intervals(95.0, Some(LogBase::TEN)).unwrap();
        assert_abs_diff_eq!(logged.high, 4f64.log10());

        assert_eq!(
            h.credible_intervals(120.0, None),
            Err(HistogramError::InvalidPercent(120.0))
        );
    }

    #[test]
    fn sample_stays_within_populated_bins() {
        let mut h = four_bins();
        h.update(&[1.2, 1.4, 3.6], true, false).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let samples = h.sample(1000, &mut rng).unwrap();
        assert!(samples
            .iter()
            .all(|&s| (1.0..=2.0).contains(&s) || (3.0..=4.0).contains(&s)));
    }

    #[test]
    fn combine_with_self_doubles() {
        let mut h = four_bins();
        h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
        let copy = h.clone();
        h.combine(&copy).unwrap();
        assert_eq!(h.counts(), &[2, 4, 0, 2]);
    }

    #[test]
    fn combine_onto_coarser_bins() {
        let mut fine = four_bins();
        fine.update(&[0.5, 1.5, 2.5, 3.5, 3.5], true, false).unwrap();
        let mut coarse = Histogram1D::from_edges(&[0.0, 2.0, 4.0], None, 0.0).unwrap();
        coarse.combine(&fine).unwrap();
        assert_eq!(coarse.counts(), &[2, 3]);
    }

    #[test]
    fn combine_across_log_frames() {
        let mut logged = Histogram1D::from_edges(&[1.0, 10.0, 100.0], Some(LogBase::TEN), 0.0).unwrap();
        logged.update(&[5.0, 50.0, 60.0], true, false).unwrap();
        // centres 10^0.5 ~ 3.16 and 10^1.5 ~ 31.6 in linear space
        let mut linear = Histogram1D::from_edges(&[0.0, 20.0, 40.0], None, 0.0).unwrap();
        linear.combine(&logged).unwrap();
        assert_eq!(linear.counts(), &[1, 2]);
    }

    #[test]
    fn slice_is_independent() {
        let mut h = four_bins();
        h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
        let mut sub = h.slice(1..3).unwrap();
        assert_eq!(sub.bins(), &[1.0, 2.0, 3.0]);
        assert_eq!(sub.counts(), &[2, 0]);
        sub.update(&[2.5], true, false).unwrap();
        assert_eq!(h.counts(), &[1, 2, 0, 1]);
        assert!(h.slice(3..3).is_err());
    }

    #[test]
    fn display_mentions_log_base() {
        let h = Histogram1D::from_edges(&[1.0, 10.0, 100.0], Some(LogBase::TEN), 0.0).unwrap();
        let text = h.to_string();
        assert!(text.contains("logged to base 10"));
        assert!(text.contains("Relative to: 0"));
    }
}
