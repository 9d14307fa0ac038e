//! Bin axis: the edges a histogram counts into.
//!
//! A [`BinAxis`] stores its edges in *internal* space. When a [`LogBase`] is
//! attached, edges handed to the constructors are in linear space and are
//! logged on the way in; every value located on the axis goes through the
//! same transform first.

use super::HistogramError;
use crate::utils::search_sorted_right;

// ============================================================================
// LogBase
// ============================================================================

/// Logarithm applied to values before binning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogBase {
    /// Natural logarithm.
    E,
    /// Logarithm to an arbitrary base (e.g. 10).
    Base { base: f64 },
}

impl LogBase {
    /// Base-10 logarithm.
    pub const TEN: LogBase = LogBase::Base { base: 10.0 };

    /// Numeric base, `e` for [`LogBase::E`].
    #[inline]
    pub fn base(self) -> f64 {
        match self {
            LogBase::E => std::f64::consts::E,
            LogBase::Base { base } => base,
        }
    }

    /// Interpret a stored numeric base.
    pub fn from_base(base: f64) -> Self {
        if (base - std::f64::consts::E).abs() < 1e-12 {
            LogBase::E
        } else {
            LogBase::Base { base }
        }
    }

    /// Logarithm of `x` in this base.
    ///
    /// Non-positive input maps to negative infinity so that it falls below
    /// every finite edge.
    #[inline]
    pub fn log(self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        match self {
            LogBase::E => x.ln(),
            LogBase::Base { base } if base == 10.0 => x.log10(),
            LogBase::Base { base } if base == 2.0 => x.log2(),
            LogBase::Base { base } => x.log(base),
        }
    }

    /// Inverse of [`log`](Self::log).
    #[inline]
    pub fn power(self, x: f64) -> f64 {
        match self {
            LogBase::E => x.exp(),
            LogBase::Base { base } => base.powf(x),
        }
    }
}

/// Apply an optional logarithm.
#[inline]
pub fn maybe_log(x: f64, log: Option<LogBase>) -> f64 {
    log.map_or(x, |b| b.log(x))
}

/// Invert an optional logarithm.
#[inline]
pub fn maybe_power(x: f64, log: Option<LogBase>) -> f64 {
    log.map_or(x, |b| b.power(x))
}

/// Edges half-way between centres, outer edges extended by half the
/// neighbouring spacing.
pub(crate) fn edges_from_centres(c: &[f64]) -> Result<Vec<f64>, HistogramError> {
    let n = c.len();
    if n < 2 {
        return Err(HistogramError::TooFewEdges(n));
    }
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(c[0] - 0.5 * (c[1] - c[0]));
    edges.extend(c.windows(2).map(|w| 0.5 * (w[0] + w[1])));
    edges.push(c[n - 1] + 0.5 * (c[n - 1] - c[n - 2]));
    Ok(edges)
}

// ============================================================================
// BinAxis
// ============================================================================

/// Monotonically increasing bin edges with an optional value transform.
///
/// A value `v` is mapped to internal space as `log(v - relative_to)` (or
/// `v - relative_to` without a log) before it is located. Edges are held
/// in the offset frame already, so only the log is applied to them.
#[derive(Clone, Debug, PartialEq)]
pub struct BinAxis {
    /// Edges in internal space, length `n_cells + 1`.
    edges: Box<[f64]>,
    log: Option<LogBase>,
    relative_to: f64,
}

impl BinAxis {
    /// Create an axis from linear-space edges.
    ///
    /// # Errors
    ///
    /// Fails if there are fewer than two edges, or if the (logged) edges
    /// are not finite and strictly increasing.
    pub fn from_edges(
        edges: &[f64],
        log: Option<LogBase>,
        relative_to: f64,
    ) -> Result<Self, HistogramError> {
        let internal = edges.iter().map(|&e| maybe_log(e, log)).collect();
        Self::from_internal_edges(internal, log, relative_to)
    }

    /// Create an axis from linear-space bin centres.
    ///
    /// Interior edges sit half-way between consecutive centres; the outer
    /// edges extend by half of the neighbouring spacing. The construction
    /// happens in internal (logged) space.
    pub fn from_centres(
        centres: &[f64],
        log: Option<LogBase>,
        relative_to: f64,
    ) -> Result<Self, HistogramError> {
        let c: Vec<f64> = centres.iter().map(|&v| maybe_log(v, log)).collect();
        Self::from_internal_edges(edges_from_centres(&c)?, log, relative_to)
    }

    /// Create an axis from edges that are already in internal space.
    pub fn from_internal_edges(
        edges: Vec<f64>,
        log: Option<LogBase>,
        relative_to: f64,
    ) -> Result<Self, HistogramError> {
        if edges.len() < 2 {
            return Err(HistogramError::TooFewEdges(edges.len()));
        }
        if let Some(i) = edges.iter().position(|e| !e.is_finite()) {
            return Err(HistogramError::NonFiniteEdge { index: i, value: edges[i] });
        }
        if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(HistogramError::NotIncreasing { index: i + 1 });
        }
        Ok(Self {
            edges: edges.into_boxed_slice(),
            log,
            relative_to,
        })
    }

    /// Number of cells (bins).
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.edges.len() - 1
    }

    /// Edges in internal space.
    #[inline]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Edges strictly inside the axis, `edges[1..n_cells]`.
    #[inline]
    pub fn internal_edges(&self) -> &[f64] {
        &self.edges[1..self.edges.len() - 1]
    }

    /// Cell centres in internal space.
    pub fn centres(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Cell widths in internal space.
    pub fn widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[inline]
    pub fn log(&self) -> Option<LogBase> {
        self.log
    }

    #[inline]
    pub fn relative_to(&self) -> f64 {
        self.relative_to
    }

    /// Map a raw value into internal space.
    #[inline]
    pub fn transform(&self, value: f64) -> f64 {
        maybe_log(value - self.relative_to, self.log)
    }

    /// Map an internal-space value back to raw space.
    #[inline]
    pub fn inverse(&self, x: f64) -> f64 {
        maybe_power(x, self.log) + self.relative_to
    }

    /// Locate the cell containing a raw value.
    ///
    /// Cell `k` spans `[edges[k], edges[k+1])`; the top edge belongs to the
    /// last cell. Values outside the axis are excluded (`Ok(None)`) when
    /// `trim` is set, clamped to the first/last cell when `clip` is set,
    /// and rejected otherwise. NaN is never clamped.
    pub fn cell_index(
        &self,
        value: f64,
        clip: bool,
        trim: bool,
    ) -> Result<Option<usize>, HistogramError> {
        let v = self.transform(value);
        let n = self.n_cells();
        let lo = self.edges[0];
        let hi = self.edges[n];

        if v.is_nan() {
            return if trim {
                Ok(None)
            } else {
                Err(HistogramError::NotBinnable(value))
            };
        }

        if v < lo || v > hi {
            if trim {
                return Ok(None);
            }
            if clip {
                return Ok(Some(if v < lo { 0 } else { n - 1 }));
            }
            return Err(HistogramError::OutOfRange { value, low: lo, high: hi });
        }

        // searchsorted(side=right) - 1, with the top edge folded into the last cell
        let i = search_sorted_right(&self.edges, v);
        Ok(Some((i - 1).min(n - 1)))
    }

    /// Sub-axis covering cells `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self, HistogramError> {
        if start >= end || end > self.n_cells() {
            return Err(HistogramError::InvalidRange {
                start,
                end,
                n_bins: self.n_cells(),
            });
        }
        Self::from_internal_edges(self.edges[start..=end].to_vec(), self.log, self.relative_to)
    }
}
