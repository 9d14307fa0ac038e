//! Common utilities used across the crate.
//!
//! This module provides the parallelism flag, NaN-aware reductions and
//! small array helpers shared by the histogram and gridding code.

use rayon::prelude::*;

// =============================================================================
// Statistical Utilities
// =============================================================================

/// Minimum and maximum of a slice, ignoring NaN entries.
///
/// Returns `None` when the slice is empty or contains only NaN.
#[inline]
pub fn nan_min_max(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
///
/// Mirrors `numpy.linspace`: `n == 1` yields `[start]`, `n == 0` is empty.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            // Pin the end point exactly.
            out[n - 1] = stop;
            out
        }
    }
}

/// Index of the first element of a sorted slice that is `>= target`.
///
/// Leftmost insertion point, as `numpy.searchsorted(side="left")`.
#[inline]
pub fn search_sorted_left(sorted: &[f64], target: f64) -> usize {
    sorted.partition_point(|&v| v < target)
}

/// Index of the first element of a sorted slice that is `> target`.
///
/// Rightmost insertion point, as `numpy.searchsorted(side="right")`.
#[inline]
pub fn search_sorted_right(sorted: &[f64], target: f64) -> usize {
    sorted.partition_point(|&v| v <= target)
}

/// Piecewise-linear interpolation of `x` against increasing `xp`/`fp`.
///
/// Values outside `xp` are clamped to the end values of `fp`, like
/// `numpy.interp`. Repeated abscissae pick the right-most segment.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    let n = xp.len();
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let j = search_sorted_right(xp, x);
    let (x0, x1) = (xp[j - 1], xp[j]);
    let (y0, y1) = (fp[j - 1], fp[j]);
    if x1 == x0 {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Components that can fan out (grid evaluation) take this flag and use
/// `rayon` parallel iterators only when it is `Parallel`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    #[default]
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use the global rayon pool)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// If a dedicated pool cannot be created the closure runs sequentially.
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                Err(err) => {
                    log::warn!("falling back to sequential execution: {err}");
                    f(Parallelism::Sequential)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_min_max_skips_nan() {
        let values = [f64::NAN, 3.0, -1.0, f64::NAN, 7.5];
        assert_eq!(nan_min_max(&values), Some((-1.0, 7.5)));
    }

    #[test]
    fn test_nan_min_max_all_nan() {
        assert_eq!(nan_min_max(&[f64::NAN, f64::NAN]), None);
        assert_eq!(nan_min_max(&[]), None);
    }

    #[test]
    fn test_linspace_endpoints() {
        let v = linspace(1.0, 9.0, 5);
        assert_eq!(v, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
        assert_eq!(linspace(2.0, 4.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_search_sorted_sides() {
        let edges = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(search_sorted_left(&edges, 1.0), 1);
        assert_eq!(search_sorted_right(&edges, 1.0), 2);
        assert_eq!(search_sorted_left(&edges, -5.0), 0);
        assert_eq!(search_sorted_right(&edges, 10.0), 4);
    }

    #[test]
    fn test_interp_matches_numpy() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp(0.5, &xp, &fp), 5.0);
        assert_eq!(interp(1.5, &xp, &fp), 20.0);
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(3.0, &xp, &fp), 30.0);
    }

    #[test]
    fn test_parallelism_from_threads() {
        assert_eq!(Parallelism::from_threads(1), Parallelism::Sequential);
        assert_eq!(Parallelism::from_threads(4), Parallelism::Parallel);
    }

    #[test]
    fn test_maybe_par_map_preserves_order() {
        let seq = Parallelism::Sequential.maybe_par_map(0..100usize, |i| i * 2);
        let par = Parallelism::Parallel.maybe_par_map(0..100usize, |i| i * 2);
        assert_eq!(seq, par);
    }
}
