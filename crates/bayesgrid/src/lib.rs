//! bayesgrid: posterior summaries and scattered-data gridding for Bayesian
//! geophysical inversion.
//!
//! # Key Types
//!
//! - [`Histogram1D`] / [`BinAxis`] - incrementally updated histograms of
//!   posterior samples, optionally in a log frame
//! - [`PeakFitConfig`] / [`MixtureConfig`] - Gaussian summaries of a
//!   histogram (peak fitting and BIC-selected mixtures)
//! - [`Normal`] / [`LogNormal`] - distributions used by the summaries
//! - [`clough_tocher_grid`] / [`minimum_curvature`] - gridding of scattered
//!   2D samples
//! - [`persist::File`] - hierarchical container for histograms and
//!   distributions
//!
//! # Gridding
//!
//! ```
//! use bayesgrid::{clough_tocher_grid, Bounds, CloughTocherOptions};
//! use ndarray::array;
//!
//! let points = array![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
//! let values = array![1.0, 2.0, 3.0, 2.0];
//! let bounds = Bounds::new(0.0, 4.0, 0.0, 4.0).unwrap();
//! let grid = clough_tocher_grid(
//!     points.view(),
//!     values.view(),
//!     &bounds,
//!     1.0,
//!     1.0,
//!     &CloughTocherOptions::default(),
//!     None,
//! )
//! .unwrap();
//! assert_eq!(grid.shape(), (4, 4));
//! ```

// Re-export approx traits for users who want to compare grids and densities
pub use approx;

pub mod config;
pub mod distribution;
pub mod histogram;
pub mod interpolate;
pub mod persist;
pub mod signal;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Histograms and their summaries
pub use histogram::{
    BinAxis, CredibleInterval, FitError, GaussianMixture, Histogram1D, HistogramError, LogBase, MixtureConfig,
    MixtureFit, PeakFit, PeakFitConfig,
};

// Distributions
pub use distribution::{DistributionError, LogNormal, Normal};

// Gridding
pub use interpolate::{
    clough_tocher_grid, grid_locations_2d, minimum_curvature, Bounds, CloughTocherOptions, Extrapolation, Grid,
    GridLocations, GriddingError, InterpolationError, MinimumCurvatureConfig, NearestIndex,
};

// Configuration errors
pub use config::ConfigError;

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
