//! Gridding of scattered 2D samples.
//!
//! - [`clough_tocher_grid`] - C1 piecewise-cubic interpolation over a
//!   Delaunay triangulation, with distance masking, clipping and
//!   nearest-sample extrapolation
//! - [`minimum_curvature`] - minimum-curvature gridding through the GMT
//!   `surface` and `grdmask` programs
//! - [`grid_locations_2d`] - the cell-centred node layout both use
//!
//! Grids are `ndarray::Array2` with shape `(ny, nx)`: rows follow `y`,
//! columns follow `x`.

mod clough_tocher;
pub mod gmt_grid;
mod minimum_curvature;
mod nearest;
mod triangulation;

use ndarray::{Array1, Array2, ArrayView2};

pub use clough_tocher::{clough_tocher_grid, CloughTocher, CloughTocherOptions, Extrapolation};
pub use minimum_curvature::{minimum_curvature, GriddingError, MinimumCurvatureConfig};
pub use nearest::NearestIndex;
pub use triangulation::Triangulation;

use crate::utils::linspace;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the interpolation routines.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    /// Points must be an `(n, 2)` array.
    #[error("points must have 2 columns, got {0}")]
    PointDimension(usize),

    #[error("{points} points but {values} values")]
    LengthMismatch { points: usize, values: usize },

    #[error("need at least {needed} points, got {actual}")]
    TooFewPoints { needed: usize, actual: usize },

    #[error("point {0} has a non-finite coordinate")]
    NonFinitePoint(usize),

    /// All points are collinear (or coincident).
    #[error("points do not span a triangle")]
    DegenerateTriangulation,

    #[error("invalid bounds [{xmin}, {xmax}, {ymin}, {ymax}]")]
    InvalidBounds { xmin: f64, xmax: f64, ymin: f64, ymax: f64 },

    #[error("grid steps must be finite and > 0, got dx={dx}, dy={dy}")]
    InvalidStep { dx: f64, dy: f64 },

    #[error("bounds are smaller than one grid step")]
    GridTooSmall,

    #[error("extrapolation '{0}' is not supported, choose 'nearest'")]
    UnsupportedExtrapolation(String),

    /// Clipping needs at least one finite sample value.
    #[error("no finite sample values")]
    NoFiniteValues,
}

// =============================================================================
// Bounds
// =============================================================================

/// Axis-aligned bounding box `[xmin, xmax, ymin, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Bounds {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self, InterpolationError> {
        let ok = [xmin, xmax, ymin, ymax].iter().all(|v| v.is_finite()) && xmin <= xmax && ymin <= ymax;
        if !ok {
            return Err(InterpolationError::InvalidBounds { xmin, xmax, ymin, ymax });
        }
        Ok(Self { xmin, xmax, ymin, ymax })
    }

    /// Bounds enclosing every point.
    pub fn from_points(points: &[[f64; 2]]) -> Result<Self, InterpolationError> {
        let first = points.first().ok_or(InterpolationError::TooFewPoints { needed: 1, actual: 0 })?;
        let mut b = [first[0], first[0], first[1], first[1]];
        for p in points {
            b[0] = b[0].min(p[0]);
            b[1] = b[1].max(p[0]);
            b[2] = b[2].min(p[1]);
            b[3] = b[3].max(p[1]);
        }
        Self::new(b[0], b[1], b[2], b[3])
    }

    #[inline]
    pub fn as_array(&self) -> [f64; 4] {
        [self.xmin, self.xmax, self.ymin, self.ymax]
    }
}

impl TryFrom<[f64; 4]> for Bounds {
    type Error = InterpolationError;

    fn try_from(b: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(b[0], b[1], b[2], b[3])
    }
}

pub(crate) fn check_steps(dx: f64, dy: f64) -> Result<(), InterpolationError> {
    if dx > 0.0 && dy > 0.0 && dx.is_finite() && dy.is_finite() {
        Ok(())
    } else {
        Err(InterpolationError::InvalidStep { dx, dy })
    }
}

// =============================================================================
// Grid layout
// =============================================================================

/// Node coordinates of a cell-centred regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLocations {
    /// Node x coordinates, ascending.
    pub x: Array1<f64>,
    /// Node y coordinates, ascending.
    pub y: Array1<f64>,
    /// All nodes, shape `(nx * ny, 2)`, with x varying fastest.
    pub points: Array2<f64>,
}

/// Grid node locations inset by half a step from `bounds`.
///
/// The first and last nodes sit at `xmin + dx/2` and `xmax - dx/2`; the
/// node count along x is `floor((xmax - xmin - dx) / dx) + 1` (likewise in
/// y).
pub fn grid_locations_2d(bounds: &Bounds, dx: f64, dy: f64) -> Result<GridLocations, InterpolationError> {
    check_steps(dx, dy)?;
    let (cx0, cx1) = (bounds.xmin + 0.5 * dx, bounds.xmax - 0.5 * dx);
    let (cy0, cy1) = (bounds.ymin + 0.5 * dy, bounds.ymax - 0.5 * dy);
    if cx1 < cx0 || cy1 < cy0 {
        return Err(InterpolationError::GridTooSmall);
    }
    let nx = ((cx1 - cx0) / dx).floor() as usize + 1;
    let ny = ((cy1 - cy0) / dy).floor() as usize + 1;

    let x = Array1::from(linspace(cx0, cx1, nx));
    let y = Array1::from(linspace(cy0, cy1, ny));
    let points = Array2::from_shape_fn((nx * ny, 2), |(i, j)| if j == 0 { x[i % nx] } else { y[i / nx] });
    Ok(GridLocations { x, y, points })
}

/// Interpolated values on a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    /// Values with shape `(y.len(), x.len())`; NaN marks missing nodes.
    pub values: Array2<f64>,
}

impl Grid {
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Number of NaN nodes.
    pub fn n_missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

/// Validate an `(n, 2)` point array and its values.
pub(crate) fn sample_points(points: ArrayView2<'_, f64>, n_values: usize) -> Result<Vec<[f64; 2]>, InterpolationError> {
    if points.ncols() != 2 {
        return Err(InterpolationError::PointDimension(points.ncols()));
    }
    if points.nrows() != n_values {
        return Err(InterpolationError::LengthMismatch {
            points: points.nrows(),
            values: n_values,
        });
    }
    points
        .outer_iter()
        .enumerate()
        .map(|(i, row)| {
            let p = [row[0], row[1]];
            if p[0].is_finite() && p[1].is_finite() {
                Ok(p)
            } else {
                Err(InterpolationError::NonFinitePoint(i))
            }
        })
        .collect()
}
