//! Clough-Tocher C1 interpolation of scattered 2D samples.
//!
//! Vertex gradients are estimated globally by minimizing the curvature of
//! the piecewise-cubic surface (Gauss-Seidel sweeps over the triangulation
//! graph), then every triangle is split into three cubic sub-triangles
//! whose Bernstein-Bezier coefficients follow from the vertex values and
//! gradients.

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use ndarray::{Array2, ArrayView1, ArrayView2};

use super::nearest::NearestIndex;
use super::triangulation::Triangulation;
use super::{grid_locations_2d, sample_points, Bounds, Grid, InterpolationError};
use crate::config::{check_positive, ConfigError};
use crate::utils::{nan_min_max, Parallelism};

// =============================================================================
// Options
// =============================================================================

/// How to fill grid nodes left empty after interpolation and masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extrapolation {
    /// Value of the closest sample.
    Nearest,
}

impl FromStr for Extrapolation {
    type Err = InterpolationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Extrapolation::Nearest),
            _ => Err(InterpolationError::UnsupportedExtrapolation(s.to_owned())),
        }
    }
}

impl fmt::Display for Extrapolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extrapolation::Nearest => f.write_str("nearest"),
        }
    }
}

/// Options for [`clough_tocher_grid`].
///
/// # Example
///
/// ```
/// use bayesgrid::{CloughTocherOptions, Extrapolation};
///
/// let options = CloughTocherOptions::builder()
///     .mask(250.0)
///     .clip(true)
///     .extrapolate("nearest".parse::<Extrapolation>().unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(options.mask, Some(250.0));
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct CloughTocherOptions {
    /// Nodes farther than this from every sample become NaN.
    pub mask: Option<f64>,

    /// Clamp interpolated values to the observed range. Default: false.
    #[builder(default)]
    pub clip: bool,

    /// Fill NaN nodes after masking and clipping.
    pub extrapolate: Option<Extrapolation>,

    /// Evaluate grid nodes with rayon. Default: sequential.
    #[builder(default)]
    pub parallelism: Parallelism,

    /// Relative gradient change that ends the Gauss-Seidel sweeps. Default: 1e-6.
    #[builder(default = 1e-6)]
    pub gradient_tolerance: f64,

    /// Most Gauss-Seidel sweeps. Default: 400.
    #[builder(default = 400)]
    pub max_gradient_iterations: usize,
}

impl<S: clough_tocher_options_builder::IsComplete> CloughTocherOptionsBuilder<S> {
    /// Build and validate the options.
    pub fn build(self) -> Result<CloughTocherOptions, ConfigError> {
        let options = self.__build_internal();
        options.validate()?;
        Ok(options)
    }
}

impl Default for CloughTocherOptions {
    fn default() -> Self {
        Self {
            mask: None,
            clip: false,
            extrapolate: None,
            parallelism: Parallelism::Sequential,
            gradient_tolerance: 1e-6,
            max_gradient_iterations: 400,
        }
    }
}

impl CloughTocherOptions {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(mask) = self.mask {
            check_positive("mask", mask)?;
        }
        check_positive("gradient_tolerance", self.gradient_tolerance)?;
        if self.max_gradient_iterations == 0 {
            return Err(ConfigError::Zero("max_gradient_iterations"));
        }
        Ok(())
    }
}

// =============================================================================
// Interpolant
// =============================================================================

/// A C1 piecewise-cubic interpolant over a Delaunay triangulation.
#[derive(Debug, Clone)]
pub struct CloughTocher {
    tri: Triangulation,
    values: Vec<f64>,
    gradients: Vec<[f64; 2]>,
}

impl CloughTocher {
    /// Interpolant with the default gradient tolerance (1e-6, 400 sweeps).
    pub fn new(points: Vec<[f64; 2]>, values: Vec<f64>) -> Result<Self, InterpolationError> {
        Self::with_tolerance(points, values, 1e-6, 400)
    }

    pub fn with_tolerance(
        points: Vec<[f64; 2]>,
        values: Vec<f64>,
        tolerance: f64,
        max_iter: usize,
    ) -> Result<Self, InterpolationError> {
        if points.len() != values.len() {
            return Err(InterpolationError::LengthMismatch {
                points: points.len(),
                values: values.len(),
            });
        }
        let tri = Triangulation::new(points)?;
        let gradients = estimate_gradients(&tri, &values, tolerance, max_iter);
        Ok(Self { tri, values, gradients })
    }

    #[inline]
    pub fn triangulation(&self) -> &Triangulation {
        &self.tri
    }

    /// Estimated `[df/dx, df/dy]` at every sample.
    #[inline]
    pub fn gradients(&self) -> &[[f64; 2]] {
        &self.gradients
    }

    /// Interpolated value at `p`, NaN outside the convex hull.
    pub fn evaluate(&self, p: [f64; 2]) -> f64 {
        match self.tri.find_simplex(p) {
            Some((t, b)) => self.evaluate_in(t, b),
            None => f64::NAN,
        }
    }

    fn evaluate_in(&self, t: usize, b: [f64; 3]) -> f64 {
        let verts = self.tri.triangle(t);
        let [p1, p2, p3] = verts.map(|v| self.tri.points()[v]);
        let [f1, f2, f3] = verts.map(|v| self.values[v]);
        let [d1, d2, d3] = verts.map(|v| self.gradients[v]);

        let e12 = [p2[0] - p1[0], p2[1] - p1[1]];
        let e23 = [p3[0] - p2[0], p3[1] - p2[1]];
        let e31 = [p1[0] - p3[0], p1[1] - p3[1]];
        let dot = |d: [f64; 2], e: [f64; 2]| d[0] * e[0] + d[1] * e[1];

        // derivatives along the edges, away from each vertex
        let df12 = dot(d1, e12);
        let df21 = -dot(d2, e12);
        let df23 = dot(d2, e23);
        let df32 = -dot(d3, e23);
        let df31 = dot(d3, e31);
        let df13 = -dot(d1, e31);

        let c3000 = f1;
        let c2100 = (df12 + 3.0 * c3000) / 3.0;
        let c2010 = (df13 + 3.0 * c3000) / 3.0;
        let c0300 = f2;
        let c1200 = (df21 + 3.0 * c0300) / 3.0;
        let c0210 = (df23 + 3.0 * c0300) / 3.0;
        let c0030 = f3;
        let c1020 = (df31 + 3.0 * c0030) / 3.0;
        let c0120 = (df32 + 3.0 * c0030) / 3.0;

        let c2001 = (c2100 + c2010 + c3000) / 3.0;
        let c0201 = (c1200 + c0300 + c0210) / 3.0;
        let c0021 = (c1020 + c0120 + c0030) / 3.0;

        // Cross-boundary derivatives are made linear along each edge, using
        // the centroid of the neighbouring triangle as the reference
        // direction. Hull edges fall back to the triangle's own centroid.
        let g = self.tri.neighbors(t).map(|n| n.map(|n| self.tri.barycentric(t, centroid(&self.tri, n))));
        let g = [
            g[0].map_or(-0.5, |c| (2.0 * c[2] + c[1] - 1.0) / (2.0 - 3.0 * c[2] - 3.0 * c[1])),
            g[1].map_or(-0.5, |c| (2.0 * c[0] + c[2] - 1.0) / (2.0 - 3.0 * c[0] - 3.0 * c[2])),
            g[2].map_or(-0.5, |c| (2.0 * c[1] + c[0] - 1.0) / (2.0 - 3.0 * c[1] - 3.0 * c[0])),
        ];

        let c0111 = (g[0] * (-c0300 + 3.0 * c0210 - 3.0 * c0120 + c0030)
            + (-c0300 + 2.0 * c0210 - c0120 + c0021 + c0201))
            / 2.0;
        let c1011 = (g[1] * (-c0030 + 3.0 * c1020 - 3.0 * c2010 + c3000)
            + (-c0030 + 2.0 * c1020 - c2010 + c2001 + c0021))
            / 2.0;
        let c1101 = (g[2] * (-c3000 + 3.0 * c2100 - 3.0 * c1200 + c0300)
            + (-c3000 + 2.0 * c2100 - c1200 + c2001 + c0201))
            / 2.0;

        let c1002 = (c1101 + c1011 + c2001) / 3.0;
        let c0102 = (c1101 + c0111 + c0201) / 3.0;
        let c0012 = (c1011 + c0111 + c0021) / 3.0;
        let c0003 = (c1002 + c0102 + c0012) / 3.0;

        // barycentric coordinates within the sub-triangle; b4 is the split point
        let min = b[0].min(b[1]).min(b[2]);
        let (b1, b2, b3, b4) = (b[0] - min, b[1] - min, b[2] - min, 3.0 * min);

        b1.powi(3) * c3000
            + 3.0 * b1 * b1 * b2 * c2100
            + 3.0 * b1 * b1 * b3 * c2010
            + 3.0 * b1 * b1 * b4 * c2001
            + 3.0 * b1 * b2 * b2 * c1200
            + 6.0 * b1 * b2 * b4 * c1101
            + 3.0 * b1 * b3 * b3 * c1020
            + 6.0 * b1 * b3 * b4 * c1011
            + 3.0 * b1 * b4 * b4 * c1002
            + b2.powi(3) * c0300
            + 3.0 * b2 * b2 * b3 * c0210
            + 3.0 * b2 * b2 * b4 * c0201
            + 3.0 * b2 * b3 * b3 * c0120
            + 6.0 * b2 * b3 * b4 * c0111
            + 3.0 * b2 * b4 * b4 * c0102
            + b3.powi(3) * c0030
            + 3.0 * b3 * b3 * b4 * c0021
            + 3.0 * b3 * b4 * b4 * c0012
            + b4.powi(3) * c0003
    }
}

fn centroid(tri: &Triangulation, t: usize) -> [f64; 2] {
    let [a, b, c] = tri.triangle(t).map(|v| tri.points()[v]);
    [(a[0] + b[0] + c[0]) / 3.0, (a[1] + b[1] + c[1]) / 3.0]
}

/// Vertex gradients minimizing the total curvature along triangulation edges.
fn estimate_gradients(tri: &Triangulation, values: &[f64], tolerance: f64, max_iter: usize) -> Vec<[f64; 2]> {
    let points = tri.points();
    let adjacency = tri.vertex_neighbors();
    let mut grad = vec![[0.0; 2]; points.len()];

    for iteration in 0..max_iter {
        let mut err = 0.0f64;
        for (i, neighbours) in adjacency.iter().enumerate() {
            let mut q = [0.0; 3];
            let mut s = [0.0; 2];
            for &j in neighbours {
                let e = [points[j][0] - points[i][0], points[j][1] - points[i][1]];
                let l3 = e[0].hypot(e[1]).powi(3);
                let df2 = -e[0] * grad[j][0] - e[1] * grad[j][1];
                let w = 6.0 * (values[i] - values[j]) - 2.0 * df2;
                q[0] += 4.0 * e[0] * e[0] / l3;
                q[1] += 4.0 * e[0] * e[1] / l3;
                q[2] += 4.0 * e[1] * e[1] / l3;
                s[0] += w * e[0] / l3;
                s[1] += w * e[1] / l3;
            }
            let det = q[0] * q[2] - q[1] * q[1];
            if neighbours.is_empty() || det == 0.0 || !det.is_finite() {
                continue;
            }
            let r = [(q[2] * s[0] - q[1] * s[1]) / det, (q[0] * s[1] - q[1] * s[0]) / det];
            let change = (grad[i][0] + r[0]).abs().max((grad[i][1] + r[1]).abs());
            grad[i] = [-r[0], -r[1]];
            err = err.max(change / r[0].abs().max(r[1].abs()).max(1.0));
        }
        if err < tolerance {
            log::debug!("gradient estimation converged after {} sweeps", iteration + 1);
            return grad;
        }
    }
    log::warn!("gradient estimation did not converge in {max_iter} sweeps");
    grad
}

// =============================================================================
// Gridding
// =============================================================================

/// Interpolate scattered samples onto the grid of [`grid_locations_2d`].
///
/// After evaluating the interpolant (NaN outside the convex hull of the
/// samples) the options apply in order: distance mask, clipping to the
/// observed value range, then extrapolation into the remaining NaN nodes.
///
/// `index` is a nearest-sample index over the same `points`; one is built
/// when masking or extrapolation needs it and none is given. Samples whose
/// value is not finite are left out of the triangulation.
pub fn clough_tocher_grid(
    points: ArrayView2<'_, f64>,
    values: ArrayView1<'_, f64>,
    bounds: &Bounds,
    dx: f64,
    dy: f64,
    options: &CloughTocherOptions,
    index: Option<&NearestIndex>,
) -> Result<Grid, InterpolationError> {
    let samples = sample_points(points, values.len())?;
    let values = values.to_vec();
    let locations = grid_locations_2d(bounds, dx, dy)?;
    let (nx, ny) = (locations.x.len(), locations.y.len());

    let (kept_points, kept_values): (Vec<_>, Vec<_>) = samples
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_finite())
        .map(|(p, v)| (*p, *v))
        .unzip();
    if kept_points.len() < samples.len() {
        log::warn!("ignoring {} samples without a finite value", samples.len() - kept_points.len());
    }
    let interpolant = CloughTocher::with_tolerance(
        kept_points,
        kept_values,
        options.gradient_tolerance,
        options.max_gradient_iterations,
    )?;

    let nodes: Vec<[f64; 2]> = locations.points.outer_iter().map(|row| [row[0], row[1]]).collect();
    let evaluated = options
        .parallelism
        .maybe_par_map(&nodes, |p| interpolant.evaluate(*p));
    let mut grid = Array2::from_shape_fn((ny, nx), |(r, c)| evaluated[r * nx + c]);

    let built;
    let index = match index {
        Some(index) if index.len() != samples.len() => {
            return Err(InterpolationError::LengthMismatch {
                points: index.len(),
                values: samples.len(),
            })
        }
        Some(index) => Some(index),
        None if options.mask.is_some() || options.extrapolate.is_some() => {
            built = NearestIndex::new(&samples);
            Some(&built)
        }
        None => None,
    };

    if let (Some(mask), Some(index)) = (options.mask, index) {
        for ((r, c), v) in grid.indexed_iter_mut() {
            let far = index
                .nearest([locations.x[c], locations.y[r]])
                .map_or(true, |(_, d)| d > mask);
            if far {
                *v = f64::NAN;
            }
        }
    }

    if options.clip {
        let (lo, hi) = nan_min_max(&values).ok_or(InterpolationError::NoFiniteValues)?;
        grid.mapv_inplace(|v| if v.is_nan() { v } else { v.clamp(lo, hi) });
    }

    if let (Some(Extrapolation::Nearest), Some(index)) = (options.extrapolate, index) {
        for ((r, c), v) in grid.indexed_iter_mut() {
            if v.is_nan() {
                if let Some((i, _)) = index.nearest([locations.x[c], locations.y[r]]) {
                    *v = values[i];
                }
            }
        }
    }

    log::debug!(
        "gridded {} samples onto {}x{} nodes, {} empty",
        samples.len(),
        nx,
        ny,
        grid.iter().filter(|v| v.is_nan()).count()
    );
    Ok(Grid {
        x: locations.x,
        y: locations.y,
        values: grid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scattered(n: usize, seed: u64) -> Vec<[f64; 2]> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pts = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        pts.extend((0..n).map(|_| [rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)]));
        pts
    }

    fn as_arrays(pts: &[[f64; 2]], f: impl Fn([f64; 2]) -> f64) -> (Array2<f64>, Array1<f64>) {
        let points = Array2::from_shape_fn((pts.len(), 2), |(i, j)| pts[i][j]);
        let values = pts.iter().map(|&p| f(p)).collect();
        (points, values)
    }

    fn triangle_samples() -> (Array2<f64>, Array1<f64>) {
        (
            ndarray::array![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]],
            ndarray::array![1.0, 2.0, 3.0],
        )
    }

    #[test]
    fn extrapolation_parses_case_insensitively() {
        assert_eq!("Nearest".parse::<Extrapolation>().unwrap(), Extrapolation::Nearest);
        assert_eq!(
            "linear".parse::<Extrapolation>().unwrap_err(),
            InterpolationError::UnsupportedExtrapolation("linear".into())
        );
        assert_eq!(Extrapolation::Nearest.to_string(), "nearest");
    }

    #[test]
    fn options_validate() {
        assert!(CloughTocherOptions::builder().mask(0.0).build().is_err());
        assert!(CloughTocherOptions::builder()
            .max_gradient_iterations(0)
            .build()
            .is_err());
        let defaults = CloughTocherOptions::builder().build().unwrap();
        assert_eq!(defaults.gradient_tolerance, CloughTocherOptions::default().gradient_tolerance);
    }

    #[test]
    fn reproduces_linear_function() {
        let f = |p: [f64; 2]| 2.0 * p[0] - 3.0 * p[1] + 1.0;
        let pts = scattered(40, 7);
        let ct = CloughTocher::new(pts.clone(), pts.iter().map(|&p| f(p)).collect()).unwrap();
        for g in ct.gradients() {
            assert_abs_diff_eq!(g[0], 2.0, epsilon = 1e-4);
            assert_abs_diff_eq!(g[1], -3.0, epsilon = 1e-4);
        }
        for p in [[0.5, 0.5], [3.3, 7.1], [9.9, 0.2], [5.0, 5.0]] {
            assert_abs_diff_eq!(ct.evaluate(p), f(p), epsilon = 1e-4);
        }
    }

    #[test]
    fn interpolates_samples_exactly() {
        let pts = scattered(25, 3);
        let values: Vec<f64> = pts.iter().map(|p| (p[0] * 0.3).sin() + p[1] * p[1] * 0.05).collect();
        let ct = CloughTocher::new(pts.clone(), values.clone()).unwrap();
        for (p, v) in pts.iter().zip(&values) {
            assert_abs_diff_eq!(ct.evaluate(*p), *v, epsilon = 1e-9);
        }
        assert!(ct.evaluate([11.0, 5.0]).is_nan());
    }

    #[test]
    fn grid_is_nan_outside_hull() {
        let (points, values) = triangle_samples();
        let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let grid = clough_tocher_grid(
            points.view(),
            values.view(),
            &bounds,
            1.0,
            1.0,
            &CloughTocherOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(grid.shape(), (10, 10));
        // (9.5, 1.5) lies beyond the hypotenuse
        assert!(grid.values[[1, 9]].is_nan());
        assert!(grid.values[[0, 0]].is_finite());
    }

    #[test]
    fn nearest_extrapolation_fills_outside_hull() {
        let (points, values) = triangle_samples();
        let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let options = CloughTocherOptions::builder()
            .extrapolate(Extrapolation::Nearest)
            .build()
            .unwrap();
        let grid = clough_tocher_grid(points.view(), values.view(), &bounds, 1.0, 1.0, &options, None).unwrap();
        assert_eq!(grid.n_missing(), 0);
        assert_eq!(grid.values[[1, 9]], 2.0);
    }

    #[test]
    fn distance_mask_blanks_far_nodes() {
        let (points, values) = triangle_samples();
        let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let options = CloughTocherOptions::builder().mask(3.0).build().unwrap();
        let index = NearestIndex::from_array(points.view()).unwrap();
        let grid = clough_tocher_grid(points.view(), values.view(), &bounds, 1.0, 1.0, &options, Some(&index)).unwrap();
        assert!(grid.values[[0, 0]].is_finite());
        // the centroid region is more than 3 from every corner
        assert!(grid.values[[3, 3]].is_nan());
        for ((r, c), v) in grid.values.indexed_iter() {
            if v.is_finite() {
                let (_, d) = index.nearest([grid.x[c], grid.y[r]]).unwrap();
                assert!(d <= 3.0);
            }
        }
    }

    #[test]
    fn clip_keeps_values_in_observed_range() {
        let pts = scattered(30, 11);
        let (points, values) = as_arrays(&pts, |p| ((p[0] - 5.0).powi(2) + (p[1] - 5.0).powi(2)).sqrt().cos());
        let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let options = CloughTocherOptions::builder().clip(true).build().unwrap();
        let grid = clough_tocher_grid(points.view(), values.view(), &bounds, 0.5, 0.5, &options, None).unwrap();
        let (lo, hi) = nan_min_max(values.as_slice().unwrap()).unwrap();
        assert!(grid.values.iter().filter(|v| v.is_finite()).all(|&v| v >= lo && v <= hi));
    }

    #[test]
    fn parallel_matches_sequential() {
        let pts = scattered(50, 5);
        let (points, values) = as_arrays(&pts, |p| p[0] * p[1]);
        let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let seq = clough_tocher_grid(
            points.view(),
            values.view(),
            &bounds,
            0.5,
            0.5,
            &CloughTocherOptions::default(),
            None,
        )
        .unwrap();
        let options = CloughTocherOptions::builder()
            .parallelism(Parallelism::Parallel)
            .build()
            .unwrap();
        let par = clough_tocher_grid(points.view(), values.view(), &bounds, 0.5, 0.5, &options, None).unwrap();
        assert_eq!(seq.values.shape(), par.values.shape());
        for (a, b) in seq.values.iter().zip(par.values.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn mismatched_index_is_rejected() {
        let (points, values) = triangle_samples();
        let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let index = NearestIndex::new(&[[0.0, 0.0]]);
        let err = clough_tocher_grid(
            points.view(),
            values.view(),
            &bounds,
            1.0,
            1.0,
            &CloughTocherOptions::default(),
            Some(&index),
        )
        .unwrap_err();
        assert!(matches!(err, InterpolationError::LengthMismatch { .. }));
    }
}
