//! Fixtures shared by unit and integration tests.

use ndarray::{Array1, Array2};
use rand::prelude::*;

use crate::distribution::Normal;
use crate::histogram::Histogram1D;

/// Tolerance for values reproduced up to the gradient solver's convergence.
pub const GRID_TOLERANCE: f64 = 1e-4;

/// Random points uniform in `[xmin, xmax] x [ymin, ymax]`, plus the four
/// corners so the convex hull covers the whole box.
pub fn random_points(n: usize, bounds: [f64; 4], seed: u64) -> Array2<f64> {
    let [xmin, xmax, ymin, ymax] = bounds;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pts = vec![[xmin, ymin], [xmax, ymin], [xmax, ymax], [xmin, ymax]];
    pts.extend((0..n).map(|_| {
        [
            xmin + rng.r#gen::<f64>() * (xmax - xmin),
            ymin + rng.r#gen::<f64>() * (ymax - ymin),
        ]
    }));
    Array2::from_shape_fn((pts.len(), 2), |(i, j)| pts[i][j])
}

/// `a * x + b * y + c` at every row of `points`.
pub fn linear_field(points: &Array2<f64>, a: f64, b: f64, c: f64) -> Array1<f64> {
    points.outer_iter().map(|p| a * p[0] + b * p[1] + c).collect()
}

/// Histogram of `n` samples from an equal mixture of two normals.
pub fn bimodal_histogram(
    edges: &[f64],
    modes: [(f64, f64); 2],
    n: usize,
    seed: u64,
) -> Result<Histogram1D, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut h = Histogram1D::from_edges(edges, None, 0.0)?;
    for (mean, std) in modes {
        let normal = Normal::new(mean, std)?;
        h.update(&normal.sample(n / 2, &mut rng), true, false)?;
    }
    Ok(h)
}

/// Element-wise closeness where NaN only matches NaN.
pub fn grids_match(a: &Array2<f64>, b: &Array2<f64>, epsilon: f64) -> bool {
    a.dim() == b.dim()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| (x.is_nan() && y.is_nan()) || (x - y).abs() <= epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_points_include_corners_and_stay_inside() {
        let pts = random_points(20, [0.0, 2.0, -1.0, 1.0], 1);
        assert_eq!(pts.dim(), (24, 2));
        assert_eq!(pts.row(2).to_vec(), vec![2.0, 1.0]);
        assert!(pts.outer_iter().all(|p| (0.0..=2.0).contains(&p[0]) && (-1.0..=1.0).contains(&p[1])));
    }

    #[test]
    fn bimodal_histogram_counts_every_sample() {
        let edges: Vec<f64> = (0..=40).map(|i| -10.0 + 0.5 * i as f64).collect();
        let h = bimodal_histogram(&edges, [(-4.0, 1.0), (4.0, 1.0)], 2000, 3).unwrap();
        assert_eq!(h.n_samples(), 2000);
    }

    #[test]
    fn grids_match_treats_nan_as_equal() {
        let a = ndarray::array![[1.0, f64::NAN]];
        let b = ndarray::array![[1.0 + 1e-9, f64::NAN]];
        assert!(grids_match(&a, &b, 1e-6));
        assert!(!grids_match(&a, &ndarray::array![[1.0, 0.0]], 1e-6));
    }
}
