//! Delaunay triangulation with point location.
//!
//! Triangles come from `delaunator`; an R-tree over their bounding boxes
//! answers "which triangle contains this point".

use delaunator::{triangulate, Point, EMPTY};
use rstar::{RTree, RTreeObject, AABB};

use super::InterpolationError;

/// Barycentric slack for points on a shared edge or the hull.
const BARYCENTRIC_EPS: f64 = 100.0 * f64::EPSILON;

#[derive(Debug, Clone)]
struct TriangleBox {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for TriangleBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A 2D Delaunay triangulation of a fixed point set.
#[derive(Debug, Clone)]
pub struct Triangulation {
    points: Vec<[f64; 2]>,
    triangles: Vec<[usize; 3]>,
    /// `neighbors[t][k]` is the triangle across the edge opposite vertex `k`.
    neighbors: Vec<[Option<usize>; 3]>,
    hull: Vec<usize>,
    tree: RTree<TriangleBox>,
}

impl Triangulation {
    /// Triangulate `points`.
    ///
    /// Coincident points are kept in [`points`](Self::points) but belong to
    /// no triangle.
    pub fn new(points: Vec<[f64; 2]>) -> Result<Self, InterpolationError> {
        if points.len() < 3 {
            return Err(InterpolationError::TooFewPoints {
                needed: 3,
                actual: points.len(),
            });
        }
        let input: Vec<Point> = points.iter().map(|p| Point { x: p[0], y: p[1] }).collect();
        let result = triangulate(&input);
        if result.triangles.is_empty() {
            log::warn!("{} points are collinear, no triangles", points.len());
            return Err(InterpolationError::DegenerateTriangulation);
        }

        let n_triangles = result.triangles.len() / 3;
        let triangles: Vec<[usize; 3]> = result
            .triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        let neighbors = (0..n_triangles)
            .map(|t| {
                let across = |k: usize| {
                    let he = result.halfedges[3 * t + (k + 1) % 3];
                    (he != EMPTY).then_some(he / 3)
                };
                [across(0), across(1), across(2)]
            })
            .collect();

        let boxes = triangles
            .iter()
            .enumerate()
            .map(|(index, tri)| {
                let [a, b, c] = tri.map(|v| points[v]);
                let lower = [a[0].min(b[0]).min(c[0]), a[1].min(b[1]).min(c[1])];
                let upper = [a[0].max(b[0]).max(c[0]), a[1].max(b[1]).max(c[1])];
                TriangleBox {
                    index,
                    envelope: AABB::from_corners(lower, upper),
                }
            })
            .collect();

        log::debug!("triangulated {} points into {} triangles", points.len(), n_triangles);

        Ok(Self {
            points,
            triangles,
            neighbors,
            hull: result.hull,
            tree: RTree::bulk_load(boxes),
        })
    }

    #[inline]
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    #[inline]
    pub fn n_triangles(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn triangle(&self, t: usize) -> [usize; 3] {
        self.triangles[t]
    }

    #[inline]
    pub fn neighbors(&self, t: usize) -> [Option<usize>; 3] {
        self.neighbors[t]
    }

    /// Vertex indices on the convex hull.
    #[inline]
    pub fn hull(&self) -> &[usize] {
        &self.hull
    }

    /// Barycentric coordinates of `p` with respect to triangle `t`.
    pub fn barycentric(&self, t: usize, p: [f64; 2]) -> [f64; 3] {
        let [a, b, c] = self.triangles[t].map(|v| self.points[v]);
        let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
        let l0 = ((b[1] - c[1]) * (p[0] - c[0]) + (c[0] - b[0]) * (p[1] - c[1])) / det;
        let l1 = ((c[1] - a[1]) * (p[0] - c[0]) + (a[0] - c[0]) * (p[1] - c[1])) / det;
        [l0, l1, 1.0 - l0 - l1]
    }

    /// Triangle containing `p` and the barycentric coordinates of `p` in it.
    ///
    /// When `p` lies on a shared edge the triangle it is deepest inside wins.
    pub fn find_simplex(&self, p: [f64; 2]) -> Option<(usize, [f64; 3])> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point(p))
            .map(|tb| (tb.index, self.barycentric(tb.index, p)))
            .filter(|(_, b)| b.iter().all(|&l| l >= -BARYCENTRIC_EPS))
            .max_by(|(_, a), (_, b)| min3(a).total_cmp(&min3(b)))
    }

    /// Sorted, de-duplicated neighbours of every vertex along triangle edges.
    pub fn vertex_neighbors(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.points.len()];
        for tri in &self.triangles {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        adjacency
    }
}

#[inline]
fn min3(b: &[f64; 3]) -> f64 {
    b[0].min(b[1]).min(b[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_square() -> Triangulation {
        Triangulation::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]).unwrap()
    }

    #[test]
    fn square_splits_into_two_triangles() {
        let tri = unit_square();
        assert_eq!(tri.n_triangles(), 2);
        assert_eq!(tri.hull().len(), 4);
        let shared: Vec<_> = (0..2).map(|t| tri.neighbors(t).iter().flatten().count()).collect();
        assert_eq!(shared, vec![1, 1]);
    }

    #[test]
    fn neighbor_is_across_opposite_edge() {
        let tri = unit_square();
        for t in 0..tri.n_triangles() {
            for (k, n) in tri.neighbors(t).iter().enumerate() {
                if let Some(n) = n {
                    let verts = tri.triangle(t);
                    let edge = [verts[(k + 1) % 3], verts[(k + 2) % 3]];
                    let other = tri.triangle(*n);
                    assert!(edge.iter().all(|v| other.contains(v)));
                    assert!(!other.contains(&verts[k]));
                }
            }
        }
    }

    #[test]
    fn locates_interior_and_boundary_points() {
        let tri = unit_square();
        let (t, b) = tri.find_simplex([0.25, 0.5]).unwrap();
        let [p0, p1, p2] = tri.triangle(t).map(|v| tri.points()[v]);
        let x = b[0] * p0[0] + b[1] * p1[0] + b[2] * p2[0];
        let y = b[0] * p0[1] + b[1] * p1[1] + b[2] * p2[1];
        assert_abs_diff_eq!(x, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(b.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        assert!(tri.find_simplex([1.0, 0.5]).is_some());
        assert!(tri.find_simplex([0.0, 0.0]).is_some());
        assert!(tri.find_simplex([1.5, 0.5]).is_none());
        assert!(tri.find_simplex([-0.1, -0.1]).is_none());
    }

    #[test]
    fn vertex_neighbors_are_symmetric() {
        let tri = Triangulation::new(vec![[0.0, 0.0], [2.0, 0.0], [1.0, 2.0], [1.0, 0.7]]).unwrap();
        let adj = tri.vertex_neighbors();
        // the interior point connects to every hull vertex
        assert_eq!(adj[3], vec![0, 1, 2]);
        for (i, list) in adj.iter().enumerate() {
            for &j in list {
                assert!(adj[j].contains(&i));
            }
        }
    }

    #[test]
    fn rejects_degenerate_input() {
        assert_eq!(
            Triangulation::new(vec![[0.0, 0.0], [1.0, 1.0]]).unwrap_err(),
            InterpolationError::TooFewPoints { needed: 3, actual: 2 }
        );
        assert_eq!(
            Triangulation::new(vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]).unwrap_err(),
            InterpolationError::DegenerateTriangulation
        );
    }
}
