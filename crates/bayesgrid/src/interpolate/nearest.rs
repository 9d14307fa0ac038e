//! Nearest-sample lookup over scattered 2D points.

use ndarray::ArrayView2;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use super::{sample_points, InterpolationError};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// R-tree over sample locations, keyed by sample index.
///
/// Building the index once and passing it to repeated gridding calls over
/// the same samples avoids rebuilding it per call.
#[derive(Debug, Clone)]
pub struct NearestIndex {
    tree: RTree<IndexedPoint>,
    len: usize,
}

impl NearestIndex {
    pub fn new(points: &[[f64; 2]]) -> Self {
        let items = points
            .iter()
            .enumerate()
            .map(|(i, &p)| GeomWithData::new(p, i))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
            len: points.len(),
        }
    }

    /// Build from an `(n, 2)` array.
    pub fn from_array(points: ArrayView2<'_, f64>) -> Result<Self, InterpolationError> {
        Ok(Self::new(&sample_points(points, points.nrows())?))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the sample closest to `p` and its Euclidean distance.
    pub fn nearest(&self, p: [f64; 2]) -> Option<(usize, f64)> {
        self.tree.nearest_neighbor(&p).map(|item| {
            let q = item.geom();
            (item.data, (q[0] - p[0]).hypot(q[1] - p[1]))
        })
    }
}
