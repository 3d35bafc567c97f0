//! shellscan-nn — exact neighbor indices for 3D (kd-tree, plus a linear oracle).
//!
//! Every index here resolves equidistant candidates to the smaller input index,
//! so results are reproducible regardless of tree shape or thread count.

use rayon::prelude::*;
use shellscan_core::{dist2, CloudView, SampleError};
use smallvec::SmallVec;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbor { pub idx: usize, pub dist2: f64 }

impl Neighbor {
    const NONE: Neighbor = Neighbor { idx: usize::MAX, dist2: f64::INFINITY };

    /// Lexicographic `(dist2, idx)` ordering; this is the tie rule.
    #[inline]
    fn beats(&self, other: &Neighbor) -> bool {
        self.dist2 < other.dist2 || (self.dist2 == other.dist2 && self.idx < other.idx)
    }
}

pub type Knn = SmallVec<[Neighbor; 16]>;

/// Trait for point-to-cloud neighborhood queries.
pub trait NeighborIndex3 {
    /// Number of indexed points.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Closest indexed point to `q`.
    fn nearest(&self, q: [f64; 3]) -> Neighbor;

    /// Up to `k` closest points, nearest first.
    fn knn(&self, q: [f64; 3], k: usize) -> Knn;

    /// One `nearest` per query, in query order. Runs on the rayon pool.
    fn nearest_batch(&self, queries: &[[f64; 3]]) -> Vec<usize>
    where
        Self: Sync,
    {
        queries.par_iter().map(|q| self.nearest(*q).idx).collect()
    }
}

/// Keeps `out` sorted by the tie rule and no longer than `k`.
fn knn_insert(out: &mut Knn, k: usize, cand: Neighbor) {
    if out.len() == k {
        if !out.last().is_some_and(|worst| cand.beats(worst)) { return; }
        out.pop();
    }
    let pos = out.iter().position(|n| cand.beats(n)).unwrap_or(out.len());
    out.insert(pos, cand);
}

// ---------- brute force ----------

/// Linear scan. O(N) per query; used as a reference in tests and for tiny clouds.
#[derive(Copy, Clone, Debug)]
pub struct BruteIndex<'a> {
    pts: CloudView<'a>,
}

impl<'a> BruteIndex<'a> {
    pub fn build(pts: CloudView<'a>) -> Result<Self, SampleError> {
        if pts.is_empty() { return Err(SampleError::EmptyCloud); }
        Ok(Self { pts })
    }
}

impl<'a> NeighborIndex3 for BruteIndex<'a> {
    fn len(&self) -> usize { self.pts.len() }

    fn nearest(&self, q: [f64; 3]) -> Neighbor {
        let mut best = Neighbor::NONE;
        for i in 0..self.pts.len() {
            let cand = Neighbor { idx: i, dist2: dist2(self.pts.point(i), q) };
            if cand.beats(&best) { best = cand; }
        }
        best
    }

    fn knn(&self, q: [f64; 3], k: usize) -> Knn {
        let mut out = Knn::new();
        if k == 0 { return out; }
        for i in 0..self.pts.len() {
            knn_insert(&mut out, k, Neighbor { idx: i, dist2: dist2(self.pts.point(i), q) });
        }
        out
    }
}

// ---------- kd-tree ----------

const LEAF_SIZE: usize = 16;
const NO_CHILD: usize = usize::MAX;

#[derive(Clone, Copy, Debug)]
struct KdNode {
    min: [f64; 3],
    max: [f64; 3],
    left: usize, // NO_CHILD if leaf
    right: usize,
    // leaf payload: order[start..end]
    start: usize,
    end: usize,
    split: f64,
    axis: u8,
}

impl KdNode {
    #[inline]
    fn is_leaf(&self) -> bool { self.left == NO_CHILD }

    /// Squared distance from `q` to this node's box (0 inside).
    #[inline]
    fn box_dist2(&self, q: [f64; 3]) -> f64 {
        let mut d2 = 0.0;
        for a in 0..3 {
            let v = q[a];
            if v < self.min[a] {
                let d = self.min[a] - v;
                d2 += d * d;
            } else if v > self.max[a] {
                let d = v - self.max[a];
                d2 += d * d;
            }
        }
        d2
    }
}

/// Median-split kd-tree over a borrowed cloud. Immutable after `build`.
#[derive(Clone, Debug)]
pub struct KdTree<'a> {
    pts: CloudView<'a>,
    nodes: Vec<KdNode>,
    order: Vec<usize>,
    root: usize,
}

impl<'a> KdTree<'a> {
    pub fn build(pts: CloudView<'a>) -> Result<Self, SampleError> {
        let n = pts.len();
        if n == 0 { return Err(SampleError::EmptyCloud); }
        let mut tree = Self {
            pts,
            nodes: Vec::with_capacity(2 * n / LEAF_SIZE + 1),
            order: (0..n).collect(),
            root: 0,
        };
        tree.root = tree.build_range(0, n);
        log::debug!("kd-tree: {} points, {} nodes", n, tree.nodes.len());
        Ok(tree)
    }

    fn build_range(&mut self, start: usize, end: usize) -> usize {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for &i in &self.order[start..end] {
            let p = self.pts.point(i);
            for a in 0..3 {
                if p[a] < min[a] { min[a] = p[a]; }
                if p[a] > max[a] { max[a] = p[a]; }
            }
        }

        let count = end - start;
        if count <= LEAF_SIZE {
            return self.push_node(KdNode {
                min, max,
                left: NO_CHILD, right: NO_CHILD,
                start, end,
                split: 0.0, axis: 0,
            });
        }

        // widest axis of this node's box
        let w = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        let axis = if w[0] >= w[1] && w[0] >= w[2] { 0 } else if w[1] >= w[2] { 1 } else { 2 };

        let half = count / 2;
        let pts = self.pts;
        self.order[start..end].select_nth_unstable_by(half, |&a, &b| {
            pts.point(a)[axis].total_cmp(&pts.point(b)[axis])
        });
        let split = pts.point(self.order[start + half])[axis];

        let left = self.build_range(start, start + half);
        let right = self.build_range(start + half, end);
        self.push_node(KdNode {
            min, max, left, right,
            start: 0, end: 0,
            split, axis: axis as u8,
        })
    }

    fn push_node(&mut self, node: KdNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn nearest_in(&self, node_idx: usize, q: [f64; 3], best: &mut Neighbor) {
        let node = &self.nodes[node_idx];
        // Strict: a box exactly as far as `best` may still hold a smaller index.
        if node.box_dist2(q) > best.dist2 { return; }

        if node.is_leaf() {
            for &i in &self.order[node.start..node.end] {
                let cand = Neighbor { idx: i, dist2: dist2(self.pts.point(i), q) };
                if cand.beats(best) { *best = cand; }
            }
            return;
        }

        let (first, second) = if q[node.axis as usize] <= node.split {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.nearest_in(first, q, best);
        self.nearest_in(second, q, best);
    }

    fn knn_in(&self, node_idx: usize, q: [f64; 3], k: usize, out: &mut Knn) {
        let node = &self.nodes[node_idx];
        if out.len() == k {
            if let Some(worst) = out.last() {
                if node.box_dist2(q) > worst.dist2 { return; }
            }
        }

        if node.is_leaf() {
            for &i in &self.order[node.start..node.end] {
                knn_insert(out, k, Neighbor { idx: i, dist2: dist2(self.pts.point(i), q) });
            }
            return;
        }

        let (first, second) = if q[node.axis as usize] <= node.split {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.knn_in(first, q, k, out);
        self.knn_in(second, q, k, out);
    }
}

impl<'a> NeighborIndex3 for KdTree<'a> {
    fn len(&self) -> usize { self.pts.len() }

    fn nearest(&self, q: [f64; 3]) -> Neighbor {
        let mut best = Neighbor::NONE;
        self.nearest_in(self.root, q, &mut best);
        best
    }

    fn knn(&self, q: [f64; 3], k: usize) -> Knn {
        let mut out = Knn::new();
        if k > 0 { self.knn_in(self.root, q, k, &mut out); }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shellscan_core::Cloud;

    fn random_cloud(n: usize, seed: u64) -> Cloud {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut c = Cloud::with_capacity(n);
        for _ in 0..n {
            c.push(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(0.0..10.0));
        }
        c
    }

    #[test]
    fn empty_view_fails_to_build() {
        let c = Cloud::default();
        assert_eq!(KdTree::build((&c).into()).unwrap_err(), SampleError::EmptyCloud);
        assert_eq!(BruteIndex::build((&c).into()).unwrap_err(), SampleError::EmptyCloud);
    }

    #[test]
    fn kdtree_matches_brute_force() {
        let c = random_cloud(2_000, 7);
        let tree = KdTree::build((&c).into()).unwrap();
        let brute = BruteIndex::build((&c).into()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let q = [rng.gen_range(-8.0..8.0), rng.gen_range(-8.0..8.0), rng.gen_range(-3.0..13.0)];
            assert_eq!(tree.nearest(q), brute.nearest(q), "query {q:?}");
        }
    }

    #[test]
    fn ties_resolve_to_smallest_input_index() {
        // Many exact duplicates spread across several leaves.
        let mut c = random_cloud(300, 3);
        for _ in 0..100 { c.push(1.0, 1.0, 1.0); }
        let first_dup = 300;
        let tree = KdTree::build((&c).into()).unwrap();
        let hit = tree.nearest([1.0, 1.0, 1.0]);
        assert_eq!(hit.idx, first_dup);
        assert_eq!(hit.dist2, 0.0);

        // Equidistant but distinct points: (0,0,0) listed before (0,0,2).
        let c = Cloud::from_points(&[[0.0, 0.0, 2.0], [0.0, 0.0, 0.0], [5.0, 5.0, 5.0]]);
        let tree = KdTree::build((&c).into()).unwrap();
        assert_eq!(tree.nearest([0.0, 0.0, 1.0]).idx, 0);
    }

    #[test]
    fn single_point_is_always_nearest() {
        let c = Cloud::from_points(&[[3.0, 4.0, 5.0]]);
        let tree = KdTree::build((&c).into()).unwrap();
        for q in [[0.0; 3], [1e6, -1e6, 3.0], [3.0, 4.0, 5.0]] {
            assert_eq!(tree.nearest(q).idx, 0);
        }
    }

    #[test]
    fn knn_is_sorted_and_agrees_with_brute() {
        let c = random_cloud(1_000, 21);
        let tree = KdTree::build((&c).into()).unwrap();
        let brute = BruteIndex::build((&c).into()).unwrap();
        let q = [0.5, -0.25, 4.0];
        let a = tree.knn(q, 12);
        let b = brute.knn(q, 12);
        assert_eq!(a.len(), 12);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].dist2 <= w[1].dist2));
        assert_eq!(a[0], tree.nearest(q));
        assert!(tree.knn(q, 0).is_empty());
        assert_eq!(tree.knn(q, 5_000).len(), 1_000);
    }

    #[test]
    fn batch_preserves_query_order() {
        let c = random_cloud(500, 5);
        let tree = KdTree::build((&c).into()).unwrap();
        let queries: Vec<[f64; 3]> = (0..200).map(|i| c.point((i * 7) % 500)).collect();
        let batch = tree.nearest_batch(&queries);
        let serial: Vec<usize> = queries.iter().map(|q| tree.nearest(*q).idx).collect();
        assert_eq!(batch, serial);
        for (q, &i) in queries.iter().zip(&batch) {
            assert_eq!(c.point(i), *q);
        }
    }

    #[test]
    fn leaves_partition_the_input() {
        let mut c = random_cloud(1_000, 17);
        for _ in 0..250 { c.push(0.0, 0.0, 5.0); }
        let tree = KdTree::build((&c).into()).unwrap();
        let mut seen = vec![0usize; c.len()];
        let mut stack = vec![tree.root];
        while let Some(n) = stack.pop() {
            let node = &tree.nodes[n];
            if node.is_leaf() {
                assert!(node.start < node.end && node.end - node.start <= LEAF_SIZE);
                for &i in &tree.order[node.start..node.end] {
                    seen[i] += 1;
                    let p = c.point(i);
                    assert!((0..3).all(|a| node.min[a] <= p[a] && p[a] <= node.max[a]));
                }
            } else {
                assert!(node.left < tree.nodes.len() && node.right < tree.nodes.len());
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        assert!(seen.iter().all(|&k| k == 1));
        assert_eq!(tree.root, tree.nodes.len() - 1);
    }

    #[test]
    fn degenerate_column_cloud() {
        let pts: Vec<[f64; 3]> = (0..40).map(|k| [0.0, 0.0, k as f64]).collect();
        let c = Cloud::from_points(&pts);
        let tree = KdTree::build((&c).into()).unwrap();
        assert_eq!(tree.nearest([0.0, 0.0, 17.2]).idx, 17);
        // exactly halfway: smaller index wins
        assert_eq!(tree.nearest([0.0, 0.0, 17.5]).idx, 17);
    }
}
