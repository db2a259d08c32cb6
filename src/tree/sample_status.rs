//! Per-sample node assignment for the layer currently being split: `0` means
//! "not part of this tree" (unused from the start, or already settled into a
//! leaf at an earlier layer); `k + 1` means "routed to node `k` of the
//! current layer". Width is the narrowest unsigned integer that fits the
//! largest node count a layer can reach, `2^max_tree_depth`.
//!
//! `TreeTrainerImplD` tracks this information implicitly, as contiguous
//! blocks inside `orderedSamples_` delimited by per-node sample counts. This
//! crate materializes it as an explicit vector instead, which both backs
//! `updateOrderedSamplesSaveMemory`-style rebuilds from the presort index and
//! gives the sample-status coherence invariant something concrete to check.

use crate::narrow::NarrowColumn;

pub struct SampleStatus {
    values: NarrowColumn,
}

impl SampleStatus {
    /// Root layer: status `1` for samples selected by the initial sample
    /// mask, `0` for everyone else.
    pub fn from_root_mask(mask: &[bool]) -> Self {
        let mut values = NarrowColumn::zeroed(mask.len(), 1);
        for (i, &used) in mask.iter().enumerate() {
            if used {
                values.set(i, 1);
            }
        }
        SampleStatus { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> usize {
        self.values.get(i)
    }

    /// Build the status vector for layer `d + 1` from layer `d`'s routing
    /// decisions. `route` maps an old status value `s != 0` (so node index
    /// `s - 1`) to `Some(new_status)` when that node split (left child gets
    /// one new status, right child another), or `None` when it stayed a
    /// leaf (those samples leave the tree: new status `0`).
    pub fn advance(&self, x: &crate::matrix::Matrix, routes: &[NodeRoute]) -> SampleStatus {
        let max_new_status = routes
            .iter()
            .filter_map(|r| r.as_split())
            .map(|(_, _, left, right)| left.max(right))
            .max()
            .unwrap_or(0);
        let mut next = NarrowColumn::zeroed(self.len(), max_new_status);
        for i in 0..self.len() {
            let s = self.get(i);
            if s == 0 {
                continue;
            }
            match routes[s - 1] {
                NodeRoute::Leaf => {}
                NodeRoute::Split { j, x: threshold, left, right } => {
                    let new_status = if x.get(i, j) < threshold { left } else { right };
                    next.set(i, new_status);
                }
            }
        }
        SampleStatus { values: next }
    }
}

/// What happened to one layer-`d` node, needed to advance the status vector
/// to layer `d + 1`.
#[derive(Debug, Clone, Copy)]
pub enum NodeRoute {
    Leaf,
    Split { j: usize, x: f32, left: usize, right: usize },
}

impl NodeRoute {
    fn as_split(&self) -> Option<(usize, f32, usize, usize)> {
        match *self {
            NodeRoute::Leaf => None,
            NodeRoute::Split { j, x, left, right } => Some((j, x, left, right)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    #[test]
    fn root_mask_assigns_status_one() {
        let status = SampleStatus::from_root_mask(&[true, false, true]);
        assert_eq!(status.get(0), 1);
        assert_eq!(status.get(1), 0);
        assert_eq!(status.get(2), 1);
    }

    #[test]
    fn advance_routes_by_threshold_and_drops_leaves() {
        // 4 samples, single feature; root splits at x=0.5 into left=1, right=2.
        let x = Matrix::from_column_major(vec![0.0, 1.0, 0.2, 0.8], 4, 1).unwrap();
        let root = SampleStatus::from_root_mask(&[true, true, true, true]);
        let routes = vec![NodeRoute::Split { j: 0, x: 0.5, left: 1, right: 2 }];
        let next = root.advance(&x, &routes);
        assert_eq!(next.get(0), 1);
        assert_eq!(next.get(1), 2);
        assert_eq!(next.get(2), 1);
        assert_eq!(next.get(3), 2);

        // now node 1 (left) is a leaf, node 2 (right) splits again.
        let routes2 = vec![
            NodeRoute::Leaf,
            NodeRoute::Split { j: 0, x: 0.9, left: 1, right: 2 },
        ];
        let final_status = next.advance(&x, &routes2);
        assert_eq!(final_status.get(0), 0); // was node 1 (leaf) -> dropped
        assert_eq!(final_status.get(1), 2); // was node 2, x=1.0 >= 0.9 -> right
        assert_eq!(final_status.get(2), 0); // was node 1 (leaf) -> dropped
        assert_eq!(final_status.get(3), 1); // was node 2, x=0.8 < 0.9 -> left
    }
}
