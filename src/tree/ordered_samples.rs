//! Builds the per-variable sample orderings the split search scans.
//!
//! Three constructors, matching `TreeTrainerImplD`'s three code paths:
//! - [`init_layer0`] — `initOrderedSamples_`: filter the presort column down
//!   to the root's used samples.
//! - [`rebuild_from_presort`] — `updateOrderedSamplesSaveMemory`: used when
//!   `select_variables_by_level` picks a different variable set each layer,
//!   so there is no previous-layer buffer for that variable to reuse.
//! - [`partition_from_previous`] — `updateOrderedSamples`: used when the
//!   variable set is fixed for the whole tree; splits the previous layer's
//!   buffer left/right in place of re-scanning the presort index.
//!
//! The original's branch-free variant of `partition_from_previous` writes
//! through both the left and right cursors unconditionally and appends one
//! sentinel slot per block to absorb the always-one spurious write; this
//! port uses an ordinary conditional instead; the output is identical.

use crate::matrix::Matrix;
use crate::narrow::NarrowColumn;
use crate::tree::sample_status::SampleStatus;

/// Root layer: samples from `presort_col` with non-zero status, in
/// ascending feature order.
pub fn init_layer0(presort_col: &NarrowColumn, status: &SampleStatus, used_sample_count: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(used_sample_count);
    for i in presort_col.iter() {
        if status.get(i) != 0 {
            out.push(i);
        }
    }
    out
}

/// Rebuild the ordering for variable `j` directly from the presort column,
/// bucketing by current node (`status - 1`) while preserving the ascending
/// order within each bucket. `sample_count_by_node[k]` gives each bucket's
/// size so write cursors can be placed contiguously up front.
pub fn rebuild_from_presort(
    presort_col: &NarrowColumn,
    status: &SampleStatus,
    sample_count_by_node: &[usize],
) -> Vec<usize> {
    let total: usize = sample_count_by_node.iter().sum();
    let mut out = vec![0usize; total];
    let mut cursor = Vec::with_capacity(sample_count_by_node.len());
    let mut acc = 0usize;
    for &c in sample_count_by_node {
        cursor.push(acc);
        acc += c;
    }
    for i in presort_col.iter() {
        let s = status.get(i);
        if s == 0 {
            continue;
        }
        let node = s - 1;
        out[cursor[node]] = i;
        cursor[node] += 1;
    }
    out
}

/// One parent node's routing decision, needed to partition its block of
/// `prev` into left/right child blocks.
pub enum ParentRoute {
    Leaf,
    Split { j: usize, x: f32 },
}

/// Partition `prev` (ordered for variable `j`, blocked by
/// `sample_count_by_parent`) into per-child blocks according to each
/// parent's split. Leaf parents contribute nothing (their samples leave the
/// tree). `sample_count_by_child` must list child block sizes in the same
/// left-then-right, parent-major order this function produces.
pub fn partition_from_previous(
    prev: &[usize],
    x: &Matrix,
    parents: &[ParentRoute],
    sample_count_by_parent: &[usize],
    sample_count_by_child: &[usize],
) -> Vec<usize> {
    let total: usize = sample_count_by_child.iter().sum();
    let mut out = vec![0usize; total];
    let mut p = 0usize; // read cursor into prev
    let mut write_base = 0usize; // write cursor into out
    let mut child_index = 0usize;

    for (parent_index, parent) in parents.iter().enumerate() {
        let block_len = sample_count_by_parent[parent_index];
        match parent {
            ParentRoute::Leaf => {
                p += block_len;
            }
            ParentRoute::Split { j, x: threshold } => {
                let left_len = sample_count_by_child[child_index];
                let right_len = sample_count_by_child[child_index + 1];
                let mut left_cursor = write_base;
                let mut right_cursor = write_base + left_len;
                for _ in 0..block_len {
                    let i = prev[p];
                    p += 1;
                    if x.get(i, *j) < *threshold {
                        out[left_cursor] = i;
                        left_cursor += 1;
                    } else {
                        out[right_cursor] = i;
                        right_cursor += 1;
                    }
                }
                debug_assert_eq!(left_cursor, write_base + left_len);
                debug_assert_eq!(right_cursor, write_base + left_len + right_len);
                write_base += left_len + right_len;
                child_index += 2;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presort_col(values: &[usize]) -> NarrowColumn {
        NarrowColumn::from_usize_iter(values.iter().copied())
    }

    #[test]
    fn init_layer0_filters_by_status() {
        // presort says ascending order is 2,0,1,3
        let col = presort_col(&[2, 0, 1, 3]);
        let status = SampleStatus::from_root_mask(&[true, false, true, true]);
        let ordered = init_layer0(&col, &status, 3);
        assert_eq!(ordered, vec![2, 0, 3]);
    }

    #[test]
    fn rebuild_from_presort_buckets_by_node_preserving_order() {
        let col = presort_col(&[3, 1, 0, 2]);
        // statuses: sample 3 -> node0, sample1 -> node1, sample0 -> node0, sample2 -> node1
        let mut status = SampleStatus::from_root_mask(&[false; 4]);
        // simulate by constructing via advance-like direct poke through a tiny matrix
        let x = crate::matrix::Matrix::from_column_major(vec![0.0, 1.0, 2.0, 3.0], 4, 1).unwrap();
        let root = SampleStatus::from_root_mask(&[true, true, true, true]);
        let routes = vec![crate::tree::sample_status::NodeRoute::Split { j: 0, x: 1.5, left: 1, right: 2 }];
        status = root.advance(&x, &routes);
        let ordered = rebuild_from_presort(&col, &status, &[2, 2]);
        assert_eq!(ordered, vec![0, 1, 3, 2]);
    }

    #[test]
    fn partition_from_previous_splits_left_right_and_skips_leaves() {
        let prev = vec![10, 11, 12, 13, 20, 21];
        let mut data = vec![0.0f32; 22];
        data[10] = 0.1;
        data[11] = 0.9;
        data[12] = 0.2;
        data[13] = 0.8;
        data[20] = 5.0; // irrelevant (leaf parent)
        data[21] = 5.0;
        let x = crate::matrix::Matrix::from_column_major(data, 22, 1).unwrap();

        let parents = vec![
            ParentRoute::Split { j: 0, x: 0.5 },
            ParentRoute::Leaf,
        ];
        let sample_count_by_parent = vec![4, 2];
        let sample_count_by_child = vec![2, 2];
        let out = partition_from_previous(&prev, &x, &parents, &sample_count_by_parent, &sample_count_by_child);
        assert_eq!(out, vec![10, 12, 11, 13]);
    }
}
