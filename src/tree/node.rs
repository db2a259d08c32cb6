//! The tree arena: `Vec<TreeNode>` in depth-first order, with child fields as
//! indices into the same vector rather than raw owning pointers. This is the
//! spec's own design note — it eliminates individual node
//! allocation/freeing and makes `reindex` a cheap clone-and-rewrite.

/// One node of a decision tree, stored in a flat arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    pub is_leaf: bool,
    /// Leaf value. Valid (and finite) iff `is_leaf`.
    pub y: f32,
    /// Split feature index. Valid iff `!is_leaf`.
    pub j: usize,
    /// Split threshold. Valid (and finite) iff `!is_leaf`.
    pub x: f32,
    /// Split gain, `>= 0`. Valid iff `!is_leaf`.
    pub gain: f32,
    /// Arena index of the left child. Valid iff `!is_leaf`.
    pub left: usize,
    /// Arena index of the right child. Valid iff `!is_leaf`.
    pub right: usize,
}

impl TreeNode {
    pub fn leaf(y: f32) -> Self {
        TreeNode {
            is_leaf: true,
            y,
            j: 0,
            x: 0.0,
            gain: 0.0,
            left: 0,
            right: 0,
        }
    }

    pub fn internal(j: usize, x: f32, gain: f32, left: usize, right: usize) -> Self {
        TreeNode {
            is_leaf: false,
            y: 0.0,
            j,
            x,
            gain,
            left,
            right,
        }
    }
}

/// An immutable decision tree: a depth-first arena with the root at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub(crate) arena: Vec<TreeNode>,
}

impl Tree {
    pub fn from_arena(arena: Vec<TreeNode>) -> Self {
        debug_assert!(!arena.is_empty());
        Tree { arena }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, i: usize) -> &TreeNode {
        &self.arena[i]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Traverse from the root: go left if `row[j] < x`, else right.
    pub fn predict_one(&self, row: &[f32]) -> f32 {
        let mut idx = self.root();
        loop {
            let node = &self.arena[idx];
            if node.is_leaf {
                return node.y;
            }
            idx = if row[node.j] < node.x { node.left } else { node.right };
        }
    }

    pub fn max_variable_index(&self) -> Option<usize> {
        self.arena
            .iter()
            .filter(|n| !n.is_leaf)
            .map(|n| n.j)
            .max()
    }

    /// Sum `gain` into slot `j` for every internal node.
    pub fn accumulate_variable_weights(&self, weights: &mut Vec<f32>, scale: f32) {
        for node in &self.arena {
            if !node.is_leaf {
                if node.j >= weights.len() {
                    weights.resize(node.j + 1, 0.0);
                }
                weights[node.j] += scale * node.gain;
            }
        }
    }

    /// Return a new tree with every internal node's feature index replaced
    /// by `perm[j]`.
    pub fn reindexed(&self, perm: &[usize]) -> Tree {
        let arena = self
            .arena
            .iter()
            .map(|n| {
                let mut n = *n;
                if !n.is_leaf {
                    n.j = perm[n.j];
                }
                n
            })
            .collect();
        Tree { arena }
    }
}
