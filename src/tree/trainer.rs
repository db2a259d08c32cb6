//! `TreeTrainer::train`: one call produces one immutable base predictor from
//! `(out_data, weights, options)`, following `TreeTrainerImplD`'s
//! layer-by-layer BFS (the "D" variant resolved in `DESIGN.md`: ordered
//! samples for a fixed variable set are carried forward layer-to-layer
//! rather than rebuilt from the presort index each time).
//!
//! The per-(node, variable) split search mirrors `TreeNodeTrainer::update`
//! almost line for line (same incremental sums, same `score <= best`
//! fast-path, same constraint order); see the comments there for why the
//! branch is written the way it is.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::options::Options;
use crate::presort::PresortIndex;
use crate::predictor::BasePredictor;
use crate::rng::{self, SplitMix64};
use crate::tree::node::{Tree, TreeNode};
use crate::tree::ordered_samples::{self, ParentRoute};
use crate::tree::sample_status::{NodeRoute, SampleStatus};

#[derive(Debug, Clone, Copy)]
struct NodeStats {
    sum_w: f64,
    sum_wy: f64,
    count: usize,
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    score: f64,
    j: usize,
    x: f32,
    left_y: f32,
    right_y: f32,
    left_count: usize,
    right_count: usize,
    left_sum_w: f64,
    left_sum_wy: f64,
    right_sum_w: f64,
    right_sum_wy: f64,
}

impl SplitCandidate {
    fn gain(&self, parent: &NodeStats) -> f32 {
        (self.score - parent.sum_wy * parent.sum_wy / parent.sum_w) as f32
    }
}

fn round_half_up(x: f64) -> usize {
    (x + 0.5) as usize
}

/// Find the best split of `block` (the samples of one node, ordered
/// ascending by variable `j`) for every node in `layer_stats`, in order.
/// `block` positions `0..layer_stats[0].count` belong to node 0,
/// the next `layer_stats[1].count` to node 1, and so on.
fn find_best_splits(
    j: usize,
    ordered: &[usize],
    x: &Matrix,
    out_data: &[f64],
    weights: &[f64],
    layer_stats: &[NodeStats],
    options: &Options,
) -> Vec<Option<SplitCandidate>> {
    let min_node_size = options.get_min_node_size();
    let min_node_gain = options.get_min_node_gain();
    let min_node_weight_floor = options.get_min_node_weight();

    let mut out = Vec::with_capacity(layer_stats.len());
    let mut pos = 0usize;
    for stats in layer_stats {
        let block = &ordered[pos..pos + stats.count];
        pos += stats.count;

        if stats.sum_w == 0.0 || block.len() < 2 {
            out.push(None);
            continue;
        }

        // floor lifted above the rounding tolerance of the running
        // leftSumW/rightSumW subtraction; see SPEC_FULL.md's BoostTrainer
        // numerics note.
        let min_node_weight = min_node_weight_floor
            .max(stats.sum_w * (stats.count as f64).sqrt() * f64::EPSILON / 2.0);

        let mut best_score = stats.sum_wy * stats.sum_wy / stats.sum_w + min_node_gain;
        let mut best: Option<SplitCandidate> = None;

        let mut left_sum_w = 0.0_f64;
        let mut left_sum_wy = 0.0_f64;

        for idx in 0..block.len() - 1 {
            let i = block[idx];
            let next_i = block[idx + 1];

            let w = weights[i];
            let y = out_data[i];
            left_sum_w += w;
            left_sum_wy += w * y;
            let right_sum_w = stats.sum_w - left_sum_w;
            let right_sum_wy = stats.sum_wy - left_sum_wy;

            let score = left_sum_wy * left_sum_wy / left_sum_w + right_sum_wy * right_sum_wy / right_sum_w;
            if score <= best_score {
                continue;
            }

            let left_count = idx + 1;
            let right_count = block.len() - left_count;
            if left_count < min_node_size || right_count < min_node_size {
                continue;
            }
            if left_sum_w < min_node_weight || right_sum_w < min_node_weight {
                continue;
            }

            let left_x = x.get(i, j);
            let right_x = x.get(next_i, j);
            let mid_x = (left_x + right_x) / 2.0;
            if left_x == mid_x {
                continue;
            }

            best_score = score;
            best = Some(SplitCandidate {
                score,
                j,
                x: mid_x,
                left_y: (left_sum_wy / left_sum_w) as f32,
                right_y: (right_sum_wy / right_sum_w) as f32,
                left_count,
                right_count,
                left_sum_w,
                left_sum_wy,
                right_sum_w,
                right_sum_wy,
            });
        }

        out.push(best);
    }
    out
}

fn pick_used_variables(rng: &mut SplitMix64, candidate_count: usize, ratio: f64) -> Vec<usize> {
    let mut used_count = round_half_up(ratio * candidate_count as f64);
    // A ratio of exactly 0 keeps "no variables used" exact (see §8 boundary
    // behavior); any positive ratio that rounds to 0 is bumped to 1,
    // matching `initUsedVariables_`.
    if used_count == 0 && ratio > 0.0 {
        used_count = 1;
    }
    used_count = used_count.min(candidate_count);
    rng::ordered_random_subset(rng, candidate_count, used_count)
}

fn pick_sample_mask(
    rng: &mut SplitMix64,
    weights: &[f64],
    min_sample_weight: f64,
    options: &Options,
    strata: &[u8],
) -> (Vec<bool>, usize) {
    let n = weights.len();
    let stratified = options.get_stratified_samples();
    let ratio = options.get_used_sample_ratio();

    if min_sample_weight == 0.0 {
        if !stratified {
            let mut k = round_half_up(ratio * n as f64);
            if k == 0 {
                k = 1;
            }
            let mut mask = vec![false; n];
            let mut remaining_n = n as u64;
            let mut remaining_k = k as u64;
            for slot in mask.iter_mut() {
                let b = rng.bernoulli(remaining_k, remaining_n);
                *slot = b;
                if b {
                    remaining_k -= 1;
                }
                remaining_n -= 1;
            }
            (mask, k)
        } else {
            let n0 = strata.iter().filter(|&&s| s == 0).count();
            let n1 = n - n0;
            let mut k = [round_half_up(ratio * n0 as f64), round_half_up(ratio * n1 as f64)];
            let counts = [n0, n1];
            for s in 0..2 {
                if k[s] == 0 && counts[s] > 0 {
                    k[s] = 1;
                }
            }
            let mut remaining = [n0 as u64, n1 as u64];
            let mut remaining_k = [k[0] as u64, k[1] as u64];
            let mut mask = vec![false; n];
            for i in 0..n {
                let s = strata[i] as usize;
                let b = rng.bernoulli(remaining_k[s], remaining[s]);
                mask[i] = b;
                if b {
                    remaining_k[s] -= 1;
                }
                remaining[s] -= 1;
            }
            (mask, k[0] + k[1])
        }
    } else {
        let eligible: Vec<usize> = (0..n).filter(|&i| weights[i] >= min_sample_weight).collect();
        let mut mask = vec![false; n];
        if !stratified {
            let n_e = eligible.len();
            let mut k = round_half_up(ratio * n_e as f64);
            if k == 0 && n_e > 0 {
                k = 1;
            }
            let mut remaining_n = n_e as u64;
            let mut remaining_k = k as u64;
            for &i in &eligible {
                let b = rng.bernoulli(remaining_k, remaining_n);
                mask[i] = b;
                if b {
                    remaining_k -= 1;
                }
                remaining_n -= 1;
            }
            (mask, k)
        } else {
            let mut counts = [0usize; 2];
            for &i in &eligible {
                counts[strata[i] as usize] += 1;
            }
            let mut k = [round_half_up(ratio * counts[0] as f64), round_half_up(ratio * counts[1] as f64)];
            for s in 0..2 {
                if k[s] == 0 && counts[s] > 0 {
                    k[s] = 1;
                }
            }
            let mut remaining = [counts[0] as u64, counts[1] as u64];
            let mut remaining_k = [k[0] as u64, k[1] as u64];
            for &i in &eligible {
                let s = strata[i] as usize;
                let b = rng.bernoulli(remaining_k[s], remaining[s]);
                mask[i] = b;
                if b {
                    remaining_k[s] -= 1;
                }
                remaining[s] -= 1;
            }
            (mask, k[0] + k[1])
        }
    }
}

/// Merge per-layer provisional node lists into one depth-first-indexed
/// arena. Each provisional internal node's `left`/`right` are indices into
/// the *next* layer's node list; this pass rewrites them into absolute
/// arena indices. Returns the arena plus the stats used to build each node,
/// aligned by index (needed for pruning).
fn flatten_layers(layers: Vec<Vec<TreeNode>>, stats_layers: Vec<Vec<NodeStats>>) -> (Vec<TreeNode>, Vec<NodeStats>) {
    let mut offsets = Vec::with_capacity(layers.len());
    let mut acc = 0usize;
    for layer in &layers {
        offsets.push(acc);
        acc += layer.len();
    }

    let mut arena = Vec::with_capacity(acc);
    let mut stats = Vec::with_capacity(acc);
    for (d, layer) in layers.into_iter().enumerate() {
        for node in layer {
            if node.is_leaf {
                arena.push(node);
            } else {
                let base = offsets[d + 1];
                arena.push(TreeNode::internal(node.j, node.x, node.gain, base + node.left, base + node.right));
            }
        }
    }
    for layer in stats_layers {
        stats.extend(layer);
    }
    (arena, stats)
}

/// Collapse any non-root internal node whose gain is below
/// `prune_factor * root_gain` and whose children are both leaves, replacing
/// it with a leaf carrying its own weighted-mean target. Runs in descending
/// index order so a layer-major arena (children at larger indices than
/// their parent) is processed bottom-up in one pass.
fn prune(arena: &mut [TreeNode], stats: &[NodeStats], root_gain: f32, prune_factor: f64) {
    let threshold = prune_factor as f32 * root_gain;
    for idx in (0..arena.len()).rev() {
        if arena[idx].is_leaf {
            continue;
        }
        let (l, r) = (arena[idx].left, arena[idx].right);
        if arena[l].is_leaf && arena[r].is_leaf && arena[idx].gain < threshold {
            let s = stats[idx];
            let y = if s.sum_w > 0.0 { (s.sum_wy / s.sum_w) as f32 } else { 0.0 };
            arena[idx] = TreeNode::leaf(y);
        }
    }
}

/// Rebuild the arena keeping only nodes reachable from the root, in
/// depth-first order, with child indices rewritten to match. `prune` leaves
/// a collapsed node's former children in place as unreachable orphans; this
/// must run afterward so `pack_tree`'s size-based Stump/Constant detection
/// and `format::save`'s node count both see only the nodes that remain.
fn compact_reachable(arena: &[TreeNode]) -> Vec<TreeNode> {
    fn visit(arena: &[TreeNode], idx: usize, out: &mut Vec<TreeNode>) -> usize {
        let node = arena[idx];
        if node.is_leaf {
            out.push(node);
            return out.len() - 1;
        }
        let my_idx = out.len();
        out.push(node);
        let left = visit(arena, node.left, out);
        let right = visit(arena, node.right, out);
        out[my_idx] = TreeNode::internal(node.j, node.x, node.gain, left, right);
        my_idx
    }
    let mut out = Vec::with_capacity(arena.len());
    visit(arena, 0, &mut out);
    out
}

fn pack_tree(arena: Vec<TreeNode>) -> BasePredictor {
    if arena.len() == 1 {
        return BasePredictor::Constant(arena[0].y);
    }
    if arena.len() == 3 && !arena[0].is_leaf && arena[1].is_leaf && arena[2].is_leaf {
        return BasePredictor::Stump {
            j: arena[0].j,
            x: arena[0].x,
            left_y: arena[1].y,
            right_y: arena[2].y,
            gain: arena[0].gain,
        };
    }
    BasePredictor::Tree(Tree::from_arena(arena))
}

/// Produces one immutable base predictor per call from `(out_data,
/// weights, options)`, reusing a presort index built once at construction.
pub struct TreeTrainer<'a> {
    x: &'a Matrix,
    presort: PresortIndex,
    strata: Vec<u8>,
}

impl<'a> TreeTrainer<'a> {
    /// `strata` controls stratified sampling; pass the label (or a derived
    /// small-integer grouping) when `Options::stratified_samples` may be
    /// set. Values must be 0 or 1, matching the two-stratum case the
    /// trainer's sampling routines implement.
    pub fn new(x: &'a Matrix, strata: Vec<u8>) -> Result<Self> {
        if strata.len() != x.n_rows() {
            return Err(Error::invalid_input("strata length does not match sample count"));
        }
        if strata.iter().any(|&s| s > 1) {
            return Err(Error::invalid_input("strata values must be 0 or 1"));
        }
        let presort = PresortIndex::build(x);
        Ok(TreeTrainer { x, presort, strata })
    }

    pub fn train(&self, out_data: &[f64], weights: &[f64], options: &Options) -> Result<BasePredictor> {
        if out_data.len() != self.x.n_rows() || weights.len() != self.x.n_rows() {
            return Err(Error::invalid_input("out_data/weights length does not match sample count"));
        }
        if !out_data.iter().all(|v| v.is_finite()) {
            return Err(Error::invalid_input("out_data has values that are infinite or NaN"));
        }
        if !weights.iter().all(|&w| w.is_finite() && w >= 0.0) {
            return Err(Error::invalid_input("weights must be finite and non-negative"));
        }

        log::debug!(
            "tree fit: {} samples, {} features, forest_size={}",
            self.x.n_rows(),
            self.presort.n_features(),
            options.get_forest_size()
        );

        if options.get_forest_size() > 1 {
            let members: Vec<BasePredictor> = (0..options.get_forest_size())
                .map(|_| self.train_one(out_data, weights, options))
                .collect::<Result<_>>()?;
            return Ok(BasePredictor::Forest(members));
        }
        self.train_one(out_data, weights, options)
    }

    fn train_one(&self, out_data: &[f64], weights: &[f64], options: &Options) -> Result<BasePredictor> {
        let n = self.x.n_rows();

        let w_max = weights.iter().cloned().fold(0.0_f64, f64::max);
        let mut min_sample_weight = options.get_min_abs_sample_weight();
        if options.get_min_rel_sample_weight() > 0.0 {
            min_sample_weight = min_sample_weight.max(w_max * options.get_min_rel_sample_weight());
        }

        let (mask, used_sample_count) = rng::with_thread_rng(|r| {
            pick_sample_mask(r, weights, min_sample_weight, options, &self.strata)
        });

        let mut sum_w = 0.0_f64;
        let mut sum_wy = 0.0_f64;
        for i in 0..n {
            if mask[i] {
                sum_w += weights[i];
                sum_wy += weights[i] * out_data[i];
            }
        }

        if sum_w == 0.0 {
            return Ok(BasePredictor::Zero);
        }

        let mut status = SampleStatus::from_root_mask(&mask);

        let n_features = self.presort.n_features();
        let candidate_count = n_features.min(options.get_top_variable_count());

        let mut used_variables = rng::with_thread_rng(|r| {
            pick_used_variables(r, candidate_count, options.get_used_variable_ratio())
        });

        let mut ordered: Vec<(usize, Vec<usize>)> = used_variables
            .iter()
            .map(|&j| {
                (
                    j,
                    ordered_samples::init_layer0(self.presort.feature(j), &status, used_sample_count),
                )
            })
            .collect();

        let mut layer_stats = vec![NodeStats { sum_w, sum_wy, count: used_sample_count }];
        let mut arena_layers: Vec<Vec<TreeNode>> = Vec::new();
        let mut stats_layers: Vec<Vec<NodeStats>> = Vec::new();
        let mut root_gain = 0.0_f32;

        let max_depth = options.get_max_tree_depth();

        for d in 0..max_depth {
            if options.get_select_variables_by_level() && d > 0 {
                used_variables = rng::with_thread_rng(|r| {
                    pick_used_variables(r, candidate_count, options.get_used_variable_ratio())
                });
                let counts: Vec<usize> = layer_stats.iter().map(|s| s.count).collect();
                ordered = used_variables
                    .iter()
                    .map(|&j| (j, ordered_samples::rebuild_from_presort(self.presort.feature(j), &status, &counts)))
                    .collect();
            }

            let sample_count_by_parent: Vec<usize> = layer_stats.iter().map(|s| s.count).collect();

            let per_variable: Vec<Vec<Option<SplitCandidate>>> = ordered
                .par_iter()
                .map(|(j, buf)| find_best_splits(*j, buf, self.x, out_data, weights, &layer_stats, options))
                .collect();

            let mut best: Vec<Option<SplitCandidate>> = vec![None; layer_stats.len()];
            for per_node in &per_variable {
                for (k, cand) in per_node.iter().enumerate() {
                    if let Some(c) = cand {
                        let replace = match &best[k] {
                            None => true,
                            Some(b) => c.score > b.score,
                        };
                        if replace {
                            best[k] = Some(c.clone());
                        }
                    }
                }
            }

            let mut children_stats: Vec<NodeStats> = Vec::new();
            let mut parents: Vec<ParentRoute> = Vec::with_capacity(layer_stats.len());
            let mut routes: Vec<NodeRoute> = Vec::with_capacity(layer_stats.len());
            let mut layer_nodes: Vec<TreeNode> = Vec::with_capacity(layer_stats.len());

            for (k, stats) in layer_stats.iter().enumerate() {
                match &best[k] {
                    Some(cand) => {
                        if d == 0 {
                            root_gain = cand.gain(stats);
                            log::trace!("split depth=0 node=0 j={} x={} gain={}", cand.j, cand.x, root_gain);
                        } else {
                            log::trace!(
                                "split depth={} node={} j={} x={} gain={}",
                                d,
                                k,
                                cand.j,
                                cand.x,
                                cand.gain(stats)
                            );
                        }
                        let left_idx = children_stats.len();
                        children_stats.push(NodeStats {
                            sum_w: cand.left_sum_w,
                            sum_wy: cand.left_sum_wy,
                            count: cand.left_count,
                        });
                        let right_idx = children_stats.len();
                        children_stats.push(NodeStats {
                            sum_w: cand.right_sum_w,
                            sum_wy: cand.right_sum_wy,
                            count: cand.right_count,
                        });
                        layer_nodes.push(TreeNode::internal(cand.j, cand.x, cand.gain(stats), left_idx, right_idx));
                        parents.push(ParentRoute::Split { j: cand.j, x: cand.x });
                        routes.push(NodeRoute::Split {
                            j: cand.j,
                            x: cand.x,
                            left: left_idx + 1,
                            right: right_idx + 1,
                        });
                    }
                    None => {
                        let y = if stats.sum_w > 0.0 { (stats.sum_wy / stats.sum_w) as f32 } else { 0.0 };
                        layer_nodes.push(TreeNode::leaf(y));
                        parents.push(ParentRoute::Leaf);
                        routes.push(NodeRoute::Leaf);
                    }
                }
            }

            arena_layers.push(layer_nodes);
            stats_layers.push(layer_stats.clone());

            if children_stats.is_empty() {
                break;
            }

            if d + 1 == max_depth {
                // Depth limit reached: the children this layer produced
                // become leaves without a further split search.
                let leaves: Vec<TreeNode> = children_stats
                    .iter()
                    .map(|s| {
                        let y = if s.sum_w > 0.0 { (s.sum_wy / s.sum_w) as f32 } else { 0.0 };
                        TreeNode::leaf(y)
                    })
                    .collect();
                arena_layers.push(leaves);
                stats_layers.push(children_stats);
                break;
            }

            status = status.advance(self.x, &routes);

            if !options.get_select_variables_by_level() {
                let sample_count_by_child: Vec<usize> = children_stats.iter().map(|s| s.count).collect();
                ordered = ordered
                    .iter()
                    .map(|(j, buf)| {
                        (
                            *j,
                            ordered_samples::partition_from_previous(
                                buf,
                                self.x,
                                &parents,
                                &sample_count_by_parent,
                                &sample_count_by_child,
                            ),
                        )
                    })
                    .collect();
            }

            layer_stats = children_stats;
        }

        let (mut arena, stats) = flatten_layers(arena_layers, stats_layers);

        if options.get_prune_factor() > 0.0 {
            prune(&mut arena, &stats, root_gain, options.get_prune_factor());
            arena = compact_reachable(&arena);
        }

        Ok(pack_tree(arena))
    }
}
