//! Depth-limited regression trees grown on first and second order gradients.
//!
//! Split search is exact and greedy: every distinct value of every candidate feature is
//! tried, thresholds sit halfway between neighbouring values, and rows with
//! `x < threshold` go left. Gains and leaf weights follow the second-order boosting
//! objective with an L2 penalty on leaf weights.

use ndarray::{ArrayView1, ArrayView2};

/// Splits whose gain does not exceed this are treated as no improvement.
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    /// Minimum gain required to keep a split.
    pub gamma: f64,
    /// Minimum hessian sum on each side of a split.
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights.
    pub reg_lambda: f64,
    /// Shrinkage applied to every leaf weight.
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }
}

/// Row indices of each column, sorted by value. Computed once per training matrix and
/// reused by every tree grown on it.
#[derive(Debug, Clone)]
pub struct SortedColumns {
    order: Vec<Vec<usize>>,
}

impl SortedColumns {
    pub fn new(x: ArrayView2<f64>) -> Self {
        let order = x
            .columns()
            .into_iter()
            .map(|column| {
                let mut idx: Vec<usize> = (0..column.len()).collect();
                idx.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
                idx
            })
            .collect();
        Self { order }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows trees on a fixed training matrix.
pub struct TreeGrower<'a> {
    x: ArrayView2<'a, f64>,
    sorted: &'a SortedColumns,
    params: TreeParams,
}

impl<'a> TreeGrower<'a> {
    pub fn new(x: ArrayView2<'a, f64>, sorted: &'a SortedColumns, params: TreeParams) -> Self {
        Self { x, sorted, params }
    }

    /// Grows one tree over the active `rows`, considering only `features`.
    pub fn grow(
        &self,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        features: &[usize],
    ) -> RegressionTree {
        let mut nodes = Vec::new();
        let mut in_node = vec![false; self.x.nrows()];
        self.grow_node(&mut nodes, rows, 0, grad, hess, features, &mut in_node);
        RegressionTree { nodes }
    }

    #[allow(clippy::too_many_arguments)]
    fn grow_node(
        &self,
        nodes: &mut Vec<TreeNode>,
        rows: Vec<usize>,
        depth: usize,
        grad: &[f64],
        hess: &[f64],
        features: &[usize],
        in_node: &mut [bool],
    ) -> usize {
        let g_sum: f64 = rows.iter().map(|&r| grad[r]).sum();
        let h_sum: f64 = rows.iter().map(|&r| hess[r]).sum();

        let id = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: self.leaf_value(g_sum, h_sum),
        });
        if depth >= self.params.max_depth || rows.len() < 2 {
            return id;
        }

        for &r in &rows {
            in_node[r] = true;
        }
        let best = self.best_split(g_sum, h_sum, grad, hess, features, in_node);
        for &r in &rows {
            in_node[r] = false;
        }
        let Some(split) = best else {
            return id;
        };

        let x = self.x;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[[r, split.feature]] < split.threshold);
        let left = self.grow_node(nodes, left_rows, depth + 1, grad, hess, features, in_node);
        let right = self.grow_node(nodes, right_rows, depth + 1, grad, hess, features, in_node);
        nodes[id] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(
        &self,
        g_sum: f64,
        h_sum: f64,
        grad: &[f64],
        hess: &[f64],
        features: &[usize],
        in_node: &[bool],
    ) -> Option<SplitCandidate> {
        let lambda = self.params.reg_lambda;
        let parent = node_score(g_sum, h_sum, lambda);
        let mut best: Option<SplitCandidate> = None;

        for &feature in features {
            let mut g_left = 0.0;
            let mut h_left = 0.0;
            let mut previous: Option<f64> = None;

            for &r in &self.sorted.order[feature] {
                if !in_node[r] {
                    continue;
                }
                let value = self.x[[r, feature]];
                if let Some(prev) = previous {
                    if value > prev {
                        let g_right = g_sum - g_left;
                        let h_right = h_sum - h_left;
                        if h_left >= self.params.min_child_weight
                            && h_right >= self.params.min_child_weight
                        {
                            let gain = node_score(g_left, h_left, lambda)
                                + node_score(g_right, h_right, lambda)
                                - parent;
                            let improves = best.is_none_or(|b| gain > b.gain);
                            if gain > self.params.gamma && gain > MIN_SPLIT_GAIN && improves {
                                best = Some(SplitCandidate {
                                    feature,
                                    threshold: prev + (value - prev) / 2.0,
                                    gain,
                                });
                            }
                        }
                    }
                }
                g_left += grad[r];
                h_left += hess[r];
                previous = Some(value);
            }
        }
        best
    }

    fn leaf_value(&self, g_sum: f64, h_sum: f64) -> f64 {
        let denom = h_sum + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -g_sum / denom * self.params.learning_rate
    }
}

#[inline]
fn node_score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 { 0.0 } else { g * g / denom }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            gamma: 0.0,
            min_child_weight: 1.0,
            reg_lambda: 0.0,
            learning_rate: 1.0,
        }
    }

    /// Gradients for a squared-error fit starting from a zero prediction.
    fn gradients(y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (y.iter().map(|v| -v).collect(), vec![1.0; y.len()])
    }

    #[test]
    fn stump_separates_a_step_function() {
        let x = array![[0.1], [0.2], [0.3], [0.7], [0.8], [0.9]];
        let y = [1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        let (grad, hess) = gradients(&y);
        let sorted = SortedColumns::new(x.view());
        let tree = TreeGrower::new(x.view(), &sorted, params(1)).grow(&grad, &hess, (0..6).collect(), &[0]);

        match tree.nodes()[0] {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(feature, 0);
                assert_abs_diff_eq!(threshold, 0.5, epsilon = 1e-12);
            }
            other => panic!("expected a split at the root, got {other:?}"),
        }
        assert_abs_diff_eq!(tree.predict_row(array![0.0].view()), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.predict_row(array![1.0].view()), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn picks_the_informative_feature() {
        let x = Array2::from_shape_vec(
            (4, 2),
            vec![0.5, 0.0, 0.1, 0.0, 0.5, 1.0, 0.1, 1.0],
        )
        .unwrap();
        let y = [0.0, 0.0, 2.0, 2.0];
        let (grad, hess) = gradients(&y);
        let sorted = SortedColumns::new(x.view());
        let tree = TreeGrower::new(x.view(), &sorted, params(1)).grow(&grad, &hess, (0..4).collect(), &[0, 1]);
        assert!(matches!(tree.nodes()[0], TreeNode::Split { feature: 1, .. }));
    }

    #[test]
    fn depth_limits_the_number_of_leaves() {
        let x = Array2::from_shape_fn((16, 1), |(i, _)| i as f64);
        let y: Vec<f64> = (0..16).map(|i| (i * i) as f64).collect();
        let (grad, hess) = gradients(&y);
        let sorted = SortedColumns::new(x.view());
        let tree = TreeGrower::new(x.view(), &sorted, params(2)).grow(&grad, &hess, (0..16).collect(), &[0]);
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn constant_target_stays_a_single_leaf() {
        let x = array![[0.1], [0.2], [0.3]];
        let y = [2.0, 2.0, 2.0];
        let (grad, hess) = gradients(&y);
        let sorted = SortedColumns::new(x.view());
        let tree = TreeGrower::new(x.view(), &sorted, params(2)).grow(&grad, &hess, (0..3).collect(), &[0]);
        assert_eq!(tree.nodes().len(), 1);
        assert_abs_diff_eq!(tree.predict_row(array![0.0].view()), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn min_child_weight_blocks_small_children() {
        let x = array![[0.1], [0.2], [0.3], [0.9]];
        let y = [0.0, 0.0, 0.0, 10.0];
        let (grad, hess) = gradients(&y);
        let sorted = SortedColumns::new(x.view());
        let mut p = params(1);
        p.min_child_weight = 2.0;
        let tree = TreeGrower::new(x.view(), &sorted, p).grow(&grad, &hess, (0..4).collect(), &[0]);
        // The only useful split isolates one row, which has hessian 1 < 2.
        match tree.nodes()[0] {
            TreeNode::Split { threshold, .. } => assert_abs_diff_eq!(threshold, 0.25, epsilon = 1e-12),
            other => panic!("expected a balanced split, got {other:?}"),
        }
    }

    #[test]
    fn inactive_rows_are_ignored() {
        let x = array![[0.1], [0.2], [0.8], [0.9]];
        let y = [0.0, 0.0, 4.0, 100.0];
        let (grad, hess) = gradients(&y);
        let sorted = SortedColumns::new(x.view());
        let tree = TreeGrower::new(x.view(), &sorted, params(1)).grow(&grad, &hess, vec![0, 1, 2], &[0]);
        assert_abs_diff_eq!(tree.predict_row(array![0.95].view()), 4.0, epsilon = 1e-12);
    }
}
