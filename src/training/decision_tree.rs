//! Decision tree implementation

use crate::error::{InsightError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with one value per model output
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split; samples with `x <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    /// Training samples that reached this node (its cover)
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }

    /// Cover-weighted mean of the leaf values below this node
    pub fn expected_value(&self, n_outputs: usize) -> Vec<f64> {
        let mut acc = vec![0.0; n_outputs];
        self.accumulate_leaves(&mut acc);
        let total = self.n_samples().max(1) as f64;
        acc.iter_mut().for_each(|v| *v /= total);
        acc
    }

    fn accumulate_leaves(&self, acc: &mut [f64]) {
        match self {
            TreeNode::Leaf { value, n_samples } => {
                for (a, v) in acc.iter_mut().zip(value) {
                    *a += v * *n_samples as f64;
                }
            }
            TreeNode::Split { left, right, .. } => {
                left.accumulate_leaves(acc);
                right.accumulate_leaves(acc);
            }
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features sampled per split (all if unset)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Number of classes (classification)
    n_classes: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Is classification task
    is_classification: bool,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

/// Split candidate: feature, threshold, impurity gain
type SplitCandidate = (usize, f64, f64);

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            n_classes: 0,
            feature_importances: None,
            is_classification: true,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set features considered per split
    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n.max(1));
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fix the number of classes (otherwise inferred from `y`)
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Fit the tree.
    ///
    /// For classification `y` holds class indices `0..n_classes`.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(InsightError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(InsightError::Training("cannot fit a tree on empty data".to_string()));
        }

        if self.is_classification {
            if y.iter().any(|&v| v < 0.0 || v.fract() != 0.0) {
                return Err(InsightError::Training(
                    "classification targets must be class indices".to_string(),
                ));
            }
            let observed = y.iter().fold(0.0f64, |m, &v| m.max(v)) as usize + 1;
            self.n_classes = self.n_classes.max(observed);
        }

        self.n_features = n_features;

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, &mut rng));

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let leaf = || TreeNode::Leaf {
            value: self.leaf_value(y, indices),
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || self.is_pure(y, indices);

        if should_stop {
            return leaf();
        }

        let candidates = self.candidate_features(rng);
        let Some((feature, threshold, gain)) = self.find_best_split(x, y, indices, &candidates)
        else {
            return leaf();
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        if left_idx.len() < self.min_samples_leaf || right_idx.len() < self.min_samples_leaf {
            return leaf();
        }

        importances[feature] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_idx, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_idx, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples,
            impurity: self.impurity_of(y, indices),
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Scan each candidate feature in sorted order, accumulating child
    /// statistics incrementally.
    fn find_best_split(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        indices: &[usize],
        candidates: &[usize],
    ) -> Option<SplitCandidate> {
        let parent_impurity = self.impurity_of(y, indices);
        let n = indices.len();

        let feature_results: Vec<Option<SplitCandidate>> = candidates
            .par_iter()
            .map(|&feature_idx| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| {
                    x[[a, feature_idx]]
                        .partial_cmp(&x[[b, feature_idx]])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                let mut left = NodeStats::new(self.stats_width());
                let mut right = NodeStats::new(self.stats_width());
                for &i in &order {
                    right.add(y[i], self.is_classification);
                }

                let mut best: Option<SplitCandidate> = None;
                for pos in 0..n - 1 {
                    let i = order[pos];
                    left.add(y[i], self.is_classification);
                    right.remove(y[i], self.is_classification);

                    let here = x[[i, feature_idx]];
                    let next = x[[order[pos + 1], feature_idx]];
                    if here == next {
                        continue;
                    }
                    if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.count as f64 * left.impurity(self.criterion)
                        + right.count as f64 * right.impurity(self.criterion))
                        / n as f64;
                    let gain = parent_impurity - weighted;
                    if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                        best = Some((feature_idx, (here + next) / 2.0, gain));
                    }
                }
                best
            })
            .collect();

        feature_results
            .into_iter()
            .flatten()
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn stats_width(&self) -> usize {
        if self.is_classification {
            self.n_classes
        } else {
            0
        }
    }

    fn impurity_of(&self, y: ArrayView1<'_, f64>, indices: &[usize]) -> f64 {
        let mut stats = NodeStats::new(self.stats_width());
        for &i in indices {
            stats.add(y[i], self.is_classification);
        }
        stats.impurity(self.criterion)
    }

    fn is_pure(&self, y: ArrayView1<'_, f64>, indices: &[usize]) -> bool {
        let Some(&first) = indices.first() else {
            return true;
        };
        indices.iter().all(|&i| (y[i] - y[first]).abs() < 1e-10)
    }

    fn leaf_value(&self, y: ArrayView1<'_, f64>, indices: &[usize]) -> Vec<f64> {
        if indices.is_empty() {
            return vec![0.0; self.n_outputs()];
        }
        let n = indices.len() as f64;
        if self.is_classification {
            // Class frequency distribution
            let mut dist = vec![0.0; self.n_classes];
            for &i in indices {
                dist[y[i] as usize] += 1.0;
            }
            dist.iter_mut().for_each(|v| *v /= n);
            dist
        } else {
            vec![indices.iter().map(|&i| y[i]).sum::<f64>() / n]
        }
    }

    /// Raw outputs: one column for regression, class probabilities for
    /// classification
    pub fn predict_raw(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(InsightError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(InsightError::SchemaMismatch(format!(
                "tree expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let n_outputs = self.n_outputs();
        let mut out = Array2::zeros((x.nrows(), n_outputs));
        for (i, sample) in x.rows().into_iter().enumerate() {
            let value = Self::leaf_for(root, sample);
            for (j, v) in value.iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        Ok(out)
    }

    /// Make predictions (class index for classifiers)
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let raw = self.predict_raw(x)?;
        if self.is_classification {
            Ok(raw.rows().into_iter().map(|r| argmax(r) as f64).collect())
        } else {
            Ok(raw.column(0).to_owned())
        }
    }

    fn leaf_for<'a>(node: &'a TreeNode, sample: ArrayView1<'_, f64>) -> &'a [f64] {
        match node {
            TreeNode::Leaf { value, .. } => value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    Self::leaf_for(left, sample)
                } else {
                    Self::leaf_for(right, sample)
                }
            }
        }
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Width of the raw output
    pub fn n_outputs(&self) -> usize {
        if self.is_classification {
            self.n_classes
        } else {
            1
        }
    }

    pub fn is_classification(&self) -> bool {
        self.is_classification
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

/// Index of the largest value (first on ties)
pub(crate) fn argmax(values: ArrayView1<'_, f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// Running sufficient statistics of a node's targets
struct NodeStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl NodeStats {
    fn new(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64, classification: bool) {
        self.count += 1;
        if classification {
            self.class_counts[y as usize] += 1;
        } else {
            self.sum += y;
            self.sq_sum += y * y;
        }
    }

    fn remove(&mut self, y: f64, classification: bool) {
        self.count -= 1;
        if classification {
            self.class_counts[y as usize] -= 1;
        } else {
            self.sum -= y;
            self.sq_sum -= y * y;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            // Var = E[X^2] - E[X]^2
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}
