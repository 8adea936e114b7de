//! Exact TreeSHAP for tree ensembles
//!
//! Path-dependent TreeSHAP: the contribution of every feature is computed by
//! walking each tree once per observation while tracking, for the unique
//! features on the current root-to-node path, the proportion of subsets that
//! flow down that path. Missing features follow both children weighted by the
//! training cover of each child. Leaf values may be vectors, so one pass
//! yields attributions for every model output.

use crate::error::{InsightError, Result};
use crate::training::{DecisionTree, TreeNode};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// `None` for the root sentinel
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// SHAP values for an ensemble whose prediction is the mean of its trees
#[derive(Debug, Clone)]
pub struct TreeExplainer<'a> {
    trees: Vec<&'a DecisionTree>,
    n_features: usize,
    n_outputs: usize,
    expected_value: Vec<f64>,
}

impl<'a> TreeExplainer<'a> {
    pub fn new(trees: Vec<&'a DecisionTree>) -> Result<Self> {
        let first = trees
            .first()
            .ok_or_else(|| InsightError::Explanation("ensemble has no trees".to_string()))?;
        let n_features = first.n_features();
        let n_outputs = first.n_outputs();

        let mut expected_value = vec![0.0; n_outputs];
        for tree in &trees {
            if tree.n_features() != n_features || tree.n_outputs() != n_outputs {
                return Err(InsightError::Explanation(
                    "trees in the ensemble disagree on shape".to_string(),
                ));
            }
            let root = tree.root().ok_or(InsightError::ModelNotFitted)?;
            for (acc, v) in expected_value.iter_mut().zip(root.expected_value(n_outputs)) {
                *acc += v;
            }
        }
        let n_trees = trees.len() as f64;
        expected_value.iter_mut().for_each(|v| *v /= n_trees);

        Ok(Self {
            trees,
            n_features,
            n_outputs,
            expected_value,
        })
    }

    /// Cover-weighted mean model output over the training data
    pub fn expected_value(&self) -> &[f64] {
        &self.expected_value
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// SHAP values for every row of `x`, one `(rows x features)` matrix per
    /// model output
    pub fn shap_values(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Array2<f64>>> {
        if x.ncols() != self.n_features {
            return Err(InsightError::SchemaMismatch(format!(
                "explainer expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        // Per row: (features x outputs)
        let per_row: Vec<Array2<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.explain_row(x.row(i)))
            .collect::<Result<Vec<_>>>()?;

        let mut outputs = vec![Array2::zeros((x.nrows(), self.n_features)); self.n_outputs];
        for (i, phi) in per_row.iter().enumerate() {
            for (o, out) in outputs.iter_mut().enumerate() {
                out.row_mut(i).assign(&phi.column(o));
            }
        }
        Ok(outputs)
    }

    fn explain_row(&self, row: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
        let mut phi = Array2::zeros((self.n_features, self.n_outputs));
        for tree in &self.trees {
            let root = tree.root().ok_or(InsightError::ModelNotFitted)?;
            recurse(root, row, &mut phi, &[], 1.0, 1.0, None);
        }
        phi /= self.trees.len() as f64;
        Ok(phi)
    }

    /// Base value per output, repeated for `n` observations
    pub fn base_values(&self, output: usize, n: usize) -> Array1<f64> {
        Array1::from_elem(n, self.expected_value.get(output).copied().unwrap_or(0.0))
    }
}

fn recurse(
    node: &TreeNode,
    x: ArrayView1<'_, f64>,
    phi: &mut Array2<f64>,
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    match node {
        TreeNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                let element = path[i];
                if let Some(f) = element.feature {
                    let w = unwound_path_sum(&path, i);
                    let scale = w * (element.one_fraction - element.zero_fraction);
                    for (o, v) in value.iter().enumerate() {
                        phi[[f, o]] += scale * v;
                    }
                }
            }
        }
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            ..
        } => {
            let (hot, cold) = if x[*feature_idx] <= *threshold {
                (left, right)
            } else {
                (right, left)
            };
            let cover = (*n_samples).max(1) as f64;
            let hot_zero = hot.n_samples() as f64 / cover;
            let cold_zero = cold.n_samples() as f64 / cover;

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(*feature_idx)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind_path(&mut path, k);
            }

            recurse(
                hot,
                x,
                phi,
                &path,
                hot_zero * incoming_zero,
                incoming_one,
                Some(*feature_idx),
            );
            recurse(
                cold,
                x,
                phi,
                &path,
                cold_zero * incoming_zero,
                0.0,
                Some(*feature_idx),
            );
        }
    }
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let d = (depth + 1) as f64;
    for i in (0..depth).rev() {
        let pw = path[i].pweight;
        path[i + 1].pweight += one_fraction * pw * (i + 1) as f64 / d;
        path[i].pweight = zero_fraction * pw * (depth - i) as f64 / d;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let d = (depth + 1) as f64;
    let mut next_one = path[depth].pweight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one * d / ((i + 1) as f64 * one);
            next_one = tmp - path[i].pweight * zero * (depth - i) as f64 / d;
        } else {
            path[i].pweight = path[i].pweight * d / (zero * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total path weight with element `index` removed, without mutating the path
fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let d = (depth + 1) as f64;
    let mut next_one = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next_one * d / ((i + 1) as f64 * one);
            total += tmp;
            next_one = path[i].pweight - tmp * zero * (depth - i) as f64 / d;
        } else if zero != 0.0 {
            total += path[i].pweight * d / (zero * (depth - i) as f64);
        }
    }
    total
}
