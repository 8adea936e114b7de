//! Linear models

use crate::error::{InsightError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Multinomial logistic regression (softmax) trained with full-batch
/// gradient descent on standardized inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients (n_features x n_classes), in standardized space
    pub coefficients: Option<Array2<f64>>,
    /// Fitted intercepts (n_classes)
    pub intercept: Option<Array1<f64>>,
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Column means used for standardization
    means: Option<Array1<f64>>,
    /// Column scales used for standardization
    scales: Option<Array1<f64>>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.5,
            means: None,
            scales: None,
        }
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn standardize(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (means, scales) = match (&self.means, &self.scales) {
            (Some(m), Some(s)) => (m, s),
            _ => return Err(InsightError::ModelNotFitted),
        };
        Ok((&x - &means.view().insert_axis(Axis(0))) / &scales.view().insert_axis(Axis(0)))
    }

    /// Row-wise softmax with max subtraction for stability
    fn softmax(mut z: Array2<f64>) -> Array2<f64> {
        for mut row in z.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        z
    }

    /// Fit the model; `y` holds class indices `0..n_classes`
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(InsightError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(InsightError::Training("cannot fit on empty data".to_string()));
        }
        if y.iter().any(|&v| v < 0.0 || v.fract() != 0.0) {
            return Err(InsightError::Training(
                "classification targets must be class indices".to_string(),
            ));
        }
        let n_classes = (y.iter().fold(0.0f64, |m, &v| m.max(v)) as usize + 1).max(2);

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let scales = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        self.means = Some(means);
        self.scales = Some(scales);
        let xs = self.standardize(x)?;

        let mut onehot = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &c) in y.iter().enumerate() {
            onehot[[i, c as usize]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);
        let n = n_samples as f64;

        for _iter in 0..self.max_iter {
            let logits = xs.dot(&weights) + &bias.view().insert_axis(Axis(0));
            let probs = Self::softmax(logits);
            let errors = &probs - &onehot;

            let dw = xs.t().dot(&errors) / n + &weights * self.alpha;
            let db = errors.sum_axis(Axis(0)) / n;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - dw * self.learning_rate;
            bias = bias - db * self.learning_rate;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);

        Ok(self)
    }

    /// Class probabilities, one row per sample
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (weights, bias) = match (&self.coefficients, &self.intercept) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(InsightError::ModelNotFitted),
        };
        if x.ncols() != weights.nrows() {
            return Err(InsightError::SchemaMismatch(format!(
                "model expects {} features, got {}",
                weights.nrows(),
                x.ncols()
            )));
        }
        let xs = self.standardize(x)?;
        Ok(Self::softmax(xs.dot(weights) + &bias.view().insert_axis(Axis(0))))
    }

    /// Predict class indices
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|r| super::decision_tree::argmax(r) as f64)
            .collect())
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.as_ref().map_or(0, |w| w.nrows())
    }

    pub fn n_classes(&self) -> usize {
        self.coefficients.as_ref().map_or(0, |w| w.ncols())
    }

    /// Get accuracy score
    pub fn score(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        let correct = y_pred
            .iter()
            .zip(y.iter())
            .filter(|(pred, actual)| (*pred - *actual).abs() < 0.5)
            .count();
        Ok(correct as f64 / y.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_binary_separable() {
        let x = array![[0.0, 10.0], [1.0, 11.0], [2.0, 12.0], [8.0, 30.0], [9.0, 31.0], [10.0, 32.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(x.view(), y.view()).unwrap();

        assert_eq!(model.score(x.view(), y.view()).unwrap(), 1.0);
    }

    #[test]
    fn test_multiclass_probabilities() {
        let x = array![[0.0], [0.2], [5.0], [5.2], [10.0], [10.2]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];

        let mut model = LogisticRegression::new().with_max_iter(3000);
        model.fit(x.view(), y.view()).unwrap();

        let proba = model.predict_proba(x.view()).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(array![[0.1]].view()).unwrap()[0], 0.0);
        assert_eq!(model.predict(array![[10.1]].view()).unwrap()[0], 2.0);
    }

    #[test]
    fn test_unfitted() {
        let model = LogisticRegression::new();
        assert!(matches!(
            model.predict_proba(array![[1.0]].view()),
            Err(InsightError::ModelNotFitted)
        ));
    }
}
