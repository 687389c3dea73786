//! Classifier traits shared by the float and quantized models.

use crate::error::{AdsieveError, Result};

/// A model that maps a dense feature vector to class probabilities.
///
/// Implementations of this trait are the float model produced by training
/// and the quantized model decoded from an exported artifact.
pub trait Scorer: Send + Sync {
    /// Width of the feature vectors this model accepts.
    fn input_dim(&self) -> usize;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Probability of each class for `features`; the values sum to 1.
    ///
    /// # Arguments
    /// * `features` - A vector of exactly [`Scorer::input_dim`] values
    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>>;

    /// Index of the most probable class.
    fn predict(&self, features: &[f32]) -> Result<usize> {
        Ok(argmax(&self.predict_proba(features)?))
    }

    /// Get the name of this model for debugging and logging.
    fn name(&self) -> &str;
}

/// Produces a [`Scorer`] from labelled feature vectors.
pub trait Trainer {
    type Model: Scorer;

    /// Fit a model on `features` with class indices `labels` in `0..num_classes`.
    fn fit(&self, features: &[Vec<f32>], labels: &[usize], num_classes: usize)
    -> Result<Self::Model>;
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Fraction of `features` whose predicted class equals the label.
pub fn accuracy<S: Scorer + ?Sized>(
    model: &S,
    features: &[Vec<f32>],
    labels: &[usize],
) -> Result<f64> {
    if features.is_empty() {
        return Err(AdsieveError::precondition(
            "accuracy is undefined on an empty evaluation set",
        ));
    }
    if features.len() != labels.len() {
        return Err(AdsieveError::DimensionMismatch {
            expected: features.len(),
            actual: labels.len(),
        });
    }

    let mut correct = 0usize;
    for (row, &label) in features.iter().zip(labels) {
        if model.predict(row)? == label {
            correct += 1;
        }
    }
    Ok(correct as f64 / features.len() as f64)
}

/// Check a feature vector against a model's input width.
pub(crate) fn check_input(expected: usize, features: &[f32]) -> Result<()> {
    if features.len() != expected {
        return Err(AdsieveError::DimensionMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

/// In-place softmax with max subtraction.
pub(crate) fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}
