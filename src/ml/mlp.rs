//! Feed-forward text classifier trained with Adam.
//!
//! The network is a stack of fully connected layers: ReLU hidden layers,
//! each optionally followed by inverted dropout, and a softmax output layer.
//! Weights are stored input-major (`weights[i * output_dim + j]` connects
//! input `i` to output `j`) so that the sparse TF-IDF input of the first layer
//! can skip zero features in both the forward and backward pass.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{AdsieveError, Result};
use crate::ml::classifier::{Scorer, Trainer, accuracy, argmax, check_input, softmax};
use crate::ml::split::stratified_split;

/// Hyper-parameters of the classifier and its training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Width of each hidden ReLU layer.
    pub hidden_layers: Vec<usize>,
    /// Dropout rate after each hidden layer; `0.0` disables it.
    pub dropout: Vec<f32>,
    pub epochs: usize,
    pub batch_size: usize,
    /// Adam step size.
    pub learning_rate: f32,
    /// Share of the samples held out for evaluation.
    pub test_fraction: f64,
    /// Seed of the stratified split.
    pub split_seed: u64,
    /// Seed of weight initialization, shuffling and dropout.
    pub init_seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 64, 32],
            dropout: vec![0.4, 0.3, 0.0],
            epochs: 15,
            batch_size: 32,
            learning_rate: 0.001,
            test_fraction: 0.2,
            split_seed: 42,
            init_seed: 42,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_layers.iter().any(|&w| w == 0) {
            return Err(AdsieveError::invalid_config(
                "hidden layer widths must be positive",
            ));
        }
        if self.dropout.len() != self.hidden_layers.len() {
            return Err(AdsieveError::invalid_config(format!(
                "{} dropout rates given for {} hidden layers",
                self.dropout.len(),
                self.hidden_layers.len()
            )));
        }
        if self.dropout.iter().any(|p| !(0.0..1.0).contains(p)) {
            return Err(AdsieveError::invalid_config("dropout rates must be in [0, 1)"));
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(AdsieveError::invalid_config(
                "epochs and batch_size must be positive",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(AdsieveError::invalid_config("learning_rate must be positive"));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(AdsieveError::invalid_config("test_fraction must be in (0, 1)"));
        }
        Ok(())
    }
}

/// Activation applied to a layer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Softmax,
}

/// A fully connected layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    input_dim: usize,
    output_dim: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    activation: Activation,
}

impl DenseLayer {
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(AdsieveError::invalid_argument(
                "layer dimensions must be positive",
            ));
        }
        if weights.len() != input_dim * output_dim {
            return Err(AdsieveError::DimensionMismatch {
                expected: input_dim * output_dim,
                actual: weights.len(),
            });
        }
        if bias.len() != output_dim {
            return Err(AdsieveError::DimensionMismatch {
                expected: output_dim,
                actual: bias.len(),
            });
        }
        Ok(Self {
            input_dim,
            output_dim,
            weights,
            bias,
            activation,
        })
    }

    /// Glorot-uniform weights, zero bias.
    fn glorot<R: Rng>(
        input_dim: usize,
        output_dim: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let weights = (0..input_dim * output_dim)
            .map(|_| rng.random_range(-limit..limit))
            .collect();
        Self {
            input_dim,
            output_dim,
            weights,
            bias: vec![0.0; output_dim],
            activation,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Weight connecting `input` to `output`.
    pub fn weight(&self, input: usize, output: usize) -> f32 {
        self.weights[input * self.output_dim + output]
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out = self.bias.clone();
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row = &self.weights[i * self.output_dim..(i + 1) * self.output_dim];
            for (o, &w) in out.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        match self.activation {
            Activation::Relu => out.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax(&mut out),
        }
        out
    }
}

/// A trained multilayer perceptron.
#[derive(Debug, Clone, PartialEq)]
pub struct MlpClassifier {
    layers: Vec<DenseLayer>,
}

impl MlpClassifier {
    /// Assemble a network; hidden layers must be ReLU, the last one softmax,
    /// and consecutive widths must agree.
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self> {
        let Some(last) = layers.last() else {
            return Err(AdsieveError::invalid_argument("a network needs at least one layer"));
        };
        if last.activation != Activation::Softmax {
            return Err(AdsieveError::invalid_argument(
                "the output layer must use softmax",
            ));
        }
        if last.output_dim < 2 {
            return Err(AdsieveError::invalid_argument(
                "the output layer needs at least two classes",
            ));
        }
        for pair in layers.windows(2) {
            if pair[0].activation != Activation::Relu {
                return Err(AdsieveError::invalid_argument(
                    "hidden layers must use ReLU",
                ));
            }
            if pair[0].output_dim != pair[1].input_dim {
                return Err(AdsieveError::DimensionMismatch {
                    expected: pair[0].output_dim,
                    actual: pair[1].input_dim,
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Total count of weights and biases.
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }
}

impl Scorer for MlpClassifier {
    fn input_dim(&self) -> usize {
        self.layers[0].input_dim
    }

    fn num_classes(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        check_input(self.input_dim(), features)?;
        let mut activations = features.to_vec();
        for layer in &self.layers {
            activations = layer.forward(&activations);
        }
        Ok(activations)
    }

    fn name(&self) -> &str {
        "mlp"
    }
}

/// Adam with bias correction, one moment pair per parameter tensor.
struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    timestep: i32,
    first: Vec<Vec<f32>>,
    second: Vec<Vec<f32>>,
}

impl Adam {
    fn new(learning_rate: f32, sizes: &[usize]) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            timestep: 0,
            first: sizes.iter().map(|&n| vec![0.0; n]).collect(),
            second: sizes.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }

    fn advance(&mut self) {
        self.timestep += 1;
    }

    fn update(&mut self, slot: usize, params: &mut [f32], grads: &[f32]) {
        let correction1 = 1.0 - self.beta1.powi(self.timestep);
        let correction2 = 1.0 - self.beta2.powi(self.timestep);
        let m = &mut self.first[slot];
        let v = &mut self.second[slot];
        for k in 0..params.len() {
            let g = grads[k];
            m[k] = self.beta1 * m[k] + (1.0 - self.beta1) * g;
            v[k] = self.beta2 * v[k] + (1.0 - self.beta2) * g * g;
            let m_hat = m[k] / correction1;
            let v_hat = v[k] / correction2;
            params[k] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

/// Trains an [`MlpClassifier`] with mini-batch Adam on sparse cross-entropy.
#[derive(Debug, Clone, Default)]
pub struct ClassifierTrainer {
    config: TrainerConfig,
}

impl ClassifierTrainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Split `features` with a stratified split, train on the training part
    /// and return the model with its accuracy on the held-out part.
    pub fn train(
        &self,
        features: &[Vec<f32>],
        labels: &[usize],
        num_classes: usize,
    ) -> Result<(MlpClassifier, f64)> {
        if features.len() != labels.len() {
            return Err(AdsieveError::DimensionMismatch {
                expected: features.len(),
                actual: labels.len(),
            });
        }
        let split = stratified_split(labels, self.config.test_fraction, self.config.split_seed)?;
        let (train_x, test_x) = split.select(features);
        let (train_y, test_y) = split.select(labels);
        self.train_split(&train_x, &train_y, &test_x, &test_y, num_classes)
    }

    /// Train on an already separated training set and evaluate on the test set.
    pub fn train_split(
        &self,
        train_features: &[Vec<f32>],
        train_labels: &[usize],
        test_features: &[Vec<f32>],
        test_labels: &[usize],
        num_classes: usize,
    ) -> Result<(MlpClassifier, f64)> {
        let model = self.fit(train_features, train_labels, num_classes)?;
        let test_accuracy = accuracy(&model, test_features, test_labels)?;
        info!(
            "mlp: test accuracy {:.4} on {} samples",
            test_accuracy,
            test_features.len()
        );
        Ok((model, test_accuracy))
    }

    fn check_inputs(&self, features: &[Vec<f32>], labels: &[usize], num_classes: usize) -> Result<usize> {
        if num_classes < 2 {
            return Err(AdsieveError::precondition(format!(
                "a classifier needs at least 2 classes, got {num_classes}"
            )));
        }
        if features.is_empty() {
            return Err(AdsieveError::precondition("no training samples"));
        }
        if features.len() != labels.len() {
            return Err(AdsieveError::DimensionMismatch {
                expected: features.len(),
                actual: labels.len(),
            });
        }
        let input_dim = features[0].len();
        if input_dim == 0 {
            return Err(AdsieveError::precondition("feature vectors are empty"));
        }
        if let Some(row) = features.iter().find(|row| row.len() != input_dim) {
            return Err(AdsieveError::DimensionMismatch {
                expected: input_dim,
                actual: row.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(AdsieveError::precondition(format!(
                "label {label} out of range for {num_classes} classes"
            )));
        }
        Ok(input_dim)
    }
}

/// Per-sample forward state kept for backpropagation.
struct Trace {
    /// Input of each layer, then the network output.
    activations: Vec<Vec<f32>>,
    /// Per hidden unit: 0 when ReLU or dropout zeroed it, else the dropout scale.
    gates: Vec<Vec<f32>>,
}

fn forward_train<R: Rng>(
    layers: &[DenseLayer],
    dropout: &[f32],
    input: &[f32],
    rng: &mut R,
) -> Trace {
    let mut activations = Vec::with_capacity(layers.len() + 1);
    let mut gates = Vec::with_capacity(layers.len().saturating_sub(1));
    activations.push(input.to_vec());

    for (l, layer) in layers.iter().enumerate() {
        let mut out = layer.forward(&activations[l]);
        if layer.activation == Activation::Relu {
            let rate = dropout.get(l).copied().unwrap_or(0.0);
            let mut gate = vec![0.0; out.len()];
            for (a, g) in out.iter_mut().zip(gate.iter_mut()) {
                let kept = rate == 0.0 || rng.random::<f32>() >= rate;
                if *a > 0.0 && kept {
                    *g = 1.0 / (1.0 - rate);
                    *a *= *g;
                } else {
                    *a = 0.0;
                }
            }
            gates.push(gate);
        }
        activations.push(out);
    }
    Trace { activations, gates }
}

impl Trainer for ClassifierTrainer {
    type Model = MlpClassifier;

    fn fit(&self, features: &[Vec<f32>], labels: &[usize], num_classes: usize) -> Result<MlpClassifier> {
        let input_dim = self.check_inputs(features, labels, num_classes)?;
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(config.init_seed);

        let mut widths = vec![input_dim];
        widths.extend_from_slice(&config.hidden_layers);
        let mut layers: Vec<DenseLayer> = widths
            .windows(2)
            .map(|w| DenseLayer::glorot(w[0], w[1], Activation::Relu, &mut rng))
            .collect();
        let last_width = widths[widths.len() - 1];
        layers.push(DenseLayer::glorot(
            last_width,
            num_classes,
            Activation::Softmax,
            &mut rng,
        ));

        let sizes: Vec<usize> = layers
            .iter()
            .flat_map(|l| [l.weights.len(), l.bias.len()])
            .collect();
        let mut adam = Adam::new(config.learning_rate, &sizes);
        let mut grad_w: Vec<Vec<f32>> = layers.iter().map(|l| vec![0.0; l.weights.len()]).collect();
        let mut grad_b: Vec<Vec<f32>> = layers.iter().map(|l| vec![0.0; l.bias.len()]).collect();

        info!(
            "mlp: training {} -> {:?} -> {} on {} samples, {} epochs, batch {}",
            input_dim,
            config.hidden_layers,
            num_classes,
            features.len(),
            config.epochs,
            config.batch_size
        );

        let mut order: Vec<usize> = (0..features.len()).collect();
        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            let mut total_loss = 0.0f64;
            let mut correct = 0usize;

            for batch in order.chunks(config.batch_size) {
                grad_w.iter_mut().for_each(|g| g.fill(0.0));
                grad_b.iter_mut().for_each(|g| g.fill(0.0));

                for &sample in batch {
                    let trace = forward_train(&layers, &config.dropout, &features[sample], &mut rng);
                    let Some(probs) = trace.activations.last() else {
                        continue;
                    };
                    if probs.iter().any(|p| !p.is_finite()) {
                        return Err(AdsieveError::training(format!(
                            "non-finite output in epoch {}",
                            epoch + 1
                        )));
                    }
                    let target = labels[sample];
                    total_loss -= f64::from(probs[target].max(1e-7).ln());
                    if argmax(probs) == target {
                        correct += 1;
                    }

                    // softmax + cross-entropy gradient
                    let mut delta = probs.clone();
                    delta[target] -= 1.0;

                    for l in (0..layers.len()).rev() {
                        let layer = &layers[l];
                        let input = &trace.activations[l];
                        let out = layer.output_dim;
                        for (gb, d) in grad_b[l].iter_mut().zip(&delta) {
                            *gb += d;
                        }
                        for (i, &x) in input.iter().enumerate() {
                            if x == 0.0 {
                                continue;
                            }
                            let grads = &mut grad_w[l][i * out..(i + 1) * out];
                            for (g, d) in grads.iter_mut().zip(&delta) {
                                *g += x * d;
                            }
                        }
                        if l == 0 {
                            break;
                        }
                        let gate = &trace.gates[l - 1];
                        delta = (0..layer.input_dim)
                            .map(|i| {
                                if gate[i] == 0.0 {
                                    return 0.0;
                                }
                                let weights = &layer.weights[i * out..(i + 1) * out];
                                let upstream: f32 =
                                    weights.iter().zip(&delta).map(|(w, d)| w * d).sum();
                                upstream * gate[i]
                            })
                            .collect();
                    }
                }

                let scale = 1.0 / batch.len() as f32;
                adam.advance();
                for (l, layer) in layers.iter_mut().enumerate() {
                    grad_w[l].iter_mut().for_each(|g| *g *= scale);
                    grad_b[l].iter_mut().for_each(|g| *g *= scale);
                    adam.update(2 * l, &mut layer.weights, &grad_w[l]);
                    adam.update(2 * l + 1, &mut layer.bias, &grad_b[l]);
                }
            }

            let mean_loss = total_loss / features.len() as f64;
            if !mean_loss.is_finite() {
                return Err(AdsieveError::training(format!(
                    "loss diverged to {mean_loss} in epoch {}",
                    epoch + 1
                )));
            }
            debug!(
                "mlp: epoch {}/{} loss {:.4} train accuracy {:.4}",
                epoch + 1,
                config.epochs,
                mean_loss,
                correct as f64 / features.len() as f64
            );
        }

        let model = MlpClassifier::new(layers)?;
        debug!("mlp: {} parameters", model.parameter_count());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let class = i % 2;
            let mut row = vec![0.0; 6];
            row[class * 3 + i % 3] = 1.0;
            features.push(row);
            labels.push(class);
        }
        (features, labels)
    }

    fn small_config() -> TrainerConfig {
        TrainerConfig {
            hidden_layers: vec![8],
            dropout: vec![0.0],
            epochs: 60,
            batch_size: 8,
            learning_rate: 0.01,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = TrainerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hidden_layers, vec![128, 64, 32]);
        assert_eq!(config.epochs, 15);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_invalid_config() {
        let config = TrainerConfig {
            dropout: vec![0.4],
            ..TrainerConfig::default()
        };
        assert!(ClassifierTrainer::new(config).is_err());

        let config = TrainerConfig {
            dropout: vec![1.0, 0.0, 0.0],
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_learns_separable_data() {
        let (features, labels) = separable(60);
        let trainer = ClassifierTrainer::new(small_config()).unwrap();
        let (model, test_accuracy) = trainer.train(&features, &labels, 2).unwrap();

        assert_eq!(model.input_dim(), 6);
        assert_eq!(model.num_classes(), 2);
        assert!(test_accuracy >= 0.9, "accuracy {test_accuracy}");

        let probs = model.predict_proba(&features[0]).unwrap();
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_default_architecture_shapes() {
        let (features, labels) = separable(40);
        let config = TrainerConfig {
            epochs: 1,
            ..TrainerConfig::default()
        };
        let model = ClassifierTrainer::new(config)
            .unwrap()
            .fit(&features, &labels, 2)
            .unwrap();

        let shapes: Vec<(usize, usize, Activation)> = model
            .layers()
            .iter()
            .map(|l| (l.input_dim(), l.output_dim(), l.activation()))
            .collect();
        assert_eq!(
            shapes,
            vec![
                (6, 128, Activation::Relu),
                (128, 64, Activation::Relu),
                (64, 32, Activation::Relu),
                (32, 2, Activation::Softmax),
            ]
        );
    }

    #[test]
    fn test_training_is_deterministic() {
        let (features, labels) = separable(30);
        let trainer = ClassifierTrainer::new(TrainerConfig {
            dropout: vec![0.5],
            epochs: 3,
            ..small_config()
        })
        .unwrap();
        let a = trainer.fit(&features, &labels, 2).unwrap();
        let b = trainer.fit(&features, &labels, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let (features, labels) = separable(10);
        let trainer = ClassifierTrainer::new(small_config()).unwrap();

        assert!(matches!(
            trainer.fit(&features, &labels, 1),
            Err(AdsieveError::Precondition(_))
        ));

        let mut bad = labels.clone();
        bad[0] = 5;
        assert!(matches!(
            trainer.fit(&features, &bad, 2),
            Err(AdsieveError::Precondition(_))
        ));

        assert!(matches!(
            trainer.fit(&features, &labels[..5], 2),
            Err(AdsieveError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_network_validation() {
        let hidden = DenseLayer::new(2, 3, vec![0.0; 6], vec![0.0; 3], Activation::Relu).unwrap();
        let output = DenseLayer::new(4, 2, vec![0.0; 8], vec![0.0; 2], Activation::Softmax).unwrap();
        assert!(MlpClassifier::new(vec![hidden, output]).is_err());
        assert!(DenseLayer::new(2, 3, vec![0.0; 5], vec![0.0; 3], Activation::Relu).is_err());
    }

    #[test]
    fn test_forward_uses_input_major_weights() {
        // 2 inputs -> 2 outputs, w[0][1] = 1 routes input 0 to class 1
        let layer = DenseLayer::new(
            2,
            2,
            vec![0.0, 5.0, 0.0, 0.0],
            vec![0.0, 0.0],
            Activation::Softmax,
        )
        .unwrap();
        assert_eq!(layer.weight(0, 1), 5.0);
        let model = MlpClassifier::new(vec![layer]).unwrap();
        assert_eq!(model.predict(&[1.0, 0.0]).unwrap(), 1);
        assert_eq!(model.predict(&[0.0, 1.0]).unwrap(), 0);
    }
}
