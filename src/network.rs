//! Feed-forward network representation.
//!
//! A frozen stack of dense layers consumed from the training side. Hidden
//! layers are ReLU, the output layer is linear: the softmax head is inverted
//! into argmax comparisons over logits, which is what both the box
//! propagator and the MILP encoding reason about.

use crate::types::ExplicationError;
use serde::{Deserialize, Serialize};

/// Activation applied after a layer's affine map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified linear unit: `max(0, y)`.
    Relu,
    /// Identity; required for the output layer.
    Linear,
}

/// A dense layer: weight matrix, bias vector and activation tag.
///
/// Weights are stored row-major with one row per output neuron, so
/// `weights[j]` holds the incoming weights of neuron `j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Weight rows, one per output neuron.
    pub weights: Vec<Vec<f64>>,
    /// Bias per output neuron.
    pub biases: Vec<f64>,
    /// Activation applied to the affine result.
    pub activation: Activation,
}

impl Layer {
    /// Create a layer, checking that all weight rows share one width and
    /// that the bias vector matches the number of rows.
    pub fn new(
        weights: Vec<Vec<f64>>,
        biases: Vec<f64>,
        activation: Activation,
    ) -> Result<Self, ExplicationError> {
        let layer = Self {
            weights,
            biases,
            activation,
        };
        layer.check_shape(0)?;
        Ok(layer)
    }

    /// Number of inputs the layer consumes.
    pub fn input_size(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    /// Number of neurons in the layer.
    pub fn output_size(&self) -> usize {
        self.weights.len()
    }

    /// Affine part of the layer: `W · input + b`.
    pub fn affine(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(row, bias)| {
                bias + row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect()
    }

    /// Full layer application: affine map followed by the activation.
    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.affine(input);
        if self.activation == Activation::Relu {
            for v in &mut out {
                *v = v.max(0.0);
            }
        }
        out
    }

    fn check_shape(&self, layer_index: usize) -> Result<(), ExplicationError> {
        let width = self.input_size();
        for row in &self.weights {
            if row.len() != width {
                return Err(ExplicationError::ShapeMismatch {
                    layer: layer_index,
                    expected: width,
                    actual: row.len(),
                });
            }
        }
        if self.biases.len() != self.output_size() {
            return Err(ExplicationError::ShapeMismatch {
                layer: layer_index,
                expected: self.output_size(),
                actual: self.biases.len(),
            });
        }
        Ok(())
    }
}

/// An ordered stack of dense layers with consistent shapes.
///
/// Immutable after construction; `Network::new` and the JSON loader both
/// validate the layer chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Build a network from layers, validating shape consistency and the
    /// linear output convention.
    pub fn new(layers: Vec<Layer>) -> Result<Self, ExplicationError> {
        let network = Self { layers };
        network.validate()?;
        Ok(network)
    }

    /// The layer stack, first hidden layer first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of input features.
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, Layer::input_size)
    }

    /// Number of output classes.
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, Layer::output_size)
    }

    /// Forward pass producing the pre-softmax logits.
    ///
    /// # Errors
    ///
    /// Returns [`ExplicationError::InvalidInput`] if the input width does
    /// not match the first layer.
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>, ExplicationError> {
        if input.len() != self.input_size() {
            return Err(ExplicationError::InvalidInput {
                expected: self.input_size(),
                actual: input.len(),
            });
        }
        let mut activation = input.to_vec();
        for layer in &self.layers {
            activation = layer.apply(&activation);
        }
        Ok(activation)
    }

    /// Predicted class: argmax over the logits.
    pub fn predict(&self, input: &[f64]) -> Result<usize, ExplicationError> {
        Ok(argmax(&self.forward(input)?))
    }

    /// Serialize to JSON for interchange with the training side.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Load a network from JSON, re-running shape validation.
    pub fn from_json(json: &str) -> Result<Self, ExplicationError> {
        let network: Self = serde_json::from_str(json)?;
        network.validate()?;
        Ok(network)
    }

    fn validate(&self) -> Result<(), ExplicationError> {
        let last = match self.layers.last() {
            Some(layer) => layer,
            None => return Err(ExplicationError::EmptyNetwork),
        };
        if last.activation != Activation::Linear {
            return Err(ExplicationError::OutputNotLinear);
        }
        let mut width = self.layers[0].input_size();
        for (index, layer) in self.layers.iter().enumerate() {
            layer.check_shape(index)?;
            if layer.input_size() != width {
                return Err(ExplicationError::ShapeMismatch {
                    layer: index,
                    expected: width,
                    actual: layer.input_size(),
                });
            }
            width = layer.output_size();
        }
        Ok(())
    }
}

/// Index of the maximum value; first index wins ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

/// Softmax over raw logits, for displaying confidences.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}
