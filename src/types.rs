//! Shared error types for the explication pipeline.
//!
//! Error policy:
//! - Construction and encoding errors fail fast
//! - A solver failure aborts the current explication only
//! - A probe coming back infeasible is the irrelevance signal, never an error
//! - Bound-tightening failures are recovered locally with box bounds and a
//!   warning, so they do not appear here

use crate::milp::SolverFailure;
use thiserror::Error;

/// Errors produced while building or explicating a network.
#[derive(Debug, Error)]
pub enum ExplicationError {
    /// Layer dimensions are inconsistent with the preceding layer.
    #[error("shape mismatch at layer {layer}: expected {expected} inputs, found {actual}")]
    ShapeMismatch {
        /// Index of the offending layer.
        layer: usize,
        /// Input width required by the layer chain.
        expected: usize,
        /// Input width actually declared.
        actual: usize,
    },

    /// A feature vector disagrees with the network's input width.
    #[error("invalid input: expected {expected} features, found {actual}")]
    InvalidInput {
        /// Feature count the network expects.
        expected: usize,
        /// Feature count supplied.
        actual: usize,
    },

    /// The predicted class index does not name an output neuron.
    #[error("predicted class {class} out of range for {outputs} outputs")]
    ClassOutOfRange {
        /// Class index supplied.
        class: usize,
        /// Number of output neurons.
        outputs: usize,
    },

    /// A network must end in a linear layer (softmax is inverted into
    /// argmax comparisons, so logits are compared directly).
    #[error("the final layer must be linear")]
    OutputNotLinear,

    /// A network needs at least one layer.
    #[error("network has no layers")]
    EmptyNetwork,

    /// Feature domains cannot be derived from an empty dataset.
    #[error("dataset has no rows")]
    EmptyDataset,

    /// The MILP solver failed in a way that is not plain infeasibility.
    #[error("solver failure: {0}")]
    Solver(#[from] SolverFailure),

    /// A network or dataset description could not be parsed.
    #[error("malformed description: {0}")]
    Deserialize(#[from] serde_json::Error),
}
