//! Explication Engine - minimal sufficient explanations for ReLU classifiers
//!
//! Computes, for a trained feed-forward ReLU network and a concrete input,
//! a minimal subset of input features whose fixed values alone force the
//! network's prediction. The certificate is adversarial: a feature is
//! irrelevant exactly when no input that agrees with the remaining fixed
//! features can flip the predicted class.
//!
//! # Architecture
//!
//! The crate is built from small components, leaves first:
//! - **Network**: frozen dense layers with `relu`/`linear` activations
//! - **Interval**: box propagation, a cheap sound over-approximation
//! - **MILP**: linear models with constraint handles and a narrow solver trait
//! - **Simplex**: a self-contained LP + branch-and-bound backend
//! - **Encoder**: big-M ReLU encoding with LP-tightened per-neuron bounds
//! - **Engine**: the feature-elimination loop over a cloned probe model
//! - **Metrics**: counters and wall-clock accounting for reporting
//!
//! # Safety
//!
//! - Zero `unsafe` blocks
//! - The base MILP model is immutable after encoding; each explication
//!   mutates its own clone
//!
//! # Determinism
//!
//! Features are always eliminated in column order, so the returned
//! explanation is deterministic for a given network, domains and input.
//! It is minimal under that order, not the smallest possible subset.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod dataset;
pub mod encoder;
pub mod engine;
pub mod interval;
pub mod metrics;
pub mod milp;
pub mod network;
pub mod simplex;
pub mod types;

pub use dataset::Dataset;
pub use encoder::{encode, EncodedNetwork};
pub use engine::{Explication, ExplicationConfig, ExplicationEngine};
pub use interval::{FeatureDomains, Interval};
pub use metrics::{Metrics, MetricsSummary};
pub use milp::{Model, Solver};
pub use network::{Activation, Layer, Network};
pub use simplex::SimplexSolver;
pub use types::ExplicationError;

/// Library version following semantic versioning
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
