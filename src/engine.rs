//! The feature-elimination loop.
//!
//! One probe model per input: a clone of the base model plus one equality
//! per feature and the output-disagreement block. The probe is satisfiable
//! exactly when the current fixture set is *not* sufficient, so the loop
//! frees one feature at a time, asks the box first when enabled, and falls
//! back to the MILP solver for an exact answer. A feature stays dropped
//! only when a counter-example is proven impossible.

#![forbid(unsafe_code)]

use crate::dataset::Dataset;
use crate::encoder::EncodedNetwork;
use crate::interval::{box_has_solution, relax_to_domains, FeatureDomains};
use crate::metrics::Metrics;
use crate::milp::{Constraint, ConstraintId, LinExpr, MilpOutcome, Model, Solver};
use crate::network::Network;
use crate::types::ExplicationError;
use std::time::Instant;
use tracing::info;

/// Tunables for the explication loop.
#[derive(Debug, Clone)]
pub struct ExplicationConfig {
    /// Consult the box before every solver call.
    pub use_box: bool,
    /// Margin forcing strict disagreement, since the model only supports
    /// non-strict inequalities. Too large under-reports irrelevance; too
    /// small invites numerical trouble.
    pub epsilon: f64,
    /// Log every explication's relevant/irrelevant split.
    pub log_explications: bool,
}

impl Default for ExplicationConfig {
    fn default() -> Self {
        Self {
            use_box: true,
            epsilon: 1e-4,
            log_explications: false,
        }
    }
}

/// Result of one explication: which features remain fixed, and which of
/// the dropped ones the box settled without a solver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explication {
    /// `true` = the feature's fixture is required (relevant).
    pub relevant: Vec<bool>,
    /// `true` = dropped with the box alone.
    pub dropped_by_box: Vec<bool>,
}

impl Explication {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.relevant.len()
    }

    /// Whether the explication covers no features.
    pub fn is_empty(&self) -> bool {
        self.relevant.is_empty()
    }

    /// Indices of relevant features, in column order.
    pub fn relevant_indices(&self) -> Vec<usize> {
        mask_indices(&self.relevant, true)
    }

    /// Indices of irrelevant features, in column order.
    pub fn irrelevant_indices(&self) -> Vec<usize> {
        mask_indices(&self.relevant, false)
    }

    /// Indices of features the box proved irrelevant.
    pub fn box_indices(&self) -> Vec<usize> {
        mask_indices(&self.dropped_by_box, true)
    }

    /// Indices of features the solver proved irrelevant.
    pub fn solver_indices(&self) -> Vec<usize> {
        self.relevant
            .iter()
            .zip(&self.dropped_by_box)
            .enumerate()
            .filter(|(_, (relevant, by_box))| !**relevant && !**by_box)
            .map(|(i, _)| i)
            .collect()
    }
}

fn mask_indices(mask: &[bool], keep: bool) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, &m)| m == keep)
        .map(|(i, _)| i)
        .collect()
}

fn named<'a>(names: &'a [String], indices: &[usize]) -> Vec<&'a str> {
    indices.iter().map(|&i| names[i].as_str()).collect()
}

/// Drives explications against one encoded network.
pub struct ExplicationEngine<'a, S: Solver> {
    network: &'a Network,
    base: &'a EncodedNetwork,
    domains: &'a FeatureDomains,
    solver: &'a S,
    config: ExplicationConfig,
}

impl<'a, S: Solver> ExplicationEngine<'a, S> {
    /// Wire the engine up, checking the pieces agree on shapes.
    pub fn new(
        network: &'a Network,
        base: &'a EncodedNetwork,
        domains: &'a FeatureDomains,
        solver: &'a S,
        config: ExplicationConfig,
    ) -> Result<Self, ExplicationError> {
        if domains.len() != network.input_size() {
            return Err(ExplicationError::InvalidInput {
                expected: network.input_size(),
                actual: domains.len(),
            });
        }
        if base.input_vars().len() != network.input_size()
            || base.output_vars().len() != network.output_size()
        {
            return Err(ExplicationError::InvalidInput {
                expected: network.input_size(),
                actual: base.input_vars().len(),
            });
        }
        Ok(Self {
            network,
            base,
            domains,
            solver,
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ExplicationConfig {
        &self.config
    }

    /// Compute the minimal explanation for one input with predicted class
    /// `predicted`.
    ///
    /// # Errors
    ///
    /// Input width or class range mismatches fail fast; a solver failure
    /// aborts this explication and is surfaced to the caller.
    pub fn explain(
        &self,
        input: &[f64],
        predicted: usize,
        metrics: &mut Metrics,
    ) -> Result<Explication, ExplicationError> {
        let features = self.network.input_size();
        if input.len() != features {
            return Err(ExplicationError::InvalidInput {
                expected: features,
                actual: input.len(),
            });
        }
        if predicted >= self.network.output_size() {
            return Err(ExplicationError::ClassOutOfRange {
                class: predicted,
                outputs: self.network.output_size(),
            });
        }

        let mut probe = self.base.model().clone();
        let mut fixtures: Vec<ConstraintId> = self
            .base
            .input_vars()
            .iter()
            .zip(input)
            .map(|(var, value)| probe.add(Constraint::eq(LinExpr::term(*var, 1.0), *value)))
            .collect();
        self.add_disagreement(&mut probe, predicted);

        let mut relevant = vec![true; features];
        let mut dropped_by_box = vec![false; features];

        for i in 0..features {
            let saved = probe.remove(fixtures[i]);
            relevant[i] = false;

            if self.config.use_box {
                let box_start = Instant::now();
                let freed: Vec<bool> = relevant.iter().map(|r| !r).collect();
                let bounds = relax_to_domains(input, self.domains, &freed);
                let inconclusive = box_has_solution(&bounds, self.network, predicted);
                metrics.accumulated_box_time += box_start.elapsed();
                if !inconclusive {
                    // The box refutes every counter-example: sound drop
                    // without touching the solver.
                    dropped_by_box[i] = true;
                    metrics.irrelevant_by_box += 1;
                    continue;
                }
            }

            match self.solver.solve_milp(&probe)? {
                MilpOutcome::Infeasible => {
                    metrics.irrelevant_by_solver += 1;
                }
                MilpOutcome::Feasible(_) => {
                    fixtures[i] = probe.add(saved);
                    relevant[i] = true;
                }
            }
        }

        Ok(Explication {
            relevant,
            dropped_by_box,
        })
    }

    /// Explicate every row of a dataset, accumulating wall-clock into the
    /// with-box or without-box bucket.
    pub fn explain_all(
        &self,
        dataset: &Dataset,
        predictions: &[usize],
        metrics: &mut Metrics,
    ) -> Result<Vec<Explication>, ExplicationError> {
        if dataset.num_features() != self.network.input_size() {
            return Err(ExplicationError::InvalidInput {
                expected: self.network.input_size(),
                actual: dataset.num_features(),
            });
        }
        if predictions.len() != dataset.len() {
            return Err(ExplicationError::InvalidInput {
                expected: dataset.len(),
                actual: predictions.len(),
            });
        }

        let mut explications = Vec::with_capacity(dataset.len());
        for (row, &predicted) in dataset.rows().iter().zip(predictions) {
            let start = Instant::now();
            let explication = self.explain(row, predicted, metrics)?;
            let elapsed = start.elapsed();
            if self.config.use_box {
                metrics.accumulated_time_with_box += elapsed;
            } else {
                metrics.accumulated_time_without_box += elapsed;
            }

            if self.config.log_explications {
                let names = dataset.feature_names();
                info!(?row, predicted, "explicated input");
                info!(
                    relevant = ?named(names, &explication.relevant_indices()),
                    irrelevant = ?named(names, &explication.irrelevant_indices()),
                    "explanation"
                );
                if self.config.use_box {
                    info!(
                        by_box = ?named(names, &explication.box_indices()),
                        by_solver = ?named(names, &explication.solver_indices()),
                        "irrelevance attribution"
                    );
                }
            }
            explications.push(explication);
        }
        Ok(explications)
    }

    /// Disagreement block: binaries `q_m` for every non-predicted class,
    /// `sum q >= 1`, and for each `m` a big-M row that activates
    /// `o_m - o_c >= epsilon` exactly when `q_m = 1`.
    fn add_disagreement(&self, probe: &mut Model, predicted: usize) {
        let epsilon = self.config.epsilon;
        let o = self.base.output_vars();
        let bounds = self.base.output_bounds();
        let c = o[predicted];
        let (c_lo, c_hi) = (bounds[predicted].lo, bounds[predicted].hi);

        let mut gate_sum = LinExpr::new();
        for (m, (&o_m, m_bounds)) in o.iter().zip(bounds).enumerate() {
            if m == predicted {
                continue;
            }
            let q = probe.binary(format!("q_{m}"));
            gate_sum.add(q, 1.0);
            // q = 1 must force o_m - o_c >= epsilon; q = 0 must leave the
            // row slack for every reachable output pair, which needs
            // big_m >= epsilon + U_c - L_m.
            let big_m = (m_bounds.hi - c_lo).max(epsilon + c_hi - m_bounds.lo);
            probe.add(Constraint::ge(
                LinExpr::term(o_m, 1.0).with(c, -1.0).with(q, -big_m),
                epsilon - big_m,
            ));
        }
        probe.add(Constraint::ge(gate_sum, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::interval::Interval;
    use crate::network::{Activation, Layer};
    use crate::simplex::{SimplexConfig, SimplexSolver};

    /// o0 = x0, o1 = -x0; x1 never matters.
    fn sign_network() -> Network {
        Network::new(vec![
            Layer::new(
                vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
                vec![0.0, 0.0],
                Activation::Relu,
            )
            .unwrap(),
            Layer::new(
                vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
                vec![0.0, 0.0],
                Activation::Linear,
            )
            .unwrap(),
        ])
        .unwrap()
    }

    /// o0 = x0 + x1, o1 = -(x0 + x1).
    fn sum_network() -> Network {
        Network::new(vec![
            Layer::new(
                vec![vec![1.0, 1.0], vec![-1.0, -1.0]],
                vec![0.0, 0.0],
                Activation::Relu,
            )
            .unwrap(),
            Layer::new(
                vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
                vec![0.0, 0.0],
                Activation::Linear,
            )
            .unwrap(),
        ])
        .unwrap()
    }

    /// o0 = relu(x0 + x1), o1 = 0.8: both features feed one duplicated
    /// column, the second class is a plain threshold.
    fn threshold_network() -> Network {
        Network::new(vec![
            Layer::new(vec![vec![1.0, 1.0]], vec![0.0], Activation::Relu).unwrap(),
            Layer::new(
                vec![vec![1.0], vec![0.0]],
                vec![0.0, 0.8],
                Activation::Linear,
            )
            .unwrap(),
        ])
        .unwrap()
    }

    fn unit_domains() -> FeatureDomains {
        FeatureDomains::new(vec![
            Interval::new(-1.0, 1.0),
            Interval::new(-1.0, 1.0),
        ])
    }

    struct Fixture {
        network: Network,
        domains: FeatureDomains,
        base: EncodedNetwork,
        solver: SimplexSolver,
    }

    impl Fixture {
        fn build(network: Network, domains: FeatureDomains) -> Self {
            let solver = SimplexSolver::default();
            let mut metrics = Metrics::new();
            let base = encode(&network, &domains, &solver, &mut metrics).unwrap();
            Self {
                network,
                domains,
                base,
                solver,
            }
        }

        fn engine(&self, config: ExplicationConfig) -> ExplicationEngine<'_, SimplexSolver> {
            ExplicationEngine::new(&self.network, &self.base, &self.domains, &self.solver, config)
                .unwrap()
        }
    }

    fn with_box() -> ExplicationConfig {
        ExplicationConfig::default()
    }

    fn without_box() -> ExplicationConfig {
        ExplicationConfig {
            use_box: false,
            ..ExplicationConfig::default()
        }
    }

    #[test]
    fn test_tautological_feature_dropped_by_box() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        let explication = engine.explain(&[0.5, 0.3], 0, &mut metrics).unwrap();
        assert_eq!(explication.relevant, vec![true, false]);
        assert_eq!(explication.dropped_by_box, vec![false, true]);
        assert_eq!(metrics.irrelevant_by_box, 1);
        assert_eq!(metrics.irrelevant_by_solver, 0);
    }

    #[test]
    fn test_tautological_feature_dropped_by_solver_without_box() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let engine = fixture.engine(without_box());
        let mut metrics = Metrics::new();

        let explication = engine.explain(&[0.5, 0.3], 0, &mut metrics).unwrap();
        assert_eq!(explication.relevant, vec![true, false]);
        assert_eq!(explication.dropped_by_box, vec![false, false]);
        assert_eq!(metrics.irrelevant_by_box, 0);
        assert_eq!(metrics.irrelevant_by_solver, 1);
    }

    #[test]
    fn test_box_and_solver_agree() {
        // Box drops are sound: disabling the box must not change the mask.
        let fixture = Fixture::build(sign_network(), unit_domains());
        let mut metrics = Metrics::new();

        let boxed = fixture
            .engine(with_box())
            .explain(&[0.5, 0.3], 0, &mut metrics)
            .unwrap();
        let exact = fixture
            .engine(without_box())
            .explain(&[0.5, 0.3], 0, &mut metrics)
            .unwrap();
        assert_eq!(boxed.relevant, exact.relevant);
    }

    #[test]
    fn test_all_features_relevant_near_boundary() {
        let fixture = Fixture::build(sum_network(), unit_domains());
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        let explication = engine.explain(&[0.3, 0.2], 0, &mut metrics).unwrap();
        assert_eq!(explication.relevant, vec![true, true]);

        // Minimality: freeing either feature alone admits a counter-example.
        assert_eq!(fixture.network.predict(&[-1.0, 0.2]).unwrap(), 1);
        assert_eq!(fixture.network.predict(&[0.3, -1.0]).unwrap(), 1);
    }

    #[test]
    fn test_sufficiency_of_returned_mask() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        let explication = engine.explain(&[0.5, 0.3], 0, &mut metrics).unwrap();
        assert_eq!(explication.relevant_indices(), vec![0]);

        // Sweep the freed feature across its whole domain: the prediction
        // may never move.
        let mut x1 = -1.0;
        while x1 <= 1.0 {
            assert_eq!(fixture.network.predict(&[0.5, x1]).unwrap(), 0);
            x1 += 0.05;
        }
    }

    #[test]
    fn test_order_dependence_keeps_first_duplicate() {
        let domains = FeatureDomains::new(vec![
            Interval::new(0.0, 1.0),
            Interval::new(0.0, 1.0),
        ]);
        let fixture = Fixture::build(threshold_network(), domains);
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        // x0 = 0.9 clears the 0.8 threshold on its own; x1 = 0.6 does not.
        // Freeing x0 first admits a counter-example, so the first duplicate
        // stays fixed and the second is dropped.
        let explication = engine.explain(&[0.9, 0.6], 0, &mut metrics).unwrap();
        assert_eq!(explication.relevant, vec![true, false]);
    }

    #[test]
    fn test_metric_accounting_over_batch() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        let dataset = Dataset::new(
            vec!["x0".into(), "x1".into()],
            vec![vec![0.5, 0.3], vec![-0.4, 0.9], vec![0.8, -0.2]],
        )
        .unwrap();
        let predictions: Vec<usize> = dataset
            .rows()
            .iter()
            .map(|row| fixture.network.predict(row).unwrap())
            .collect();

        let explications = engine
            .explain_all(&dataset, &predictions, &mut metrics)
            .unwrap();

        let total_dropped: u64 = explications
            .iter()
            .map(|e| e.irrelevant_indices().len() as u64)
            .sum();
        assert_eq!(total_dropped, 3);
        assert_eq!(
            metrics.irrelevant_by_box + metrics.irrelevant_by_solver,
            total_dropped
        );
        assert!(metrics.accumulated_time_with_box > std::time::Duration::ZERO);
    }

    #[test]
    fn test_cloning_isolation_across_inputs() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let engine = fixture.engine(with_box());

        let a = [0.5, 0.3];
        let b = [-0.6, 0.1];

        let mut metrics = Metrics::new();
        let first_a = engine.explain(&a, 0, &mut metrics).unwrap();
        let first_b = engine.explain(&b, 1, &mut metrics).unwrap();

        let mut metrics = Metrics::new();
        let second_b = engine.explain(&b, 1, &mut metrics).unwrap();
        let second_a = engine.explain(&a, 0, &mut metrics).unwrap();

        assert_eq!(first_a, second_a);
        assert_eq!(first_b, second_b);
    }

    #[test]
    fn test_idempotence() {
        let fixture = Fixture::build(sum_network(), unit_domains());
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        let first = engine.explain(&[0.3, 0.2], 0, &mut metrics).unwrap();
        let second = engine.explain(&[0.3, 0.2], 0, &mut metrics).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_solver_failure_aborts_explication() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let crippled = SimplexSolver::new(SimplexConfig {
            max_nodes: 0,
            ..SimplexConfig::default()
        });
        let engine = ExplicationEngine::new(
            &fixture.network,
            &fixture.base,
            &fixture.domains,
            &crippled,
            without_box(),
        )
        .unwrap();

        let mut metrics = Metrics::new();
        let result = engine.explain(&[0.5, 0.3], 0, &mut metrics);
        assert!(matches!(result, Err(ExplicationError::Solver(_))));
    }

    #[test]
    fn test_input_validation() {
        let fixture = Fixture::build(sign_network(), unit_domains());
        let engine = fixture.engine(with_box());
        let mut metrics = Metrics::new();

        assert!(matches!(
            engine.explain(&[0.5], 0, &mut metrics),
            Err(ExplicationError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.explain(&[0.5, 0.3], 7, &mut metrics),
            Err(ExplicationError::ClassOutOfRange { .. })
        ));
    }
}
