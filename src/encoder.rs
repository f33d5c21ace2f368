//! MILP encoding of the network with LP-tightened neuron bounds.
//!
//! Builds the reusable base model once per network/domain pair. Each hidden
//! neuron gets a continuous pre-activation `y`, a continuous post-activation
//! `a` and a binary gate `z`, linked by the big-M ReLU encoding. The big-M
//! values are the neuron's own pre-activation bounds `[L, U]`, computed by
//! minimizing and maximizing the affine expression over the LP relaxation of
//! the model built so far; interval bounds are the fallback when an LP solve
//! misbehaves. Bounds for layer `k` are always known before layer `k`'s
//! constraints are emitted, which is what keeps the big-M values tight.

use crate::interval::{affine_bounds, FeatureDomains, Interval};
use crate::metrics::Metrics;
use crate::milp::{Constraint, Goal, LinExpr, LpOutcome, Model, Solver, VarId};
use crate::network::{Activation, Network};
use crate::types::ExplicationError;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Slack added to every tightened bound so a vertex sitting exactly on a
/// true bound stays feasible under LP round-off.
const BOUND_SLACK: f64 = 1e-6;

/// The base MILP model plus the variable handles the engine needs.
///
/// Read-only after encoding: explications clone the model and mutate only
/// their own copy.
#[derive(Debug, Clone)]
pub struct EncodedNetwork {
    model: Model,
    input_vars: Vec<VarId>,
    output_vars: Vec<VarId>,
    output_bounds: Vec<Interval>,
}

impl EncodedNetwork {
    /// The base model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Input variable handles, in feature column order.
    pub fn input_vars(&self) -> &[VarId] {
        &self.input_vars
    }

    /// Output variable handles, in class order.
    pub fn output_vars(&self) -> &[VarId] {
        &self.output_vars
    }

    /// LP-tightened output bounds, used as big-M values by the
    /// disagreement constraints.
    pub fn output_bounds(&self) -> &[Interval] {
        &self.output_bounds
    }
}

/// Encode a network over its feature domains into the base MILP model.
///
/// Counts variables and constraints into `metrics`, including the rows a
/// probe adds per input (input equalities and the disagreement block),
/// which are counted once here since every probe replicates them.
pub fn encode<S: Solver>(
    network: &Network,
    domains: &FeatureDomains,
    solver: &S,
    metrics: &mut Metrics,
) -> Result<EncodedNetwork, ExplicationError> {
    if domains.len() != network.input_size() {
        return Err(ExplicationError::InvalidInput {
            expected: network.input_size(),
            actual: domains.len(),
        });
    }

    info!(
        inputs = network.input_size(),
        outputs = network.output_size(),
        layers = network.layers().len(),
        "building base MILP model"
    );
    let start = Instant::now();

    let mut model = Model::new("base");
    let mut input_vars = Vec::with_capacity(domains.len());
    for (i, domain) in domains.intervals().iter().enumerate() {
        input_vars.push(model.continuous(format!("x_{i}"), domain.lo, domain.hi));
    }
    metrics.continuous_vars += domains.len() as u64;

    let mut prev_vars = input_vars.clone();
    let mut prev_box: Vec<Interval> = domains.intervals().to_vec();
    let mut output_vars = Vec::new();
    let mut output_bounds = Vec::new();

    let last_index = network.layers().len() - 1;
    for (layer_index, layer) in network.layers().iter().enumerate() {
        let pre_box = affine_bounds(layer, &prev_box);
        let mut next_vars = Vec::with_capacity(layer.output_size());
        let mut next_box = Vec::with_capacity(layer.output_size());

        for (j, (row, bias)) in layer.weights.iter().zip(&layer.biases).enumerate() {
            let mut expr = LinExpr::new().offset(*bias);
            for (var, weight) in prev_vars.iter().zip(row) {
                if *weight != 0.0 {
                    expr.add(*var, *weight);
                }
            }
            let tight = tighten(&model, solver, &expr, pre_box[j], layer_index, j);

            if layer_index == last_index {
                // Output layer: one equality per class, bounds recorded for
                // the disagreement big-M.
                let o = model.continuous(
                    format!("o_{j}"),
                    tight.lo - BOUND_SLACK,
                    tight.hi + BOUND_SLACK,
                );
                model.add(Constraint::eq(expr.with(o, -1.0), 0.0));
                metrics.continuous_vars += 1;
                metrics.constraints += 1;
                output_vars.push(o);
                output_bounds.push(tight);
                continue;
            }

            let (lo, hi) = (tight.lo - BOUND_SLACK, tight.hi + BOUND_SLACK);
            let y = model.continuous(format!("y_{layer_index}_{j}"), lo, hi);
            model.add(Constraint::eq(expr.with(y, -1.0), 0.0));
            metrics.constraints += 1;

            let a = match layer.activation {
                Activation::Linear => {
                    // Pass-through hidden layer: the gate is pinned open.
                    let a = model.continuous(format!("a_{layer_index}_{j}"), lo, hi);
                    let z = model.binary(format!("z_{layer_index}_{j}"));
                    model.set_bounds(z, 1.0, 1.0);
                    model.add(Constraint::eq(LinExpr::term(a, 1.0).with(y, -1.0), 0.0));
                    metrics.constraints += 1;
                    next_box.push(tight);
                    a
                }
                Activation::Relu => {
                    let a = model.continuous(
                        format!("a_{layer_index}_{j}"),
                        0.0,
                        tight.hi.max(0.0) + BOUND_SLACK,
                    );
                    let z = model.binary(format!("z_{layer_index}_{j}"));
                    if tight.lo >= 0.0 {
                        // Always active: a = y, gate fixed open.
                        model.set_bounds(z, 1.0, 1.0);
                        model.add(Constraint::eq(LinExpr::term(a, 1.0).with(y, -1.0), 0.0));
                        metrics.constraints += 1;
                    } else if tight.hi <= 0.0 {
                        // Always inactive: a = 0, gate fixed closed.
                        model.set_bounds(z, 0.0, 0.0);
                        model.add(Constraint::eq(LinExpr::term(a, 1.0), 0.0));
                        metrics.constraints += 1;
                    } else {
                        // Mixed: the big-M encoding proper.
                        //   a >= y
                        //   a <= y - L (1 - z)
                        //   a <= U z
                        // with a >= 0 carried by the variable's lower bound.
                        model.add(Constraint::ge(
                            LinExpr::term(a, 1.0).with(y, -1.0),
                            0.0,
                        ));
                        model.add(Constraint::le(
                            LinExpr::term(a, 1.0).with(y, -1.0).with(z, -lo),
                            -lo,
                        ));
                        model.add(Constraint::le(
                            LinExpr::term(a, 1.0).with(z, -hi),
                            0.0,
                        ));
                        metrics.constraints += 3;
                    }
                    next_box.push(tight.relu());
                    a
                }
            };
            metrics.continuous_vars += 2;
            metrics.binary_vars += 1;
            next_vars.push(a);
        }

        if layer_index != last_index {
            prev_vars = next_vars;
            prev_box = next_box;
        }
    }

    // Probe-side rows, counted once: one equality per input feature, the
    // disagreement binaries and their rows, and the gate sum.
    let classes = network.output_size() as u64;
    metrics.constraints += domains.len() as u64;
    metrics.binary_vars += classes - 1;
    metrics.constraints += classes;

    info!(
        continuous_vars = metrics.continuous_vars,
        binary_vars = metrics.binary_vars,
        constraints = metrics.constraints,
        elapsed_s = start.elapsed().as_secs_f64(),
        "base MILP model built"
    );

    Ok(EncodedNetwork {
        model,
        input_vars,
        output_vars,
        output_bounds,
    })
}

/// Tight pre-activation bounds for one neuron: LP min/max over the relaxed
/// partial model, clamped into the interval bounds, with the interval as a
/// fallback when a solve misbehaves.
fn tighten<S: Solver>(
    model: &Model,
    solver: &S,
    expr: &LinExpr,
    fallback: Interval,
    layer_index: usize,
    neuron: usize,
) -> Interval {
    let lo = match solver.solve_lp(model, expr, Goal::Minimize) {
        Ok(LpOutcome::Optimal { objective, .. }) => objective.max(fallback.lo),
        outcome => {
            warn!(
                layer = layer_index,
                neuron,
                ?outcome,
                "lower bound LP failed, falling back to interval bound"
            );
            fallback.lo
        }
    };
    let hi = match solver.solve_lp(model, expr, Goal::Maximize) {
        Ok(LpOutcome::Optimal { objective, .. }) => objective.min(fallback.hi),
        outcome => {
            warn!(
                layer = layer_index,
                neuron,
                ?outcome,
                "upper bound LP failed, falling back to interval bound"
            );
            fallback.hi
        }
    };
    if lo > hi {
        // Tightening crossed under round-off; the interval is always sound.
        debug!(layer = layer_index, neuron, "crossed bounds, using interval");
        return fallback;
    }
    debug!(
        layer = layer_index,
        neuron,
        lo,
        hi,
        box_lo = fallback.lo,
        box_hi = fallback.hi,
        "tightened neuron bounds"
    );
    Interval::new(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp::MilpOutcome;
    use crate::network::Layer;
    use crate::simplex::SimplexSolver;
    use approx::assert_relative_eq;

    fn sign_network() -> Network {
        // h0 = relu(x0), h1 = relu(-x0); o0 = h0 - h1 = x0, o1 = -x0.
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

    fn unit_domains() -> FeatureDomains {
        FeatureDomains::new(vec![
            Interval::new(-1.0, 1.0),
            Interval::new(-1.0, 1.0),
        ])
    }

    #[test]
    fn test_encoding_size() {
        let network = sign_network();
        let solver = SimplexSolver::default();
        let mut metrics = Metrics::new();
        let encoded = encode(&network, &unit_domains(), &solver, &mut metrics).unwrap();

        assert_eq!(encoded.input_vars().len(), 2);
        assert_eq!(encoded.output_vars().len(), 2);
        // 2 inputs + (y, a) per hidden neuron + 2 outputs
        assert_eq!(metrics.continuous_vars, 2 + 4 + 2);
        // one gate per hidden neuron + one q per non-predicted class
        assert_eq!(metrics.binary_vars, 2 + 1);
    }

    #[test]
    fn test_tightened_bounds_match_reachable_range() {
        let network = sign_network();
        let solver = SimplexSolver::default();
        let mut metrics = Metrics::new();
        let encoded = encode(&network, &unit_domains(), &solver, &mut metrics).unwrap();

        // o0 = x0 over x0 in [-1, 1]
        let bounds = encoded.output_bounds();
        assert_relative_eq!(bounds[0].lo, -1.0, epsilon = 1e-5);
        assert_relative_eq!(bounds[0].hi, 1.0, epsilon = 1e-5);
        assert_relative_eq!(bounds[1].lo, -1.0, epsilon = 1e-5);
        assert_relative_eq!(bounds[1].hi, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_stable_neuron_gates_are_fixed() {
        // With x0 in [0.5, 1.0], relu(x0) is always active and relu(-x0)
        // always inactive, so both gates should be pinned by their bounds.
        let network = sign_network();
        let domains = FeatureDomains::new(vec![
            Interval::new(0.5, 1.0),
            Interval::new(-1.0, 1.0),
        ]);
        let solver = SimplexSolver::default();
        let mut metrics = Metrics::new();
        let encoded = encode(&network, &domains, &solver, &mut metrics).unwrap();

        let model = encoded.model();
        let fixed: Vec<(f64, f64)> = (0..model.num_vars())
            .map(|i| model.bounds(VarId(i)))
            .filter(|(lo, hi)| lo == hi)
            .collect();
        assert!(fixed.contains(&(1.0, 1.0)));
        assert!(fixed.contains(&(0.0, 0.0)));
    }

    /// Encoding exactness: with every input pinned by an equality, the only
    /// feasible assignment reproduces the forward pass at the outputs.
    #[test]
    fn test_encoding_reproduces_forward_pass() {
        let network = sign_network();
        let solver = SimplexSolver::default();
        let mut metrics = Metrics::new();
        let encoded = encode(&network, &unit_domains(), &solver, &mut metrics).unwrap();

        for x in [[0.5, 0.3], [-0.7, 0.1], [0.0, -0.9], [0.25, 0.25]] {
            let mut probe = encoded.model().clone();
            for (var, value) in encoded.input_vars().iter().zip(&x) {
                probe.add(Constraint::eq(LinExpr::term(*var, 1.0), *value));
            }
            let forward = network.forward(&x).unwrap();
            match solver.solve_milp(&probe).unwrap() {
                MilpOutcome::Feasible(values) => {
                    for (var, expected) in encoded.output_vars().iter().zip(&forward) {
                        assert_relative_eq!(values[var.0], *expected, epsilon = 1e-6);
                    }
                }
                MilpOutcome::Infeasible => panic!("pinned probe must be feasible"),
            }
        }
    }

    #[test]
    fn test_domain_width_checked() {
        let network = sign_network();
        let solver = SimplexSolver::default();
        let mut metrics = Metrics::new();
        let narrow = FeatureDomains::new(vec![Interval::new(0.0, 1.0)]);
        assert!(matches!(
            encode(&network, &narrow, &solver, &mut metrics),
            Err(ExplicationError::InvalidInput { expected: 2, actual: 1 })
        ));
    }
}
