//! Basic usage of the explication engine
//!
//! Run with: cargo run --example basic_usage

use explication_engine::{
    encode, network::softmax, Activation, ExplicationConfig, ExplicationEngine, FeatureDomains,
    Interval, Layer, Metrics, Network, SimplexSolver,
};

fn main() {
    println!("Explication Engine - Basic Usage Example\n");

    // A tiny classifier: class 0 iff x0 + 0.5 * x1 outweighs its negation.
    let network = Network::new(vec![
        Layer {
            weights: vec![vec![1.0, 0.5], vec![-1.0, -0.5]],
            biases: vec![0.0, 0.0],
            activation: Activation::Relu,
        },
        Layer {
            weights: vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
            biases: vec![0.0, 0.0],
            activation: Activation::Linear,
        },
    ])
    .expect("demo network is well formed");

    let domains = FeatureDomains::new(vec![Interval::new(-1.0, 1.0), Interval::new(-1.0, 1.0)]);

    // Build the base MILP model once.
    let solver = SimplexSolver::default();
    let mut metrics = Metrics::new();
    let base = encode(&network, &domains, &solver, &mut metrics).expect("encoding succeeds");
    println!(
        "Base model: {} continuous vars, {} binary vars, {} constraints",
        metrics.continuous_vars, metrics.binary_vars, metrics.constraints
    );

    // Explicate one input.
    let x = [0.8, -0.1];
    let logits = network.forward(&x).expect("input matches the network");
    let predicted = explication_engine::network::argmax(&logits);
    let confidence = softmax(&logits)[predicted];
    println!(
        "\nInput {:?} -> class {} (confidence {:.3})",
        x, predicted, confidence
    );

    let engine = ExplicationEngine::new(
        &network,
        &base,
        &domains,
        &solver,
        ExplicationConfig::default(),
    )
    .expect("engine shapes agree");

    let explication = engine
        .explain(&x, predicted, &mut metrics)
        .expect("explication succeeds");

    println!("Relevant features:   {:?}", explication.relevant_indices());
    println!("Irrelevant features: {:?}", explication.irrelevant_indices());
    println!("  settled by box:    {:?}", explication.box_indices());
    println!("  settled by solver: {:?}", explication.solver_indices());
}
