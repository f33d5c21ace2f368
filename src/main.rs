//! Explication Engine - Command Line Interface
//!
//! # Usage
//!
//! ```bash
//! explicate --demo
//! explicate network.json dataset.json
//! explicate --no-box network.json dataset.json
//! explicate --runs 5 network.json dataset.json
//! ```

use explication_engine::{
    encode, Activation, Dataset, ExplicationConfig, ExplicationEngine, Layer, Metrics, Network,
    SimplexSolver,
};
use rand::Rng;
use std::env;
use std::fs;
use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    match parse_args(&args) {
        Mode::Demo => run_demo(),
        Mode::Run {
            network_path,
            dataset_path,
            use_box,
            runs,
        } => run_files(&network_path, &dataset_path, use_box, runs),
        Mode::Help => print_help(),
        Mode::Version => print_version(),
    }
}

#[derive(Debug)]
enum Mode {
    Demo,
    Run {
        network_path: String,
        dataset_path: String,
        use_box: bool,
        runs: usize,
    },
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Mode {
    let mut use_box = true;
    let mut runs = 1usize;
    let mut paths: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Mode::Help,
            "--version" | "-v" => return Mode::Version,
            "--demo" => return Mode::Demo,
            "--no-box" => use_box = false,
            "--runs" => {
                i += 1;
                runs = match args.get(i).and_then(|v| v.parse().ok()) {
                    Some(n) if n > 0 => n,
                    _ => {
                        eprintln!("Error: --runs requires a positive integer");
                        process::exit(1);
                    }
                };
            }
            other => paths.push(other.to_string()),
        }
        i += 1;
    }

    match paths.len() {
        0 => Mode::Help,
        2 => Mode::Run {
            network_path: paths[0].clone(),
            dataset_path: paths[1].clone(),
            use_box,
            runs,
        },
        _ => {
            eprintln!("Error: expected a network file and a dataset file");
            process::exit(1);
        }
    }
}

/// Explicate every dataset row against a network loaded from JSON.
fn run_files(network_path: &str, dataset_path: &str, use_box: bool, runs: usize) {
    let network = match fs::read_to_string(network_path)
        .map_err(|e| e.to_string())
        .and_then(|json| Network::from_json(&json).map_err(|e| e.to_string()))
    {
        Ok(network) => network,
        Err(err) => {
            eprintln!("Error loading network from {network_path}: {err}");
            process::exit(1);
        }
    };
    let dataset = match fs::read_to_string(dataset_path)
        .map_err(|e| e.to_string())
        .and_then(|json| Dataset::from_json(&json).map_err(|e| e.to_string()))
    {
        Ok(dataset) => dataset,
        Err(err) => {
            eprintln!("Error loading dataset from {dataset_path}: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = explicate(&network, &dataset, &[use_box], runs) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn explicate(
    network: &Network,
    dataset: &Dataset,
    modes: &[bool],
    runs: usize,
) -> Result<(), String> {
    let domains = dataset.feature_domains().map_err(|e| e.to_string())?;
    let predictions: Vec<usize> = dataset
        .rows()
        .iter()
        .map(|row| network.predict(row))
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    let solver = SimplexSolver::default();
    let mut metrics = Metrics::new();
    let base = encode(network, &domains, &solver, &mut metrics).map_err(|e| e.to_string())?;

    for &use_box in modes {
        let config = ExplicationConfig {
            use_box,
            log_explications: true,
            ..ExplicationConfig::default()
        };
        let engine = ExplicationEngine::new(network, &base, &domains, &solver, config)
            .map_err(|e| e.to_string())?;
        for _ in 0..runs {
            engine
                .explain_all(dataset, &predictions, &mut metrics)
                .map_err(|e| e.to_string())?;
        }
    }
    metrics.summarize(runs, dataset.len()).report();
    Ok(())
}

/// A bundled two-feature problem, explicated with and without the box so
/// the report can compare the two.
fn run_demo() {
    let network = demo_network();
    let dataset = demo_dataset();

    println!("Explication Engine - demo");
    println!("Network: 2 features -> 2 hidden -> 2 classes");
    println!("Dataset: {} rows\n", dataset.len());

    if let Err(err) = explicate(&network, &dataset, &[true, false], 1) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn demo_network() -> Network {
    // h0 = relu(x0 + 0.5 x1), h1 = relu(-x0 + 0.3 x1)
    // o0 = h0 - h1, o1 = h1 - h0
    let layers = vec![
        Layer {
            weights: vec![vec![1.0, 0.5], vec![-1.0, 0.3]],
            biases: vec![0.0, 0.0],
            activation: Activation::Relu,
        },
        Layer {
            weights: vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
            biases: vec![0.0, 0.0],
            activation: Activation::Linear,
        },
    ];
    match Network::new(layers) {
        Ok(network) => network,
        Err(err) => {
            eprintln!("Error building demo network: {err}");
            process::exit(1);
        }
    }
}

fn demo_dataset() -> Dataset {
    // Corner rows pin the feature domains to [-1, 1]; the rest is sampled.
    let mut rows = vec![vec![-1.0, -1.0], vec![1.0, 1.0], vec![0.6, -0.2]];
    let mut rng = rand::thread_rng();
    for _ in 0..5 {
        rows.push(vec![rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)]);
    }
    match Dataset::new(vec!["x0".into(), "x1".into()], rows) {
        Ok(dataset) => dataset,
        Err(err) => {
            eprintln!("Error building demo dataset: {err}");
            process::exit(1);
        }
    }
}

fn print_help() {
    println!("Explication Engine v{}", explication_engine::VERSION);
    println!();
    println!("Computes minimal sufficient explanations for the predictions of a");
    println!("feed-forward ReLU classifier, certified with a MILP encoding.");
    println!();
    println!("USAGE:");
    println!("    explicate [OPTIONS] <NETWORK.json> <DATASET.json>");
    println!("    explicate --demo");
    println!();
    println!("OPTIONS:");
    println!("    --demo              Run the bundled demo problem");
    println!("    --no-box            Skip the interval pre-filter");
    println!("    --runs <N>          Repeat the whole input set N times");
    println!("    -h, --help          Print help information");
    println!("    -v, --version       Print version information");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG            Log filter (default: info)");
}

fn print_version() {
    println!("explicate {}", explication_engine::VERSION);
}
