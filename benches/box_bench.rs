use criterion::{black_box, criterion_group, criterion_main, Criterion};
use explication_engine::interval::{box_has_solution, propagate, relax_to_domains};
use explication_engine::{Activation, FeatureDomains, Interval, Layer, Network};

/// Deterministic dense network with pseudo-random weights.
fn build_network(input: usize, hidden: &[usize], output: usize) -> Network {
    let mut sizes = vec![input];
    sizes.extend_from_slice(hidden);
    sizes.push(output);

    let mut seed = 42u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) as f64 / (1u64 << 31) as f64) - 1.0
    };

    let layers: Vec<Layer> = (0..sizes.len() - 1)
        .map(|i| {
            let last = i == sizes.len() - 2;
            Layer {
                weights: (0..sizes[i + 1])
                    .map(|_| (0..sizes[i]).map(|_| next()).collect())
                    .collect(),
                biases: vec![0.0; sizes[i + 1]],
                activation: if last { Activation::Linear } else { Activation::Relu },
            }
        })
        .collect();
    Network::new(layers).expect("bench network is well formed")
}

fn unit_domains(n: usize) -> FeatureDomains {
    FeatureDomains::new(vec![Interval::new(-1.0, 1.0); n])
}

fn bench_propagate_small(c: &mut Criterion) {
    c.bench_function("box_propagate_small", |b| {
        let network = build_network(4, &[8], 3);
        let bounds = vec![Interval::new(-1.0, 1.0); 4];
        b.iter(|| propagate(&network, black_box(&bounds)));
    });
}

fn bench_propagate_deep(c: &mut Criterion) {
    c.bench_function("box_propagate_deep", |b| {
        let network = build_network(16, &[32, 32, 16], 5);
        let bounds = vec![Interval::new(-1.0, 1.0); 16];
        b.iter(|| propagate(&network, black_box(&bounds)));
    });
}

fn bench_box_has_solution(c: &mut Criterion) {
    c.bench_function("box_has_solution", |b| {
        let network = build_network(8, &[16], 3);
        let domains = unit_domains(8);
        let x = vec![0.25; 8];
        let relax = vec![true, false, true, false, true, false, true, false];
        b.iter(|| {
            let bounds = relax_to_domains(black_box(&x), &domains, &relax);
            box_has_solution(&bounds, &network, 0)
        });
    });
}

criterion_group!(
    benches,
    bench_propagate_small,
    bench_propagate_deep,
    bench_box_has_solution
);
criterion_main!(benches);
