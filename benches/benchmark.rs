use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use galaxy::{compute_accelerations, Gravity, Octree, PlummerSampler, Simulation};

fn tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree build");
    for n in [100, 1_000, 10_000] {
        let particles = PlummerSampler::new(1., 1., Some(0)).generate(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &particles, |b, particles| {
            b.iter(|| Octree::build(particles).unwrap())
        });
    }
}

fn accelerations(c: &mut Criterion) {
    let particles = PlummerSampler::new(1., 1., Some(0)).generate(1_000);
    let tree = Octree::build(&particles).unwrap();

    let mut group = c.benchmark_group("accelerations");
    for theta in [0., 0.5, 1.] {
        group.bench_with_input(BenchmarkId::from_parameter(theta), &theta, |b, &theta| {
            let gravity = Gravity::new(1., theta, 0.01);
            b.iter(|| compute_accelerations(&tree, &particles, gravity))
        });
    }
}

fn steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");
    for n in [100, 1_000] {
        let particles = PlummerSampler::new(1., 1., Some(0)).generate(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &particles, |b, particles| {
            b.iter_batched_ref(
                || Simulation::new(particles.clone(), Gravity::new(1., 0.5, 0.01)),
                |simulation| simulation.simulate(0.001, 10).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }
}

criterion_group!(benches, tree_build, accelerations, steps);
criterion_main!(benches);
