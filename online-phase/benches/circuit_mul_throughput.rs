//! Benchmarks for multiplication throughput over a chain of dependent
//! multiplications and over a batch of independent ones

use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spdz_mpc::{
    algebra::Scalar,
    numeric::Numeric,
    test_helpers::{execute_mock_mpc, test_modulus},
    PARTY1,
};
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

/// The number of parties in each benchmarked computation
const N_PARTIES: usize = 2;

/// Build the runtime the parties run on
fn runtime() -> Runtime {
    RuntimeBuilder::new_multi_thread().worker_threads(3).enable_all().build().unwrap()
}

/// Measure the time for each party to evaluate `circuit_size`
/// multiplications, either chained or independent
async fn time_circuit(circuit_size: usize, independent: bool) -> Duration {
    let elapsed = execute_mock_mpc(N_PARTIES, test_modulus(), move |mut fabric| async move {
        let me = fabric.party_id();
        let start_time = Instant::now();
        let res = fabric
            .run(move |b| {
                let m = b.modulus();
                let x = b.input((me == PARTY1).then(|| Scalar::from_u64(3, &m)), PARTY1);
                let prod = if independent {
                    let prods = b.par(move |b| {
                        (0..circuit_size).map(|_| b.mult(&x, &x)).collect::<Vec<_>>()
                    });
                    b.gate(move |_| {
                        let shares = prods.get();
                        Ok(shares[0].clone())
                    })
                } else {
                    (0..circuit_size).fold(x.clone(), |acc, _| b.mult(&acc, &x))
                };
                b.open(&prod)
            })
            .await;

        black_box(res.unwrap());
        start_time.elapsed()
    })
    .await;

    // The slowest party bounds the computation
    elapsed.into_iter().max().unwrap_or_default()
}

/// Measure the throughput of a chain of dependent multiplications
pub fn bench_mul_chain(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("mul-chain");
    for circuit_size in [10, 100, 1000].into_iter() {
        group.throughput(Throughput::Elements(circuit_size as u64));
        group.bench_function(BenchmarkId::from_parameter(circuit_size), |b| {
            b.to_async(&runtime).iter_custom(|n_iters| async move {
                let mut total_time = Duration::from_millis(0);
                for _ in 0..n_iters {
                    total_time += time_circuit(circuit_size, false /* independent */).await;
                }

                total_time
            })
        });
    }
}

/// Measure the throughput of independent multiplications sharing rounds
pub fn bench_mul_batch(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("mul-batch");
    for circuit_size in [10, 100, 1000, 10000].into_iter() {
        group.throughput(Throughput::Elements(circuit_size as u64));
        group.bench_function(BenchmarkId::from_parameter(circuit_size), |b| {
            b.to_async(&runtime).iter_custom(|n_iters| async move {
                let mut total_time = Duration::from_millis(0);
                for _ in 0..n_iters {
                    total_time += time_circuit(circuit_size, true /* independent */).await;
                }

                total_time
            })
        });
    }
}

criterion_group!(
    name = mul_throughput;
    config = Criterion::default().sample_size(10);
    targets = bench_mul_chain, bench_mul_batch
);
criterion_main!(mul_throughput);
