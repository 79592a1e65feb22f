#[macro_use]
extern crate bencher;

use bencher::Bencher;

use nodenet_lib::{random, InitRange, Network, TrainParams};

fn network() -> Network {
    let mut net = Network::layered(&[16, 64, 64, 8], TrainParams::default()).unwrap();
    net.randomize(&mut random::seeded(0), InitRange::default());
    net
}

fn bench_forward(bench: &mut Bencher) {
    let mut net = network();
    let x: Vec<f64> = (0..16).map(|i| i as f64 / 16.0).collect();
    bench.iter(|| net.forward(&x).unwrap());
}

fn bench_forward_workers(bench: &mut Bencher) {
    let mut net = network();
    let x: Vec<f64> = (0..16).map(|i| i as f64 / 16.0).collect();
    bench.iter(|| net.forward_parallel(&x, 4).unwrap());
}

fn bench_train_step(bench: &mut Bencher) {
    let mut net = network();
    let x: Vec<f64> = (0..16).map(|i| i as f64 / 16.0).collect();
    let y = vec![0.5; 8];
    bench.iter(|| net.train_sample(&x, &y).unwrap());
}

benchmark_group!(benches, bench_forward, bench_forward_workers, bench_train_step);
benchmark_main!(benches);
