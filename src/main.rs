use std::{env, fs};

use anyhow::{Context, Result};
use log::info;

use nodenet_lib::{random, Config, Network, NetworkConfig};

/// usage: nodenet [config.ron] [network-out.ron]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let mut cfg = NetworkConfig::default();
    if let Some(path) = args.next() {
        let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {path}"))?;
        cfg.load_config(&text)?;
        info!("loaded config from {path}");
    }

    let mut net = Network::layered(&cfg.layers, cfg.train.clone())?;
    net.randomize(&mut random::seeded(cfg.seed), cfg.init);

    let (inputs, targets) = sample(&cfg.layers);
    for epoch in 0..cfg.epochs {
        let outputs = net.forward_parallel(&inputs, cfg.workers)?;
        let error = nodenet_lib::graph::squared_error(&outputs, &targets);
        net.backward(&targets)?;
        if epoch % 100 == 0 {
            info!("epoch {epoch}: error {error:.8}");
        }
    }

    let outputs = net.forward_parallel(&inputs, cfg.workers)?;
    info!(
        "after {} epochs: outputs {:?}, error {:.8}",
        cfg.epochs,
        outputs,
        nodenet_lib::graph::squared_error(&outputs, &targets)
    );

    if let Some(path) = args.next() {
        fs::write(&path, net.save()?).with_context(|| format!("Failed to write {path}"))?;
        info!("saved network to {path}");
    }
    Ok(())
}

/// The classic 2-2-2 sample, stretched to the configured widths
fn sample(layers: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let width = |i: usize| layers.get(i).copied().unwrap_or(0);
    let inputs = [0.05, 0.10].iter().copied().cycle().take(width(0)).collect();
    let targets = [0.01, 0.99].iter().copied().cycle().take(width(layers.len().saturating_sub(1))).collect();
    (inputs, targets)
}
