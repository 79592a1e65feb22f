use serde::{Deserialize, Serialize};

use crate::activations::Activation;

/// Everything a forward and backward step needs besides the nodes themselves,
/// passed by reference into each call
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TrainParams {
    pub activation: Activation,
    pub momentum: f64,
    pub learning_rate: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            activation: Activation::default(),
            momentum: 0.0,
            learning_rate: 0.5,
        }
    }
}

/// Interval initial weights and biases are drawn from
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct InitRange {
    pub low: f64,
    pub high: f64,
}

impl InitRange {
    /// Map `u` from [0, 1) onto the range
    pub fn sample(&self, u: f64) -> f64 {
        self.low + u * (self.high - self.low)
    }
}

impl Default for InitRange {
    fn default() -> Self {
        InitRange { low: -1.0, high: 1.0 }
    }
}

/// Setup for the command line trainer: a fully connected network of `layers`,
/// first entry is the input width and the last the output width
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct NetworkConfig {
    pub layers: Vec<usize>,
    pub train: TrainParams,
    pub init: InitRange,
    pub seed: u64,
    pub epochs: usize,
    /// worker threads for the forward pass, 0 keeps everything on the caller's thread
    pub workers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            layers: vec![2, 2, 2],
            train: TrainParams::default(),
            init: InitRange::default(),
            seed: 42,
            epochs: 1000,
            workers: 0,
        }
    }
}
