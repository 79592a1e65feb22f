use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod activations;
pub mod configs;
pub mod error;
pub mod graph;
pub mod node;
pub mod random;
pub mod serialize;

pub use activations::{Activation, ActivationFunction};
pub use configs::{InitRange, NetworkConfig, TrainParams};
pub use error::NodeError;
pub use graph::{Network, NetworkDocument};
pub use node::{Neuron, NodeId, NodeRole, TopologyIndex};
pub use serialize::NeuronDocument;

pub trait Config: Send + Sync {
    fn config(&self) -> Result<String>;
    fn load_config(&mut self, config: &str) -> Result<()>;
}

impl<T: Serialize + DeserializeOwned + Send + Sync> Config for T {
    fn config(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).context("Failed to write config")
    }
    fn load_config(&mut self, config: &str) -> Result<()> {
        *self = ron::from_str(config).context(format!("Failed to load config {}", config))?;
        Ok(())
    }
}
