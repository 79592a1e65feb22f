use std::fmt;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::activations::ActivationFunction;
use crate::configs::InitRange;
use crate::error::{NodeError, Result};
use crate::random::RandomSource;

mod backprop;
pub mod topology;

pub use topology::TopologyIndex;

/// Identity of a node inside one arena, never reused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out ids for a single arena, so two networks in one process
/// never share a counter
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// Makes sure an externally chosen id (eg. a restored one) is never handed out again
    pub fn reserve(&mut self, id: NodeId) {
        self.next = self.next.max(id.0 + 1);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
pub enum NodeRole {
    Input,
    Standard,
    Output,
}

/// One weighted input slot, fed by a single predecessor
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub source: NodeId,
    pub value: f64,
    pub collected: bool,
}

impl Edge {
    fn new(source: NodeId) -> Self {
        Edge { source, value: 0.0, collected: false }
    }
}

/// Completion signal a node emits after it fires. `net` carries the raw input
/// for input nodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Signal {
    pub source: NodeId,
    pub value: f64,
    pub net: f64,
}

/// A single unit of the network. `edges`, `weights` and `prev_weights` are
/// parallel arrays and are only ever resized together.
#[derive(Clone, Debug)]
pub struct Neuron {
    pub(crate) id: NodeId,
    pub(crate) role: NodeRole,
    pub(crate) edges: Vec<Edge>,
    pub(crate) weights: Vec<f64>,
    pub(crate) prev_weights: Vec<f64>,
    pub(crate) bias: f64,
    net: f64,
    activation: f64,
    delta: f64,
    pub(crate) prev_delta: f64,
    raw_input: f64,
    topology: TopologyIndex,
}

impl Neuron {
    pub fn new(id: NodeId, role: NodeRole, predecessors: &[NodeId]) -> Neuron {
        let mut neuron = Neuron {
            id,
            role,
            edges: Vec::with_capacity(predecessors.len()),
            weights: Vec::with_capacity(predecessors.len()),
            prev_weights: Vec::with_capacity(predecessors.len()),
            bias: 0.0,
            net: 0.0,
            activation: 0.0,
            delta: 0.0,
            prev_delta: 0.0,
            raw_input: 0.0,
            topology: TopologyIndex::default(),
        };
        for &p in predecessors {
            neuron.subscribe(p, 0.0);
        }
        neuron
    }

    pub fn input(id: NodeId) -> Neuron {
        Neuron::new(id, NodeRole::Input, &[])
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_input(&self) -> bool {
        self.role == NodeRole::Input
    }

    pub fn is_output(&self) -> bool {
        self.role == NodeRole::Output
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn predecessors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.iter().map(|e| e.source)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn prev_weights(&self) -> &[f64] {
        &self.prev_weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    pub fn threshold(&self) -> f64 {
        -self.bias
    }

    pub fn net(&self) -> f64 {
        self.net
    }

    pub fn activation(&self) -> f64 {
        self.activation
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn prev_delta(&self) -> f64 {
        self.prev_delta
    }

    pub fn raw_input(&self) -> f64 {
        self.raw_input
    }

    pub fn topology(&self) -> &TopologyIndex {
        &self.topology
    }

    pub(crate) fn topology_mut(&mut self) -> &mut TopologyIndex {
        &mut self.topology
    }

    /// Slot this node's edge from `source` occupies, if connected
    pub fn slot_of(&self, source: NodeId) -> Option<usize> {
        self.edges.iter().position(|e| e.source == source)
    }

    pub fn set_input(&mut self, raw: f64) {
        if !self.is_input() {
            warn!("raw input {raw} given to {} node {}, ignored by activate", self.role, self.id);
        }
        self.raw_input = raw;
    }

    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.edges.len() {
            return Err(NodeError::IndexMismatch {
                node: self.id,
                what: "weights",
                expected: self.edges.len(),
                found: weights.len(),
            });
        }
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    pub fn check_alignment(&self) -> Result<()> {
        let expected = self.edges.len();
        for (what, found) in [("weights", self.weights.len()), ("previous weights", self.prev_weights.len())] {
            if found != expected {
                return Err(NodeError::IndexMismatch { node: self.id, what, expected, found });
            }
        }
        Ok(())
    }

    /// Draws every weight and the bias from `range`
    pub fn randomize(&mut self, source: &mut dyn RandomSource, range: InitRange) {
        for w in self.weights.iter_mut() {
            *w = range.sample(source.next_double());
        }
        self.bias = range.sample(source.next_double());
    }

    /// Recompute net and activation from the collected edge values and
    /// produce the completion signal. Input nodes pass their raw input
    /// through untouched, `f` is not applied to them.
    pub fn activate(&mut self, f: &dyn ActivationFunction) -> Signal {
        if self.is_input() {
            self.net = self.raw_input;
            self.activation = self.net;
        } else {
            let mut net = self.bias;
            for (edge, w) in self.edges.iter_mut().zip(self.weights.iter()) {
                net += w * edge.value;
                edge.collected = false;
            }
            self.net = net;
            self.activation = f.activate(net);
        }
        debug!("{} {} fired: net={:.6} activation={:.6}", self.role, self.id, self.net, self.activation);
        Signal {
            source: self.id,
            value: self.activation,
            net: self.net,
        }
    }

    /// Forget any values collected in an unfinished round
    pub fn clear_collected(&mut self) {
        for e in self.edges.iter_mut() {
            e.collected = false;
        }
    }

    /// Record the value from `source`. When this completes the round, the
    /// node fires and its completion signal is returned.
    pub fn on_signal(&mut self, source: NodeId, value: f64, f: &dyn ActivationFunction) -> Option<Signal> {
        let Some(edge) = self.edges.iter_mut().find(|e| e.source == source) else {
            warn!("{} received a signal from non-predecessor {}", self.id, source);
            return None;
        };
        edge.value = value;
        edge.collected = true;
        trace!("{} collected {:.6} from {}", self.id, value, source);

        if self.edges.iter().all(|e| e.collected) {
            Some(self.activate(f))
        } else {
            None
        }
    }

    /// Add an edge from `source`. Duplicates, self loops and edges into input
    /// nodes are ignored and reported with `false`.
    pub fn subscribe(&mut self, source: NodeId, weight: f64) -> bool {
        if self.is_input() {
            warn!("input node {} cannot subscribe to {}", self.id, source);
            return false;
        }
        if source == self.id {
            warn!("{} cannot subscribe to itself", self.id);
            return false;
        }
        if self.slot_of(source).is_some() {
            warn!("{} is already subscribed to {}", self.id, source);
            return false;
        }
        self.edges.push(Edge::new(source));
        self.weights.push(weight);
        self.prev_weights.push(weight);
        true
    }

    /// Remove the edge from `source`, keeping the order of every other edge
    pub fn unsubscribe(&mut self, source: NodeId) -> bool {
        let Some(slot) = self.slot_of(source) else {
            return false;
        };
        self.edges.remove(slot);
        self.weights.remove(slot);
        self.prev_weights.remove(slot);
        true
    }
}
