use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::activations::ActivationFunction;
use crate::configs::{InitRange, TrainParams};
use crate::error::{NodeError, Result};
use crate::node::{IdGenerator, Neuron, NodeId, NodeRole, Signal};
use crate::random::RandomSource;

pub mod document;
mod worker;

pub use document::{NetworkDocument, NodeEntry};

/// Read only view of a node for anything that wants to display the network
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub role: NodeRole,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub activation: f64,
    pub delta: f64,
}

/// Owns every node of one feed-forward network. Edges only hold ids, all
/// lookups go through here, and so does every completion signal: a fired node
/// hands its signal back to the arena, which delivers it to the subscribers.
#[derive(Debug, Clone)]
pub struct Network {
    nodes: BTreeMap<NodeId, Neuron>,
    subscribers: BTreeMap<NodeId, Vec<NodeId>>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    ids: IdGenerator,
    params: TrainParams,
}

impl Network {
    pub fn new(params: TrainParams) -> Self {
        Network {
            nodes: BTreeMap::new(),
            subscribers: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ids: IdGenerator::new(),
            params,
        }
    }

    /// Fully connected network, `layers[0]` input nodes up to `layers[last]` output nodes
    pub fn layered(layers: &[usize], params: TrainParams) -> Result<Self> {
        if layers.len() < 2 {
            return Err(NodeError::CountMismatch { expected: 2, found: layers.len() });
        }
        let mut net = Network::new(params);
        let mut prev: Vec<NodeId> = Vec::new();
        for (depth, &width) in layers.iter().enumerate() {
            let role = if depth == 0 {
                NodeRole::Input
            } else if depth == layers.len() - 1 {
                NodeRole::Output
            } else {
                NodeRole::Standard
            };
            let mut layer = Vec::with_capacity(width);
            for _ in 0..width {
                layer.push(net.add_node(role, &prev)?);
            }
            prev = layer;
        }
        debug!("built layered network {:?} with {} nodes", layers, net.len());
        Ok(net)
    }

    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut TrainParams {
        &mut self.params
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Neuron> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Neuron> {
        self.nodes.values()
    }

    pub fn input_ids(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn output_ids(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.subscribers.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Neuron> {
        self.nodes.get_mut(&id).ok_or(NodeError::UnknownNode(id))
    }

    pub fn add_node(&mut self, role: NodeRole, predecessors: &[NodeId]) -> Result<NodeId> {
        let id = self.ids.next_id();
        self.insert_node(id, role, predecessors)?;
        Ok(id)
    }

    /// Insert under a caller chosen id, used when restoring a saved network
    pub(crate) fn insert_node(&mut self, id: NodeId, role: NodeRole, predecessors: &[NodeId]) -> Result<()> {
        if let Some(&missing) = predecessors.iter().find(|p| !self.nodes.contains_key(*p)) {
            return Err(NodeError::UnknownNode(missing));
        }
        if self.nodes.contains_key(&id) {
            return Err(NodeError::Deserialization(format!("duplicate node id {id}")));
        }
        if role == NodeRole::Input && !predecessors.is_empty() {
            return Err(NodeError::CountMismatch { expected: 0, found: predecessors.len() });
        }
        self.ids.reserve(id);

        let neuron = Neuron::new(id, role, predecessors);
        for p in neuron.predecessors() {
            self.subscribers.entry(p).or_default().push(id);
        }
        self.nodes.insert(id, neuron);
        match role {
            NodeRole::Input => self.inputs.push(id),
            NodeRole::Output => self.outputs.push(id),
            NodeRole::Standard => {}
        }
        Ok(())
    }

    /// Every node whose cached slot into `dst` may have moved
    fn invalidate_slots_into(&mut self, dst: NodeId, extra: Option<NodeId>) {
        let mut stale: Vec<NodeId> = self
            .nodes
            .get(&dst)
            .map(|n| n.predecessors().collect())
            .unwrap_or_default();
        stale.extend(extra);
        for p in stale {
            if let Some(n) = self.nodes.get_mut(&p) {
                n.topology_mut().invalidate(dst);
            }
        }
    }

    /// Whether `to` can be reached from `from` along existing edges
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                stack.extend_from_slice(self.successors(id));
            }
        }
        false
    }

    /// Add an edge `src -> dst`, false if it already existed or `dst` is an
    /// input node. An edge that would close a loop fails with `Cycle`.
    pub fn connect(&mut self, src: NodeId, dst: NodeId, weight: f64) -> Result<bool> {
        if !self.nodes.contains_key(&src) {
            return Err(NodeError::UnknownNode(src));
        }
        if !self.nodes.contains_key(&dst) {
            return Err(NodeError::UnknownNode(dst));
        }
        if self.reaches(dst, src) {
            warn!("refusing edge {src} -> {dst}, it would close a cycle");
            return Err(NodeError::Cycle(dst));
        }
        if !self.get_mut(dst)?.subscribe(src, weight) {
            return Ok(false);
        }
        self.subscribers.entry(src).or_default().push(dst);
        self.invalidate_slots_into(dst, None);
        Ok(true)
    }

    /// Remove the edge `src -> dst`, false if there was none
    pub fn disconnect(&mut self, src: NodeId, dst: NodeId) -> Result<bool> {
        if !self.get_mut(dst)?.unsubscribe(src) {
            return Ok(false);
        }
        if let Some(subs) = self.subscribers.get_mut(&src) {
            subs.retain(|&s| s != dst);
        }
        self.invalidate_slots_into(dst, Some(src));
        Ok(true)
    }

    /// Drop a node together with the edges it feeds and the subscriptions it
    /// holds on its predecessors
    pub fn remove_node(&mut self, id: NodeId) -> Result<Neuron> {
        if !self.nodes.contains_key(&id) {
            return Err(NodeError::UnknownNode(id));
        }
        for succ in self.successors(id).to_vec() {
            self.disconnect(id, succ)?;
        }
        let neuron = self.nodes.remove(&id).ok_or(NodeError::UnknownNode(id))?;
        for p in neuron.predecessors() {
            if let Some(subs) = self.subscribers.get_mut(&p) {
                subs.retain(|&s| s != id);
            }
            if let Some(n) = self.nodes.get_mut(&p) {
                n.topology_mut().invalidate(id);
            }
        }
        self.subscribers.remove(&id);
        self.inputs.retain(|&i| i != id);
        self.outputs.retain(|&o| o != id);
        Ok(neuron)
    }

    pub fn set_weights(&mut self, id: NodeId, weights: &[f64]) -> Result<()> {
        self.get_mut(id)?.set_weights(weights)
    }

    pub fn set_bias(&mut self, id: NodeId, bias: f64) -> Result<()> {
        self.get_mut(id)?.set_bias(bias);
        Ok(())
    }

    /// Initialize every weight and bias, before any forward pass
    pub fn randomize(&mut self, source: &mut dyn RandomSource, range: InitRange) {
        for n in self.nodes.values_mut() {
            n.randomize(source, range);
        }
    }

    /// Reset the join state and fire the nodes that do not wait on anything:
    /// every input with its raw value, and non-input nodes without edges.
    fn begin_round(&mut self, inputs: &[f64]) -> Result<Vec<Signal>> {
        if inputs.len() != self.inputs.len() {
            return Err(NodeError::CountMismatch {
                expected: self.inputs.len(),
                found: inputs.len(),
            });
        }
        for n in self.nodes.values_mut() {
            n.clear_collected();
        }

        let mut fired = Vec::with_capacity(inputs.len());
        for (&id, &raw) in self.inputs.iter().zip(inputs.iter()) {
            let n = self.nodes.get_mut(&id).ok_or(NodeError::UnknownNode(id))?;
            n.set_input(raw);
            fired.push(n.activate(&self.params.activation));
        }
        for n in self.nodes.values_mut() {
            if !n.is_input() && n.edges().is_empty() {
                fired.push(n.activate(&self.params.activation));
            }
        }
        Ok(fired)
    }

    /// Deliver signals until nothing fires anymore
    fn drain(&mut self, mut queue: VecDeque<Signal>) {
        let f: &dyn ActivationFunction = &self.params.activation;
        while let Some(signal) = queue.pop_front() {
            trace!("delivering {:.6} from {}", signal.value, signal.source);
            for succ in self.subscribers.get(&signal.source).into_iter().flatten() {
                if let Some(n) = self.nodes.get_mut(succ) {
                    if let Some(next) = n.on_signal(signal.source, signal.value, f) {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    /// Non-input nodes without edges that some successor is still waiting on.
    /// They fire on their bias alone.
    fn fire_edgeless_due(&mut self) -> Vec<Signal> {
        let due: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| !n.is_input() && n.edges().is_empty())
            .map(Neuron::id)
            .filter(|&id| {
                self.successors(id).iter().any(|s| {
                    self.nodes
                        .get(s)
                        .and_then(|n| n.edges().iter().find(|e| e.source == id))
                        .map_or(false, |e| !e.collected)
                })
            })
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for id in due {
            if let Some(n) = self.nodes.get_mut(&id) {
                fired.push(n.activate(&self.params.activation));
            }
        }
        fired
    }

    /// Feed a single input node. The signal cascades as far as the joins
    /// downstream allow before this returns. Edgeless nodes are fired
    /// alongside whenever a successor has not collected them yet in the
    /// current round.
    pub fn stimulate(&mut self, id: NodeId, raw: f64) -> Result<()> {
        match self.nodes.get(&id) {
            None => return Err(NodeError::UnknownNode(id)),
            Some(n) if !n.is_input() => return Err(NodeError::InvalidState(id)),
            Some(_) => {}
        }
        let mut queue: VecDeque<Signal> = self.fire_edgeless_due().into();
        let n = self.nodes.get_mut(&id).ok_or(NodeError::UnknownNode(id))?;
        n.set_input(raw);
        let signal = n.activate(&self.params.activation);
        queue.push_back(signal);
        self.drain(queue);
        Ok(())
    }

    /// Run one complete forward pass and return the output activations
    pub fn forward(&mut self, inputs: &[f64]) -> Result<Vec<f64>> {
        let seeds = self.begin_round(inputs)?;
        self.drain(seeds.into());
        Ok(self.output_values())
    }

    pub fn output_values(&self) -> Vec<f64> {
        self.outputs
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(Neuron::activation)
            .collect()
    }

    /// Nodes ordered so every predecessor comes before its successors
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut pending: BTreeMap<NodeId, usize> = self.nodes.iter().map(|(&id, n)| (id, n.edges().len())).collect();
        let mut ready: VecDeque<NodeId> = pending.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &succ in self.successors(id) {
                if let Some(d) = pending.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(succ);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = pending.into_iter().find(|(_, d)| *d > 0).map(|(id, _)| id);
            return Err(NodeError::Cycle(stuck.unwrap_or(NodeId(0))));
        }
        Ok(order)
    }

    /// Assign deltas and update weights, output nodes first and then
    /// backwards so every downstream delta is current when it is read.
    /// Input nodes take part too: they have no weights, but their bias and
    /// previous delta move like everyone else's.
    pub fn backward(&mut self, expected: &[f64]) -> Result<()> {
        if expected.len() != self.outputs.len() {
            return Err(NodeError::CountMismatch {
                expected: self.outputs.len(),
                found: expected.len(),
            });
        }
        let targets: BTreeMap<NodeId, f64> = self.outputs.iter().copied().zip(expected.iter().copied()).collect();

        for id in self.topological_order()?.into_iter().rev() {
            let mut node = self.nodes.remove(&id).ok_or(NodeError::UnknownNode(id))?;
            let result = if let Some(&target) = targets.get(&id) {
                node.assign_delta(&self.params, target, None, true)
            } else {
                let downstream: Vec<&Neuron> = self.successors(id).iter().filter_map(|s| self.nodes.get(s)).collect();
                node.assign_delta(&self.params, 0.0, Some(downstream.as_slice()), true)
            };
            self.nodes.insert(id, node);
            result?;
        }
        Ok(())
    }

    /// Forward, backward, and the squared error measured before the update
    pub fn train_sample(&mut self, inputs: &[f64], expected: &[f64]) -> Result<f64> {
        let outputs = self.forward(inputs)?;
        let error = squared_error(&outputs, expected);
        self.backward(expected)?;
        Ok(error)
    }

    /// Train for `epochs` passes over `samples`, returning the summed error of each epoch
    pub fn train(&mut self, samples: &[(Vec<f64>, Vec<f64>)], epochs: usize) -> Result<Vec<f64>> {
        let mut history = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let mut total = 0.0;
            for (x, y) in samples {
                total += self.train_sample(x, y)?;
            }
            debug!("epoch {epoch}: error {total:.6}");
            history.push(total);
        }
        if let Some(last) = history.last() {
            info!("trained {epochs} epochs on {} samples, final error {last:.6}", samples.len());
        }
        Ok(history)
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .values()
            .map(|n| NodeSnapshot {
                id: n.id(),
                role: n.role(),
                weights: n.weights().to_vec(),
                bias: n.bias(),
                activation: n.activation(),
                delta: n.delta(),
            })
            .collect()
    }
}

/// Half the sum of squared differences
pub fn squared_error(outputs: &[f64], expected: &[f64]) -> f64 {
    outputs
        .iter()
        .zip(expected.iter())
        .map(|(o, t)| (t - o).powi(2))
        .sum::<f64>()
        / 2.0
}
