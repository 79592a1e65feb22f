use itertools::izip;
use log::debug;

use super::{Neuron, NodeRole};
use crate::activations::ActivationFunction;
use crate::configs::TrainParams;
use crate::error::{NodeError, Result};

impl Neuron {
    /// Compute this node's delta and, with `auto_adjust`, apply the weight
    /// update straight away.
    ///
    /// Without `downstream` the node must be an output node and the error is
    /// taken against `expected`. With it, the error is gathered from every
    /// downstream node through the weight of the edge this node feeds. Those
    /// nodes must already hold their delta for this round, so callers go from
    /// the output layer backwards.
    pub fn assign_delta(
        &mut self,
        params: &TrainParams,
        expected: f64,
        downstream: Option<&[&Neuron]>,
        auto_adjust: bool,
    ) -> Result<f64> {
        let base = params.activation.derivative(self.net);

        let delta = match downstream {
            None => {
                if self.role != NodeRole::Output {
                    return Err(NodeError::InvalidState(self.id));
                }
                base * (expected - self.activation)
            }
            Some(downstream) => {
                let mut sum = 0.0;
                for d in downstream {
                    let slot = self.topology.slot_in(self.id, d)?;
                    sum += d.weights[slot] * d.delta;
                }
                base * sum
            }
        };
        // a failed call leaves the momentum carrier alone
        self.prev_delta = self.delta;
        self.delta = delta;
        debug!("{} {} delta={:.6}", self.role, self.id, self.delta);

        if auto_adjust {
            self.adjust_values(params);
        }
        Ok(self.delta)
    }

    /// Momentum update of weights and bias from the current delta. The bias
    /// moves for input nodes as well even though `activate` never reads it.
    pub fn adjust_values(&mut self, params: &TrainParams) {
        let carried = params.momentum * self.prev_delta;
        let step = params.learning_rate * self.delta;

        for (w, prev, edge) in izip!(self.weights.iter_mut(), self.prev_weights.iter_mut(), self.edges.iter()) {
            *prev = *w;
            *w += carried + step * edge.value;
        }
        self.bias += carried + step;
    }
}
