use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};
use crate::node::{Neuron, NodeRole};

/// Persistent state of one neuron. Transient values (net, activation, delta)
/// and the edges themselves are not part of it; the owning graph stores the
/// topology separately and rebuilds it before importing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename = "Neuron")]
pub struct NeuronDocument {
    #[serde(rename = "Input")]
    pub input: bool,
    #[serde(rename = "Output")]
    pub output: bool,
    #[serde(rename = "Bias")]
    pub bias: f64,
    #[serde(rename = "PreviousDelta")]
    pub previous_delta: f64,
    #[serde(rename = "Weights", default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<IndexedWeight>>,
    #[serde(rename = "PreviousWeights", default, skip_serializing_if = "Option::is_none")]
    pub previous_weights: Option<Vec<IndexedWeight>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename = "Weight")]
pub struct IndexedWeight {
    #[serde(rename = "Index")]
    pub index: usize,
    #[serde(rename = "Value")]
    pub value: f64,
}

impl NeuronDocument {
    pub fn role(&self) -> Result<NodeRole> {
        match (self.input, self.output) {
            (true, true) => Err(NodeError::Deserialization("neuron marked as both input and output".into())),
            (true, false) => Ok(NodeRole::Input),
            (false, true) => Ok(NodeRole::Output),
            (false, false) => Ok(NodeRole::Standard),
        }
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }
}

fn indexed(values: &[f64]) -> Vec<IndexedWeight> {
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| IndexedWeight { index, value })
        .collect()
}

/// Put the entries back in edge order. Every index in 0..len must appear once.
fn ordered(name: &str, entries: Option<&Vec<IndexedWeight>>) -> Result<Vec<f64>> {
    let entries = entries.ok_or_else(|| NodeError::Deserialization(format!("missing {name}")))?;
    let mut values = vec![None; entries.len()];
    for e in entries {
        let slot = values
            .get_mut(e.index)
            .ok_or_else(|| NodeError::Deserialization(format!("{name}: index {} out of range", e.index)))?;
        if slot.replace(e.value).is_some() {
            return Err(NodeError::Deserialization(format!("{name}: duplicate index {}", e.index)));
        }
    }
    // with no duplicates and nothing out of range every slot is filled
    Ok(values.into_iter().flatten().collect())
}

impl Neuron {
    pub fn export(&self) -> NeuronDocument {
        let (weights, previous_weights) = if self.is_input() {
            (None, None)
        } else {
            (Some(indexed(self.weights())), Some(indexed(self.prev_weights())))
        };
        NeuronDocument {
            input: self.is_input(),
            output: self.is_output(),
            bias: self.bias(),
            previous_delta: self.prev_delta(),
            weights,
            previous_weights,
        }
    }

    /// Overwrite role, bias, previous delta and both weight arrays from `doc`.
    /// Fails without touching the node if the document is inconsistent or its
    /// weight count differs from the current edge count.
    pub fn import(&mut self, doc: &NeuronDocument) -> Result<()> {
        let role = doc.role()?;
        let (weights, prev_weights) = if role == NodeRole::Input {
            (Vec::new(), Vec::new())
        } else {
            (
                ordered("Weights", doc.weights.as_ref())?,
                ordered("PreviousWeights", doc.previous_weights.as_ref())?,
            )
        };

        for (what, found) in [("weights", weights.len()), ("previous weights", prev_weights.len())] {
            if found != self.edges.len() {
                return Err(NodeError::IndexMismatch {
                    node: self.id,
                    what,
                    expected: self.edges.len(),
                    found,
                });
            }
        }

        self.role = role;
        self.bias = doc.bias;
        self.prev_delta = doc.previous_delta;
        self.weights = weights;
        self.prev_weights = prev_weights;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::NodeId;

    fn trained() -> Neuron {
        let mut n = Neuron::new(NodeId(4), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);
        n.set_weights(&[0.4, -0.25, 1.5]).unwrap();
        n.set_bias(0.6);
        n.prev_delta = -0.031;
        n.prev_weights = vec![0.39, -0.2, 1.45];
        n
    }

    #[test]
    fn round_trip_through_ron() {
        let n = trained();
        let text = n.export().to_ron().unwrap();
        let doc = NeuronDocument::from_ron(&text).unwrap();

        let mut fresh = Neuron::new(NodeId(4), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);
        fresh.import(&doc).unwrap();
        assert_eq!(fresh.bias(), n.bias());
        assert_eq!(fresh.prev_delta(), n.prev_delta());
        assert_eq!(fresh.weights(), n.weights());
        assert_eq!(fresh.prev_weights(), n.prev_weights());
        assert_eq!(fresh.role(), NodeRole::Output);
    }

    #[test]
    fn input_document_has_no_weights() {
        let mut n = Neuron::input(NodeId(0));
        n.set_bias(0.2);
        let doc = n.export();
        assert!(doc.input && !doc.output);
        assert!(doc.weights.is_none());
        let text = doc.to_ron().unwrap();
        assert!(!text.contains("Weights"));

        let mut fresh = Neuron::input(NodeId(0));
        fresh.import(&NeuronDocument::from_ron(&text).unwrap()).unwrap();
        assert_eq!(fresh.bias(), 0.2);
    }

    #[test]
    fn weights_are_reordered_by_index() {
        let mut doc = trained().export();
        doc.weights.as_mut().unwrap().reverse();
        let mut fresh = Neuron::new(NodeId(4), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);
        fresh.import(&doc).unwrap();
        assert_eq!(fresh.weights(), &[0.4, -0.25, 1.5]);
    }

    #[test]
    fn missing_fields_fail_fast() {
        let text = "(Input: false, Output: true, PreviousDelta: 0.0)";
        assert!(matches!(NeuronDocument::from_ron(text), Err(NodeError::Deserialization(_))));

        let mut doc = trained().export();
        doc.previous_weights = None;
        let mut fresh = Neuron::new(NodeId(4), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);
        let before = fresh.weights().to_vec();
        assert!(matches!(fresh.import(&doc), Err(NodeError::Deserialization(_))));
        assert_eq!(fresh.weights(), &before[..]);
    }

    #[test]
    fn import_keeps_transient_state() {
        use crate::activations::{Activation, Linear};
        use crate::configs::TrainParams;

        let p = TrainParams {
            activation: Activation::Linear(Linear::default()),
            momentum: 0.0,
            learning_rate: 0.5,
        };
        let mut out = Neuron::new(NodeId(5), NodeRole::Output, &[NodeId(4)]);
        out.set_weights(&[2.0]).unwrap();
        out.on_signal(NodeId(4), 1.0, &p.activation).unwrap();
        out.assign_delta(&p, 0.0, None, false).unwrap();

        let mut hidden = Neuron::new(NodeId(4), NodeRole::Standard, &[NodeId(1)]);
        hidden.set_weights(&[0.5]).unwrap();
        hidden.on_signal(NodeId(1), 3.0, &p.activation).unwrap();
        hidden.assign_delta(&p, 0.0, Some(&[&out][..]), false).unwrap();
        assert_eq!(hidden.delta(), -4.0);
        assert_eq!(hidden.topology().cached(NodeId(5)), Some(0));
        let edges = hidden.edges().to_vec();

        let doc = NeuronDocument {
            input: false,
            output: false,
            bias: 9.0,
            previous_delta: 0.7,
            weights: Some(vec![IndexedWeight { index: 0, value: 0.25 }]),
            previous_weights: Some(vec![IndexedWeight { index: 0, value: 0.2 }]),
        };
        hidden.import(&doc).unwrap();

        assert_eq!(hidden.bias(), 9.0);
        assert_eq!(hidden.prev_delta(), 0.7);
        assert_eq!(hidden.weights(), &[0.25]);
        assert_eq!(hidden.prev_weights(), &[0.2]);

        assert_eq!(hidden.delta(), -4.0);
        assert_eq!(hidden.activation(), 1.5);
        assert_eq!(hidden.net(), 1.5);
        assert_eq!(hidden.edges(), &edges[..]);
        assert_eq!(hidden.topology().cached(NodeId(5)), Some(0));
    }

    #[test]
    fn inconsistent_documents_are_rejected() {
        let mut fresh = Neuron::new(NodeId(4), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);

        let mut doc = trained().export();
        doc.input = true;
        assert!(matches!(fresh.import(&doc), Err(NodeError::Deserialization(_))));

        let mut doc = trained().export();
        doc.weights.as_mut().unwrap()[1].index = 0;
        assert!(matches!(fresh.import(&doc), Err(NodeError::Deserialization(_))));

        let mut doc = trained().export();
        doc.weights.as_mut().unwrap()[2].index = 7;
        assert!(matches!(fresh.import(&doc), Err(NodeError::Deserialization(_))));

        let mut two = Neuron::new(NodeId(4), NodeRole::Output, &[NodeId(1), NodeId(2)]);
        assert!(matches!(two.import(&trained().export()), Err(NodeError::IndexMismatch { .. })));
    }
}
