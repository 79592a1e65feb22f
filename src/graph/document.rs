use log::debug;
use serde::{Deserialize, Serialize};

use super::Network;
use crate::configs::TrainParams;
use crate::error::{NodeError, Result};
use crate::node::NodeId;
use crate::serialize::NeuronDocument;

/// One node of a saved network. `predecessors` is in edge order, which is
/// the order the indexed weights of `neuron` refer to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeEntry {
    pub id: NodeId,
    pub predecessors: Vec<NodeId>,
    pub neuron: NeuronDocument,
}

/// A whole network: training parameters, the port order of inputs and
/// outputs, and every node listed after all of its predecessors.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NetworkDocument {
    pub params: TrainParams,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    pub nodes: Vec<NodeEntry>,
}

impl NetworkDocument {
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }
}

/// `ports` must name exactly the nodes collected in `found`, in any order
fn check_ports(what: &str, ports: &[NodeId], found: &[NodeId]) -> Result<()> {
    let mut a = ports.to_vec();
    let mut b = found.to_vec();
    a.sort();
    b.sort();
    if a != b {
        return Err(NodeError::Deserialization(format!(
            "{what} {ports:?} do not match the nodes marked as {what}"
        )));
    }
    Ok(())
}

impl Network {
    pub fn to_document(&self) -> Result<NetworkDocument> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for id in self.topological_order()? {
            let n = self.nodes.get(&id).ok_or(NodeError::UnknownNode(id))?;
            nodes.push(NodeEntry {
                id,
                predecessors: n.predecessors().collect(),
                neuron: n.export(),
            });
        }
        Ok(NetworkDocument {
            params: self.params.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            nodes,
        })
    }

    /// Rebuild a network. Nodes keep their ids, and ids handed out afterwards
    /// continue past the largest restored one.
    pub fn from_document(doc: &NetworkDocument) -> Result<Network> {
        let mut net = Network::new(doc.params.clone());
        for entry in &doc.nodes {
            let role = entry.neuron.role()?;
            net.insert_node(entry.id, role, &entry.predecessors)?;
            net.get_mut(entry.id)?.import(&entry.neuron)?;
        }

        check_ports("inputs", &doc.inputs, &net.inputs)?;
        check_ports("outputs", &doc.outputs, &net.outputs)?;
        net.inputs = doc.inputs.clone();
        net.outputs = doc.outputs.clone();
        debug!("restored network with {} nodes", net.len());
        Ok(net)
    }

    pub fn save(&self) -> Result<String> {
        self.to_document()?.to_ron()
    }

    pub fn load(text: &str) -> Result<Network> {
        Network::from_document(&NetworkDocument::from_ron(text)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::activations::{Activation, ActivationFunction, Sigmoid};
    use crate::configs::InitRange;
    use crate::node::NodeRole;
    use crate::random;

    fn trained() -> Network {
        let params = TrainParams {
            activation: Activation::Sigmoid(Sigmoid::default()),
            momentum: 0.4,
            learning_rate: 0.5,
        };
        let mut net = Network::layered(&[3, 4, 2], params).unwrap();
        net.randomize(&mut random::seeded(5), InitRange::default());
        let samples = vec![(vec![0.1, 0.9, 0.3], vec![0.2, 0.8])];
        net.train(&samples, 10).unwrap();
        net
    }

    #[test]
    fn restored_network_reproduces_outputs() {
        let mut net = trained();
        let text = net.save().unwrap();
        let mut restored = Network::load(&text).unwrap();

        let x = [0.4, 0.2, 0.7];
        assert_eq!(net.forward(&x).unwrap(), restored.forward(&x).unwrap());
        assert_eq!(restored.params().momentum, 0.4);
        for (a, b) in net.nodes().zip(restored.nodes()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.prev_weights(), b.prev_weights());
            assert_eq!(a.prev_delta(), b.prev_delta());
        }
    }

    #[test]
    fn ids_continue_after_restore() {
        let net = trained();
        let mut restored = Network::from_document(&net.to_document().unwrap()).unwrap();
        let fresh = restored.add_node(NodeRole::Output, &[NodeId(4)]).unwrap();
        assert_eq!(fresh, NodeId(9));
    }

    #[test]
    fn predecessors_must_come_first() {
        let mut doc = trained().to_document().unwrap();
        doc.nodes.reverse();
        assert!(matches!(Network::from_document(&doc), Err(NodeError::UnknownNode(_))));
    }

    #[test]
    fn ports_must_match_roles() {
        let mut doc = trained().to_document().unwrap();
        doc.outputs.pop();
        assert!(matches!(Network::from_document(&doc), Err(NodeError::Deserialization(_))));

        let mut doc = trained().to_document().unwrap();
        let last = doc.nodes.len() - 1;
        doc.nodes[last].neuron.weights.as_mut().unwrap().pop();
        doc.nodes[last].neuron.previous_weights.as_mut().unwrap().pop();
        assert!(matches!(Network::from_document(&doc), Err(NodeError::IndexMismatch { .. })));
    }

    #[test]
    fn custom_activation_cannot_be_saved() {
        #[derive(Debug)]
        struct Square;
        impl ActivationFunction for Square {
            fn activate(&self, x: f64) -> f64 {
                x * x
            }
            fn derivative(&self, x: f64) -> f64 {
                2.0 * x
            }
        }
        let mut net = trained();
        net.params_mut().activation = Activation::custom(Square);
        assert!(matches!(net.save(), Err(NodeError::Serialization(_))));
    }
}
