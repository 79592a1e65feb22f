use std::collections::HashMap;

use log::trace;

use super::{Neuron, NodeId};
use crate::error::{NodeError, Result};

/// Per node cache of the slot this node occupies in each downstream node's
/// edge list. Filled lazily during backpropagation. The owning graph drops
/// entries whenever a downstream edge list changes; a cached slot is also
/// checked against the edge it points at before use.
#[derive(Clone, Debug, Default)]
pub struct TopologyIndex {
    slots: HashMap<NodeId, usize>,
}

impl TopologyIndex {
    /// Slot of `me` inside `downstream`'s edges
    pub fn slot_in(&mut self, me: NodeId, downstream: &Neuron) -> Result<usize> {
        let target = downstream.id();
        if let Some(&slot) = self.slots.get(&target) {
            if downstream.edges().get(slot).map(|e| e.source) == Some(me) {
                return Ok(slot);
            }
            trace!("{me}: stale slot {slot} for {target}, rescanning");
            self.slots.remove(&target);
        }

        let slot = downstream.slot_of(me).ok_or(NodeError::Linkage {
            node: me,
            downstream: target,
        })?;
        self.slots.insert(target, slot);
        Ok(slot)
    }

    pub fn cached(&self, downstream: NodeId) -> Option<usize> {
        self.slots.get(&downstream).copied()
    }

    pub fn invalidate(&mut self, downstream: NodeId) {
        self.slots.remove(&downstream);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::NodeRole;

    #[test]
    fn lookup_is_cached() {
        let down = Neuron::new(NodeId(9), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);
        let mut index = TopologyIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.slot_in(NodeId(3), &down), Ok(2));
        assert_eq!(index.cached(NodeId(9)), Some(2));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn stale_entry_is_rebuilt() {
        let mut down = Neuron::new(NodeId(9), NodeRole::Output, &[NodeId(1), NodeId(2), NodeId(3)]);
        let mut index = TopologyIndex::default();
        assert_eq!(index.slot_in(NodeId(3), &down), Ok(2));

        down.unsubscribe(NodeId(1));
        assert_eq!(index.slot_in(NodeId(3), &down), Ok(1));
        assert_eq!(index.cached(NodeId(9)), Some(1));

        down.unsubscribe(NodeId(3));
        assert!(matches!(index.slot_in(NodeId(3), &down), Err(NodeError::Linkage { .. })));
    }

    #[test]
    fn invalidate_drops_entry() {
        let down = Neuron::new(NodeId(4), NodeRole::Standard, &[NodeId(1)]);
        let mut index = TopologyIndex::default();
        index.slot_in(NodeId(1), &down).unwrap();
        index.invalidate(NodeId(4));
        assert_eq!(index.cached(NodeId(4)), None);
        index.slot_in(NodeId(1), &down).unwrap();
        index.clear();
        assert!(index.is_empty());
    }
}
