use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use super::Network;
use crate::activations::ActivationFunction;
use crate::error::Result;
use crate::node::{Neuron, NodeId, Signal};

enum Dispatch {
    Signal(Signal),
    Stop,
}

/// Shared state of one parallel round. The mutex around each node makes
/// "store value, check every flag, maybe fire" a single step, so two
/// predecessors finishing at once can neither both trigger nor both miss
/// the join.
struct Round<'a> {
    nodes: &'a BTreeMap<NodeId, Mutex<Neuron>>,
    subscribers: &'a BTreeMap<NodeId, Vec<NodeId>>,
    activation: &'a dyn ActivationFunction,
    /// signals sent but not yet fully delivered
    pending: AtomicUsize,
    workers: usize,
}

/// Releases every worker if the one holding it unwinds, otherwise the
/// pending count would never reach zero and the pool would wait forever.
struct StopOnPanic<'r> {
    send: &'r Sender<Dispatch>,
    workers: usize,
}

impl Drop for StopOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            for _ in 0..self.workers {
                let _ = self.send.send(Dispatch::Stop);
            }
        }
    }
}

impl<'a> Round<'a> {
    fn run(&self, recv: Receiver<Dispatch>, send: Sender<Dispatch>) {
        let _guard = StopOnPanic { send: &send, workers: self.workers };
        for msg in recv.iter() {
            let signal = match msg {
                Dispatch::Signal(s) => s,
                Dispatch::Stop => break,
            };

            for succ in self.subscribers.get(&signal.source).into_iter().flatten() {
                let Some(node) = self.nodes.get(succ) else {
                    continue;
                };
                let fired = node
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .on_signal(signal.source, signal.value, self.activation);
                if let Some(next) = fired {
                    // count the child before releasing the parent so pending never dips to zero early
                    self.pending.fetch_add(1, Ordering::SeqCst);
                    Self::post(&send, Dispatch::Signal(next));
                }
            }

            if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                for _ in 0..self.workers {
                    Self::post(&send, Dispatch::Stop);
                }
            }
        }
    }

    fn post(send: &Sender<Dispatch>, msg: Dispatch) {
        if send.send(msg).is_err() {
            warn!("dispatch channel closed with work outstanding");
        }
    }
}

impl Network {
    /// Same as [`Network::forward`], but completion signals are delivered by
    /// a pool of `workers` threads. With zero workers this is the synchronous pass.
    pub fn forward_parallel(&mut self, inputs: &[f64], workers: usize) -> Result<Vec<f64>> {
        if workers == 0 {
            return self.forward(inputs);
        }
        let seeds = self.begin_round(inputs)?;
        if seeds.is_empty() {
            return Ok(self.output_values());
        }

        let nodes: BTreeMap<NodeId, Mutex<Neuron>> = mem::take(&mut self.nodes)
            .into_iter()
            .map(|(id, n)| (id, Mutex::new(n)))
            .collect();
        let round = Round {
            nodes: &nodes,
            subscribers: &self.subscribers,
            activation: &self.params.activation,
            pending: AtomicUsize::new(seeds.len()),
            workers,
        };

        let (send, recv) = unbounded();
        for s in seeds {
            Round::post(&send, Dispatch::Signal(s));
        }
        debug!("dispatching forward pass on {workers} workers");

        let joined = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let (send, recv) = (send.clone(), recv.clone());
                let round = &round;
                scope.spawn(move |_| round.run(recv, send));
            }
        });
        self.nodes = nodes
            .into_iter()
            .map(|(id, n)| (id, n.into_inner().unwrap_or_else(PoisonError::into_inner)))
            .collect();
        if let Err(panic) = joined {
            std::panic::resume_unwind(panic);
        }
        Ok(self.output_values())
    }
}

#[cfg(test)]
mod test {
    use std::panic::{self, AssertUnwindSafe};

    use crate::activations::{Activation, ActivationFunction, Sigmoid};
    use crate::configs::{InitRange, TrainParams};
    use crate::graph::Network;
    use crate::node::NodeId;
    use crate::random;

    fn wide() -> Network {
        let params = TrainParams {
            activation: Activation::Sigmoid(Sigmoid::default()),
            momentum: 0.0,
            learning_rate: 0.3,
        };
        let mut net = Network::layered(&[4, 16, 16, 3], params).unwrap();
        net.randomize(&mut random::seeded(11), InitRange::default());
        net
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut a = wide();
        let mut b = a.clone();
        for x in [[0.1, 0.2, 0.3, 0.4], [1.0, -1.0, 0.5, 0.0], [0.0; 4]] {
            let seq = a.forward(&x).unwrap();
            for workers in [1, 2, 8] {
                let par = b.forward_parallel(&x, workers).unwrap();
                assert_eq!(seq, par);
            }
        }
    }

    #[test]
    fn every_node_fires_once_per_round() {
        let mut net = wide();
        net.forward_parallel(&[0.3, 0.1, 0.9, 0.2], 4).unwrap();
        for n in net.nodes() {
            assert!(n.edges().iter().all(|e| !e.collected), "{} left a join open", n.id());
        }
        assert_eq!(net.len(), 4 + 16 + 16 + 3);
    }

    #[test]
    fn worker_panic_reaches_the_caller() {
        #[derive(Debug)]
        struct Overflow;
        impl ActivationFunction for Overflow {
            fn activate(&self, x: f64) -> f64 {
                assert!(x <= 100.0, "activation overflow at {x}");
                x
            }
            fn derivative(&self, _: f64) -> f64 {
                1.0
            }
        }

        let params = TrainParams {
            activation: Activation::custom(Overflow),
            momentum: 0.0,
            learning_rate: 0.1,
        };
        let mut net = Network::layered(&[1, 4, 1], params).unwrap();
        for hidden in 1..5 {
            net.set_weights(NodeId(hidden), &[1.0]).unwrap();
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| net.forward_parallel(&[1000.0], 2)));
        assert!(result.is_err());

        // the nodes are back in the arena and a sane round still works
        assert_eq!(net.len(), 6);
        net.set_weights(NodeId(5), &[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(net.forward_parallel(&[2.0], 2).unwrap(), vec![8.0]);
    }

    #[test]
    fn zero_workers_is_synchronous() {
        let mut a = wide();
        let mut b = a.clone();
        let x = [0.5, 0.5, 0.5, 0.5];
        assert_eq!(a.forward(&x).unwrap(), b.forward_parallel(&x, 0).unwrap());
    }

    #[test]
    fn parallel_forward_supports_training() {
        let mut net = wide();
        let x = [0.2, 0.4, 0.6, 0.8];
        let y = [0.1, 0.5, 0.9];
        let before = crate::graph::squared_error(&net.forward_parallel(&x, 3).unwrap(), &y);
        for _ in 0..20 {
            net.forward_parallel(&x, 3).unwrap();
            net.backward(&y).unwrap();
        }
        let after = crate::graph::squared_error(&net.forward_parallel(&x, 3).unwrap(), &y);
        assert!(after < before);
    }
}
