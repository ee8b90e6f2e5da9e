use crate::completion::CompletionStore;
use crate::graph::CircuitGraph;
use crate::types::{ChargeDisplay, ChargeSign, NodeId, PuzzleKey};

/// Result of walking the wire run that starts at the output node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitReading {
    pub charge_total: i32,
    pub target: i32,
    pub path: Vec<NodeId>,
    pub terminus: Option<NodeId>,
    pub reached_end: bool,
}

impl CircuitReading {
    pub fn sign(&self) -> ChargeSign {
        ChargeSign::of(self.charge_total)
    }

    pub fn is_solved(&self) -> bool {
        self.reached_end && self.charge_total == self.target
    }

    pub fn display(&self) -> ChargeDisplay {
        ChargeDisplay {
            total: self.charge_total,
            target: self.target,
            sign: self.sign(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// Completion was already recorded; nothing was read.
    Inert,
    Incomplete(CircuitReading),
    Completed(CircuitReading),
}

impl Evaluation {
    pub fn reading(&self) -> Option<&CircuitReading> {
        match self {
            Self::Inert => None,
            Self::Incomplete(reading) | Self::Completed(reading) => Some(reading),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

pub fn trace(graph: &CircuitGraph) -> CircuitReading {
    let output = graph.output();
    let mut reading = CircuitReading {
        charge_total: 0,
        target: output.voltage,
        path: Vec::new(),
        terminus: None,
        reached_end: false,
    };

    let Some(first) = output.connections().next() else {
        return reading;
    };
    let Some(mut current) = graph
        .connection(first)
        .and_then(|connection| connection.other(output.id))
    else {
        return reading;
    };
    let mut came_from = first;

    // Capacity rules keep the run linear, so it visits each node at most once.
    for _ in 0..graph.node_count() {
        let Some(node) = graph.node(current) else {
            break;
        };
        reading.charge_total += node.voltage;
        reading.path.push(current);

        match graph.next_step(current, came_from) {
            Some((connection, next)) if next != output.id => {
                came_from = connection;
                current = next;
            }
            Some(_) => break,
            None => {
                reading.terminus = Some(current);
                reading.reached_end = node.end;
                break;
            }
        }
    }
    reading
}

#[derive(Clone, Debug)]
pub struct CircuitEvaluator {
    key: PuzzleKey,
    completed: bool,
}

impl CircuitEvaluator {
    pub fn new(key: PuzzleKey, store: &dyn CompletionStore) -> Self {
        Self {
            key,
            completed: store.contains(key),
        }
    }

    pub fn key(&self) -> PuzzleKey {
        self.key
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn evaluate(&mut self, graph: &CircuitGraph, store: &mut dyn CompletionStore) -> Evaluation {
        if self.completed || store.contains(self.key) {
            self.completed = true;
            return Evaluation::Inert;
        }
        let reading = trace(graph);
        if !reading.is_solved() {
            return Evaluation::Incomplete(reading);
        }
        self.completed = true;
        store.add(self.key);
        Evaluation::Completed(reading)
    }
}
