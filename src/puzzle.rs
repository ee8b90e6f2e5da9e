use crate::builder::ConnectionBuilder;
use crate::catalog::WireCatalog;
use crate::completion::CompletionStore;
use crate::error::SetupError;
use crate::evaluator::{trace, CircuitEvaluator, Evaluation};
use crate::graph::CircuitGraph;
use crate::highlight::{Highlighter, NoHighlight};
use crate::layout::PuzzleLayout;
use crate::types::{
    ChargeDisplay, ClickOutcome, ClickTarget, ConnectionId, EvaluationMode, IgnoreReason, NodeId,
    PuzzleEvent, PuzzleKey, PuzzleSnapshot, PuzzleSummary, RemovalPolicy, WireId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PuzzleOptions {
    pub removal_policy: RemovalPolicy,
    pub evaluation_mode: EvaluationMode,
}

impl Default for PuzzleOptions {
    fn default() -> Self {
        Self {
            removal_policy: RemovalPolicy::Refund,
            evaluation_mode: EvaluationMode::OnChange,
        }
    }
}

type CompletionListener = Box<dyn FnMut() + Send>;

/// One wire box: its nodes, wire catalog, builder and evaluator.
pub struct WirePuzzle {
    key: PuzzleKey,
    name: String,
    options: PuzzleOptions,
    graph: CircuitGraph,
    builder: ConnectionBuilder,
    evaluator: CircuitEvaluator,
    highlighter: Box<dyn Highlighter + Send>,
    listeners: Vec<CompletionListener>,
    events: Vec<PuzzleEvent>,
    charge: ChargeDisplay,
    tick_counter: u64,
    elapsed_ms: u64,
}

impl WirePuzzle {
    pub fn new(
        layout: &PuzzleLayout,
        key: PuzzleKey,
        options: PuzzleOptions,
        store: &dyn CompletionStore,
    ) -> Result<Self, SetupError> {
        let graph = CircuitGraph::from_layout(layout)?;
        let builder = ConnectionBuilder::new(WireCatalog::from_layout(layout)?);
        let evaluator = CircuitEvaluator::new(key, store);
        let charge = trace(&graph).display();
        Ok(Self {
            key,
            name: layout.name.trim().to_string(),
            options,
            graph,
            builder,
            evaluator,
            highlighter: Box::new(NoHighlight),
            listeners: Vec::new(),
            events: Vec::new(),
            charge,
            tick_counter: 0,
            elapsed_ms: 0,
        })
    }

    pub fn key(&self) -> PuzzleKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> PuzzleOptions {
        self.options
    }

    pub fn graph(&self) -> &CircuitGraph {
        &self.graph
    }

    pub fn builder(&self) -> &ConnectionBuilder {
        &self.builder
    }

    pub fn is_completed(&self) -> bool {
        self.evaluator.is_completed()
    }

    pub fn charge(&self) -> ChargeDisplay {
        self.charge
    }

    pub fn selected_wire(&self) -> Option<WireId> {
        self.builder.selected_wire()
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.builder.anchor()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn set_highlighter(&mut self, highlighter: Box<dyn Highlighter + Send>) {
        self.highlighter = highlighter;
    }

    pub fn on_completed(&mut self, listener: impl FnMut() + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn handle_click(
        &mut self,
        target: ClickTarget,
        store: &mut dyn CompletionStore,
    ) -> ClickOutcome {
        let outcome = match target {
            ClickTarget::Node(node) => {
                self.builder
                    .click_node(&mut self.graph, node, self.highlighter.as_mut())
            }
            ClickTarget::Wire(wire) => self.builder.click_wire(wire, self.highlighter.as_mut()),
            ClickTarget::Connection(connection) => {
                if self.remove(connection) {
                    ClickOutcome::Removed { connection }
                } else {
                    ClickOutcome::Ignored {
                        reason: IgnoreReason::UnknownTarget,
                    }
                }
            }
            ClickTarget::Nothing => ClickOutcome::Ignored {
                reason: IgnoreReason::NothingHit,
            },
        };
        self.events.extend(self.builder.drain_events());
        if outcome.changed_edges() && self.options.evaluation_mode == EvaluationMode::OnChange {
            self.evaluate(store);
        }
        outcome
    }

    pub fn select_wire(&mut self, wire: WireId) -> Result<(), IgnoreReason> {
        let result = self.builder.select_wire(wire, self.highlighter.as_mut());
        self.events.extend(self.builder.drain_events());
        result
    }

    pub fn deselect_wire(&mut self, wire: WireId) -> bool {
        let changed = self.builder.deselect_wire(wire, self.highlighter.as_mut());
        self.events.extend(self.builder.drain_events());
        changed
    }

    pub fn remove_connection(
        &mut self,
        connection: ConnectionId,
        store: &mut dyn CompletionStore,
    ) -> bool {
        self.handle_click(ClickTarget::Connection(connection), store)
            .changed_edges()
    }

    fn remove(&mut self, connection: ConnectionId) -> bool {
        self.builder
            .remove_connection(&mut self.graph, connection, self.options.removal_policy)
            .is_some()
    }

    /// Reads the circuit now, regardless of evaluation mode.
    pub fn poll(&mut self, store: &mut dyn CompletionStore) -> Evaluation {
        self.evaluate(store)
    }

    pub fn step(&mut self, dt_ms: u64, store: &mut dyn CompletionStore) {
        self.tick_counter += 1;
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
        if self.options.evaluation_mode == EvaluationMode::Polling {
            self.evaluate(store);
        }
    }

    fn evaluate(&mut self, store: &mut dyn CompletionStore) -> Evaluation {
        let evaluation = self.evaluator.evaluate(&self.graph, store);
        // An inert puzzle still shows what is wired now.
        let charge = match evaluation.reading() {
            Some(reading) => reading.display(),
            None => trace(&self.graph).display(),
        };
        if charge != self.charge {
            self.charge = charge;
            self.events.push(PuzzleEvent::ChargeChanged { charge });
        }
        if evaluation.is_completed() {
            log::info!(
                "puzzle '{}' completed with charge {}",
                self.name,
                self.charge.total
            );
            self.events.push(PuzzleEvent::PuzzleCompleted {
                puzzle: self.name.clone(),
            });
            for listener in &mut self.listeners {
                listener();
            }
        }
        evaluation
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<PuzzleEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> PuzzleSnapshot {
        PuzzleSnapshot {
            tick: self.tick_counter,
            puzzle: self.name.clone(),
            completed: self.is_completed(),
            selected_wire: self.builder.selected_wire(),
            anchor: self.builder.anchor(),
            charge: self.charge,
            nodes: self.graph.node_views(),
            wires: self.builder.catalog().views(),
            connections: self.graph.connection_views(),
            events: if include_events {
                self.take_events()
            } else {
                Vec::new()
            },
        }
    }

    pub fn summary(&self) -> PuzzleSummary {
        PuzzleSummary {
            name: self.name.clone(),
            completed: self.is_completed(),
            node_count: self.graph.node_count(),
            wire_count: self.builder.catalog().entries().len(),
        }
    }
}
