use crate::catalog::{WireCatalog, WireEntry};
use crate::constants::WIRE_LENGTH_SCALE;
use crate::graph::{CircuitGraph, Connection, LinkRefusal};
use crate::highlight::{HighlightTarget, Highlighter};
use crate::types::{
    ClickOutcome, ConnectionId, IgnoreReason, NodeId, PuzzleEvent, RemovalPolicy, WireId,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReachPreview {
    /// Distance between the two nodes in wire length units.
    pub distance: f32,
    pub max_length: f32,
    pub within: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Removal {
    pub connection: Connection,
    pub refunded: bool,
}

/// Turns wire and node clicks into connections, one pending edge at a time.
///
/// Owns the wire selection and the anchor node; nothing else mutates them.
#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    catalog: WireCatalog,
    anchor: Option<NodeId>,
    events: Vec<PuzzleEvent>,
}

impl ConnectionBuilder {
    pub fn new(catalog: WireCatalog) -> Self {
        Self {
            catalog,
            anchor: None,
            events: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &WireCatalog {
        &self.catalog
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    pub fn selected_wire(&self) -> Option<WireId> {
        self.catalog.selected()
    }

    pub fn drain_events(&mut self) -> Vec<PuzzleEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn reach_preview(
        graph: &CircuitGraph,
        a: NodeId,
        b: NodeId,
        max_length: f32,
    ) -> Option<ReachPreview> {
        let distance = graph.distance(a, b)? * WIRE_LENGTH_SCALE;
        Some(ReachPreview {
            distance,
            max_length,
            within: distance <= max_length,
        })
    }

    pub fn within_reach(graph: &CircuitGraph, a: NodeId, b: NodeId, max_length: f32) -> bool {
        Self::reach_preview(graph, a, b, max_length).is_some_and(|preview| preview.within)
    }

    pub fn select_wire(
        &mut self,
        wire: WireId,
        highlighter: &mut dyn Highlighter,
    ) -> Result<(), IgnoreReason> {
        let entry = self.catalog.entry(wire).ok_or(IgnoreReason::UnknownTarget)?;
        if !entry.available {
            return Err(IgnoreReason::WireUnavailable);
        }
        // A half-built edge never carries over to a wire of another length.
        self.clear_anchor(highlighter);
        if self.catalog.selected() == Some(wire) {
            return Ok(());
        }
        if let Some(previous) = self.catalog.select(wire)? {
            highlighter.deselect(HighlightTarget::Wire(previous));
            self.events.push(PuzzleEvent::WireDeselected { wire: previous });
        }
        highlighter.select(HighlightTarget::Wire(wire));
        self.events.push(PuzzleEvent::WireSelected { wire });
        Ok(())
    }

    pub fn deselect_wire(&mut self, wire: WireId, highlighter: &mut dyn Highlighter) -> bool {
        if !self.catalog.deselect(wire) {
            return false;
        }
        highlighter.deselect(HighlightTarget::Wire(wire));
        self.events.push(PuzzleEvent::WireDeselected { wire });
        self.clear_anchor(highlighter);
        true
    }

    /// Clicking the selected wire cancels it, any other wire switches to it.
    pub fn click_wire(&mut self, wire: WireId, highlighter: &mut dyn Highlighter) -> ClickOutcome {
        if self.catalog.selected() == Some(wire) {
            self.deselect_wire(wire, highlighter);
            return ClickOutcome::WireDeselected { wire };
        }
        match self.select_wire(wire, highlighter) {
            Ok(()) => ClickOutcome::WireSelected { wire },
            Err(reason) => ClickOutcome::Ignored { reason },
        }
    }

    pub fn click_node(
        &mut self,
        graph: &mut CircuitGraph,
        node: NodeId,
        highlighter: &mut dyn Highlighter,
    ) -> ClickOutcome {
        let Some(wire) = self.catalog.selected_entry() else {
            return ignored(IgnoreReason::NoWireSelected);
        };
        let Some(clicked) = graph.node(node) else {
            return ignored(IgnoreReason::UnknownTarget);
        };

        let Some(anchor) = self.anchor else {
            if !clicked.has_spare_capacity() {
                return ignored(IgnoreReason::NodeFull);
            }
            self.anchor = Some(node);
            highlighter.select(HighlightTarget::Node(node));
            self.events.push(PuzzleEvent::AnchorSet { node });
            return ClickOutcome::Anchored { node };
        };

        if anchor == node {
            self.clear_anchor(highlighter);
            return ClickOutcome::AnchorCancelled { node };
        }
        if !clicked.has_spare_capacity() {
            return ignored(IgnoreReason::NodeFull);
        }
        if graph.are_linked(anchor, node) {
            return ignored(IgnoreReason::AlreadyLinked);
        }
        self.complete_edge(graph, anchor, node, wire, highlighter)
    }

    fn complete_edge(
        &mut self,
        graph: &mut CircuitGraph,
        anchor: NodeId,
        node: NodeId,
        wire: WireEntry,
        highlighter: &mut dyn Highlighter,
    ) -> ClickOutcome {
        let Some(preview) = Self::reach_preview(graph, anchor, node, wire.length) else {
            return ignored(IgnoreReason::UnknownTarget);
        };
        if !preview.within {
            log::debug!(
                "rejected wire {:?} between {:?} and {:?}: {:.2} > {:.2}",
                wire.id,
                anchor,
                node,
                preview.distance,
                preview.max_length
            );
            self.events.push(PuzzleEvent::ConnectionRejected {
                a: anchor,
                b: node,
                distance: preview.distance,
                max_length: preview.max_length,
            });
            return ClickOutcome::Rejected {
                distance: preview.distance,
                max_length: preview.max_length,
            };
        }

        let connection = match graph.connect(anchor, node, wire.id, preview.distance) {
            Ok(connection) => connection,
            Err(refusal) => return ignored(refusal_reason(refusal)),
        };
        self.catalog.consume(wire.id);
        highlighter.deselect(HighlightTarget::Wire(wire.id));
        self.events.push(PuzzleEvent::WireDeselected { wire: wire.id });
        self.clear_anchor(highlighter);
        self.events.push(PuzzleEvent::ConnectionPlaced {
            connection,
            a: anchor,
            b: node,
            wire: wire.id,
        });
        ClickOutcome::Connected { connection }
    }

    pub fn remove_connection(
        &mut self,
        graph: &mut CircuitGraph,
        connection: ConnectionId,
        policy: RemovalPolicy,
    ) -> Option<Removal> {
        let removed = graph.disconnect(connection)?;
        let refunded = match policy {
            RemovalPolicy::Refund => self.catalog.restore(removed.wire),
            RemovalPolicy::Discard => false,
        };
        self.events.push(PuzzleEvent::ConnectionRemoved {
            connection,
            refunded,
        });
        Some(Removal {
            connection: removed,
            refunded,
        })
    }

    fn clear_anchor(&mut self, highlighter: &mut dyn Highlighter) {
        if let Some(node) = self.anchor.take() {
            highlighter.deselect(HighlightTarget::Node(node));
            self.events.push(PuzzleEvent::AnchorCleared { node });
        }
    }
}

fn ignored(reason: IgnoreReason) -> ClickOutcome {
    ClickOutcome::Ignored { reason }
}

fn refusal_reason(refusal: LinkRefusal) -> IgnoreReason {
    match refusal {
        LinkRefusal::UnknownNode(_) | LinkRefusal::SameNode => IgnoreReason::UnknownTarget,
        LinkRefusal::NodeFull(_) => IgnoreReason::NodeFull,
        LinkRefusal::AlreadyLinked => IgnoreReason::AlreadyLinked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::HighlightSet;
    use crate::layout::{NodeSpec, OutputSpec, PuzzleLayout, WireSpec};

    fn setup(layout: &PuzzleLayout) -> (CircuitGraph, ConnectionBuilder, HighlightSet) {
        let graph = CircuitGraph::from_layout(layout).expect("valid layout");
        let catalog = WireCatalog::from_layout(layout).expect("valid layout");
        (graph, ConnectionBuilder::new(catalog), HighlightSet::default())
    }

    fn far_pair_layout() -> PuzzleLayout {
        PuzzleLayout {
            name: "far_pair".to_string(),
            output: OutputSpec {
                x: 0.0,
                y: 0.0,
                voltage: 1,
            },
            nodes: vec![
                NodeSpec {
                    x: 1.2,
                    y: 0.0,
                    voltage: 1,
                    end: true,
                },
                NodeSpec {
                    x: 0.9,
                    y: 0.0,
                    voltage: 1,
                    end: false,
                },
            ],
            wires: vec![WireSpec { length: 10.0 }],
        }
    }

    #[test]
    fn node_clicks_without_wire_are_ignored() {
        let (mut graph, mut builder, mut highlights) =
            setup(&crate::graph::tests::line_layout(3, &[(3, true)]));
        let outcome = builder.click_node(&mut graph, NodeId(1), &mut highlights);
        assert_eq!(
            outcome,
            ClickOutcome::Ignored {
                reason: IgnoreReason::NoWireSelected
            }
        );
        assert_eq!(builder.anchor(), None);
        assert!(highlights.is_empty());
    }

    #[test]
    fn two_node_clicks_place_a_connection_and_consume_the_wire() {
        let (mut graph, mut builder, mut highlights) =
            setup(&crate::graph::tests::line_layout(3, &[(3, true)]));
        builder.click_wire(WireId(0), &mut highlights);
        assert_eq!(
            builder.click_node(&mut graph, NodeId(0), &mut highlights),
            ClickOutcome::Anchored { node: NodeId(0) }
        );
        assert!(highlights.is_highlighted(HighlightTarget::Node(NodeId(0))));

        let outcome = builder.click_node(&mut graph, NodeId(1), &mut highlights);
        assert!(matches!(outcome, ClickOutcome::Connected { .. }));
        assert_eq!(graph.connection_count(), 1);
        assert_eq!(builder.anchor(), None);
        assert_eq!(builder.selected_wire(), None);
        assert!(!builder.catalog().entries()[0].available);
        assert!(highlights.is_empty());
    }

    #[test]
    fn over_length_connection_is_rejected_without_mutation() {
        let (mut graph, mut builder, mut highlights) = setup(&far_pair_layout());
        builder.select_wire(WireId(0), &mut highlights).expect("select");
        builder.click_node(&mut graph, NodeId(0), &mut highlights);

        let outcome = builder.click_node(&mut graph, NodeId(1), &mut highlights);
        match outcome {
            ClickOutcome::Rejected {
                distance,
                max_length,
            } => {
                assert!((distance - 12.0).abs() < 1e-4);
                assert_eq!(max_length, 10.0);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.nodes().iter().all(|node| node.degree() == 0));
        assert_eq!(builder.anchor(), Some(NodeId(0)));
        assert_eq!(builder.selected_wire(), Some(WireId(0)));
        assert!(builder.catalog().entries()[0].available);

        assert!(ConnectionBuilder::within_reach(&graph, NodeId(0), NodeId(2), 10.0));
        assert!(!ConnectionBuilder::within_reach(&graph, NodeId(0), NodeId(1), 10.0));
    }

    #[test]
    fn reclicking_anchor_cancels_pending_edge() {
        let (mut graph, mut builder, mut highlights) =
            setup(&crate::graph::tests::line_layout(3, &[(3, true)]));
        builder.select_wire(WireId(0), &mut highlights).expect("select");
        builder.click_node(&mut graph, NodeId(1), &mut highlights);
        let outcome = builder.click_node(&mut graph, NodeId(1), &mut highlights);

        assert_eq!(outcome, ClickOutcome::AnchorCancelled { node: NodeId(1) });
        assert_eq!(builder.anchor(), None);
        assert_eq!(graph.connection_count(), 0);
        assert!(!highlights.is_highlighted(HighlightTarget::Node(NodeId(1))));
        assert_eq!(builder.selected_wire(), Some(WireId(0)));
    }

    #[test]
    fn switching_or_cancelling_wire_clears_anchor() {
        let (mut graph, mut builder, mut highlights) =
            setup(&crate::graph::tests::line_layout(3, &[(1, false), (2, true)]));
        builder.click_wire(WireId(0), &mut highlights);
        builder.click_node(&mut graph, NodeId(1), &mut highlights);

        assert_eq!(
            builder.click_wire(WireId(1), &mut highlights),
            ClickOutcome::WireSelected { wire: WireId(1) }
        );
        assert_eq!(builder.anchor(), None);
        assert!(!highlights.is_highlighted(HighlightTarget::Wire(WireId(0))));
        assert!(highlights.is_highlighted(HighlightTarget::Wire(WireId(1))));

        builder.click_node(&mut graph, NodeId(2), &mut highlights);
        assert_eq!(
            builder.click_wire(WireId(1), &mut highlights),
            ClickOutcome::WireDeselected { wire: WireId(1) }
        );
        assert_eq!(builder.anchor(), None);
        assert_eq!(builder.selected_wire(), None);
        assert!(highlights.is_empty());
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn full_nodes_ignore_clicks() {
        let (mut graph, mut builder, mut highlights) =
            setup(&crate::graph::tests::line_layout(3, &[(1, false), (2, true)]));
        builder.click_wire(WireId(0), &mut highlights);
        builder.click_node(&mut graph, NodeId(0), &mut highlights);
        builder.click_node(&mut graph, NodeId(1), &mut highlights);

        builder.click_wire(WireId(1), &mut highlights);
        assert_eq!(
            builder.click_node(&mut graph, NodeId(0), &mut highlights),
            ClickOutcome::Ignored {
                reason: IgnoreReason::NodeFull
            }
        );
        builder.click_node(&mut graph, NodeId(2), &mut highlights);
        assert_eq!(
            builder.click_node(&mut graph, NodeId(0), &mut highlights),
            ClickOutcome::Ignored {
                reason: IgnoreReason::NodeFull
            }
        );
        assert_eq!(builder.anchor(), Some(NodeId(2)));
    }

    #[test]
    fn removal_refunds_only_when_configured() {
        let layout = crate::graph::tests::line_layout(3, &[(3, true)]);
        for (policy, expect_refund) in [
            (RemovalPolicy::Refund, true),
            (RemovalPolicy::Discard, false),
        ] {
            let (mut graph, mut builder, mut highlights) = setup(&layout);
            builder.click_wire(WireId(0), &mut highlights);
            builder.click_node(&mut graph, NodeId(0), &mut highlights);
            let ClickOutcome::Connected { connection } =
                builder.click_node(&mut graph, NodeId(1), &mut highlights)
            else {
                panic!("expected connection");
            };

            let removal = builder
                .remove_connection(&mut graph, connection, policy)
                .expect("connection exists");
            assert_eq!(removal.refunded, expect_refund);
            assert_eq!(builder.catalog().entries()[0].available, expect_refund);
            assert_eq!(graph.connection_count(), 0);
            assert!(builder.remove_connection(&mut graph, connection, policy).is_none());
        }
    }

    #[test]
    fn events_follow_the_click_sequence() {
        let (mut graph, mut builder, mut highlights) =
            setup(&crate::graph::tests::line_layout(3, &[(3, true)]));
        builder.click_wire(WireId(0), &mut highlights);
        builder.click_node(&mut graph, NodeId(0), &mut highlights);
        builder.click_node(&mut graph, NodeId(1), &mut highlights);

        let events = builder.drain_events();
        assert_eq!(events[0], PuzzleEvent::WireSelected { wire: WireId(0) });
        assert_eq!(events[1], PuzzleEvent::AnchorSet { node: NodeId(0) });
        assert!(matches!(
            events.last(),
            Some(PuzzleEvent::ConnectionPlaced { a: NodeId(0), b: NodeId(1), .. })
        ));
        assert!(builder.drain_events().is_empty());
    }
}
