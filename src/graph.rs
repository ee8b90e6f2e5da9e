use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{NODE_CAPACITY, OUTPUT_NODE_CAPACITY, OUTPUT_NODE_ID};
use crate::error::SetupError;
use crate::layout::PuzzleLayout;
use crate::types::{ConnectionId, ConnectionView, NodeId, NodeView, Vec2, WireId};

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec2,
    pub voltage: i32,
    pub end: bool,
    pub output: bool,
    links: [Option<ConnectionId>; NODE_CAPACITY],
}

impl Node {
    pub fn capacity(&self) -> usize {
        if self.output {
            OUTPUT_NODE_CAPACITY
        } else {
            NODE_CAPACITY
        }
    }

    pub fn degree(&self) -> usize {
        self.links.iter().flatten().count()
    }

    pub fn has_spare_capacity(&self) -> bool {
        self.degree() < self.capacity()
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.links.iter().flatten().copied()
    }

    fn attach(&mut self, connection: ConnectionId) -> bool {
        if !self.has_spare_capacity() {
            return false;
        }
        match self.links.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(connection);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, connection: ConnectionId) {
        for slot in &mut self.links {
            if *slot == Some(connection) {
                *slot = None;
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub a: NodeId,
    pub b: NodeId,
    pub wire: WireId,
    pub length_used: f32,
}

impl Connection {
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.a {
            Some(self.b)
        } else if node == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkRefusal {
    UnknownNode(NodeId),
    SameNode,
    NodeFull(NodeId),
    AlreadyLinked,
}

/// Fixed node set plus the connections the player has placed so far.
#[derive(Clone, Debug)]
pub struct CircuitGraph {
    nodes: Vec<Node>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection_id: usize,
}

impl CircuitGraph {
    pub fn from_layout(layout: &PuzzleLayout) -> Result<Self, SetupError> {
        layout.validate()?;
        let mut nodes = Vec::with_capacity(layout.nodes.len() + 1);
        nodes.push(Node {
            id: NodeId(OUTPUT_NODE_ID),
            position: Vec2::new(layout.output.x, layout.output.y),
            voltage: layout.output.voltage,
            end: false,
            output: true,
            links: [None; NODE_CAPACITY],
        });
        for spec in &layout.nodes {
            nodes.push(Node {
                id: NodeId(nodes.len()),
                position: Vec2::new(spec.x, spec.y),
                voltage: spec.voltage,
                end: spec.end,
                output: false,
                links: [None; NODE_CAPACITY],
            });
        }
        Ok(Self {
            nodes,
            connections: BTreeMap::new(),
            next_connection_id: 1,
        })
    }

    pub fn output_id(&self) -> NodeId {
        NodeId(OUTPUT_NODE_ID)
    }

    pub fn output(&self) -> &Node {
        &self.nodes[OUTPUT_NODE_ID]
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Straight-line distance in board units.
    pub fn distance(&self, a: NodeId, b: NodeId) -> Option<f32> {
        let a = self.node(a)?;
        let b = self.node(b)?;
        Some(a.position.distance(b.position))
    }

    pub fn are_linked(&self, a: NodeId, b: NodeId) -> bool {
        self.connections
            .values()
            .any(|connection| connection.other(a) == Some(b))
    }

    pub fn connect(
        &mut self,
        a: NodeId,
        b: NodeId,
        wire: WireId,
        length_used: f32,
    ) -> Result<ConnectionId, LinkRefusal> {
        if a == b {
            return Err(LinkRefusal::SameNode);
        }
        for id in [a, b] {
            let node = self.node(id).ok_or(LinkRefusal::UnknownNode(id))?;
            if !node.has_spare_capacity() {
                return Err(LinkRefusal::NodeFull(id));
            }
        }
        if self.are_linked(a, b) {
            return Err(LinkRefusal::AlreadyLinked);
        }

        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        let attached_a = self.nodes[a.0].attach(id);
        let attached_b = self.nodes[b.0].attach(id);
        debug_assert!(attached_a && attached_b);
        self.connections.insert(
            id,
            Connection {
                id,
                a,
                b,
                wire,
                length_used,
            },
        );
        Ok(id)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        self.nodes[connection.a.0].detach(id);
        self.nodes[connection.b.0].detach(id);
        Some(connection)
    }

    /// Follows `node`'s connection other than `came_from`.
    pub fn next_step(&self, node: NodeId, came_from: ConnectionId) -> Option<(ConnectionId, NodeId)> {
        let node = self.node(node)?;
        let outgoing = node.connections().find(|id| *id != came_from)?;
        let next = self.connection(outgoing)?.other(node.id)?;
        Some((outgoing, next))
    }

    /// Placed connections as normalized node pairs, ignoring connection ids.
    pub fn topology(&self) -> BTreeSet<(NodeId, NodeId)> {
        self.connections
            .values()
            .map(|connection| {
                (
                    connection.a.min(connection.b),
                    connection.a.max(connection.b),
                )
            })
            .collect()
    }

    pub fn node_views(&self) -> Vec<NodeView> {
        self.nodes
            .iter()
            .map(|node| NodeView {
                id: node.id,
                x: node.position.x,
                y: node.position.y,
                voltage: node.voltage,
                end: node.end,
                output: node.output,
                connections: node.connections().collect(),
            })
            .collect()
    }

    pub fn connection_views(&self) -> Vec<ConnectionView> {
        self.connections
            .values()
            .map(|connection| ConnectionView {
                id: connection.id,
                a: connection.a,
                b: connection.b,
                wire: connection.wire,
                length_used: connection.length_used,
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::layout::{NodeSpec, OutputSpec, WireSpec};

    pub(crate) fn line_layout(target: i32, voltages: &[(i32, bool)]) -> PuzzleLayout {
        PuzzleLayout {
            name: "test_box".to_string(),
            output: OutputSpec {
                x: 0.0,
                y: 0.0,
                voltage: target,
            },
            nodes: voltages
                .iter()
                .enumerate()
                .map(|(index, (voltage, end))| NodeSpec {
                    x: (index + 1) as f32 * 0.5,
                    y: 0.0,
                    voltage: *voltage,
                    end: *end,
                })
                .collect(),
            wires: vec![WireSpec { length: 10.0 }; voltages.len() + 1],
        }
    }

    #[test]
    fn from_layout_puts_output_first() {
        let graph = CircuitGraph::from_layout(&line_layout(5, &[(3, false), (2, true)]))
            .expect("valid layout");
        assert_eq!(graph.node_count(), 3);
        assert!(graph.output().output);
        assert_eq!(graph.output().voltage, 5);
        assert_eq!(graph.node(NodeId(2)).map(|node| node.end), Some(true));
    }

    #[test]
    fn from_layout_rejects_empty_catalog() {
        let mut layout = line_layout(5, &[(3, true)]);
        layout.wires.clear();
        assert!(matches!(
            CircuitGraph::from_layout(&layout),
            Err(SetupError::NoWires { .. })
        ));
    }

    #[test]
    fn connect_enforces_capacity() {
        let mut graph =
            CircuitGraph::from_layout(&line_layout(0, &[(1, false), (1, false), (1, false), (1, true)]))
                .expect("valid layout");
        graph
            .connect(NodeId(1), NodeId(2), WireId(0), 5.0)
            .expect("first link");
        graph
            .connect(NodeId(1), NodeId(3), WireId(1), 10.0)
            .expect("second link");
        assert_eq!(
            graph.connect(NodeId(1), NodeId(4), WireId(2), 15.0),
            Err(LinkRefusal::NodeFull(NodeId(1)))
        );

        graph
            .connect(NodeId(0), NodeId(4), WireId(3), 20.0)
            .expect("output link");
        assert_eq!(
            graph.connect(NodeId(0), NodeId(2), WireId(4), 5.0),
            Err(LinkRefusal::NodeFull(NodeId(0)))
        );
        assert!(graph.nodes().iter().all(|node| node.degree() <= node.capacity()));
    }

    #[test]
    fn connect_rejects_duplicates_and_self_links() {
        let mut graph = CircuitGraph::from_layout(&line_layout(0, &[(1, false), (1, true)]))
            .expect("valid layout");
        assert_eq!(
            graph.connect(NodeId(1), NodeId(1), WireId(0), 0.0),
            Err(LinkRefusal::SameNode)
        );
        graph
            .connect(NodeId(1), NodeId(2), WireId(0), 5.0)
            .expect("link");
        assert_eq!(
            graph.connect(NodeId(2), NodeId(1), WireId(1), 5.0),
            Err(LinkRefusal::AlreadyLinked)
        );
        assert_eq!(
            graph.connect(NodeId(2), NodeId(9), WireId(1), 5.0),
            Err(LinkRefusal::UnknownNode(NodeId(9)))
        );
    }

    #[test]
    fn connect_then_disconnect_restores_topology() {
        let mut graph = CircuitGraph::from_layout(&line_layout(0, &[(1, false), (1, true)]))
            .expect("valid layout");
        graph
            .connect(NodeId(0), NodeId(1), WireId(0), 5.0)
            .expect("link");
        let before = graph.topology();
        let degrees_before: Vec<usize> = graph.nodes().iter().map(Node::degree).collect();

        let id = graph
            .connect(NodeId(1), NodeId(2), WireId(1), 5.0)
            .expect("link");
        let removed = graph.disconnect(id).expect("connection exists");
        assert_eq!(removed.other(NodeId(1)), Some(NodeId(2)));

        assert_eq!(graph.topology(), before);
        let degrees_after: Vec<usize> = graph.nodes().iter().map(Node::degree).collect();
        assert_eq!(degrees_after, degrees_before);
        assert!(graph.disconnect(id).is_none());
    }

    #[test]
    fn next_step_skips_incoming_connection() {
        let mut graph = CircuitGraph::from_layout(&line_layout(0, &[(1, false), (1, true)]))
            .expect("valid layout");
        let first = graph
            .connect(NodeId(0), NodeId(1), WireId(0), 5.0)
            .expect("link");
        let second = graph
            .connect(NodeId(1), NodeId(2), WireId(1), 5.0)
            .expect("link");
        assert_eq!(graph.next_step(NodeId(1), first), Some((second, NodeId(2))));
        assert_eq!(graph.next_step(NodeId(2), second), None);
    }

    #[test]
    fn distance_uses_board_units() {
        let graph = CircuitGraph::from_layout(&line_layout(0, &[(1, false), (1, true)]))
            .expect("valid layout");
        let distance = graph.distance(NodeId(0), NodeId(2)).expect("nodes exist");
        assert!((distance - 1.0).abs() < 1e-6);
        assert_eq!(graph.distance(NodeId(0), NodeId(7)), None);
    }
}
