use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub usize);

/// Opaque handle for a puzzle identifier, issued by `PuzzleRegistry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PuzzleKey(pub(crate) u32);

impl PuzzleKey {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeSign {
    Neutral,
    Positive,
    Negative,
}

impl ChargeSign {
    pub fn of(total: i32) -> Self {
        match total.signum() {
            0 => Self::Neutral,
            1 => Self::Positive,
            _ => Self::Negative,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Refund,
    Discard,
}

impl RemovalPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "refund" => Some(Self::Refund),
            "discard" => Some(Self::Discard),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    OnChange,
    Polling,
}

/// What a pointer hit resolved to. Ray casting happens in the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ClickTarget {
    Node(NodeId),
    Wire(WireId),
    Connection(ConnectionId),
    Nothing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NoWireSelected,
    NodeFull,
    WireUnavailable,
    AlreadyLinked,
    UnknownTarget,
    NothingHit,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    Ignored {
        reason: IgnoreReason,
    },
    WireSelected {
        wire: WireId,
    },
    WireDeselected {
        wire: WireId,
    },
    Anchored {
        node: NodeId,
    },
    AnchorCancelled {
        node: NodeId,
    },
    Connected {
        connection: ConnectionId,
    },
    Rejected {
        distance: f32,
        #[serde(rename = "maxLength")]
        max_length: f32,
    },
    Removed {
        connection: ConnectionId,
    },
}

impl ClickOutcome {
    pub fn changed_edges(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Removed { .. })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub voltage: i32,
    pub end: bool,
    pub output: bool,
    pub connections: Vec<ConnectionId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WireView {
    pub id: WireId,
    pub length: f32,
    pub available: bool,
    pub selected: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConnectionView {
    pub id: ConnectionId,
    pub a: NodeId,
    pub b: NodeId,
    pub wire: WireId,
    #[serde(rename = "lengthUsed")]
    pub length_used: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChargeDisplay {
    pub total: i32,
    pub target: i32,
    pub sign: ChargeSign,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PuzzleEvent {
    WireSelected {
        wire: WireId,
    },
    WireDeselected {
        wire: WireId,
    },
    AnchorSet {
        node: NodeId,
    },
    AnchorCleared {
        node: NodeId,
    },
    ConnectionPlaced {
        connection: ConnectionId,
        a: NodeId,
        b: NodeId,
        wire: WireId,
    },
    ConnectionRejected {
        a: NodeId,
        b: NodeId,
        distance: f32,
        #[serde(rename = "maxLength")]
        max_length: f32,
    },
    ConnectionRemoved {
        connection: ConnectionId,
        refunded: bool,
    },
    ChargeChanged {
        charge: ChargeDisplay,
    },
    PuzzleCompleted {
        puzzle: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct PuzzleSnapshot {
    pub tick: u64,
    pub puzzle: String,
    pub completed: bool,
    #[serde(rename = "selectedWire")]
    pub selected_wire: Option<WireId>,
    pub anchor: Option<NodeId>,
    pub charge: ChargeDisplay,
    pub nodes: Vec<NodeView>,
    pub wires: Vec<WireView>,
    pub connections: Vec<ConnectionView>,
    pub events: Vec<PuzzleEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PuzzleSummary {
    pub name: String,
    pub completed: bool,
    #[serde(rename = "nodeCount")]
    pub node_count: usize,
    #[serde(rename = "wireCount")]
    pub wire_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_sign_follows_total() {
        assert_eq!(ChargeSign::of(0), ChargeSign::Neutral);
        assert_eq!(ChargeSign::of(6), ChargeSign::Positive);
        assert_eq!(ChargeSign::of(-2), ChargeSign::Negative);
    }

    #[test]
    fn click_target_uses_kind_and_id() {
        let target: ClickTarget =
            serde_json::from_str(r#"{"kind":"node","id":3}"#).expect("valid target");
        assert_eq!(target, ClickTarget::Node(NodeId(3)));
        let nothing: ClickTarget =
            serde_json::from_str(r#"{"kind":"nothing"}"#).expect("valid target");
        assert_eq!(nothing, ClickTarget::Nothing);
    }

    #[test]
    fn removal_policy_parse_rejects_unknown_values() {
        assert_eq!(RemovalPolicy::parse("refund"), Some(RemovalPolicy::Refund));
        assert_eq!(RemovalPolicy::parse("discard"), Some(RemovalPolicy::Discard));
        assert_eq!(RemovalPolicy::parse("keep"), None);
    }
}
