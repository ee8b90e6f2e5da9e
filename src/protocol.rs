use serde_json::{Map, Value};

use crate::types::{ClickTarget, ConnectionId, NodeId, WireId};

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Hello { puzzle: String },
    Click { target: ClickTarget },
    SelectWire { wire: WireId },
    DeselectWire { wire: WireId },
    Ping { t: f64 },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let puzzle = object.get("puzzle")?.as_str()?.trim().to_string();
            if puzzle.is_empty() {
                return None;
            }
            Some(ParsedClientMessage::Hello { puzzle })
        }
        "click" => {
            let target = parse_target(object.get("target")?.as_object()?)?;
            Some(ParsedClientMessage::Click { target })
        }
        "select_wire" => {
            let wire = WireId(parse_index(object.get("wire")?)?);
            Some(ParsedClientMessage::SelectWire { wire })
        }
        "deselect_wire" => {
            let wire = WireId(parse_index(object.get("wire")?)?);
            Some(ParsedClientMessage::DeselectWire { wire })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_target(object: &Map<String, Value>) -> Option<ClickTarget> {
    let kind = object.get("kind")?.as_str()?;
    if kind == "nothing" {
        return Some(ClickTarget::Nothing);
    }
    let index = parse_index(object.get("id")?)?;
    match kind {
        "node" => Some(ClickTarget::Node(NodeId(index))),
        "wire" => Some(ClickTarget::Wire(WireId(index))),
        "connection" => Some(ClickTarget::Connection(ConnectionId(index))),
        _ => None,
    }
}

fn parse_index(value: &Value) -> Option<usize> {
    if let Some(number) = value.as_u64() {
        return usize::try_from(number).ok();
    }
    let number = value.as_f64()?;
    if !number.is_finite() || number < 0.0 || number.fract() != 0.0 {
        return None;
    }
    if number > u32::MAX as f64 {
        return None;
    }
    Some(number as usize)
}
