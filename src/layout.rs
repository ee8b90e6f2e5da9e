use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, SetupError};
use crate::types::Vec2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub x: f32,
    pub y: f32,
    pub voltage: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub x: f32,
    pub y: f32,
    pub voltage: i32,
    #[serde(default)]
    pub end: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireSpec {
    pub length: f32,
}

/// Authored description of one wire box: fixed nodes and the wire catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PuzzleLayout {
    pub name: String,
    pub output: OutputSpec,
    pub nodes: Vec<NodeSpec>,
    pub wires: Vec<WireSpec>,
}

impl PuzzleLayout {
    pub fn validate(&self) -> Result<(), SetupError> {
        let puzzle = self.name.trim();
        if puzzle.is_empty() {
            return Err(SetupError::EmptyName);
        }
        let puzzle = puzzle.to_string();
        if self.nodes.is_empty() {
            return Err(SetupError::NoNodes { puzzle });
        }
        if self.wires.is_empty() {
            return Err(SetupError::NoWires { puzzle });
        }
        if !Vec2::new(self.output.x, self.output.y).is_finite() {
            return Err(SetupError::InvalidPosition { puzzle, index: 0 });
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if !Vec2::new(node.x, node.y).is_finite() {
                return Err(SetupError::InvalidPosition {
                    puzzle,
                    index: index + 1,
                });
            }
        }
        // Any path sum is bounded by the sum of magnitudes.
        let magnitude: i64 = self
            .nodes
            .iter()
            .map(|node| i64::from(node.voltage).abs())
            .sum();
        if magnitude > i64::from(i32::MAX) {
            return Err(SetupError::VoltageOverflow { puzzle });
        }
        if !self.nodes.iter().any(|node| node.end) {
            return Err(SetupError::NoEndNode { puzzle });
        }
        for (index, wire) in self.wires.iter().enumerate() {
            if !wire.length.is_finite() || wire.length <= 0.0 {
                return Err(SetupError::InvalidWireLength {
                    puzzle,
                    index,
                    length: wire.length,
                });
            }
        }
        Ok(())
    }
}

pub fn load_layout(path: &Path) -> Result<PuzzleLayout, LayoutError> {
    let text = fs::read_to_string(path).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let layout: PuzzleLayout =
        serde_json::from_str(&text).map_err(|source| LayoutError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    layout.validate().map_err(|source| LayoutError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(layout)
}

/// Loads every `*.json` file in `dir`, ordered by file name.
pub fn load_layout_dir(dir: &Path) -> Result<Vec<PuzzleLayout>, LayoutError> {
    let entries = fs::read_dir(dir).map_err(|source| LayoutError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LayoutError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut layouts = Vec::with_capacity(paths.len());
    let mut seen = HashSet::new();
    for path in paths {
        let layout = load_layout(&path)?;
        let key = layout.name.trim().to_lowercase();
        if !seen.insert(key) {
            return Err(SetupError::DuplicatePuzzle(layout.name.trim().to_string()).into());
        }
        log::debug!("loaded puzzle '{}' from {}", layout.name, path.display());
        layouts.push(layout);
    }
    Ok(layouts)
}

pub fn demo_layouts() -> Vec<PuzzleLayout> {
    vec![
        PuzzleLayout {
            name: "generator_room".to_string(),
            output: OutputSpec {
                x: 0.0,
                y: 0.0,
                voltage: 5,
            },
            nodes: vec![
                node(0.6, 0.0, 3, false),
                node(1.2, 0.0, 2, true),
                node(0.6, 0.6, -1, false),
                node(1.2, 0.6, 4, true),
            ],
            wires: vec![wire(8.0), wire(8.0), wire(6.5)],
        },
        PuzzleLayout {
            name: "basement_fuse".to_string(),
            output: OutputSpec {
                x: 0.0,
                y: 0.0,
                voltage: 1,
            },
            nodes: vec![
                node(0.5, 0.0, 4, false),
                node(0.5, 0.5, -2, false),
                node(1.0, 0.5, -1, true),
                node(1.0, 0.0, 2, true),
                node(0.0, 0.5, 3, false),
            ],
            wires: vec![wire(6.0), wire(6.0), wire(6.0), wire(9.0)],
        },
    ]
}

fn node(x: f32, y: f32, voltage: i32, end: bool) -> NodeSpec {
    NodeSpec { x, y, voltage, end }
}

fn wire(length: f32) -> WireSpec {
    WireSpec { length }
}
