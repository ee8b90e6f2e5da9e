use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::types::{NodeId, WireId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HighlightTarget {
    Node(NodeId),
    Wire(WireId),
}

/// Outline toggles implemented by whatever draws the wire box.
pub trait Highlighter {
    fn select(&mut self, target: HighlightTarget);
    fn deselect(&mut self, target: HighlightTarget);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoHighlight;

impl Highlighter for NoHighlight {
    fn select(&mut self, _target: HighlightTarget) {}

    fn deselect(&mut self, _target: HighlightTarget) {}
}

/// Tracks which targets are currently outlined.
#[derive(Clone, Debug, Default)]
pub struct HighlightSet {
    active: BTreeSet<HighlightTarget>,
}

impl HighlightSet {
    pub fn is_highlighted(&self, target: HighlightTarget) -> bool {
        self.active.contains(&target)
    }

    pub fn active(&self) -> impl Iterator<Item = HighlightTarget> + '_ {
        self.active.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Highlighter for HighlightSet {
    fn select(&mut self, target: HighlightTarget) {
        self.active.insert(target);
    }

    fn deselect(&mut self, target: HighlightTarget) {
        self.active.remove(&target);
    }
}

/// Lets a host keep a handle on the highlighter it gave to a puzzle.
impl<H: Highlighter> Highlighter for Arc<Mutex<H>> {
    fn select(&mut self, target: HighlightTarget) {
        if let Ok(mut inner) = self.lock() {
            inner.select(target);
        }
    }

    fn deselect(&mut self, target: HighlightTarget) {
        if let Ok(mut inner) = self.lock() {
            inner.deselect(target);
        }
    }
}
