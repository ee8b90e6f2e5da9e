use crate::error::SetupError;
use crate::layout::PuzzleLayout;
use crate::types::{IgnoreReason, WireId, WireView};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WireEntry {
    pub id: WireId,
    pub length: f32,
    pub available: bool,
}

/// Wire segments on offer, with at most one selected at a time.
#[derive(Clone, Debug)]
pub struct WireCatalog {
    entries: Vec<WireEntry>,
    selected: Option<WireId>,
}

impl WireCatalog {
    pub fn from_layout(layout: &PuzzleLayout) -> Result<Self, SetupError> {
        layout.validate()?;
        let entries = layout
            .wires
            .iter()
            .enumerate()
            .map(|(index, spec)| WireEntry {
                id: WireId(index),
                length: spec.length,
                available: true,
            })
            .collect();
        Ok(Self {
            entries,
            selected: None,
        })
    }

    pub fn entry(&self, id: WireId) -> Option<&WireEntry> {
        self.entries.get(id.0)
    }

    pub fn entries(&self) -> &[WireEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<WireId> {
        self.selected
    }

    pub fn selected_entry(&self) -> Option<WireEntry> {
        self.selected.and_then(|id| self.entry(id).copied())
    }

    /// Returns the previously selected wire, if any.
    pub fn select(&mut self, id: WireId) -> Result<Option<WireId>, IgnoreReason> {
        let entry = self.entry(id).ok_or(IgnoreReason::UnknownTarget)?;
        if !entry.available {
            return Err(IgnoreReason::WireUnavailable);
        }
        Ok(self.selected.replace(id))
    }

    pub fn deselect(&mut self, id: WireId) -> bool {
        if self.selected != Some(id) {
            return false;
        }
        self.selected = None;
        true
    }

    pub fn consume(&mut self, id: WireId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.available = false;
        }
        self.deselect(id);
    }

    pub fn restore(&mut self, id: WireId) -> bool {
        match self.entries.get_mut(id.0) {
            Some(entry) if !entry.available => {
                entry.available = true;
                true
            }
            _ => false,
        }
    }

    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.available).count()
    }

    pub fn views(&self) -> Vec<WireView> {
        self.entries
            .iter()
            .map(|entry| WireView {
                id: entry.id,
                length: entry.length,
                available: entry.available,
                selected: self.selected == Some(entry.id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::line_layout;

    fn catalog() -> WireCatalog {
        WireCatalog::from_layout(&line_layout(0, &[(1, false), (1, true)])).expect("valid layout")
    }

    #[test]
    fn selecting_switches_and_reports_previous() {
        let mut catalog = catalog();
        assert_eq!(catalog.select(WireId(0)), Ok(None));
        assert_eq!(catalog.select(WireId(1)), Ok(Some(WireId(0))));
        assert_eq!(catalog.selected(), Some(WireId(1)));
        assert_eq!(catalog.views().iter().filter(|view| view.selected).count(), 1);
    }

    #[test]
    fn deselect_only_clears_matching_wire() {
        let mut catalog = catalog();
        catalog.select(WireId(2)).expect("select");
        assert!(!catalog.deselect(WireId(0)));
        assert_eq!(catalog.selected(), Some(WireId(2)));
        assert!(catalog.deselect(WireId(2)));
        assert_eq!(catalog.selected(), None);
    }

    #[test]
    fn consumed_wire_cannot_be_selected_until_restored() {
        let mut catalog = catalog();
        catalog.select(WireId(0)).expect("select");
        catalog.consume(WireId(0));
        assert_eq!(catalog.selected(), None);
        assert_eq!(catalog.select(WireId(0)), Err(IgnoreReason::WireUnavailable));
        assert_eq!(catalog.available_count(), 2);

        assert!(catalog.restore(WireId(0)));
        assert!(!catalog.restore(WireId(0)));
        assert_eq!(catalog.select(WireId(0)), Ok(None));
    }

    #[test]
    fn unknown_wire_is_rejected() {
        let mut catalog = catalog();
        assert_eq!(catalog.select(WireId(42)), Err(IgnoreReason::UnknownTarget));
        assert_eq!(catalog.selected(), None);
    }
}
