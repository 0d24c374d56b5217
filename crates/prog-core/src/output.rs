use serde::{Deserialize, Serialize};

use crate::id::{EntryId, OutputId};

/// A curated export range over a contiguous slice of history.
///
/// The range ends at the entry tagged with this output and starts right after
/// the previous tagged entry. Users pick which entries of the range are
/// exported (`included`) and which are not (`ignored`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Unique identifier for this output.
    pub id: OutputId,
    /// Display name.
    pub name: String,
    /// Export target identifier (sheet name, file, ...).
    pub target: String,
    /// Entries exported from the range, in export order.
    pub included: Vec<EntryId>,
    /// Entries of the range the user chose not to export.
    pub ignored: Vec<EntryId>,
}

impl Output {
    /// Create an output with empty membership.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: OutputId::new(),
            name: name.into(),
            target: target.into(),
            included: Vec::new(),
            ignored: Vec::new(),
        }
    }

    /// Whether the output remembers an entry in either list.
    pub fn remembers(&self, entry: EntryId) -> bool {
        self.included.contains(&entry) || self.ignored.contains(&entry)
    }

    /// Align membership with the entries the range currently covers.
    ///
    /// Entries that left the range are forgotten; entries new to the range
    /// are ignored until the user includes them. Existing curation survives.
    pub fn reconcile(&mut self, range: &[EntryId]) {
        self.included.retain(|id| range.contains(id));
        let included = &self.included;
        self.ignored
            .retain(|id| range.contains(id) && !included.contains(id));
        for id in range {
            if !self.remembers(*id) {
                self.ignored.push(*id);
            }
        }
    }

    /// Move an entry between the lists. Returns false if the entry is not
    /// remembered by this output.
    pub fn set_included(&mut self, entry: EntryId, included: bool) -> bool {
        if !self.remembers(entry) {
            return false;
        }
        self.included.retain(|id| *id != entry);
        self.ignored.retain(|id| *id != entry);
        if included {
            self.included.push(entry);
        } else {
            self.ignored.push(entry);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_adds_new_entries_as_ignored() {
        let (a, b) = (EntryId::new(), EntryId::new());
        let mut out = Output::new("Session 1", "sheet");
        out.included.push(a);
        out.reconcile(&[a, b]);
        assert_eq!(out.included, vec![a]);
        assert_eq!(out.ignored, vec![b]);
    }

    #[test]
    fn reconcile_purges_vanished_entries() {
        let (a, b, c) = (EntryId::new(), EntryId::new(), EntryId::new());
        let mut out = Output::new("Session 1", "sheet");
        out.included = vec![a, b];
        out.ignored = vec![c];
        out.reconcile(&[b]);
        assert_eq!(out.included, vec![b]);
        assert!(out.ignored.is_empty());
    }

    #[test]
    fn set_included_moves_between_lists() {
        let a = EntryId::new();
        let mut out = Output::new("Session 1", "sheet");
        out.reconcile(&[a]);
        assert!(out.set_included(a, true));
        assert_eq!(out.included, vec![a]);
        assert!(out.ignored.is_empty());
        assert!(!out.set_included(EntryId::new(), true));
    }
}
