//! The linear history of entries and the caches derived from it.
//!
//! History order is narrative order: an entry is visible at index `i` once its
//! position is `<= i`. Revision chains are independent of that order, so
//! "the current revision" of a series is always the member with the greatest
//! history position not exceeding the query index.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{ProgError, ProgResult};
use crate::id::{CategoryId, CharacterId, EntryId, OutputId};
use crate::store::EntityStore;

/// The raw ordered sequence of entry IDs plus the head pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<EntryId>,
    head: Option<usize>,
}

impl History {
    /// Create an empty history with the head before the first entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history from parts, checking the head is in range.
    pub fn from_parts(entries: Vec<EntryId>, head: Option<usize>) -> ProgResult<Self> {
        if let Some(h) = head
            && h >= entries.len()
        {
            return Err(ProgError::IndexOutOfRange {
                index: h,
                len: entries.len(),
            });
        }
        Ok(Self { entries, head })
    }

    /// Entry IDs in narrative order.
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// The head index; `None` means before the first entry.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of an entry, by linear scan. Works on uncommitted edits.
    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| *e == id)
    }

    /// Insert right after the head and move the head onto the new entry.
    pub fn insert_at_head(&mut self, id: EntryId) -> usize {
        let index = self.head.map_or(0, |h| h + 1);
        self.entries.insert(index, id);
        self.head = Some(index);
        index
    }

    /// Insert at a position (clamped to the end). The head shifts right when
    /// the insertion happens at or before it.
    pub fn insert_at(&mut self, index: usize, id: EntryId) -> usize {
        let index = index.min(self.entries.len());
        self.entries.insert(index, id);
        if let Some(h) = self.head
            && index <= h
        {
            self.head = Some(h + 1);
        }
        index
    }

    /// Remove an entry. The head shifts left when the removed position was at
    /// or before it. Returns the old position.
    pub fn remove(&mut self, id: EntryId) -> Option<usize> {
        let index = self.position(id)?;
        self.entries.remove(index);
        if let Some(h) = self.head
            && index <= h
        {
            self.head = h.checked_sub(1);
        }
        Some(index)
    }

    /// Move an entry so it ends up at `target` (clamped). Returns the new
    /// position.
    pub fn move_to(&mut self, id: EntryId, target: usize) -> Option<usize> {
        self.remove(id)?;
        Some(self.insert_at(target, id))
    }

    /// Move the head.
    pub fn set_head(&mut self, head: Option<usize>) -> ProgResult<()> {
        if let Some(h) = head
            && h >= self.entries.len()
        {
            return Err(ProgError::IndexOutOfRange {
                index: h,
                len: self.entries.len(),
            });
        }
        self.head = head;
        Ok(())
    }
}

/// History plus every cache derived from it.
///
/// Mutating methods only edit the raw sequence; call [`HistoryIndex::rebuild`]
/// afterwards. [`crate::campaign::Campaign`] pairs the two through its batch
/// guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryIndex {
    history: History,

    // Derived caches
    positions: HashMap<EntryId, usize>,
    revision_chains: HashMap<EntryId, Vec<EntryId>>,
    revision_index: HashMap<EntryId, EntryId>,
    category_roots: HashMap<(CharacterId, CategoryId), Vec<EntryId>>,
    output_at: BTreeMap<usize, OutputId>,
    output_ranges: HashMap<OutputId, Vec<EntryId>>,
    diagnostics: Vec<Diagnostic>,
}

impl HistoryIndex {
    /// Wrap a history. Caches stay empty until the first rebuild.
    pub fn new(history: History) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    /// The raw history.
    pub fn history(&self) -> &History {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Raw mutation (rebuild afterwards)
    // -----------------------------------------------------------------------

    /// See [`History::insert_at_head`].
    pub fn insert_at_head(&mut self, id: EntryId) -> usize {
        self.history.insert_at_head(id)
    }

    /// See [`History::insert_at`].
    pub fn insert_at(&mut self, index: usize, id: EntryId) -> usize {
        self.history.insert_at(index, id)
    }

    /// See [`History::move_to`].
    pub fn move_entry(&mut self, id: EntryId, target: usize) -> Option<usize> {
        self.history.move_to(id, target)
    }

    /// See [`History::remove`].
    pub fn remove(&mut self, id: EntryId) -> Option<usize> {
        self.history.remove(id)
    }

    /// See [`History::set_head`]. Moving the head invalidates nothing.
    pub fn set_current_index(&mut self, head: Option<usize>) -> ProgResult<()> {
        self.history.set_head(head)
    }

    // -----------------------------------------------------------------------
    // Rebuild
    // -----------------------------------------------------------------------

    /// Recompute every derived cache from the raw history and the store.
    ///
    /// Also reconciles output membership in the store with the ranges the
    /// history now implies. Idempotent.
    pub fn rebuild(&mut self, store: &mut EntityStore, config: &EngineConfig) {
        self.positions.clear();
        self.revision_chains.clear();
        self.revision_index.clear();
        self.category_roots.clear();
        self.output_at.clear();
        self.output_ranges.clear();
        self.diagnostics.clear();

        let entries = self.history.entries.clone();

        for (index, id) in entries.iter().enumerate() {
            if store.entry(*id).is_none() {
                self.report(
                    config,
                    Diagnostic::error(
                        DiagnosticKind::DanglingReference {
                            entry: *id,
                            target: "entry store".into(),
                        },
                        format!("history position {index} holds unknown entry {id}"),
                    ),
                );
                continue;
            }
            if self.positions.contains_key(id) {
                self.report(
                    config,
                    Diagnostic::warning(
                        DiagnosticKind::DanglingReference {
                            entry: *id,
                            target: format!("history position {index}"),
                        },
                        format!("entry {id} appears more than once in history"),
                    ),
                );
                continue;
            }
            self.positions.insert(*id, index);
        }

        for character in store.characters() {
            for category in &character.categories {
                self.category_roots
                    .insert((character.id, *category), Vec::new());
            }
        }

        for id in &entries {
            self.register_series_of(*id, store, config);
        }

        self.reconcile_outputs(&entries, store, config);

        tracing::debug!(
            entries = entries.len(),
            chains = self.revision_chains.len(),
            outputs = self.output_ranges.len(),
            diagnostics = self.diagnostics.len(),
            "rebuilt history caches"
        );
    }

    fn report(&mut self, config: &EngineConfig, diagnostic: Diagnostic) {
        if config.trace_failures {
            tracing::warn!(kind = ?diagnostic.kind, "{}", diagnostic.message);
        }
        self.diagnostics.push(diagnostic);
    }

    /// Materialize the chain containing `id` unless it is already known.
    fn register_series_of(&mut self, id: EntryId, store: &EntityStore, config: &EngineConfig) {
        if self.revision_index.contains_key(&id) || !self.positions.contains_key(&id) {
            return;
        }

        // Walk up to the root.
        let mut root = id;
        let mut seen = HashSet::from([id]);
        while let Some(parent) = store.entry(root).and_then(|e| e.parent) {
            if !self.positions.contains_key(&parent) {
                self.report(
                    config,
                    Diagnostic::warning(
                        DiagnosticKind::DanglingReference {
                            entry: root,
                            target: parent.to_string(),
                        },
                        format!("entry {root} names missing parent {parent}"),
                    ),
                );
                break;
            }
            if !seen.insert(parent) {
                self.report(
                    config,
                    Diagnostic::error(
                        DiagnosticKind::CyclicChain { entry: id },
                        format!("revision chain of entry {id} loops back on itself"),
                    ),
                );
                self.register_chain(id, vec![id], store);
                return;
            }
            root = parent;
        }

        if self.revision_index.contains_key(&root) {
            self.report(
                config,
                Diagnostic::warning(
                    DiagnosticKind::DanglingReference {
                        entry: id,
                        target: root.to_string(),
                    },
                    format!("entry {id} is not reachable from its root {root}"),
                ),
            );
            self.register_chain(id, vec![id], store);
            return;
        }

        // Walk down to the leaf.
        let mut chain = vec![root];
        let mut seen = HashSet::from([root]);
        let mut current = root;
        while let Some(child) = store.entry(current).and_then(|e| e.child) {
            let back_link = store.entry(child).and_then(|e| e.parent);
            if !self.positions.contains_key(&child) || back_link != Some(current) {
                self.report(
                    config,
                    Diagnostic::warning(
                        DiagnosticKind::DanglingReference {
                            entry: current,
                            target: child.to_string(),
                        },
                        format!("entry {current} names child {child} which does not link back"),
                    ),
                );
                break;
            }
            if !seen.insert(child) || self.revision_index.contains_key(&child) {
                self.report(
                    config,
                    Diagnostic::error(
                        DiagnosticKind::CyclicChain { entry: child },
                        format!("revision chain of entry {root} loops back on itself"),
                    ),
                );
                break;
            }
            chain.push(child);
            current = child;
        }

        let reached = chain.contains(&id);
        self.register_chain(root, chain, store);
        if !reached {
            self.report(
                config,
                Diagnostic::warning(
                    DiagnosticKind::DanglingReference {
                        entry: id,
                        target: root.to_string(),
                    },
                    format!("entry {id} is not reachable from its root {root}"),
                ),
            );
            self.register_chain(id, vec![id], store);
        }
    }

    fn register_chain(&mut self, root: EntryId, chain: Vec<EntryId>, store: &EntityStore) {
        for member in &chain {
            self.revision_index.insert(*member, root);
        }
        if let Some(entry) = store.entry(root) {
            self.category_roots
                .entry((entry.character, entry.category))
                .or_default()
                .push(root);
        }
        self.revision_chains.insert(root, chain);
    }

    fn reconcile_outputs(
        &mut self,
        entries: &[EntryId],
        store: &mut EntityStore,
        config: &EngineConfig,
    ) {
        let mut previous: Option<usize> = None;
        for (index, id) in entries.iter().enumerate() {
            if self.positions.get(id) != Some(&index) {
                continue;
            }
            let Some(output) = store.entry(*id).and_then(|e| e.output) else {
                continue;
            };
            if store.output(output).is_none() || self.output_ranges.contains_key(&output) {
                self.report(
                    config,
                    Diagnostic::warning(
                        DiagnosticKind::UnknownOutput { entry: *id, output },
                        format!("entry {id} carries unknown or duplicate output {output}"),
                    ),
                );
                continue;
            }

            let start = previous.map_or(0, |p| p + 1);
            let range: Vec<EntryId> = entries[start..=index]
                .iter()
                .enumerate()
                .filter(|(offset, e)| self.positions.get(*e) == Some(&(start + offset)))
                .map(|(_, e)| *e)
                .collect();
            self.output_at.insert(index, output);
            self.output_ranges.insert(output, range);
            previous = Some(index);
        }

        for output in store.outputs_mut() {
            let range = self
                .output_ranges
                .get(&output.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            output.reconcile(range);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The head index; `None` means before the first entry.
    pub fn current_index(&self) -> Option<usize> {
        self.history.head
    }

    /// Number of entries in history.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True if history is empty.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Entry IDs in narrative order.
    pub fn entries(&self) -> &[EntryId] {
        self.history.entries()
    }

    /// The entry at a history index.
    pub fn entry_at(&self, index: usize) -> Option<EntryId> {
        self.history.entries.get(index).copied()
    }

    /// The history index of an entry.
    pub fn index_of(&self, id: EntryId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Root of the series containing an entry.
    pub fn root_of(&self, id: EntryId) -> Option<EntryId> {
        self.revision_index.get(&id).copied()
    }

    /// All members of the series containing an entry, parent to child.
    pub fn chain_of(&self, id: EntryId) -> Option<&[EntryId]> {
        self.root_of(id)
            .and_then(|root| self.revision_chains.get(&root))
            .map(Vec::as_slice)
    }

    /// Root entries of every series, keyed by root.
    pub fn chains(&self) -> impl Iterator<Item = (EntryId, &[EntryId])> {
        self.revision_chains
            .iter()
            .map(|(root, chain)| (*root, chain.as_slice()))
    }

    /// The member of `id`'s series with the greatest history index not
    /// exceeding `index`, or `None` if every member comes later.
    pub fn most_recent_in_series_up_to(&self, id: EntryId, index: usize) -> Option<EntryId> {
        self.chain_of(id)?
            .iter()
            .filter_map(|member| self.positions.get(member).map(|p| (*p, *member)))
            .filter(|(position, _)| *position <= index)
            .max_by_key(|(position, _)| *position)
            .map(|(_, member)| member)
    }

    /// [`Self::most_recent_in_series_up_to`] at the head.
    pub fn most_recent_in_series(&self, id: EntryId) -> Option<EntryId> {
        self.current_index()
            .and_then(|head| self.most_recent_in_series_up_to(id, head))
    }

    /// Series roots for a (character, category) pair, in order of first
    /// appearance in history.
    pub fn category_roots(
        &self,
        character: CharacterId,
        category: CategoryId,
    ) -> Option<&[EntryId]> {
        self.category_roots
            .get(&(character, category))
            .map(Vec::as_slice)
    }

    /// The output whose range ends at a history index.
    pub fn output_at(&self, index: usize) -> Option<OutputId> {
        self.output_at.get(&index).copied()
    }

    /// Entries covered by an output's range, in history order.
    pub fn output_range(&self, output: OutputId) -> Option<&[EntryId]> {
        self.output_ranges.get(&output).map(Vec::as_slice)
    }

    /// Outputs with a range, ordered by the index their range ends at.
    pub fn outputs(&self) -> impl Iterator<Item = (usize, OutputId)> + '_ {
        self.output_at.iter().map(|(index, output)| (*index, *output))
    }

    /// Problems found during the last rebuild.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
