//! The campaign session: the only place store, history, and dynamic data
//! change together.
//!
//! Every command runs inside a [`Batch`]. Dropping the batch rebuilds the
//! history caches when the structure changed and recomputes dynamic data
//! once, so a caller can group any number of commands without ever leaving
//! the caches stale.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{Category, FieldEdit};
use crate::character::Character;
use crate::config::EngineConfig;
use crate::diagnostics::Diagnostic;
use crate::dynamic::DynamicData;
use crate::entry::Entry;
use crate::error::{ProgError, ProgResult};
use crate::history::{History, HistoryIndex};
use crate::id::{CategoryId, CharacterId, EntryId, OutputId};
use crate::interpolate;
use crate::output::Output;
use crate::snapshot::Snapshot;
use crate::store::EntityStore;

/// Metadata about a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMeta {
    /// Campaign name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Game system, e.g. "D&D 5e".
    pub system: Option<String>,
    /// When the campaign was created.
    pub created_at: DateTime<Utc>,
    /// When a command last changed the campaign.
    pub updated_at: DateTime<Utc>,
}

impl CampaignMeta {
    /// Create metadata stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: String::new(),
            system: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The whole campaign as one serde value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignData {
    /// Campaign metadata.
    pub meta: CampaignMeta,
    /// Engine settings.
    #[serde(default)]
    pub config: EngineConfig,
    /// Characters in display order.
    pub characters: Vec<Character>,
    /// All categories.
    pub categories: Vec<Category>,
    /// All entries, in history order.
    pub entries: Vec<Entry>,
    /// All outputs.
    pub outputs: Vec<Output>,
    /// The timeline and head.
    pub history: History,
}

/// A campaign session.
#[derive(Debug, Clone)]
pub struct Campaign {
    /// Campaign metadata.
    pub meta: CampaignMeta,
    store: EntityStore,
    history: HistoryIndex,
    dynamic: DynamicData,
    config: EngineConfig,
}

impl Campaign {
    /// Create an empty campaign with default settings.
    pub fn new(meta: CampaignMeta) -> Self {
        Self::with_config(meta, EngineConfig::default())
    }

    /// Create an empty campaign with the given settings.
    pub fn with_config(meta: CampaignMeta, config: EngineConfig) -> Self {
        Self {
            meta,
            store: EntityStore::new(),
            history: HistoryIndex::default(),
            dynamic: DynamicData::new(),
            config,
        }
    }

    /// Build a campaign from its serde form, checking the invariants the
    /// caches rely on.
    pub fn from_data(data: CampaignData) -> ProgResult<Self> {
        let CampaignData {
            meta,
            config,
            characters,
            categories,
            entries,
            outputs,
            history,
        } = data;

        let history = History::from_parts(history.entries().to_vec(), history.head())?;

        let mut store = EntityStore::new();
        for category in categories {
            store.add_category(category);
        }
        for character in characters {
            store.add_character(character)?;
        }
        for output in outputs {
            store.add_output(output);
        }
        for entry in entries {
            if store.entry(entry.id).is_some() {
                return Err(ProgError::Validation(format!(
                    "entry {} is listed twice",
                    entry.id
                )));
            }
            let assigned = store
                .character(entry.character)
                .is_some_and(|c| c.participates_in(entry.category));
            if !assigned && store.character(entry.character).is_some() {
                return Err(ProgError::CategoryNotAssigned {
                    character: entry.character,
                    category: entry.category,
                });
            }
            store.add_entry(entry)?;
        }

        validate(&store, &history)?;

        let mut campaign = Self {
            meta,
            store,
            history: HistoryIndex::new(history),
            dynamic: DynamicData::new(),
            config,
        };
        campaign.refresh(true);
        Ok(campaign)
    }

    /// Export the campaign. Entries come out in history order.
    pub fn to_data(&self) -> CampaignData {
        let mut categories: Vec<Category> = self.store.categories().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let entries = self
            .history
            .entries()
            .iter()
            .filter_map(|id| self.store.entry(*id))
            .cloned()
            .collect();

        let mut outputs: Vec<Output> = self.store.outputs().cloned().collect();
        outputs.sort_by_key(|o| (self.output_index(o.id), o.name.clone(), o.id));

        CampaignData {
            meta: self.meta.clone(),
            config: self.config.clone(),
            characters: self.store.characters().cloned().collect(),
            categories,
            entries,
            outputs,
            history: self.history.history().clone(),
        }
    }

    /// Start a group of commands. Caches refresh once when the batch drops.
    pub fn batch(&mut self) -> Batch<'_> {
        Batch {
            campaign: self,
            structural: false,
            dirty: false,
        }
    }

    fn refresh(&mut self, structural: bool) {
        if structural {
            self.history.rebuild(&mut self.store, &self.config);
        }
        self.dynamic
            .recompute(&self.history, &self.store, &self.config);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The entity store.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// The history index and its caches.
    pub fn index(&self) -> &HistoryIndex {
        &self.history
    }

    /// The dynamic data tables.
    pub fn dynamic(&self) -> &DynamicData {
        &self.dynamic
    }

    /// Entry IDs in narrative order.
    pub fn history(&self) -> &[EntryId] {
        self.history.entries()
    }

    /// The head index; `None` means before the first entry.
    pub fn current_index(&self) -> Option<usize> {
        self.history.current_index()
    }

    /// The entry at a history index.
    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        self.history
            .entry_at(index)
            .and_then(|id| self.store.entry(id))
    }

    /// Get an entry by ID.
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.store.entry(id)
    }

    /// Get a character by ID.
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.store.character(id)
    }

    /// Find a character by name (case-insensitive).
    pub fn find_character(&self, name: &str) -> Option<&Character> {
        self.store.find_character(name)
    }

    /// Get a category by ID.
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.store.category(id)
    }

    /// Get an output by ID.
    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.store.output(id)
    }

    /// The current revision of an entry's series at the head.
    pub fn most_recent_in_series(&self, id: EntryId) -> Option<EntryId> {
        self.history.most_recent_in_series(id)
    }

    /// The revision of an entry's series visible at `index`.
    pub fn most_recent_in_series_up_to(&self, id: EntryId, index: usize) -> Option<EntryId> {
        self.history.most_recent_in_series_up_to(id, index)
    }

    /// The visible revision of every series a character has in a category,
    /// at `at_index` or the head.
    pub fn entries_visible_for(
        &self,
        character: CharacterId,
        category: CategoryId,
        at_index: Option<usize>,
    ) -> Vec<EntryId> {
        let Some(index) = at_index.or(self.current_index()) else {
            return Vec::new();
        };
        self.history
            .category_roots(character, category)
            .unwrap_or_default()
            .iter()
            .filter_map(|root| self.history.most_recent_in_series_up_to(*root, index))
            .collect()
    }

    /// A character's variables right after `index`.
    pub fn snapshot(&self, character: CharacterId, index: usize) -> ProgResult<&Snapshot> {
        self.dynamic.snapshot(character, index)
    }

    /// Substitute a character's variables into `text`, as of `index` or the
    /// head. Before the first entry every placeholder is missing.
    pub fn translate(
        &self,
        text: &str,
        character: CharacterId,
        index: Option<usize>,
    ) -> ProgResult<String> {
        if self.store.character(character).is_none() {
            return Err(ProgError::CharacterNotFound(character));
        }
        let empty = Snapshot::new();
        let snapshot = match index.or(self.current_index()) {
            Some(i) => self.dynamic.snapshot(character, i)?,
            None => &empty,
        };
        Ok(interpolate::translate_with(
            text,
            |key| snapshot.get(key).map(ToString::to_string),
            &self.config.missing_value_text,
        ))
    }

    /// Render an entry through its category's creation or update template.
    ///
    /// Field names resolve to the entry's own values, anything else to the
    /// owner's variables at the entry's position. An empty template falls
    /// back to the raw field values.
    pub fn describe_entry(&self, id: EntryId) -> Option<String> {
        let entry = self.store.entry(id)?;
        let category = self.store.category(entry.category)?;
        let template = if entry.is_root() {
            &category.creation_template
        } else {
            &category.update_template
        };
        if template.trim().is_empty() {
            return Some(entry.values.join(" | "));
        }
        let snapshot = self
            .history
            .index_of(id)
            .and_then(|i| self.dynamic.snapshot(entry.character, i).ok());
        Some(interpolate::translate_with(
            template,
            |name| {
                entry
                    .field(category, name)
                    .map(str::to_string)
                    .or_else(|| snapshot.and_then(|s| s.get(name)).map(ToString::to_string))
            },
            &self.config.missing_value_text,
        ))
    }

    /// Everything the last rebuild and recompute reported.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.history
            .diagnostics()
            .iter()
            .chain(self.dynamic.diagnostics())
    }

    fn output_index(&self, output: OutputId) -> Option<usize> {
        self.history
            .outputs()
            .find(|(_, o)| *o == output)
            .map(|(i, _)| i)
    }

    // -----------------------------------------------------------------------
    // Commands (each one a batch of its own)
    // -----------------------------------------------------------------------

    /// See [`Batch::add_character`].
    pub fn add_character(&mut self, character: Character) -> ProgResult<CharacterId> {
        self.batch().add_character(character)
    }

    /// See [`Batch::remove_character`].
    pub fn remove_character(&mut self, id: CharacterId) -> ProgResult<Character> {
        self.batch().remove_character(id)
    }

    /// See [`Batch::add_category`].
    pub fn add_category(&mut self, category: Category) -> CategoryId {
        self.batch().add_category(category)
    }

    /// See [`Batch::delete_category`].
    pub fn delete_category(&mut self, id: CategoryId) -> ProgResult<Category> {
        self.batch().delete_category(id)
    }

    /// See [`Batch::assign_category`].
    pub fn assign_category(
        &mut self,
        character: CharacterId,
        category: CategoryId,
    ) -> ProgResult<bool> {
        self.batch().assign_category(character, category)
    }

    /// See [`Batch::unassign_category`].
    pub fn unassign_category(
        &mut self,
        character: CharacterId,
        category: CategoryId,
    ) -> ProgResult<usize> {
        self.batch().unassign_category(character, category)
    }

    /// See [`Batch::edit_category`].
    pub fn edit_category(&mut self, category: Category, edits: &[FieldEdit]) -> ProgResult<()> {
        self.batch().edit_category(category, edits)
    }

    /// See [`Batch::add_entry_at_head`].
    pub fn add_entry_at_head(&mut self, entry: Entry) -> ProgResult<EntryId> {
        self.batch().add_entry_at_head(entry)
    }

    /// See [`Batch::update_entry`].
    pub fn update_entry(&mut self, previous: EntryId, entry: Entry) -> ProgResult<EntryId> {
        self.batch().update_entry(previous, entry)
    }

    /// See [`Batch::edit_entry`].
    pub fn edit_entry(&mut self, entry: Entry) -> ProgResult<()> {
        self.batch().edit_entry(entry)
    }

    /// See [`Batch::move_entry`].
    pub fn move_entry(&mut self, id: EntryId, target: usize) -> ProgResult<usize> {
        self.batch().move_entry(id, target)
    }

    /// See [`Batch::delete_entry`].
    pub fn delete_entry(&mut self, id: EntryId) -> ProgResult<Entry> {
        self.batch().delete_entry(id)
    }

    /// See [`Batch::delete_entry_series`].
    pub fn delete_entry_series(&mut self, id: EntryId) -> ProgResult<Vec<Entry>> {
        self.batch().delete_entry_series(id)
    }

    /// See [`Batch::add_output`].
    pub fn add_output(&mut self, output: Output, tag: EntryId) -> ProgResult<OutputId> {
        self.batch().add_output(output, tag)
    }

    /// See [`Batch::delete_output`].
    pub fn delete_output(&mut self, id: OutputId) -> ProgResult<Output> {
        self.batch().delete_output(id)
    }

    /// See [`Batch::set_output_inclusion`].
    pub fn set_output_inclusion(
        &mut self,
        output: OutputId,
        entry: EntryId,
        included: bool,
    ) -> ProgResult<bool> {
        self.batch().set_output_inclusion(output, entry, included)
    }

    /// See [`Batch::set_current_index`].
    pub fn set_current_index(&mut self, head: Option<usize>) -> ProgResult<()> {
        self.batch().set_current_index(head)
    }
}

/// Check the structural invariants of a freshly loaded campaign.
fn validate(store: &EntityStore, history: &History) -> ProgResult<()> {
    let mut seen = HashSet::new();
    for id in history.entries() {
        if store.entry(*id).is_none() {
            return Err(ProgError::EntryNotFound(*id));
        }
        if !seen.insert(*id) {
            return Err(ProgError::Validation(format!(
                "entry {id} appears twice in history"
            )));
        }
    }

    let mut tagged = HashSet::new();
    for entry in store.entries() {
        if !seen.contains(&entry.id) {
            return Err(ProgError::Validation(format!(
                "entry {} is missing from history",
                entry.id
            )));
        }
        if let Some(child) = entry.child
            && store.entry(child).and_then(|c| c.parent) != Some(entry.id)
        {
            return Err(ProgError::Validation(format!(
                "entry {} names child {child} which does not link back",
                entry.id
            )));
        }
        if let Some(parent) = entry.parent
            && store.entry(parent).and_then(|p| p.child) != Some(entry.id)
        {
            return Err(ProgError::Validation(format!(
                "entry {} names parent {parent} which does not link back",
                entry.id
            )));
        }
        if let Some(output) = entry.output {
            if store.output(output).is_none() {
                return Err(ProgError::OutputNotFound(output));
            }
            if !tagged.insert(output) {
                return Err(ProgError::Validation(format!(
                    "output {output} closes more than one range"
                )));
            }
        }
    }
    Ok(())
}

/// A group of commands whose cache refresh is deferred to drop.
///
/// Within a batch, history positions and revision links are read from the
/// raw data, so commands see each other's effects before the caches catch up.
pub struct Batch<'a> {
    campaign: &'a mut Campaign,
    structural: bool,
    dirty: bool,
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if self.dirty {
            self.campaign.meta.updated_at = Utc::now();
            self.campaign.refresh(self.structural);
        }
    }
}

impl Batch<'_> {
    fn changed(&mut self) {
        self.dirty = true;
    }

    fn restructured(&mut self) {
        self.structural = true;
        self.dirty = true;
    }

    /// Add a character. Names are unique, case-insensitively.
    pub fn add_character(&mut self, character: Character) -> ProgResult<CharacterId> {
        let id = self.campaign.store.add_character(character)?;
        self.restructured();
        Ok(id)
    }

    /// Remove a character and every entry it owns.
    pub fn remove_character(&mut self, id: CharacterId) -> ProgResult<Character> {
        if self.campaign.store.character(id).is_none() {
            return Err(ProgError::CharacterNotFound(id));
        }
        self.delete_where(|e| e.character == id)?;
        let character = self.campaign.store.remove_character(id)?;
        self.restructured();
        Ok(character)
    }

    /// Add a category. It affects nothing until assigned to a character.
    pub fn add_category(&mut self, category: Category) -> CategoryId {
        let id = self.campaign.store.add_category(category);
        self.changed();
        id
    }

    /// Delete a category and every entry in it.
    pub fn delete_category(&mut self, id: CategoryId) -> ProgResult<Category> {
        if self.campaign.store.category(id).is_none() {
            return Err(ProgError::CategoryNotFound(id));
        }
        self.delete_where(|e| e.category == id)?;
        let category = self.campaign.store.remove_category(id)?;
        self.restructured();
        Ok(category)
    }

    /// Let a character participate in a category. Returns false if it
    /// already did.
    pub fn assign_category(
        &mut self,
        character: CharacterId,
        category: CategoryId,
    ) -> ProgResult<bool> {
        if self.campaign.store.category(category).is_none() {
            return Err(ProgError::CategoryNotFound(category));
        }
        let added = self
            .campaign
            .store
            .character_mut(character)
            .ok_or(ProgError::CharacterNotFound(character))?
            .assign(category);
        if added {
            self.restructured();
        }
        Ok(added)
    }

    /// Stop a character participating in a category, deleting its entries
    /// there. Returns how many entries were deleted.
    pub fn unassign_category(
        &mut self,
        character: CharacterId,
        category: CategoryId,
    ) -> ProgResult<usize> {
        let participates = self
            .campaign
            .store
            .character(character)
            .ok_or(ProgError::CharacterNotFound(character))?
            .participates_in(category);
        if !participates {
            return Err(ProgError::CategoryNotAssigned {
                character,
                category,
            });
        }
        let removed = self.delete_where(|e| e.character == character && e.category == category)?;
        if let Some(c) = self.campaign.store.character_mut(character) {
            c.categories.retain(|k| *k != category);
        }
        self.restructured();
        Ok(removed)
    }

    /// Replace a category definition and realign every entry's values with
    /// the given positional edits. All edits are checked before any entry
    /// changes.
    pub fn edit_category(&mut self, category: Category, edits: &[FieldEdit]) -> ProgResult<()> {
        let id = category.id;
        if self.campaign.store.category(id).is_none() {
            return Err(ProgError::CategoryNotFound(id));
        }

        let mut realigned = Vec::new();
        for entry in self.campaign.store.entries().filter(|e| e.category == id) {
            let mut values = entry.values.clone();
            for edit in edits {
                edit.apply(&mut values)?;
            }
            realigned.push((entry.id, values));
        }

        for (entry, values) in realigned {
            if let Some(entry) = self.campaign.store.entry_mut(entry) {
                entry.values = values;
            }
        }
        if let Some(slot) = self.campaign.store.category_mut(id) {
            *slot = category;
        }
        self.changed();
        Ok(())
    }

    /// Add a new series right after the head and move the head onto it.
    pub fn add_entry_at_head(&mut self, mut entry: Entry) -> ProgResult<EntryId> {
        let store = &self.campaign.store;
        let category = self.check_new_entry(&entry)?;
        if category.single_entry_only && !store.entries_of(entry.character, entry.category).is_empty()
        {
            return Err(ProgError::SingleEntryOnly(category.name.clone()));
        }
        let fields = category.fields.len();

        entry.parent = None;
        entry.child = None;
        entry.output = None;
        if entry.values.len() < fields {
            entry.values.resize(fields, String::new());
        }

        let id = self.campaign.store.add_entry(entry)?;
        self.campaign.history.insert_at_head(id);
        self.restructured();
        Ok(id)
    }

    /// Record a new revision of `previous`'s series right after the head.
    ///
    /// The revision becomes the child of whichever member of the series is
    /// visible at the head; if that member already has a child, the new
    /// revision is spliced in between.
    pub fn update_entry(&mut self, previous: EntryId, mut entry: Entry) -> ProgResult<EntryId> {
        let store = &self.campaign.store;
        let prev = store
            .entry(previous)
            .ok_or(ProgError::EntryNotFound(previous))?;
        let category = store
            .category(prev.category)
            .ok_or(ProgError::CategoryNotFound(prev.category))?;
        if !category.allow_update_over_time {
            return Err(ProgError::UpdatesNotAllowed(category.name.clone()));
        }
        if store.entry(entry.id).is_some() {
            return Err(ProgError::Validation(format!(
                "entry {} already exists",
                entry.id
            )));
        }

        let fields = category.fields.len();
        let target = self.live_revision(previous);
        let displaced = store.entry(target).and_then(|e| e.child);

        entry.character = prev.character;
        entry.category = prev.category;
        entry.parent = Some(target);
        entry.child = displaced;
        entry.output = None;
        if entry.values.len() < fields {
            entry.values.resize(fields, String::new());
        }

        let id = self.campaign.store.add_entry(entry)?;
        if let Some(child) = displaced.and_then(|c| self.campaign.store.entry_mut(c)) {
            child.parent = Some(id);
        }
        if let Some(target) = self.campaign.store.entry_mut(target) {
            target.child = Some(id);
        }
        self.campaign.history.insert_at_head(id);
        self.restructured();
        Ok(id)
    }

    /// Replace an entry's content: values, disabled flag, and operations.
    /// Identity, owner, links, and output tag are kept.
    pub fn edit_entry(&mut self, entry: Entry) -> ProgResult<()> {
        let existing = self
            .campaign
            .store
            .entry_mut(entry.id)
            .ok_or(ProgError::EntryNotFound(entry.id))?;
        existing.values = entry.values;
        existing.disabled = entry.disabled;
        existing.dynamic_data_operations = entry.dynamic_data_operations;
        self.changed();
        Ok(())
    }

    /// Move an entry to another history position. Revision links are left
    /// alone. Returns the new position.
    pub fn move_entry(&mut self, id: EntryId, target: usize) -> ProgResult<usize> {
        let len = self.campaign.history.len();
        if target >= len {
            return Err(ProgError::IndexOutOfRange { index: target, len });
        }
        let index = self
            .campaign
            .history
            .move_entry(id, target)
            .ok_or(ProgError::EntryNotFound(id))?;
        self.restructured();
        Ok(index)
    }

    /// Delete one entry, relinking its series around it.
    ///
    /// An output closing at the entry moves to the previous history
    /// neighbour (the next one when the entry is first). When that neighbour
    /// already closes an output, or there is none, the output is destroyed.
    pub fn delete_entry(&mut self, id: EntryId) -> ProgResult<Entry> {
        let entry = self.remove_entry(id)?;
        self.restructured();
        Ok(entry)
    }

    /// Delete every revision in an entry's series.
    pub fn delete_entry_series(&mut self, id: EntryId) -> ProgResult<Vec<Entry>> {
        if self.campaign.store.entry(id).is_none() {
            return Err(ProgError::EntryNotFound(id));
        }
        let members = self.series_members(id);
        let mut removed = Vec::with_capacity(members.len());
        for member in members {
            removed.push(self.remove_entry(member)?);
        }
        self.restructured();
        Ok(removed)
    }

    /// Add an output whose range closes at `tag`.
    ///
    /// The range runs back to the previous output tag. A fresh output
    /// includes every entry of its range.
    pub fn add_output(&mut self, mut output: Output, tag: EntryId) -> ProgResult<OutputId> {
        let store = &self.campaign.store;
        let entries = self.campaign.history.history().entries();
        let position = entries
            .iter()
            .position(|e| *e == tag)
            .ok_or(ProgError::EntryNotFound(tag))?;
        if let Some(existing) = store.entry(tag).and_then(|e| e.output)
            && store.output(existing).is_some()
        {
            return Err(ProgError::Validation(format!(
                "entry {tag} already closes output {existing}"
            )));
        }

        let closes_output = |id: &EntryId| {
            store
                .entry(*id)
                .and_then(|e| e.output)
                .is_some_and(|o| store.output(o).is_some())
        };
        let start = entries[..position]
            .iter()
            .rposition(closes_output)
            .map_or(0, |p| p + 1);
        output.included = entries[start..=position].to_vec();
        output.ignored.clear();

        let id = self.campaign.store.add_output(output);
        if let Some(entry) = self.campaign.store.entry_mut(tag) {
            entry.output = Some(id);
        }
        self.restructured();
        Ok(id)
    }

    /// Delete an output and clear its tag.
    pub fn delete_output(&mut self, id: OutputId) -> ProgResult<Output> {
        let output = self.campaign.store.remove_output(id)?;
        for entry in self.campaign.store.entries_mut() {
            if entry.output == Some(id) {
                entry.output = None;
            }
        }
        self.restructured();
        Ok(output)
    }

    /// Move an entry between an output's included and ignored lists.
    /// Returns false if the output does not cover the entry.
    pub fn set_output_inclusion(
        &mut self,
        output: OutputId,
        entry: EntryId,
        included: bool,
    ) -> ProgResult<bool> {
        Ok(self
            .campaign
            .store
            .output_mut(output)
            .ok_or(ProgError::OutputNotFound(output))?
            .set_included(entry, included))
    }

    /// Move the head. Derived data does not depend on it.
    pub fn set_current_index(&mut self, head: Option<usize>) -> ProgResult<()> {
        self.campaign.history.set_current_index(head)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_new_entry(&self, entry: &Entry) -> ProgResult<&Category> {
        let store = &self.campaign.store;
        if store.entry(entry.id).is_some() {
            return Err(ProgError::Validation(format!(
                "entry {} already exists",
                entry.id
            )));
        }
        let character = store
            .character(entry.character)
            .ok_or(ProgError::CharacterNotFound(entry.character))?;
        let category = store
            .category(entry.category)
            .ok_or(ProgError::CategoryNotFound(entry.category))?;
        if !character.participates_in(entry.category) {
            return Err(ProgError::CategoryNotAssigned {
                character: entry.character,
                category: entry.category,
            });
        }
        Ok(category)
    }

    /// Members of an entry's series, root first, read from the raw links.
    fn series_members(&self, id: EntryId) -> Vec<EntryId> {
        let store = &self.campaign.store;

        let mut root = id;
        let mut seen = HashSet::from([id]);
        while let Some(parent) = store.entry(root).and_then(|e| e.parent) {
            if store.entry(parent).is_none() || !seen.insert(parent) {
                break;
            }
            root = parent;
        }

        let mut members = vec![root];
        let mut seen = HashSet::from([root]);
        let mut current = root;
        while let Some(child) = store.entry(current).and_then(|e| e.child) {
            if store.entry(child).is_none() || !seen.insert(child) {
                break;
            }
            members.push(child);
            current = child;
        }
        if !members.contains(&id) {
            members.push(id);
        }
        members
    }

    /// The series member with the greatest position not after the head,
    /// or `id` itself when none is visible yet.
    fn live_revision(&self, id: EntryId) -> EntryId {
        let history = self.campaign.history.history();
        let Some(head) = history.head() else {
            return id;
        };
        self.series_members(id)
            .into_iter()
            .filter_map(|m| history.position(m).map(|p| (p, m)))
            .filter(|(p, _)| *p <= head)
            .max_by_key(|(p, _)| *p)
            .map_or(id, |(_, m)| m)
    }

    fn delete_where<F>(&mut self, doomed: F) -> ProgResult<usize>
    where
        F: Fn(&Entry) -> bool,
    {
        let history = self.campaign.history.history();
        let mut ids: Vec<(Option<usize>, EntryId)> = self
            .campaign
            .store
            .entries()
            .filter(|e| doomed(*e))
            .map(|e| (history.position(e.id), e.id))
            .collect();
        ids.sort();
        for (_, id) in &ids {
            self.remove_entry(*id)?;
        }
        Ok(ids.len())
    }

    fn remove_entry(&mut self, id: EntryId) -> ProgResult<Entry> {
        let campaign = &mut *self.campaign;
        let entry = campaign
            .store
            .entry(id)
            .cloned()
            .ok_or(ProgError::EntryNotFound(id))?;

        if let Some(parent) = entry.parent.and_then(|p| campaign.store.entry_mut(p)) {
            parent.child = entry.child;
        }
        if let Some(child) = entry.child.and_then(|c| campaign.store.entry_mut(c)) {
            child.parent = entry.parent;
        }

        if let Some(output) = entry.output {
            let history = campaign.history.history();
            let neighbour = history.position(id).and_then(|p| {
                let n = if p == 0 { 1 } else { p - 1 };
                history.entries().get(n).copied()
            });
            let free = neighbour
                .filter(|n| campaign.store.entry(*n).is_some_and(|e| e.output.is_none()));
            if let Some(n) = free.and_then(|n| campaign.store.entry_mut(n)) {
                tracing::debug!(%output, to = %n.id, "moved output tag of deleted entry");
                n.output = Some(output);
            } else if campaign.store.remove_output(output).is_ok() {
                tracing::debug!(%output, "destroyed output of deleted entry");
            }
        }

        campaign.history.remove(id);
        campaign.store.remove_entry(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Field;
    use crate::operation::OperationKind::*;
    use crate::value::Value;

    struct Table {
        campaign: Campaign,
        aria: CharacterId,
        hp: CategoryId,
    }

    fn table() -> Table {
        let mut campaign = Campaign::new(CampaignMeta::new("Test"));
        let hp = campaign.add_category(Category::new("HP").with_field(Field::new("value")));
        let aria = campaign
            .add_character(Character::new("Aria").with_category(hp))
            .unwrap();
        Table { campaign, aria, hp }
    }

    fn hp_of(t: &Table, index: usize) -> Option<Value> {
        t.campaign
            .snapshot(t.aria, index)
            .unwrap()
            .get("hp")
            .cloned()
    }

    #[test]
    fn hit_points_example() {
        let mut t = table();
        let e1 = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, t.hp).with_operation("hp", AssignInteger, "10"))
            .unwrap();
        assert_eq!(t.campaign.history(), &[e1]);
        assert_eq!(t.campaign.current_index(), Some(0));
        assert_eq!(hp_of(&t, 0), Some(Value::Integer(10)));

        let e2 = t
            .campaign
            .update_entry(e1, Entry::new(t.aria, t.hp).with_operation("hp", AddInteger, "-3"))
            .unwrap();
        assert_eq!(t.campaign.history(), &[e1, e2]);
        assert_eq!(t.campaign.entry(e2).unwrap().parent, Some(e1));
        assert_eq!(hp_of(&t, 1), Some(Value::Integer(7)));
        assert_eq!(hp_of(&t, 0), Some(Value::Integer(10)));
        assert_eq!(t.campaign.most_recent_in_series(e1), Some(e2));
    }

    #[test]
    fn update_splices_after_visible_revision() {
        let mut t = table();
        let e1 = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let e3 = t
            .campaign
            .update_entry(e1, Entry::new(t.aria, t.hp))
            .unwrap();
        t.campaign.set_current_index(Some(0)).unwrap();
        let e2 = t
            .campaign
            .update_entry(e3, Entry::new(t.aria, t.hp))
            .unwrap();

        assert_eq!(t.campaign.history(), &[e1, e2, e3]);
        assert_eq!(t.campaign.index().chain_of(e1), Some(&[e1, e2, e3][..]));
        assert_eq!(t.campaign.entry(e3).unwrap().parent, Some(e2));
    }

    #[test]
    fn entries_need_an_assigned_category() {
        let mut t = table();
        let other = t.campaign.add_category(Category::new("Loot"));
        let err = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, other))
            .unwrap_err();
        assert!(matches!(err, ProgError::CategoryNotAssigned { .. }));
        assert!(t.campaign.history().is_empty());
    }

    #[test]
    fn single_entry_categories_reject_a_second_series() {
        let mut t = table();
        let mut bio = Category::new("Bio");
        bio.single_entry_only = true;
        let bio = t.campaign.add_category(bio);
        t.campaign.assign_category(t.aria, bio).unwrap();
        t.campaign.add_entry_at_head(Entry::new(t.aria, bio)).unwrap();
        let err = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, bio))
            .unwrap_err();
        assert!(matches!(err, ProgError::SingleEntryOnly(name) if name == "Bio"));
    }

    #[test]
    fn updates_can_be_forbidden() {
        let mut t = table();
        let mut fixed = Category::new("Origin");
        fixed.allow_update_over_time = false;
        let fixed = t.campaign.add_category(fixed);
        t.campaign.assign_category(t.aria, fixed).unwrap();
        let e = t.campaign.add_entry_at_head(Entry::new(t.aria, fixed)).unwrap();
        let err = t
            .campaign
            .update_entry(e, Entry::new(t.aria, fixed))
            .unwrap_err();
        assert!(matches!(err, ProgError::UpdatesNotAllowed(_)));
    }

    #[test]
    fn new_entries_get_one_value_per_field() {
        let mut t = table();
        let e = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        assert_eq!(t.campaign.entry(e).unwrap().values, vec![String::new()]);
    }

    #[test]
    fn delete_relinks_the_series() {
        let mut t = table();
        let a = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let b = t.campaign.update_entry(a, Entry::new(t.aria, t.hp)).unwrap();
        let c = t.campaign.update_entry(b, Entry::new(t.aria, t.hp)).unwrap();
        t.campaign.delete_entry(b).unwrap();

        assert_eq!(t.campaign.entry(a).unwrap().child, Some(c));
        assert_eq!(t.campaign.entry(c).unwrap().parent, Some(a));
        assert_eq!(t.campaign.index().chain_of(c), Some(&[a, c][..]));
        assert_eq!(t.campaign.current_index(), Some(1));
    }

    #[test]
    fn delete_series_removes_every_revision() {
        let mut t = table();
        let keep = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let a = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let b = t.campaign.update_entry(a, Entry::new(t.aria, t.hp)).unwrap();
        let removed = t.campaign.delete_entry_series(b).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(t.campaign.history(), &[keep]);
        assert_eq!(
            t.campaign.entries_visible_for(t.aria, t.hp, None),
            vec![keep]
        );
    }

    #[test]
    fn output_moves_to_previous_neighbour() {
        let mut t = table();
        let a = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let b = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let out = t
            .campaign
            .add_output(Output::new("Session 1", "sheet"), b)
            .unwrap();
        t.campaign.delete_entry(b).unwrap();
        assert_eq!(t.campaign.entry(a).unwrap().output, Some(out));
        assert_eq!(t.campaign.index().output_range(out), Some(&[a][..]));
    }

    #[test]
    fn output_at_first_position_moves_forward_or_dies() {
        let mut t = table();
        let e1 = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let e2 = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let first = t.campaign.add_output(Output::new("One", "sheet"), e1).unwrap();
        let second = t.campaign.add_output(Output::new("Two", "sheet"), e2).unwrap();

        t.campaign.delete_entry(e1).unwrap();
        assert!(t.campaign.output(first).is_none());
        assert_eq!(t.campaign.entry(e2).unwrap().output, Some(second));
        assert_eq!(t.campaign.store().outputs().count(), 1);
    }

    #[test]
    fn output_without_neighbour_is_destroyed() {
        let mut t = table();
        let only = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let out = t.campaign.add_output(Output::new("Solo", "sheet"), only).unwrap();
        t.campaign.delete_entry(only).unwrap();
        assert!(t.campaign.output(out).is_none());
    }

    #[test]
    fn fresh_output_includes_its_range() {
        let mut t = table();
        let a = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let b = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let out = t.campaign.add_output(Output::new("S1", "sheet"), b).unwrap();
        let output = t.campaign.output(out).unwrap();
        assert_eq!(output.included, vec![a, b]);
        assert!(output.ignored.is_empty());

        assert!(t.campaign.set_output_inclusion(out, a, false).unwrap());
        let output = t.campaign.output(out).unwrap();
        assert_eq!(output.included, vec![b]);
        assert_eq!(output.ignored, vec![a]);
    }

    #[test]
    fn unassign_cascades_entries() {
        let mut t = table();
        t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        assert_eq!(t.campaign.unassign_category(t.aria, t.hp).unwrap(), 2);
        assert!(t.campaign.history().is_empty());
        assert_eq!(t.campaign.current_index(), None);
        assert!(!t.campaign.character(t.aria).unwrap().participates_in(t.hp));
    }

    #[test]
    fn remove_character_cascades_entries() {
        let mut t = table();
        let bram = t
            .campaign
            .add_character(Character::new("Bram").with_category(t.hp))
            .unwrap();
        let kept = t.campaign.add_entry_at_head(Entry::new(bram, t.hp)).unwrap();
        t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        t.campaign.remove_character(t.aria).unwrap();
        assert_eq!(t.campaign.history(), &[kept]);
        assert!(t.campaign.find_character("aria").is_none());
    }

    #[test]
    fn edit_category_realigns_values() {
        let mut t = table();
        let e = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, t.hp).with_values(["12"]))
            .unwrap();
        let mut category = t.campaign.category(t.hp).unwrap().clone();
        category.fields.insert(0, Field::new("note"));
        t.campaign
            .edit_category(category, &[FieldEdit::InsertAt(0)])
            .unwrap();
        assert_eq!(t.campaign.entry(e).unwrap().values, vec!["", "12"]);
        assert_eq!(t.campaign.category(t.hp).unwrap().fields.len(), 2);
    }

    #[test]
    fn bad_field_edit_changes_nothing() {
        let mut t = table();
        let e = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, t.hp).with_values(["12"]))
            .unwrap();
        let category = t.campaign.category(t.hp).unwrap().clone();
        let err = t
            .campaign
            .edit_category(category, &[FieldEdit::Delete(3)])
            .unwrap_err();
        assert!(matches!(err, ProgError::InvalidFieldEdit(_)));
        assert_eq!(t.campaign.entry(e).unwrap().values, vec!["12"]);
    }

    #[test]
    fn edit_entry_recomputes() {
        let mut t = table();
        let e = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, t.hp).with_operation("hp", AssignInteger, "10"))
            .unwrap();
        let mut edited = t.campaign.entry(e).unwrap().clone();
        edited.dynamic_data_operations.clear();
        edited = edited.with_operation("hp", AssignInteger, "12");
        t.campaign.edit_entry(edited).unwrap();
        assert_eq!(hp_of(&t, 0), Some(Value::Integer(12)));
    }

    #[test]
    fn runaway_string_repetition_is_a_diagnostic() {
        let mut t = table();
        t.campaign
            .add_entry_at_head(
                Entry::new(t.aria, t.hp)
                    .with_operation("banner", AssignString, "'ab' * 9223372036854775807")
                    .with_operation("hp", AssignInteger, "10"),
            )
            .unwrap();
        assert_eq!(hp_of(&t, 0), Some(Value::Integer(10)));
        let diagnostics: Vec<_> = t.campaign.diagnostics().collect();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0].kind,
            crate::diagnostics::DiagnosticKind::OperationFailed { key, .. } if key == "banner"
        ));
        assert!(diagnostics[0].message.contains("string repetition too large"));
    }

    #[test]
    fn batch_defers_refresh_until_drop() {
        let mut t = table();
        {
            let mut batch = t.campaign.batch();
            let a = batch
                .add_entry_at_head(Entry::new(t.aria, t.hp).with_operation("hp", AssignInteger, "3"))
                .unwrap();
            batch
                .update_entry(a, Entry::new(t.aria, t.hp).with_operation("hp", MultiplyInteger, "2"))
                .unwrap();
        }
        assert_eq!(hp_of(&t, 1), Some(Value::Integer(6)));
    }

    #[test]
    fn translate_defaults_to_head() {
        let mut t = table();
        assert_eq!(
            t.campaign.translate("HP: !${hp}$!", t.aria, None).unwrap(),
            "HP: <value not found>"
        );
        t.campaign
            .add_entry_at_head(Entry::new(t.aria, t.hp).with_operation("hp", AssignInteger, "10"))
            .unwrap();
        assert_eq!(
            t.campaign.translate("HP: !${hp}$!", t.aria, None).unwrap(),
            "HP: 10"
        );
        assert!(t.campaign.translate("x", CharacterId::new(), None).is_err());
    }

    #[test]
    fn describe_entry_uses_templates() {
        let mut t = table();
        let mut category = t.campaign.category(t.hp).unwrap().clone();
        category.creation_template = "Starts with !${value}$! HP".into();
        category.update_template = "Now at !${hp}$! HP".into();
        t.campaign.edit_category(category, &[]).unwrap();

        let e1 = t
            .campaign
            .add_entry_at_head(
                Entry::new(t.aria, t.hp)
                    .with_values(["10"])
                    .with_operation("hp", AssignInteger, "!${value}$!"),
            )
            .unwrap();
        let e2 = t
            .campaign
            .update_entry(e1, Entry::new(t.aria, t.hp).with_operation("hp", SubtractInteger, "4"))
            .unwrap();
        assert_eq!(t.campaign.describe_entry(e1).unwrap(), "Starts with 10 HP");
        assert_eq!(t.campaign.describe_entry(e2).unwrap(), "Now at 6 HP");
    }

    #[test]
    fn data_round_trip_preserves_state() {
        let mut t = table();
        let e1 = t
            .campaign
            .add_entry_at_head(Entry::new(t.aria, t.hp).with_operation("hp", AssignInteger, "10"))
            .unwrap();
        t.campaign
            .add_output(Output::new("S1", "sheet"), e1)
            .unwrap();

        let data = t.campaign.to_data();
        let json = serde_json::to_string(&data).unwrap();
        let restored = Campaign::from_data(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.to_data(), data);
        assert_eq!(
            restored.snapshot(t.aria, 0).unwrap(),
            t.campaign.snapshot(t.aria, 0).unwrap()
        );
    }

    #[test]
    fn from_data_rejects_one_sided_links() {
        let mut t = table();
        let a = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let b = t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let mut data = t.campaign.to_data();
        for entry in &mut data.entries {
            if entry.id == a {
                entry.child = Some(b);
            }
        }
        assert!(matches!(
            Campaign::from_data(data),
            Err(ProgError::Validation(_))
        ));
    }

    #[test]
    fn from_data_rejects_entries_missing_from_history() {
        let mut t = table();
        t.campaign.add_entry_at_head(Entry::new(t.aria, t.hp)).unwrap();
        let mut data = t.campaign.to_data();
        data.history = History::new();
        assert!(Campaign::from_data(data).is_err());
    }
}
