use std::collections::HashMap;

use crate::category::Category;
use crate::character::Character;
use crate::entry::Entry;
use crate::error::{ProgError, ProgResult};
use crate::id::{CategoryId, CharacterId, EntryId, OutputId};
use crate::output::Output;

/// Identity-addressed records: the ground truth every cache is derived from.
///
/// The store does not know about history order. Keeping entries and history
/// consistent is the job of [`crate::campaign::Campaign`].
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    characters: HashMap<CharacterId, Character>,
    categories: HashMap<CategoryId, Category>,
    entries: HashMap<EntryId, Entry>,
    outputs: HashMap<OutputId, Output>,

    // Indexes
    character_order: Vec<CharacterId>,
    by_name_lower: HashMap<String, CharacterId>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Characters
    // -----------------------------------------------------------------------

    /// Add a character. Names are unique, case-insensitively.
    pub fn add_character(&mut self, character: Character) -> ProgResult<CharacterId> {
        let name_lower = character.name.to_lowercase();
        if self.by_name_lower.contains_key(&name_lower) {
            return Err(ProgError::DuplicateName(character.name.clone()));
        }
        for category in &character.categories {
            if !self.categories.contains_key(category) {
                return Err(ProgError::CategoryNotFound(*category));
            }
        }

        let id = character.id;
        self.by_name_lower.insert(name_lower, id);
        self.character_order.push(id);
        self.characters.insert(id, character);
        Ok(id)
    }

    /// Get a character by ID.
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    /// Get a mutable reference to a character by ID.
    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    /// Find a character by name (case-insensitive).
    pub fn find_character(&self, name: &str) -> Option<&Character> {
        self.by_name_lower
            .get(&name.to_lowercase())
            .and_then(|id| self.characters.get(id))
    }

    /// Remove a character record. Its entries are left to the caller.
    pub fn remove_character(&mut self, id: CharacterId) -> ProgResult<Character> {
        let character = self
            .characters
            .remove(&id)
            .ok_or(ProgError::CharacterNotFound(id))?;
        self.by_name_lower.remove(&character.name.to_lowercase());
        self.character_order.retain(|c| *c != id);
        Ok(character)
    }

    /// All characters, in insertion order.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.character_order
            .iter()
            .filter_map(|id| self.characters.get(id))
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    /// Add a category.
    pub fn add_category(&mut self, category: Category) -> CategoryId {
        let id = category.id;
        self.categories.insert(id, category);
        id
    }

    /// Get a category by ID.
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    /// Get a mutable reference to a category by ID.
    pub fn category_mut(&mut self, id: CategoryId) -> Option<&mut Category> {
        self.categories.get_mut(&id)
    }

    /// Remove a category record and drop it from every character's
    /// membership. Its entries are left to the caller.
    pub fn remove_category(&mut self, id: CategoryId) -> ProgResult<Category> {
        let category = self
            .categories
            .remove(&id)
            .ok_or(ProgError::CategoryNotFound(id))?;
        for character in self.characters.values_mut() {
            character.categories.retain(|c| *c != id);
        }
        Ok(category)
    }

    /// All categories (unordered).
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    /// Add an entry. Its character and category must exist.
    pub fn add_entry(&mut self, entry: Entry) -> ProgResult<EntryId> {
        if !self.characters.contains_key(&entry.character) {
            return Err(ProgError::CharacterNotFound(entry.character));
        }
        if !self.categories.contains_key(&entry.category) {
            return Err(ProgError::CategoryNotFound(entry.category));
        }
        let id = entry.id;
        self.entries.insert(id, entry);
        Ok(id)
    }

    /// Get an entry by ID.
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// Get a mutable reference to an entry by ID.
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// Remove an entry record. Revision links are left to the caller.
    pub fn remove_entry(&mut self, id: EntryId) -> ProgResult<Entry> {
        self.entries.remove(&id).ok_or(ProgError::EntryNotFound(id))
    }

    /// All entries (unordered).
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Mutable access to all entries (unordered).
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.values_mut()
    }

    /// IDs of a character's entries in a category (unordered).
    pub fn entries_of(&self, character: CharacterId, category: CategoryId) -> Vec<EntryId> {
        self.entries
            .values()
            .filter(|e| e.character == character && e.category == category)
            .map(|e| e.id)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    /// Add an output.
    pub fn add_output(&mut self, output: Output) -> OutputId {
        let id = output.id;
        self.outputs.insert(id, output);
        id
    }

    /// Get an output by ID.
    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    /// Get a mutable reference to an output by ID.
    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    /// Remove an output record. Entry tags are left to the caller.
    pub fn remove_output(&mut self, id: OutputId) -> ProgResult<Output> {
        self.outputs.remove(&id).ok_or(ProgError::OutputNotFound(id))
    }

    /// All outputs (unordered).
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    /// Mutable access to all outputs (unordered).
    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut Output> {
        self.outputs.values_mut()
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Number of characters.
    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
