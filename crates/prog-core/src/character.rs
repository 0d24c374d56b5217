use serde::{Deserialize, Serialize};

use crate::id::{CategoryId, CharacterId};

/// A tracked character. Entries are always owned by exactly one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Unique identifier for this character.
    pub id: CharacterId,
    /// Display name of the character.
    pub name: String,
    /// Categories this character participates in, in display order.
    pub categories: Vec<CategoryId>,
}

impl Character {
    /// Create a new character with a random ID and no categories.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(CharacterId::new(), name)
    }

    /// Create a character with a pre-assigned ID.
    pub fn with_id(id: CharacterId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            categories: Vec::new(),
        }
    }

    /// Add a category (ignored if already present).
    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.assign(category);
        self
    }

    /// Add a category to the end of the membership list. Returns false if it
    /// was already present.
    pub fn assign(&mut self, category: CategoryId) -> bool {
        if self.categories.contains(&category) {
            return false;
        }
        self.categories.push(category);
        true
    }

    /// Whether the character participates in a category.
    pub fn participates_in(&self, category: CategoryId) -> bool {
        self.categories.contains(&category)
    }
}
