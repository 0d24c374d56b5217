use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

/// Unique identifier for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub Uuid);

/// Unique identifier for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

/// Unique identifier for an output range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(pub Uuid);

macro_rules! impl_id {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                /// Generate a new random identifier.
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $ty {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", &self.0.to_string()[..8])
                }
            }
        )*
    };
}

impl_id!(CharacterId, CategoryId, EntryId, OutputId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_shows_short_form() {
        let id = EntryId(Uuid::parse_str("a3f2b1c8-1234-5678-9abc-def012345678").unwrap());
        assert_eq!(id.to_string(), "a3f2b1c8");
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(CharacterId::new(), CharacterId::new());
    }
}
