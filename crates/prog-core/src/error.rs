use crate::id::{CategoryId, CharacterId, EntryId, OutputId};

/// Alias for `Result<T, ProgError>`.
pub type ProgResult<T> = Result<T, ProgError>;

/// Errors that can occur when querying or mutating a campaign.
#[derive(Debug, thiserror::Error)]
pub enum ProgError {
    /// The requested character ID does not exist.
    #[error("character not found: {0}")]
    CharacterNotFound(CharacterId),

    /// The requested category ID does not exist.
    #[error("category not found: {0}")]
    CategoryNotFound(CategoryId),

    /// The requested entry ID does not exist.
    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The requested output ID does not exist.
    #[error("output not found: {0}")]
    OutputNotFound(OutputId),

    /// A character with the same name already exists.
    #[error("character already exists: \"{0}\"")]
    DuplicateName(String),

    /// A history index outside `0..len` was requested.
    #[error("history index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The history length at the time of the request.
        len: usize,
    },

    /// The character does not participate in the category.
    #[error("character {character} does not participate in category {category}")]
    CategoryNotAssigned {
        /// The character the entry was meant for.
        character: CharacterId,
        /// The category it is not assigned to.
        category: CategoryId,
    },

    /// The category only allows one entry per character and one already exists.
    #[error("category \"{0}\" only allows a single entry per character")]
    SingleEntryOnly(String),

    /// The category does not allow entries to be updated over time.
    #[error("category \"{0}\" does not allow updates over time")]
    UpdatesNotAllowed(String),

    /// A field edit instruction refers to a position that does not exist.
    #[error("invalid field edit: {0}")]
    InvalidFieldEdit(String),

    /// A generic validation error with a descriptive message.
    #[error("validation error: {0}")]
    Validation(String),
}
