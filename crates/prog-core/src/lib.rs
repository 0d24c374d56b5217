//! Core types for Progression: character progression over a linear history.
//!
//! Characters accumulate entries inside categories. Entries sit in one
//! ordered history and may form revision chains. From that history the crate
//! derives a per-character table of variables at every index, computed from
//! declarative operations. Everything is driven through a [`Campaign`].

/// Campaign session: commands, queries, and the batch guard.
pub mod campaign;
/// Categories and their field schema.
pub mod category;
/// Characters.
pub mod character;
/// Engine settings.
pub mod config;
/// Structured reports for non-fatal problems.
pub mod diagnostics;
/// Per-character, per-index variable tables.
pub mod dynamic;
/// Entries, the unit of recorded progression.
pub mod entry;
/// Error types used throughout the crate.
pub mod error;
/// Restricted expression language for operations.
pub mod expr;
/// History order, revision chains, and output ranges.
pub mod history;
/// Identifiers.
pub mod id;
/// `!${key}$!` placeholder substitution.
pub mod interpolate;
/// Operation kinds and tables.
pub mod operation;
/// Export ranges over history.
pub mod output;
/// One frozen variable table.
pub mod snapshot;
/// Identity-addressed storage of every record.
pub mod store;
/// Dynamic values.
pub mod value;

/// Re-export campaign types.
pub use campaign::{Batch, Campaign, CampaignData, CampaignMeta};
/// Re-export record types.
pub use category::{Category, Field, FieldEdit};
/// Re-export record types.
pub use character::Character;
/// Re-export engine settings.
pub use config::EngineConfig;
/// Re-export diagnostic types.
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
/// Re-export record types.
pub use entry::Entry;
/// Re-export error types.
pub use error::{ProgError, ProgResult};
/// Re-export identifiers.
pub use id::{CategoryId, CharacterId, EntryId, OutputId};
/// Re-export operation types.
pub use operation::{OperationKind, OperationSpec, OperationTable};
/// Re-export record types.
pub use output::Output;
/// Re-export the snapshot type.
pub use snapshot::Snapshot;
/// Re-export value types.
pub use value::{Value, ValueType};
