//! Categories and their field schema.

use serde::{Deserialize, Serialize};

use crate::error::{ProgError, ProgResult};
use crate::id::CategoryId;
use crate::operation::{OperationKind, OperationSpec, OperationTable};

/// A named content field of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, also usable as a `!${name}$!` reference in entry operations.
    pub name: String,
    /// Whether the field holds multi-line text.
    pub large_text: bool,
}

impl Field {
    /// A single-line field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            large_text: false,
        }
    }

    /// A multi-line field.
    pub fn large(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            large_text: true,
        }
    }
}

/// Positional schema change applied to every entry of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEdit {
    /// Insert an empty value at the position.
    InsertAt(usize),
    /// Remove the value at the position.
    Delete(usize),
    /// Swap the value at the position with its predecessor.
    MoveUp(usize),
    /// Swap the value at the position with its successor.
    MoveDown(usize),
}

impl FieldEdit {
    /// Apply the edit to one entry's field values.
    pub fn apply(self, values: &mut Vec<String>) -> ProgResult<()> {
        let len = values.len();
        match self {
            Self::InsertAt(i) if i <= len => values.insert(i, String::new()),
            Self::Delete(i) if i < len => {
                values.remove(i);
            }
            Self::MoveUp(i) if i > 0 && i < len => values.swap(i - 1, i),
            Self::MoveDown(i) if i < len.saturating_sub(1) => values.swap(i, i + 1),
            other => {
                return Err(ProgError::InvalidFieldEdit(format!(
                    "{other:?} on {len} field values"
                )));
            }
        }
        Ok(())
    }
}

/// A category of entries (stats, inventory, skills, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier for this category.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Ordered content fields; entry values are parallel to this list.
    pub fields: Vec<Field>,
    /// Display template used when an entry is created.
    pub creation_template: String,
    /// Display template used when an entry is updated.
    pub update_template: String,
    /// Show entries of this category on the character overview.
    pub show_on_overview: bool,
    /// Entries may be revised over time (form revision chains).
    pub allow_update_over_time: bool,
    /// At most one entry chain per character.
    pub single_entry_only: bool,
    /// Constant operations, evaluated at every index of a participating character.
    pub dynamic_data_operations: OperationTable,
    /// Operations re-evaluated for every live entry of this category.
    pub dynamic_data_operation_templates: OperationTable,
}

impl Category {
    /// Create a category with default flags and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.into(),
            fields: Vec::new(),
            creation_template: String::new(),
            update_template: String::new(),
            show_on_overview: true,
            allow_update_over_time: true,
            single_entry_only: false,
            dynamic_data_operations: OperationTable::new(),
            dynamic_data_operation_templates: OperationTable::new(),
        }
    }

    /// Append a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a constant operation.
    pub fn with_constant(
        mut self,
        key: impl Into<String>,
        kind: OperationKind,
        expression: impl Into<String>,
    ) -> Self {
        self.dynamic_data_operations
            .insert(key.into(), OperationSpec::new(kind, expression));
        self
    }

    /// Add a per-entry template operation.
    pub fn with_template(
        mut self,
        key: impl Into<String>,
        kind: OperationKind,
        expression: impl Into<String>,
    ) -> Self {
        self.dynamic_data_operation_templates
            .insert(key.into(), OperationSpec::new(kind, expression));
        self
    }

    /// Position of a field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
