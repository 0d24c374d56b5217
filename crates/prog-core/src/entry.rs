use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::id::{CategoryId, CharacterId, EntryId, OutputId};
use crate::operation::{OperationKind, OperationSpec, OperationTable};
use crate::value::Value;

/// A record in a category for one character.
///
/// Entries that revise each other are linked through `parent`/`child` into a
/// series; the links must stay symmetric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier for this entry.
    pub id: EntryId,
    /// Owning character.
    pub character: CharacterId,
    /// Owning category.
    pub category: CategoryId,
    /// Field values, parallel to the category's field list.
    pub values: Vec<String>,
    /// Disabled entries stay in history but contribute no operations.
    pub disabled: bool,
    /// The revision this entry supersedes.
    pub parent: Option<EntryId>,
    /// The revision that supersedes this entry.
    pub child: Option<EntryId>,
    /// Marks this entry as the last entry of an output range.
    pub output: Option<OutputId>,
    /// Operations declared on this entry.
    pub dynamic_data_operations: OperationTable,
}

impl Entry {
    /// Create a new entry with a random ID.
    pub fn new(character: CharacterId, category: CategoryId) -> Self {
        Self {
            id: EntryId::new(),
            character,
            category,
            values: Vec::new(),
            disabled: false,
            parent: None,
            child: None,
            output: None,
            dynamic_data_operations: OperationTable::new(),
        }
    }

    /// Set the field values.
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Add an operation.
    pub fn with_operation(
        mut self,
        key: impl Into<String>,
        kind: OperationKind,
        expression: impl Into<String>,
    ) -> Self {
        self.dynamic_data_operations
            .insert(key.into(), OperationSpec::new(kind, expression));
        self
    }

    /// Whether this entry starts a series.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Value of a named field, using the category's field order.
    pub fn field<'a>(&'a self, category: &Category, name: &str) -> Option<&'a str> {
        category
            .field_index(name)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Value of a named field interpreted as a dynamic value.
    pub fn field_value(&self, category: &Category, name: &str) -> Option<Value> {
        self.field(category, name).map(Value::infer)
    }
}
