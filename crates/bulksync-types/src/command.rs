//! Typed single-document commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command against one source item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "patches", rename_all = "snake_case")]
pub enum ItemCommand {
    /// (Re)index the item, or remove it if it is no longer indexable
    Index,
    /// Remove the item from the index
    Delete,
    /// Patch some fields of an already indexed item
    Update(Vec<FieldPatch>),
}

impl ItemCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ItemCommand::Index => "index",
            ItemCommand::Delete => "delete",
            ItemCommand::Update(_) => "update",
        }
    }
}

/// How a single field is changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum PatchOp {
    /// Replace the field value
    Set(Value),
    /// Add to a numeric field (negative to subtract)
    Increment(i64),
    /// Append to a string field
    Append(String),
    /// Add to an array field unless already present
    AddToSet(Value),
    /// Remove every occurrence from an array field
    RemoveFromSet(Value),
}

/// A change to one named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    pub field: String,
    #[serde(flatten)]
    pub op: PatchOp,
}

impl FieldPatch {
    pub fn new(field: impl Into<String>, op: PatchOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    /// Apply the patch to a JSON object in place.
    ///
    /// Missing fields are created from the patch; a non-object `doc` is left
    /// untouched.
    pub fn apply_to(&self, doc: &mut Value) {
        let Some(obj) = doc.as_object_mut() else {
            return;
        };
        let slot = obj.entry(self.field.clone()).or_insert(Value::Null);
        match &self.op {
            PatchOp::Set(v) => *slot = v.clone(),
            PatchOp::Increment(delta) => {
                let current = slot.as_i64().unwrap_or(0);
                *slot = Value::from(current.saturating_add(*delta));
            }
            PatchOp::Append(s) => {
                let mut current = slot.as_str().unwrap_or_default().to_string();
                current.push_str(s);
                *slot = Value::String(current);
            }
            PatchOp::AddToSet(v) => {
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Some(items) = slot.as_array_mut() {
                    if !items.contains(v) {
                        items.push(v.clone());
                    }
                }
            }
            PatchOp::RemoveFromSet(v) => {
                if let Some(items) = slot.as_array_mut() {
                    items.retain(|item| item != v);
                }
            }
        }
    }
}
