//! Incremental operations on a [`GraphState`](crate::GraphState).
//!
//! Wire shape is a JSON object tagged by `op`:
//! ```text
//! { "op": "create_node",     "node": { ...Component } }   or { "op": ..., "id": 4 }
//! { "op": "create_material", "material": { ...Material } } or { "op": ..., "id": 4 }
//! { "op": "create_relation", "id": 7, "source": "1", "target": 2 }
//! { "op": "delete_node" | "delete_relation" | "delete_material", "id": 4 }
//! ```
//!
//! Unknown tags, and known tags missing what they need, decode to
//! [`Operation::Ignored`]. Only a record that is not an object, or has no
//! string tag, is an error.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::wire::coerce_id;
use crate::{Component, Edge, Id, Material};

pub const CREATE_NODE: &str = "create_node";
pub const DELETE_NODE: &str = "delete_node";
pub const CREATE_RELATION: &str = "create_relation";
pub const DELETE_RELATION: &str = "delete_relation";
pub const CREATE_MATERIAL: &str = "create_material";
pub const DELETE_MATERIAL: &str = "delete_material";

/// A message that cannot be read as an operation record at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("invalid JSON: {0}")]
    Syntax(String),
    #[error("operation record is not a JSON object")]
    NotARecord,
    #[error("operation record has no string `op` tag")]
    MissingTag,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateNode(Component),
    DeleteNode { id: Id },
    CreateRelation(Edge),
    DeleteRelation { id: Id },
    CreateMaterial(Material),
    DeleteMaterial { id: Id },
    /// Anything the applier has no rule for. Applying it changes nothing.
    Ignored { op: String },
}

impl Operation {
    /// Decode one UTF-8 JSON text message.
    pub fn from_json(text: &str) -> Result<Self, OperationError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| OperationError::Syntax(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, OperationError> {
        let Value::Object(mut record) = value else {
            return Err(OperationError::NotARecord);
        };
        let op = match record.remove("op") {
            Some(Value::String(op)) => op,
            _ => return Err(OperationError::MissingTag),
        };

        let decoded = match op.as_str() {
            CREATE_NODE => entity(record, "node", Component::new).map(Operation::CreateNode),
            DELETE_NODE => id_of(&record).map(|id| Operation::DeleteNode { id }),
            CREATE_RELATION => serde_json::from_value(Value::Object(record))
                .ok()
                .map(Operation::CreateRelation),
            DELETE_RELATION => id_of(&record).map(|id| Operation::DeleteRelation { id }),
            CREATE_MATERIAL => {
                entity(record, "material", Material::new).map(Operation::CreateMaterial)
            }
            DELETE_MATERIAL => id_of(&record).map(|id| Operation::DeleteMaterial { id }),
            _ => None,
        };

        Ok(decoded.unwrap_or(Operation::Ignored { op }))
    }

    /// Encode back to the wire shape.
    pub fn to_value(&self) -> Value {
        match self {
            Self::CreateNode(node) => json!({ "op": CREATE_NODE, "node": node }),
            Self::DeleteNode { id } => json!({ "op": DELETE_NODE, "id": id }),
            Self::CreateRelation(edge) => json!({
                "op": CREATE_RELATION,
                "id": edge.id,
                "source": edge.source,
                "target": edge.target,
            }),
            Self::DeleteRelation { id } => json!({ "op": DELETE_RELATION, "id": id }),
            Self::CreateMaterial(material) => json!({ "op": CREATE_MATERIAL, "material": material }),
            Self::DeleteMaterial { id } => json!({ "op": DELETE_MATERIAL, "id": id }),
            Self::Ignored { op } => json!({ "op": op }),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::CreateNode(_) => CREATE_NODE,
            Self::DeleteNode { .. } => DELETE_NODE,
            Self::CreateRelation(_) => CREATE_RELATION,
            Self::DeleteRelation { .. } => DELETE_RELATION,
            Self::CreateMaterial(_) => CREATE_MATERIAL,
            Self::DeleteMaterial { .. } => DELETE_MATERIAL,
            Self::Ignored { op } => op,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }
}

fn id_of(record: &Map<String, Value>) -> Option<Id> {
    record.get("id").and_then(coerce_id)
}

/// A full entity under `key`, or else a bare one built from `id`.
fn entity<T: DeserializeOwned>(
    mut record: Map<String, Value>,
    key: &str,
    bare: impl FnOnce(Id) -> T,
) -> Option<T> {
    match record.remove(key) {
        Some(body) => serde_json::from_value(body).ok(),
        None => id_of(&record).map(bare),
    }
}
