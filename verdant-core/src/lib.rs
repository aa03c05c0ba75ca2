//! # verdant-core — graph model and reconciliation for Verdant
//!
//! Holds the client-side picture of a project: components (nodes), the
//! relations between them (edges) and the materials they are made of.
//!
//! ## Modules
//!
//! - [`op`] — wire operations pushed by the server or produced by local edits
//! - [`apply`] — the pure `(state, operation) -> state` reconciliation step
//! - [`layout`] — deterministic level/occurrence positions for new nodes
//! - [`history`] — bounded undo/redo over locally produced states
//! - [`wire`] — serde adapters for ids sent as numbers or numeric strings
//!
//! ```text
//! snapshot ──► GraphState ──► apply(op) ──► GraphState ──► HistoryManager
//!                  ▲                                            │
//!                  └──────────────── undo / redo ◄──────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub mod apply;
pub mod history;
pub mod layout;
pub mod op;
pub mod wire;

pub use apply::{apply, apply_mut};
pub use history::{HistoryManager, DEFAULT_HISTORY_LIMIT};
pub use op::{Operation, OperationError};

/// Server-assigned identifier. Ids are unique per collection, not globally.
pub type Id = i64;

/// 2-D layout coordinate. Display-only; the server never stores it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How a component is joined to its parent.
///
/// The server speaks both the integer codes (0..=5) and the upper-case
/// names; anything else is kept as a custom identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    Screw,
    Bolt,
    Glue,
    Weld,
    Nail,
    Clip,
    Custom(String),
}

impl ConnectionType {
    /// The fixed set, in server code order.
    pub const KNOWN: [ConnectionType; 6] = [
        ConnectionType::Screw,
        ConnectionType::Bolt,
        ConnectionType::Glue,
        ConnectionType::Weld,
        ConnectionType::Nail,
        ConnectionType::Clip,
    ];

    pub fn from_code(code: u64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::KNOWN.get(i))
            .cloned()
    }

    /// Case-insensitive lookup of the known names; anything else is custom.
    pub fn from_name(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(name.trim()))
            .cloned()
            .unwrap_or_else(|| Self::Custom(name.to_string()))
    }

    pub fn code(&self) -> Option<u8> {
        Self::KNOWN
            .iter()
            .position(|known| known == self)
            .and_then(|i| u8::try_from(i).ok())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Screw => "SCREW",
            Self::Bolt => "BOLT",
            Self::Glue => "GLUE",
            Self::Weld => "WELD",
            Self::Nail => "NAIL",
            Self::Clip => "CLIP",
            Self::Custom(name) => name,
        }
    }
}

impl FromStr for ConnectionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(name) => Ok(Self::from_name(&name)),
            Value::Number(n) => n
                .as_u64()
                .and_then(Self::from_code)
                .ok_or_else(|| D::Error::custom(format!("unknown connection type code {n}"))),
            other => Err(D::Error::custom(format!(
                "connection type must be a name or code, got {other}"
            ))),
        }
    }
}

/// A component of the assembly tree.
///
/// Every field but `id` may be missing: the server announces some creations
/// with nothing more than the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(deserialize_with = "wire::id")]
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(
        default,
        deserialize_with = "wire::opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic: Option<bool>,
    /// Only ever set on atomic components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reusable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recyclable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionType>,
    #[serde(
        default,
        deserialize_with = "wire::opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub material_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Component {
    /// A bare component carrying only its id.
    pub fn new(id: Id) -> Self {
        Self {
            id,
            name: None,
            level: None,
            parent_id: None,
            atomic: None,
            weight: None,
            reusable: None,
            recyclable: None,
            connection_type: None,
            material_id: None,
            position: None,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_parent(mut self, parent_id: Id) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Depth in the tree; a missing level counts as a root.
    pub fn depth(&self) -> u32 {
        self.level.unwrap_or(0)
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic == Some(true)
    }

    /// Drop the weight of anything that is not atomic.
    pub fn normalize(&mut self) {
        if !self.is_atomic() {
            self.weight = None;
        }
    }

    /// Overlay `incoming` onto `self`: present fields win, absent ones keep
    /// the stored value. A position already on screen is never moved.
    pub fn merge_from(&mut self, incoming: Component) {
        let Component {
            id: _,
            name,
            level,
            parent_id,
            atomic,
            weight,
            reusable,
            recyclable,
            connection_type,
            material_id,
            position,
        } = incoming;
        merge(&mut self.name, name);
        merge(&mut self.level, level);
        merge(&mut self.parent_id, parent_id);
        merge(&mut self.atomic, atomic);
        merge(&mut self.weight, weight);
        merge(&mut self.reusable, reusable);
        merge(&mut self.recyclable, recyclable);
        merge(&mut self.connection_type, connection_type);
        merge(&mut self.material_id, material_id);
        if self.position.is_none() {
            self.position = position;
        }
        self.normalize();
    }
}

/// A directed relation between two components. Endpoints may dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    #[serde(deserialize_with = "wire::id")]
    pub id: Id,
    #[serde(deserialize_with = "wire::id")]
    pub source: Id,
    #[serde(deserialize_with = "wire::id")]
    pub target: Id,
}

impl Edge {
    pub fn new(id: Id, source: Id, target: Id) -> Self {
        Self { id, source, target }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    #[serde(deserialize_with = "wire::id")]
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardness: Option<f64>,
}

impl Material {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            name: None,
            weight: None,
            co2_value: None,
            hardness: None,
        }
    }

    pub fn merge_from(&mut self, incoming: Material) {
        merge(&mut self.name, incoming.name);
        merge(&mut self.weight, incoming.weight);
        merge(&mut self.co2_value, incoming.co2_value);
        merge(&mut self.hardness, incoming.hardness);
    }
}

fn merge<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// The whole graph of one project, as the client currently sees it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphState {
    #[serde(default)]
    pub nodes: Vec<Component>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.materials.is_empty()
    }

    pub fn node(&self, id: Id) -> Option<&Component> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: Id) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn material(&self, id: Id) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }

    /// Nodes that may parent a new node at `level`: those one level up.
    pub fn parent_candidates(&self, level: u32) -> Vec<&Component> {
        let Some(parent_level) = level.checked_sub(1) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| n.depth() == parent_level)
            .collect()
    }

    /// Total material weight used by all nodes.
    pub fn material_weight(&self) -> f64 {
        self.nodes
            .iter()
            .filter_map(|n| n.material_id)
            .filter_map(|mid| self.material(mid))
            .filter_map(|m| m.weight)
            .sum()
    }

    /// `1 - min(weight / 1000, 1)`: 1.0 for an empty project, 0.0 at or
    /// above one tonne of material.
    pub fn sustainability_score(&self) -> f64 {
        1.0 - (self.material_weight() / 1000.0).min(1.0)
    }
}
