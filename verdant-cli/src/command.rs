//! Line commands typed at the prompt.
//!
//! ```text
//! show | help | score | undo | redo | quit
//! node NAME MATERIAL [level=N] [parent=ID] [weight=W] [conn=TYPE] [reusable] [recyclable]
//! material NAME WEIGHT CO2 HARDNESS
//! link SOURCE TARGET
//! rm node|material|link ID
//! parents LEVEL
//! ```

use std::str::FromStr;

use thiserror::Error;
use verdant_collab::{MaterialDraft, NodeDraft, RelationDraft};
use verdant_core::{ConnectionType, Id};

pub const HELP: &str = "\
commands:
  show                                 list the project
  score                                sustainability score
  parents LEVEL                        nodes that can parent a node at LEVEL
  node NAME MATERIAL [level=N] [parent=ID] [weight=W] [conn=TYPE] [reusable] [recyclable]
  material NAME WEIGHT CO2 HARDNESS
  link SOURCE TARGET
  rm node|material|link ID
  undo | redo
  quit";

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{value}` is not a valid {what}")]
    Invalid { what: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node,
    Material,
    Link,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Show,
    Help,
    Score,
    Parents(u32),
    Node(NodeDraft),
    Material(MaterialDraft),
    Link(RelationDraft),
    Remove(Target, Id),
    Undo,
    Redo,
    Quit,
}

const NODE_USAGE: &str =
    "node NAME MATERIAL [level=N] [parent=ID] [weight=W] [conn=TYPE] [reusable] [recyclable]";
const MATERIAL_USAGE: &str = "material NAME WEIGHT CO2 HARDNESS";
const LINK_USAGE: &str = "link SOURCE TARGET";
const REMOVE_USAGE: &str = "rm node|material|link ID";
const PARENTS_USAGE: &str = "parents LEVEL";

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (head, args) {
            ("show" | "ls", []) => Self::Show,
            ("help" | "?", _) => Self::Help,
            ("score", []) => Self::Score,
            ("undo", []) => Self::Undo,
            ("redo", []) => Self::Redo,
            ("quit" | "exit", []) => Self::Quit,
            ("parents", [level]) => Self::Parents(number("level", level)?),
            ("parents", _) => return Err(ParseError::Usage(PARENTS_USAGE)),
            ("node", [name, material, options @ ..]) => Self::Node(node(name, material, options)?),
            ("node", _) => return Err(ParseError::Usage(NODE_USAGE)),
            ("material", [name, weight, co2, hardness]) => Self::Material(MaterialDraft::new(
                *name,
                number("weight", weight)?,
                number("CO2 value", co2)?,
                number("hardness", hardness)?,
            )),
            ("material", _) => return Err(ParseError::Usage(MATERIAL_USAGE)),
            ("link", [source, target]) => Self::Link(RelationDraft::new(
                number("node id", source)?,
                number("node id", target)?,
            )),
            ("link", _) => return Err(ParseError::Usage(LINK_USAGE)),
            ("rm", [kind, id]) => {
                let target = match *kind {
                    "node" => Target::Node,
                    "material" => Target::Material,
                    "link" | "relation" => Target::Link,
                    _ => return Err(ParseError::Usage(REMOVE_USAGE)),
                };
                Self::Remove(target, number("id", id)?)
            }
            ("rm", _) => return Err(ParseError::Usage(REMOVE_USAGE)),
            (other, _) => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn node(name: &str, material: &str, options: &[&str]) -> Result<NodeDraft, ParseError> {
    let mut draft = NodeDraft::new(name, number("material id", material)?);
    for option in options {
        match option.split_once('=') {
            Some(("level", v)) => draft.level = number("level", v)?,
            Some(("parent", v)) => draft.parent_id = Some(number("parent id", v)?),
            Some(("weight", v)) => {
                draft.atomic = true;
                draft.weight = Some(number("weight", v)?);
            }
            Some(("conn", v)) => draft.connection_type = Some(ConnectionType::from_name(v)),
            None if *option == "reusable" => draft.reusable = true,
            None if *option == "recyclable" => draft.recyclable = true,
            _ => return Err(ParseError::Usage(NODE_USAGE)),
        }
    }
    Ok(draft)
}

fn number<T: FromStr>(what: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::Invalid {
        what,
        value: value.to_string(),
    })
}
