//! Dynamic document tree shared by YAML and JSON manifests.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered map of manifest keys.
pub type Map = BTreeMap<String, Node>;

/// A value of a parsed manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(Scalar),
    List(Vec<Node>),
    Map(Map),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Node {
    pub fn empty_map() -> Self {
        Node::Map(Map::new())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::Str(value.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Scalar(Scalar::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    /// String list, when every item is a string.
    pub fn as_str_list(&self) -> Option<Vec<String>> {
        match self {
            Node::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// A direct command is a string or a list of strings.
    pub fn is_command(&self) -> bool {
        self.as_str().is_some() || self.as_str_list().is_some()
    }

    /// Scalar rendered as text, as used for environment values.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Node::Scalar(scalar) => match scalar {
                Scalar::Null => None,
                other => Some(other.to_string()),
            },
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(value) => write!(f, "{}", value),
            Scalar::Int(value) => write!(f, "{}", value),
            Scalar::Float(value) => write!(f, "{}", value),
            Scalar::Str(value) => f.write_str(value),
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::empty_map()
    }
}
