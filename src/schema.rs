//! Flattened schema definitions.
//!
//! These are the values the resolver produces after following `$ref` and
//! applying `$merge`. Nested references stay as [`SchemaRef`] keys so that
//! recursive types remain finite.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::pointer::Expr;
use crate::types::{Kind, Method};

/// Address of a definition: document identifier plus JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaRef {
    document: String,
    pointer: String,
}

impl SchemaRef {
    pub fn new(document: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            pointer: pointer.into(),
        }
    }

    /// Reference to resource `name` of `document`.
    pub fn resource(document: &str, name: &str) -> Self {
        Self::new(document, format!("/resources/{}", name))
    }

    /// Reference to type `name` of `document`.
    pub fn type_(document: &str, name: &str) -> Self {
        Self::new(document, format!("/types/{}", name))
    }

    /// Parse `doc#/pointer` or `#/pointer` relative to `current`.
    ///
    /// Bare names need the document's contents to disambiguate, so they are
    /// handled by the resolver and rejected here.
    pub fn parse(raw: &str, current: &str) -> Result<Self, String> {
        let Some(idx) = raw.find('#') else {
            return Err(format!("reference \"{}\" has no '#'", raw));
        };
        let document = if idx == 0 { current } else { &raw[..idx] };
        let pointer = &raw[idx + 1..];
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(format!("reference \"{}\" has a malformed fragment", raw));
        }
        Ok(Self::new(document, pointer))
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// Resource name when this addresses `/resources/<name>` directly.
    pub fn resource_name(&self) -> Option<&str> {
        let name = self.pointer.strip_prefix("/resources/")?;
        (!name.contains('/')).then_some(name)
    }

    /// Reference to a definition nested under this one.
    pub fn nested(&self, suffix: &str) -> Self {
        Self::new(self.document.clone(), format!("{}{}", self.pointer, suffix))
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.pointer)
    }
}

impl Serialize for SchemaRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A fully flattened type or resource definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDef {
    /// Where this definition was requested from.
    pub id: SchemaRef,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeSlot>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, LinkDef>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, RelationDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl TypeDef {
    /// An unconstrained definition.
    pub fn any(id: SchemaRef) -> Self {
        Self {
            id,
            kind: Kind::Any,
            description: None,
            properties: BTreeMap::new(),
            items: None,
            links: BTreeMap::new(),
            relations: BTreeMap::new(),
            example: None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.get(name)
    }

    pub fn link(&self, name: &str) -> Option<&LinkDef> {
        self.links.get(name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }
}

/// A nested schema position: either defined in place or referenced by key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypeSlot {
    Ref {
        #[serde(rename = "$ref")]
        reference: SchemaRef,
    },
    Inline(Box<TypeDef>),
}

impl TypeSlot {
    pub fn reference(&self) -> Option<&SchemaRef> {
        match self {
            TypeSlot::Ref { reference } => Some(reference),
            TypeSlot::Inline(_) => None,
        }
    }

    /// Kind known without resolving, if defined in place.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            TypeSlot::Ref { .. } => None,
            TypeSlot::Inline(def) => Some(def.kind),
        }
    }
}

/// A property of an object definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PropertyDef {
    pub schema: TypeSlot,
}

/// A named HTTP operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkDef {
    #[serde(skip)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<TypeSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<TypeSlot>,
    /// Declared query parameters; advisory only.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

/// A navigational edge to another resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationDef {
    #[serde(skip)]
    pub name: String,
    pub resource: SchemaRef,
    /// Target variable to extraction expression.
    pub vars: BTreeMap<String, Expr>,
}
