//! Core types shared by the schema and runtime layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relation variable that overrides the target host.
pub const HOST_VAR: &str = "$host";

/// Relation variable that overrides the target service instance.
pub const INSTANCE_VAR: &str = "$instance";

/// Name of the link that fixes a resource's canonical path.
pub const SELF_LINK: &str = "self";

/// Name of the implicit relation on elements that reference a resource.
pub const FULL_RELATION: &str = "full";

/// Variables bound into path templates, ordered by name.
pub type Vars = BTreeMap<String, Value>;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a scalar as it appears in a path or query string.
///
/// Returns `None` for arrays, objects and null.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// HTTP method of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether a payload travels in the request body rather than the query.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    /// Case-insensitive; schema documents write both `GET` and `get`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(format!("unknown HTTP method \"{}\"", s)),
        }
    }
}

/// Scalar flavours understood by the shape checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Number,
    Integer,
    Boolean,
    /// Seconds since the epoch; checked as a number.
    Timestamp,
}

/// Structural kind of a type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Object,
    Array,
    Scalar(ScalarKind),
    Null,
    /// No `type` declared; anything goes.
    Any,
}

impl Kind {
    /// Parse the `type` keyword of a definition.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "object" => Kind::Object,
            "array" => Kind::Array,
            "null" => Kind::Null,
            "string" => Kind::Scalar(ScalarKind::String),
            "number" => Kind::Scalar(ScalarKind::Number),
            "integer" => Kind::Scalar(ScalarKind::Integer),
            "boolean" => Kind::Scalar(ScalarKind::Boolean),
            "timestamp" | "timestamp-hp" => Kind::Scalar(ScalarKind::Timestamp),
            _ => return None,
        };
        Some(kind)
    }

    /// Keyword as written in documents.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::Null => "null",
            Kind::Scalar(ScalarKind::String) => "string",
            Kind::Scalar(ScalarKind::Number) => "number",
            Kind::Scalar(ScalarKind::Integer) => "integer",
            Kind::Scalar(ScalarKind::Boolean) => "boolean",
            Kind::Scalar(ScalarKind::Timestamp) => "timestamp",
            Kind::Any => "any",
        }
    }

    /// JSON Schema `type` used for shape checks, if any.
    pub fn json_schema_type(&self) -> Option<&'static str> {
        match self {
            Kind::Object => Some("object"),
            Kind::Array => Some("array"),
            Kind::Null => Some("null"),
            Kind::Scalar(ScalarKind::String) => Some("string"),
            Kind::Scalar(ScalarKind::Number | ScalarKind::Timestamp) => Some("number"),
            Kind::Scalar(ScalarKind::Integer) => Some("integer"),
            Kind::Scalar(ScalarKind::Boolean) => Some("boolean"),
            Kind::Any => None,
        }
    }
}

impl Serialize for Kind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("DELETE".parse::<Method>(), Ok(Method::Delete));
        assert!("FETCH".parse::<Method>().is_err());
    }

    #[test]
    fn method_body_placement() {
        assert!(Method::Post.carries_body());
        assert!(Method::Put.carries_body());
        assert!(!Method::Get.carries_body());
        assert!(!Method::Delete.carries_body());
    }

    #[test]
    fn kind_parse_valid() {
        assert_eq!(Kind::parse("object"), Some(Kind::Object));
        assert_eq!(Kind::parse("array"), Some(Kind::Array));
        assert_eq!(
            Kind::parse("timestamp"),
            Some(Kind::Scalar(ScalarKind::Timestamp))
        );
        assert_eq!(Kind::parse("decimal"), None);
    }

    #[test]
    fn scalar_text_rejects_structures() {
        assert_eq!(scalar_text(&json!(7)), Some("7".into()));
        assert_eq!(scalar_text(&json!("h2")), Some("h2".into()));
        assert_eq!(scalar_text(&json!(true)), Some("true".into()));
        assert_eq!(scalar_text(&json!([1])), None);
        assert_eq!(scalar_text(&Value::Null), None);
    }
}
