//! Link compilation: path templates and callable descriptors.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::ResolutionError;
use crate::schema::{LinkDef, SchemaRef, TypeSlot};
use crate::types::{json_type_name, scalar_text, Method, Vars};
use crate::validator::Shape;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `$`: the service root of the owning document.
    Root,
    Literal(String),
    Var(String),
}

/// A path with `{name}` placeholders, optionally rooted at `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template such as `$/items/{id}/extended`.
    ///
    /// # Errors
    ///
    /// Returns a message for unbalanced braces, empty placeholder names, or a
    /// `$` anywhere but the start.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = raw;

        if let Some(after) = rest.strip_prefix('$') {
            segments.push(Segment::Root);
            rest = after;
        }

        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let close = rest
                        .find('}')
                        .ok_or_else(|| format!("unclosed '{{' in path \"{}\"", raw))?;
                    let name = &rest[1..close];
                    if name.is_empty() || name.contains('{') {
                        return Err(format!("bad placeholder in path \"{}\"", raw));
                    }
                    segments.push(Segment::Var(name.to_string()));
                    rest = &rest[close + 1..];
                }
                found => {
                    let end = found.unwrap_or(rest.len());
                    let literal = &rest[..end];
                    if literal.contains('}') || literal.contains('$') {
                        return Err(format!("unexpected character in path \"{}\"", raw));
                    }
                    segments.push(Segment::Literal(literal.to_string()));
                    rest = &rest[end..];
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Var(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Var(v) if v == name))
    }

    /// Substitute `root` for `$` and `vars` for the placeholders.
    ///
    /// # Errors
    ///
    /// Returns `MissingPathVariable` for an unbound placeholder and
    /// `InvalidPathVariable` for a value that is not a scalar.
    pub fn expand(&self, root: &str, vars: &Vars) -> Result<String, ResolutionError> {
        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Root => path.push_str(root),
                Segment::Literal(text) => path.push_str(text),
                Segment::Var(name) => {
                    let value = vars.get(name).ok_or_else(|| ResolutionError::MissingPathVariable {
                        template: self.raw.clone(),
                        variable: name.clone(),
                    })?;
                    let text = scalar_text(value).ok_or_else(|| ResolutionError::InvalidPathVariable {
                        variable: name.clone(),
                        actual: json_type_name(value).to_string(),
                    })?;
                    path.push_str(&text);
                }
            }
        }
        Ok(path)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A link ready to be called.
#[derive(Debug, Clone)]
pub struct CompiledLink {
    name: String,
    method: Option<Method>,
    path: PathTemplate,
    request: Option<TypeSlot>,
    response: Option<TypeSlot>,
    request_shape: Shape,
    response_shape: Shape,
    params: BTreeSet<String>,
}

impl CompiledLink {
    /// Build from a link definition whose path template is already known.
    pub fn new(def: &LinkDef, path: PathTemplate, request_shape: Shape, response_shape: Shape) -> Self {
        Self {
            name: def.name.clone(),
            method: def.method,
            path,
            request: def.request.clone(),
            response: def.response.clone(),
            request_shape,
            response_shape,
            params: def.params.keys().cloned().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    pub fn declared_method(&self) -> Option<Method> {
        self.method
    }

    /// Method to call with; descriptive links have none.
    ///
    /// # Errors
    ///
    /// Returns `NoMethod` for a link declared without one.
    pub fn method(&self, resource: &SchemaRef) -> Result<Method, ResolutionError> {
        self.method.ok_or_else(|| ResolutionError::NoMethod {
            resource: resource.to_string(),
            link: self.name.clone(),
        })
    }

    pub fn request(&self) -> Option<&TypeSlot> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&TypeSlot> {
        self.response.as_ref()
    }

    pub fn request_shape(&self) -> &Shape {
        &self.request_shape
    }

    pub fn response_shape(&self) -> &Shape {
        &self.response_shape
    }

    /// Declared query parameter names.
    pub fn params(&self) -> &BTreeSet<String> {
        &self.params
    }

    /// Whether a response of this link replaces the cache of `resource`.
    pub fn updates(&self, resource: &SchemaRef) -> bool {
        self.response.as_ref().and_then(TypeSlot::reference) == Some(resource)
    }
}
