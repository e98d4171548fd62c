//! Path accessors for instance data.
//!
//! Instance data is a plain [`serde_json::Value`]; every read or write the
//! engine performs goes through a [`Pointer`] (RFC 6901). Relation variables
//! use [`Expr`], a relative pointer anchored at the fragment being navigated.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// A JSON pointer into instance data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(Vec<String>);

impl Pointer {
    /// The pointer to the whole document.
    pub fn root() -> Self {
        Pointer(Vec::new())
    }

    /// Parse `""` or `/a/b`, unescaping `~1` and `~0`.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(Pointer::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(format!("pointer \"{}\" must start with '/'", s));
        };
        Ok(Pointer(
            rest.split('/')
                .map(|part| part.replace("~1", "/").replace("~0", "~"))
                .collect(),
        ))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Pointer(segments)
    }

    pub fn join(&self, other: &Pointer) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Pointer(segments)
    }

    /// Drop `levels` trailing segments; `None` when that climbs past the root.
    pub fn ancestor(&self, levels: usize) -> Option<Self> {
        let keep = self.0.len().checked_sub(levels)?;
        Some(Pointer(self.0[..keep].to_vec()))
    }

    /// Read the value this pointer addresses.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.0 {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Replace the value this pointer addresses.
    ///
    /// The parent must exist; a missing object key is inserted, a missing
    /// array index is an error.
    pub fn set(&self, target: &mut Value, new: Value) -> Result<(), String> {
        let Some((last, parents)) = self.0.split_last() else {
            *target = new;
            return Ok(());
        };
        let mut current = target;
        for segment in parents {
            current = match current {
                Value::Object(map) => map
                    .get_mut(segment)
                    .ok_or_else(|| format!("no member \"{}\"", segment))?,
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| format!("no element \"{}\"", segment))?,
                _ => return Err(format!("cannot descend into scalar at \"{}\"", segment)),
            };
        }
        match current {
            Value::Object(map) => {
                map.insert(last.clone(), new);
                Ok(())
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| format!("no element \"{}\"", last))?;
                *slot = new;
                Ok(())
            }
            _ => Err(format!("cannot set \"{}\" on a scalar", last)),
        }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

/// Extraction expression of a relation variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `N/path`: climb `N` levels from the current fragment, then descend.
    Relative { up: usize, tail: Pointer },
    /// `/path`: descend from the root of the source data.
    Absolute(Pointer),
}

impl Expr {
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.starts_with('/') {
            return Pointer::parse(s).map(Expr::Absolute);
        }
        let (head, rest) = match s.find('/') {
            Some(idx) => (&s[..idx], &s[idx..]),
            None => (s, ""),
        };
        let up = head
            .parse::<usize>()
            .map_err(|_| format!("expression \"{}\" must start with a level count or '/'", s))?;
        Ok(Expr::Relative {
            up,
            tail: Pointer::parse(rest)?,
        })
    }

    /// Pointer into the root data, seen from `current`.
    pub fn locate(&self, current: &Pointer) -> Option<Pointer> {
        match self {
            Expr::Absolute(pointer) => Some(pointer.clone()),
            Expr::Relative { up, tail } => Some(current.ancestor(*up)?.join(tail)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Absolute(pointer) => write!(f, "{}", pointer),
            Expr::Relative { up, tail } => write!(f, "{}{}", up, tail),
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
