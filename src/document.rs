//! Resource-definition documents as registered in the store.

use serde_json::Value;

use crate::error::LoadError;
use crate::loader::navigate_fragment;

/// A parsed resource-definition document.
///
/// Keeps the raw JSON for pointer navigation; compiled definitions live in
/// the store's catalog.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    id: String,
    provider: Option<String>,
    name: Option<String>,
    version: Option<String>,
    title: Option<String>,
    raw: Value,
}

impl SchemaDocument {
    /// Check the top-level layout of a raw document.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::MalformedSchema` when `id` is missing or not a
    /// plain identifier, or when `types`/`resources` are not objects.
    pub fn parse(raw: Value) -> Result<Self, LoadError> {
        let Value::Object(obj) = &raw else {
            return Err(LoadError::malformed("?", "", "document must be an object"));
        };

        let id = match obj.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(LoadError::malformed("?", "/id", "missing document id")),
        };
        if id.contains('#') {
            return Err(LoadError::malformed(&id, "/id", "document id may not contain '#'"));
        }

        for section in ["types", "resources"] {
            match obj.get(section) {
                None | Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(LoadError::malformed(
                        &id,
                        format!("/{}", section),
                        "expected an object",
                    ))
                }
            }
        }

        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(String::from);
        Ok(Self {
            provider: text("provider"),
            name: text("name"),
            version: text("version"),
            title: text("title"),
            id,
            raw,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Value at a pointer fragment such as `/resources/item`.
    pub fn lookup(&self, pointer: &str) -> Option<&Value> {
        navigate_fragment(&self.raw, pointer)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.section_names("types")
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.section_names("resources")
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.raw.get("types").and_then(|t| t.get(name)).is_some()
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.raw.get("resources").and_then(|r| r.get(name)).is_some()
    }

    fn section_names(&self, section: &str) -> Vec<String> {
        self.raw
            .get(section)
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}
