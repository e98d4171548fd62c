//! Loose shape checks for payloads and responses.
//!
//! A [`TypeDef`] is rendered as a JSON Schema carrying only `type`,
//! `properties` and `items`: no `required`, additional properties allowed.
//! Each referenced definition is rendered once under `$defs`, so recursive
//! types compile to a finite schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::{LoadError, SchemaError};
use crate::schema::{SchemaRef, TypeDef, TypeSlot};

/// A compiled shape check.
#[derive(Clone)]
pub struct Shape {
    schema: Value,
    validator: Option<Arc<jsonschema::Validator>>,
}

impl Shape {
    /// A shape that accepts any value.
    pub fn any() -> Self {
        Self {
            schema: json!({}),
            validator: None,
        }
    }

    /// Compile a rendered JSON Schema.
    ///
    /// # Errors
    ///
    /// Returns the compiler's message if the schema is invalid.
    pub fn compile(schema: Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| e.to_string())?;
        Ok(Self {
            schema,
            validator: Some(Arc::new(validator)),
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Check `instance`, collecting every offending path.
    pub fn check(&self, instance: &Value) -> Result<(), Vec<SchemaError>> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let errors: Vec<SchemaError> = validator
            .iter_errors(instance)
            .map(|e| SchemaError {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shape").field(&self.schema).finish()
    }
}

/// Render the shape of a nested slot, looking references up through `lookup`.
///
/// # Errors
///
/// Propagates the first lookup failure.
pub fn render_slot(
    slot: &TypeSlot,
    lookup: &mut dyn FnMut(&SchemaRef) -> Result<Arc<TypeDef>, LoadError>,
) -> Result<Value, LoadError> {
    let mut renderer = Renderer::new(lookup);
    let schema = renderer.slot(slot, false)?;
    Ok(renderer.finish(schema))
}

/// Render the shape of a definition.
///
/// # Errors
///
/// Propagates the first lookup failure.
pub fn render_def(
    def: &TypeDef,
    lookup: &mut dyn FnMut(&SchemaRef) -> Result<Arc<TypeDef>, LoadError>,
) -> Result<Value, LoadError> {
    let mut renderer = Renderer::new(lookup);
    let schema = renderer.inline(def, false)?;
    Ok(renderer.finish(schema))
}

/// Renders each referenced definition once under `$defs`, per nullability.
struct Renderer<'a> {
    lookup: &'a mut dyn FnMut(&SchemaRef) -> Result<Arc<TypeDef>, LoadError>,
    names: HashMap<(SchemaRef, bool), String>,
    defs: Map<String, Value>,
}

impl<'a> Renderer<'a> {
    fn new(lookup: &'a mut dyn FnMut(&SchemaRef) -> Result<Arc<TypeDef>, LoadError>) -> Self {
        Self {
            lookup,
            names: HashMap::new(),
            defs: Map::new(),
        }
    }

    fn finish(self, schema: Value) -> Value {
        if self.defs.is_empty() {
            return schema;
        }
        match schema {
            Value::Object(mut map) => {
                map.insert("$defs".to_string(), Value::Object(self.defs));
                Value::Object(map)
            }
            other => other,
        }
    }

    fn slot(&mut self, slot: &TypeSlot, nullable: bool) -> Result<Value, LoadError> {
        match slot {
            TypeSlot::Inline(def) => self.inline(def, nullable),
            TypeSlot::Ref { reference } => {
                let name = self.define(reference, nullable)?;
                Ok(json!({ "$ref": format!("#/$defs/{}", name) }))
            }
        }
    }

    fn define(&mut self, reference: &SchemaRef, nullable: bool) -> Result<String, LoadError> {
        let key = (reference.clone(), nullable);
        if let Some(name) = self.names.get(&key) {
            return Ok(name.clone());
        }
        // Named before rendering so recursive members point back here.
        let name = format!("d{}", self.names.len());
        self.names.insert(key, name.clone());
        let def = (self.lookup)(reference)?;
        let schema = self.inline(&def, nullable)?;
        self.defs.insert(name.clone(), schema);
        Ok(name)
    }

    fn inline(&mut self, def: &TypeDef, nullable: bool) -> Result<Value, LoadError> {
        let mut schema = Map::new();

        if let Some(ty) = def.kind.json_schema_type() {
            // Members may be null on the wire.
            let ty = if nullable && ty != "null" {
                json!([ty, "null"])
            } else {
                json!(ty)
            };
            schema.insert("type".to_string(), ty);
        }

        if !def.properties.is_empty() {
            let mut properties = Map::new();
            for (name, property) in &def.properties {
                properties.insert(name.clone(), self.slot(&property.schema, true)?);
            }
            schema.insert("properties".to_string(), Value::Object(properties));
        }

        if let Some(items) = &def.items {
            let items = self.slot(items, true)?;
            schema.insert("items".to_string(), items);
        }

        Ok(Value::Object(schema))
    }
}

/// Validate a payload against an already-rendered schema.
///
/// # Errors
///
/// Returns every offending path, or a single root error if the schema
/// itself does not compile.
pub fn validate_against_schema(schema: &Value, payload: &Value) -> Result<(), Vec<SchemaError>> {
    let shape = Shape::compile(schema.clone()).map_err(|message| {
        vec![SchemaError {
            path: String::new(),
            message,
        }]
    })?;
    shape.check(payload)
}
