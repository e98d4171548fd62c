//! Reference resolution - flattens `$ref`/`$merge` chains into [`TypeDef`]s.
//!
//! Only the head of a definition is expanded: a definition that *is* a
//! `$ref` (or a `$merge`) is replaced by its target. References nested
//! inside properties, items, links and relations stay as [`TypeSlot::Ref`]
//! keys, which keeps recursive types finite.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::compose::{absolutize, merge_definitions};
use crate::document::SchemaDocument;
use crate::error::LoadError;
use crate::pointer::Expr;
use crate::schema::{LinkDef, PropertyDef, RelationDef, SchemaRef, TypeDef, TypeSlot};
use crate::types::{json_type_name, Kind, Method};

/// Registered documents by identifier.
pub type Documents = BTreeMap<String, Arc<SchemaDocument>>;

/// Resolves references against a fixed set of documents.
///
/// Tracks the references currently being expanded so that a chain which
/// comes back to itself fails instead of recursing forever.
pub struct Resolver<'a> {
    documents: &'a Documents,
    stack: Vec<SchemaRef>,
}

impl<'a> Resolver<'a> {
    pub fn new(documents: &'a Documents) -> Self {
        Self {
            documents,
            stack: Vec::new(),
        }
    }

    /// Flatten and compile the definition at `reference`.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::CyclicReference` for a `$ref` chain that revisits
    /// itself, `LoadError::UnresolvedDocument` when a chain leaves the loaded
    /// documents, and `LoadError::MalformedSchema` for invalid definitions.
    pub fn resolve(&mut self, reference: &SchemaRef) -> Result<TypeDef, LoadError> {
        let flat = self.flatten(reference)?;
        self.build(reference.clone(), &flat)
    }

    /// Raw flattened definition at `reference`, with `$ref` and `$merge`
    /// applied at the head and every nested reference absolute.
    pub fn flatten(&mut self, reference: &SchemaRef) -> Result<Map<String, Value>, LoadError> {
        if let Some(pos) = self.stack.iter().position(|r| r == reference) {
            let mut chain: Vec<String> = self.stack[pos..].iter().map(ToString::to_string).collect();
            chain.push(reference.to_string());
            return Err(LoadError::CyclicReference {
                reference: reference.to_string(),
                chain,
            });
        }

        let raw = self.fetch(reference)?;
        self.stack.push(reference.clone());
        let result = self.flatten_value(&raw, reference);
        self.stack.pop();
        result
    }

    fn fetch(&self, reference: &SchemaRef) -> Result<Value, LoadError> {
        let document =
            self.documents
                .get(reference.document())
                .ok_or_else(|| LoadError::UnresolvedDocument {
                    id: reference.document().to_string(),
                    reference: reference.to_string(),
                })?;
        let mut value = document
            .lookup(reference.pointer())
            .cloned()
            .ok_or_else(|| LoadError::UnresolvedReference {
                reference: reference.to_string(),
            })?;
        absolutize(&mut value, document);
        Ok(value)
    }

    fn flatten_value(&mut self, value: &Value, at: &SchemaRef) -> Result<Map<String, Value>, LoadError> {
        let Value::Object(map) = value else {
            return Err(malformed(
                at,
                "",
                format!("definition must be an object, got {}", json_type_name(value)),
            ));
        };

        if let Some(target) = map.get("$ref") {
            let target = self.reference(target, at, "/$ref")?;
            let base = self.flatten(&target)?;
            let mut overlay = map.clone();
            overlay.remove("$ref");
            return Ok(merge_definitions(&base, &overlay));
        }

        if let Some(merge) = map.get("$merge") {
            let (Some(source), Some(overlay)) = (merge.get("source"), merge.get("with")) else {
                return Err(malformed(at, "/$merge", "needs both 'source' and 'with'"));
            };
            let source = self.flatten_value(source, &at.nested("/$merge/source"))?;
            let overlay = self.flatten_value(overlay, &at.nested("/$merge/with"))?;
            let mut merged = merge_definitions(&source, &overlay);
            for (key, value) in map {
                if key != "$merge" {
                    merged.insert(key.clone(), value.clone());
                }
            }
            return Ok(merged);
        }

        Ok(map.clone())
    }

    fn reference(&self, value: &Value, at: &SchemaRef, path: &str) -> Result<SchemaRef, LoadError> {
        let Value::String(raw) = value else {
            return Err(malformed(
                at,
                path,
                format!("reference must be a string, got {}", json_type_name(value)),
            ));
        };
        SchemaRef::parse(raw, at.document()).map_err(|message| malformed(at, path, message))
    }

    fn build(&mut self, id: SchemaRef, flat: &Map<String, Value>) -> Result<TypeDef, LoadError> {
        let kind = match flat.get("type") {
            Some(Value::String(s)) => Kind::parse(s)
                .ok_or_else(|| malformed(&id, "/type", format!("unknown type \"{}\"", s)))?,
            Some(other) => {
                return Err(malformed(
                    &id,
                    "/type",
                    format!("type must be a string, got {}", json_type_name(other)),
                ))
            }
            None if flat.contains_key("properties") => Kind::Object,
            None if flat.contains_key("items") => Kind::Array,
            None => Kind::Any,
        };

        let mut properties = BTreeMap::new();
        for (name, value) in section(flat, "properties", &id)? {
            let at = id.nested(&format!("/properties/{}", escape(name)));
            properties.insert(
                name.clone(),
                PropertyDef {
                    schema: self.slot(value, at)?,
                },
            );
        }

        let items = match flat.get("items") {
            Some(value) => Some(Box::new(self.slot(value, id.nested("/items"))?)),
            None => None,
        };

        let mut links = BTreeMap::new();
        for (name, value) in section(flat, "links", &id)? {
            let at = id.nested(&format!("/links/{}", escape(name)));
            links.insert(name.clone(), self.link(name, value, &at)?);
        }

        let mut relations = BTreeMap::new();
        for (name, value) in section(flat, "relations", &id)? {
            let at = id.nested(&format!("/relations/{}", escape(name)));
            relations.insert(name.clone(), self.relation(name, value, &at)?);
        }

        Ok(TypeDef {
            kind,
            description: flat.get("description").and_then(Value::as_str).map(String::from),
            properties,
            items,
            links,
            relations,
            example: flat.get("example").cloned(),
            id,
        })
    }

    /// A nested definition: kept as a key when it is a plain `$ref`.
    fn slot(&mut self, value: &Value, at: SchemaRef) -> Result<TypeSlot, LoadError> {
        if let Value::Object(map) = value {
            let plain_ref = map.keys().all(|k| k == "$ref" || k == "description");
            if let (true, Some(target)) = (plain_ref, map.get("$ref")) {
                return Ok(TypeSlot::Ref {
                    reference: self.reference(target, &at, "/$ref")?,
                });
            }
        }
        let flat = self.flatten_value(value, &at)?;
        Ok(TypeSlot::Inline(Box::new(self.build(at, &flat)?)))
    }

    fn link(&mut self, name: &str, value: &Value, at: &SchemaRef) -> Result<LinkDef, LoadError> {
        let Value::Object(map) = value else {
            return Err(malformed(at, "", "link must be an object"));
        };

        let method = match map.get("method") {
            None => None,
            Some(Value::String(s)) => Some(
                s.parse::<Method>()
                    .map_err(|message| malformed(at, "/method", message))?,
            ),
            Some(other) => {
                return Err(malformed(
                    at,
                    "/method",
                    format!("method must be a string, got {}", json_type_name(other)),
                ))
            }
        };

        let path = match map.get("path") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(malformed(at, "/path", "path must be a string")),
        };

        let mut shapes = [None, None];
        for (slot, key) in shapes.iter_mut().zip(["request", "response"]) {
            if let Some(value) = map.get(key) {
                *slot = Some(self.slot(value, at.nested(&format!("/{}", key)))?);
            }
        }
        let [request, response] = shapes;

        let params = match map.get("params") {
            None => BTreeMap::new(),
            Some(Value::Object(params)) => params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Some(_) => return Err(malformed(at, "/params", "params must be an object")),
        };

        Ok(LinkDef {
            name: name.to_string(),
            method,
            path,
            request,
            response,
            params,
        })
    }

    fn relation(&self, name: &str, value: &Value, at: &SchemaRef) -> Result<RelationDef, LoadError> {
        let Some(target) = value.get("resource") else {
            return Err(malformed(at, "", "relation needs a 'resource'"));
        };
        let resource = self.reference(target, at, "/resource")?;

        let mut vars = BTreeMap::new();
        match value.get("vars") {
            None => {}
            Some(Value::Object(map)) => {
                for (var, expression) in map {
                    let path = format!("/vars/{}", escape(var));
                    let Value::String(expression) = expression else {
                        return Err(malformed(at, &path, "expression must be a string"));
                    };
                    let expr =
                        Expr::parse(expression).map_err(|message| malformed(at, &path, message))?;
                    vars.insert(var.clone(), expr);
                }
            }
            Some(_) => return Err(malformed(at, "/vars", "vars must be an object")),
        }

        Ok(RelationDef {
            name: name.to_string(),
            resource,
            vars,
        })
    }
}

fn section<'m>(
    flat: &'m Map<String, Value>,
    key: &str,
    id: &SchemaRef,
) -> Result<Vec<(&'m String, &'m Value)>, LoadError> {
    match flat.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map.iter().collect()),
        Some(_) => Err(malformed(id, &format!("/{}", key), "expected an object")),
    }
}

fn malformed(at: &SchemaRef, path: &str, message: impl Into<String>) -> LoadError {
    LoadError::malformed(at.document(), format!("{}{}", at.pointer(), path), message)
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn documents(raw: &[Value]) -> Documents {
        raw.iter()
            .map(|v| {
                let doc = SchemaDocument::parse(v.clone()).unwrap();
                (doc.id().to_string(), Arc::new(doc))
            })
            .collect()
    }

    // === Head expansion ===

    #[test]
    fn resolve_follows_ref_chain() {
        let docs = documents(&[json!({
            "id": "foo",
            "types": {
                "a": { "$ref": "#/types/b" },
                "b": { "type": "string", "description": "b" }
            }
        })]);
        let def = Resolver::new(&docs)
            .resolve(&SchemaRef::type_("foo", "a"))
            .unwrap();
        assert_eq!(def.kind.name(), "string");
        assert_eq!(def.description.as_deref(), Some("b"));
        assert_eq!(def.id.to_string(), "foo#/types/a");
    }

    #[test]
    fn resolve_detects_cycles() {
        let docs = documents(&[json!({
            "id": "foo",
            "types": {
                "a": { "$ref": "#/types/b" },
                "b": { "$ref": "#/types/a" }
            }
        })]);
        let result = Resolver::new(&docs).resolve(&SchemaRef::type_("foo", "a"));
        match result {
            Err(LoadError::CyclicReference { chain, .. }) => {
                assert_eq!(chain, vec!["foo#/types/a", "foo#/types/b", "foo#/types/a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn recursive_property_stays_a_reference() {
        let docs = documents(&[json!({
            "id": "foo",
            "types": {
                "node": {
                    "type": "object",
                    "properties": { "next": { "$ref": "#/types/node" } }
                }
            }
        })]);
        let def = Resolver::new(&docs)
            .resolve(&SchemaRef::type_("foo", "node"))
            .unwrap();
        assert_eq!(
            def.property("next").unwrap().schema.reference(),
            Some(&SchemaRef::type_("foo", "node"))
        );
    }

    #[test]
    fn missing_document_is_named() {
        let docs = documents(&[json!({
            "id": "foo",
            "types": { "a": { "$ref": "bar#/types/b" } }
        })]);
        let result = Resolver::new(&docs).resolve(&SchemaRef::type_("foo", "a"));
        assert!(matches!(
            result,
            Err(LoadError::UnresolvedDocument { id, .. }) if id == "bar"
        ));
    }

    // === $merge ===

    #[test]
    fn merge_across_documents_keeps_source_references() {
        let docs = documents(&[
            json!({
                "id": "base",
                "types": {
                    "addr": { "type": "string" },
                    "thing": {
                        "type": "object",
                        "properties": { "home": { "$ref": "#/types/addr" } }
                    }
                }
            }),
            json!({
                "id": "ext",
                "types": {
                    "thing": {
                        "$merge": {
                            "source": { "$ref": "base#/types/thing" },
                            "with": { "properties": { "tag": { "type": "string" } } }
                        }
                    }
                }
            }),
        ]);
        let def = Resolver::new(&docs)
            .resolve(&SchemaRef::type_("ext", "thing"))
            .unwrap();
        assert_eq!(
            def.property("home").unwrap().schema.reference(),
            Some(&SchemaRef::type_("base", "addr"))
        );
        assert!(def.property("tag").is_some());
    }

    // === Definitions ===

    #[test]
    fn links_and_relations_are_parsed() {
        let docs = documents(&[json!({
            "id": "foo",
            "resources": {
                "item": {
                    "type": "object",
                    "links": {
                        "self": { "path": "$/items/{id}" },
                        "get": { "method": "GET", "response": { "$ref": "#/resources/item" } }
                    },
                    "relations": {
                        "owner": { "resource": "owner", "vars": { "id": "0/owner_id" } }
                    }
                },
                "owner": { "type": "object" }
            }
        })]);
        let def = Resolver::new(&docs)
            .resolve(&SchemaRef::resource("foo", "item"))
            .unwrap();
        assert_eq!(def.link("self").unwrap().method, None);
        assert_eq!(def.link("get").unwrap().method, Some(Method::Get));
        let owner = def.relation("owner").unwrap();
        assert_eq!(owner.resource, SchemaRef::resource("foo", "owner"));
        assert_eq!(owner.vars["id"].to_string(), "0/owner_id");
    }

    #[test]
    fn invalid_expression_is_malformed() {
        let docs = documents(&[json!({
            "id": "foo",
            "resources": {
                "item": {
                    "relations": { "x": { "resource": "#/resources/item", "vars": { "id": "owner_id" } } }
                }
            }
        })]);
        let result = Resolver::new(&docs).resolve(&SchemaRef::resource("foo", "item"));
        assert!(matches!(
            result,
            Err(LoadError::MalformedSchema { path, .. }) if path == "/resources/item/relations/x/vars/id"
        ));
    }

    #[test]
    fn kind_is_inferred_from_structure() {
        let docs = documents(&[json!({
            "id": "foo",
            "types": {
                "o": { "properties": {} },
                "a": { "items": { "type": "number" } },
                "x": {}
            }
        })]);
        let mut resolver = Resolver::new(&docs);
        assert_eq!(resolver.resolve(&SchemaRef::type_("foo", "o")).unwrap().kind, Kind::Object);
        assert_eq!(resolver.resolve(&SchemaRef::type_("foo", "a")).unwrap().kind, Kind::Array);
        assert_eq!(resolver.resolve(&SchemaRef::type_("foo", "x")).unwrap().kind, Kind::Any);
    }
}
