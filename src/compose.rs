//! Definition composition: `$merge` overlays and reference rewriting.
//!
//! A `$merge` combines a `source` definition with a `with` overlay:
//! ```json
//! {
//!   "$merge": {
//!     "source": { "$ref": "#/types/base" },
//!     "with": { "properties": { "extra": { "type": "string" } } }
//!   }
//! }
//! ```
//!
//! The sections `properties`, `links` and `relations` are unioned, with the
//! overlay winning on a key collision. Any other key of the overlay replaces
//! the source's value outright. Nothing is merged below the first level of a
//! section.
//!
//! Before a definition leaves its document, every reference inside it is
//! rewritten to the absolute `doc#/pointer` form so that it still means the
//! same thing once merged into another document's definition.

use serde_json::{Map, Value};

use crate::document::SchemaDocument;

/// Sections that are unioned key by key instead of replaced.
pub const MERGED_SECTIONS: &[&str] = &["properties", "links", "relations"];

/// Compose `source` with the `overlay`.
pub fn merge_definitions(source: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = source.clone();

    for (key, value) in overlay {
        let section = MERGED_SECTIONS.contains(&key.as_str());
        match (section, merged.get_mut(key), value) {
            (true, Some(Value::Object(base)), Value::Object(extra)) => {
                for (name, def) in extra {
                    base.insert(name.clone(), def.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    merged
}

/// Absolute form of a reference written inside `document`.
///
/// `#/x` gains the document id, `doc#/x` is returned unchanged, and a bare
/// name addresses a type, falling back to a resource. With `prefer_resource`
/// the lookup order is reversed.
pub fn absolute_reference(raw: &str, document: &SchemaDocument, prefer_resource: bool) -> String {
    if let Some(pointer) = raw.strip_prefix('#') {
        return format!("{}#{}", document.id(), pointer);
    }
    if raw.contains('#') {
        return raw.to_string();
    }

    let as_type = format!("{}#/types/{}", document.id(), raw);
    let as_resource = format!("{}#/resources/{}", document.id(), raw);
    let (first, second) = if prefer_resource {
        (as_resource, as_type)
    } else {
        (as_type, as_resource)
    };
    let exists = |r: &str| r.find('#').and_then(|i| document.lookup(&r[i + 1..])).is_some();
    if !exists(&first) && exists(&second) {
        second
    } else {
        first
    }
}

/// Rewrite every reference inside `value` to absolute form.
///
/// Covers `$ref` strings anywhere and the `resource` of each relation.
pub fn absolutize(value: &mut Value, document: &SchemaDocument) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get_mut("$ref") {
                *reference = absolute_reference(reference, document, false);
            }
            if let Some(Value::Object(relations)) = map.get_mut("relations") {
                for relation in relations.values_mut() {
                    if let Some(Value::String(target)) = relation.get_mut("resource") {
                        *target = absolute_reference(target, document, true);
                    }
                }
            }
            for (key, child) in map.iter_mut() {
                if key != "$ref" {
                    absolutize(child, document);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                absolutize(item, document);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn doc() -> SchemaDocument {
        SchemaDocument::parse(json!({
            "id": "foo",
            "types": { "address": { "type": "string" } },
            "resources": {
                "item": { "type": "object" },
                "address": { "type": "object" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn merge_unions_sections_and_overlay_wins() {
        let source = as_map(json!({
            "type": "object",
            "description": "base",
            "properties": { "a": { "type": "number" }, "b": { "type": "string" } },
            "links": { "get": { "method": "GET" } }
        }));
        let overlay = as_map(json!({
            "description": "extended",
            "properties": { "b": { "type": "integer" } },
            "links": { "set": { "method": "PUT" } }
        }));

        let merged = merge_definitions(&source, &overlay);
        assert_eq!(merged["description"], "extended");
        assert_eq!(merged["properties"]["a"], json!({ "type": "number" }));
        assert_eq!(merged["properties"]["b"], json!({ "type": "integer" }));
        assert!(merged["links"].get("get").is_some());
        assert!(merged["links"].get("set").is_some());
    }

    #[test]
    fn merge_does_not_descend_into_section_entries() {
        let source = as_map(json!({
            "properties": { "a": { "type": "object", "properties": { "x": {}, "y": {} } } }
        }));
        let overlay = as_map(json!({
            "properties": { "a": { "type": "object", "properties": { "z": {} } } }
        }));

        let merged = merge_definitions(&source, &overlay);
        let inner = merged["properties"]["a"]["properties"].as_object().unwrap();
        assert_eq!(inner.keys().collect::<Vec<_>>(), vec!["z"]);
    }

    #[test]
    fn merge_replaces_non_section_structures() {
        let source = as_map(json!({ "items": { "type": "number" }, "example": [1] }));
        let overlay = as_map(json!({ "items": { "type": "string" } }));

        let merged = merge_definitions(&source, &overlay);
        assert_eq!(merged["items"], json!({ "type": "string" }));
        assert_eq!(merged["example"], json!([1]));
    }

    #[test]
    fn bare_reference_prefers_types_then_resources() {
        let d = doc();
        assert_eq!(absolute_reference("address", &d, false), "foo#/types/address");
        assert_eq!(absolute_reference("item", &d, false), "foo#/resources/item");
        assert_eq!(absolute_reference("address", &d, true), "foo#/resources/address");
        assert_eq!(absolute_reference("#/types/x", &d, false), "foo#/types/x");
        assert_eq!(absolute_reference("bar#/resources/b", &d, false), "bar#/resources/b");
    }

    #[test]
    fn absolutize_rewrites_refs_and_relation_targets() {
        let d = doc();
        let mut value = json!({
            "properties": { "addr": { "$ref": "#/types/address" } },
            "items": { "$ref": "item" },
            "relations": { "full": { "resource": "item", "vars": { "id": "0" } } }
        });
        absolutize(&mut value, &d);
        assert_eq!(value["properties"]["addr"]["$ref"], "foo#/types/address");
        assert_eq!(value["items"]["$ref"], "foo#/resources/item");
        assert_eq!(value["relations"]["full"]["resource"], "foo#/resources/item");
    }
}
