//! Relation compilation and target extraction.
//!
//! A relation maps target variables to expressions over the source data.
//! Evaluating it yields a [`RelationTarget`]: the target resource, the path
//! variables and query parameters bound from the data, and an optional
//! host/instance override for federated services.

use std::fmt;

use serde_json::Value;

use crate::catalog::ResourceDef;
use crate::error::ResolutionError;
use crate::pointer::{Expr, Pointer};
use crate::schema::{RelationDef, SchemaRef};
use crate::types::{json_type_name, scalar_text, Vars, HOST_VAR, INSTANCE_VAR};

/// A relation ready to be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRelation {
    name: String,
    resource: SchemaRef,
    vars: Vec<(String, Expr)>,
    host: Option<Expr>,
    instance: Option<Expr>,
}

/// Identity of the representation a relation leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTarget {
    pub resource: SchemaRef,
    pub vars: Vars,
    pub params: Vars,
    pub host: Option<String>,
    pub instance: Option<String>,
}

impl fmt::Display for RelationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for (k, v) in self.vars.iter().chain(&self.params) {
            write!(f, " {}={}", k, v)?;
        }
        Ok(())
    }
}

impl CompiledRelation {
    pub fn compile(def: &RelationDef) -> Self {
        let mut vars = Vec::new();
        let mut host = None;
        let mut instance = None;
        for (name, expr) in &def.vars {
            match name.as_str() {
                HOST_VAR => host = Some(expr.clone()),
                INSTANCE_VAR => instance = Some(expr.clone()),
                _ => vars.push((name.clone(), expr.clone())),
            }
        }
        Self {
            name: def.name.clone(),
            resource: def.resource.clone(),
            vars,
            host,
            instance,
        }
    }

    /// Relation bound to a resource's identity from its own data.
    ///
    /// Each `self` placeholder `v` is read from `0/v` of the element.
    pub fn implicit(name: &str, target: &ResourceDef) -> Self {
        let vars = target
            .self_path()
            .map(|t| {
                t.variables()
                    .into_iter()
                    .map(|v| {
                        let tail = Pointer::root().child(v);
                        (v.to_string(), Expr::Relative { up: 0, tail })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            resource: target.id().clone(),
            vars,
            host: None,
            instance: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &SchemaRef {
        &self.resource
    }

    /// Whether evaluation reads the source data.
    pub fn needs_data(&self) -> bool {
        !self.vars.is_empty() || self.host.is_some() || self.instance.is_some()
    }

    /// Variable names and their expressions, overrides excluded.
    pub fn vars(&self) -> &[(String, Expr)] {
        &self.vars
    }

    /// Extract the target identity from `data`, seen from `current`.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedInstance` when an expression addresses data that
    /// is absent, `InvalidParameter` for a variable that the target neither
    /// templates nor declares, and `InvalidPathVariable` for a non-scalar
    /// override.
    pub fn evaluate(
        &self,
        data: &Value,
        current: &Pointer,
        target: &ResourceDef,
    ) -> Result<RelationTarget, ResolutionError> {
        let template = target.self_path();
        let declared = target.self_params();

        let mut vars = Vars::new();
        let mut params = Vars::new();
        for (name, expr) in &self.vars {
            let value = self.extract(expr, data, current)?;
            if template.is_some_and(|t| t.has_variable(name)) {
                vars.insert(name.clone(), value);
            } else if declared.contains(name) {
                params.insert(name.clone(), value);
            } else {
                return Err(ResolutionError::InvalidParameter {
                    template: template.map(ToString::to_string).unwrap_or_default(),
                    parameter: name.clone(),
                });
            }
        }

        Ok(RelationTarget {
            resource: self.resource.clone(),
            vars,
            params,
            host: self.override_value(HOST_VAR, self.host.as_ref(), data, current)?,
            instance: self.override_value(INSTANCE_VAR, self.instance.as_ref(), data, current)?,
        })
    }

    fn extract(&self, expr: &Expr, data: &Value, current: &Pointer) -> Result<Value, ResolutionError> {
        let unresolved = |pointer: String| ResolutionError::UnresolvedInstance {
            relation: self.name.clone(),
            expression: expr.to_string(),
            pointer,
        };
        let pointer = expr
            .locate(current)
            .ok_or_else(|| unresolved(format!("{} (above the root)", current)))?;
        pointer
            .get(data)
            .cloned()
            .ok_or_else(|| unresolved(pointer.to_string()))
    }

    /// Empty strings mean "no override".
    fn override_value(
        &self,
        var: &str,
        expr: Option<&Expr>,
        data: &Value,
        current: &Pointer,
    ) -> Result<Option<String>, ResolutionError> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        let value = self.extract(expr, data, current)?;
        if value.is_null() {
            return Ok(None);
        }
        let text = scalar_text(&value).ok_or_else(|| ResolutionError::InvalidPathVariable {
            variable: var.to_string(),
            actual: json_type_name(&value).to_string(),
        })?;
        Ok((!text.is_empty()).then_some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SchemaStore;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> SchemaStore {
        let store = SchemaStore::new();
        store
            .load(json!({
                "id": "bar",
                "resources": {
                    "bar": {
                        "type": "object",
                        "links": { "self": { "path": "$/bars/{id}", "params": { "expand": {} } } }
                    }
                }
            }))
            .unwrap();
        store
            .load(json!({
                "id": "foo",
                "resources": {
                    "foo": {
                        "type": "object",
                        "links": { "self": { "path": "$/foos/{id}" } },
                        "relations": {
                            "bar": {
                                "resource": "bar#/resources/bar",
                                "vars": {
                                    "id": "0/bar_id",
                                    "$host": "0/bar_server",
                                    "$instance": "0/bar_instance"
                                }
                            },
                            "expanded": {
                                "resource": "bar#/resources/bar",
                                "vars": { "id": "/bar_id", "expand": "/mode" }
                            },
                            "bogus": {
                                "resource": "bar#/resources/bar",
                                "vars": { "id": "0/bar_id", "color": "0/id" }
                            }
                        }
                    }
                }
            }))
            .unwrap();
        store
    }

    fn relation(store: &SchemaStore, name: &str) -> Arc<CompiledRelation> {
        store
            .resource("foo", "foo")
            .unwrap()
            .relation(name)
            .unwrap()
            .clone()
    }

    #[test]
    fn evaluate_extracts_vars_and_federation_overrides() {
        let store = store();
        let bar = store.resource("bar", "bar").unwrap();
        let data = json!({"id": 5, "bar_id": 42, "bar_server": "h2", "bar_instance": "i2"});

        let target = relation(&store, "bar")
            .evaluate(&data, &Pointer::root(), &bar)
            .unwrap();
        assert_eq!(target.vars["id"], json!(42));
        assert_eq!(target.host.as_deref(), Some("h2"));
        assert_eq!(target.instance.as_deref(), Some("i2"));
        assert!(target.params.is_empty());
    }

    #[test]
    fn empty_override_means_none() {
        let store = store();
        let bar = store.resource("bar", "bar").unwrap();
        let data = json!({"bar_id": 1, "bar_server": "", "bar_instance": ""});

        let target = relation(&store, "bar")
            .evaluate(&data, &Pointer::root(), &bar)
            .unwrap();
        assert_eq!(target.host, None);
        assert_eq!(target.instance, None);
    }

    #[test]
    fn missing_data_is_unresolved_instance() {
        let store = store();
        let bar = store.resource("bar", "bar").unwrap();
        let result = relation(&store, "bar").evaluate(&json!({"id": 5}), &Pointer::root(), &bar);
        assert!(matches!(
            result,
            Err(ResolutionError::UnresolvedInstance { pointer, .. }) if pointer == "/bar_id"
        ));
    }

    #[test]
    fn declared_params_become_query_parameters() {
        let store = store();
        let bar = store.resource("bar", "bar").unwrap();
        let target = relation(&store, "expanded")
            .evaluate(&json!({"bar_id": 3, "mode": "full"}), &Pointer::root(), &bar)
            .unwrap();
        assert_eq!(target.vars["id"], json!(3));
        assert_eq!(target.params["expand"], json!("full"));
    }

    #[test]
    fn undeclared_variable_is_invalid_parameter() {
        let store = store();
        let bar = store.resource("bar", "bar").unwrap();
        let result = relation(&store, "bogus").evaluate(
            &json!({"id": 1, "bar_id": 3}),
            &Pointer::root(),
            &bar,
        );
        assert!(matches!(
            result,
            Err(ResolutionError::InvalidParameter { parameter, .. }) if parameter == "color"
        ));
    }

    #[test]
    fn element_expression_reads_the_element() {
        let store = store();
        let bar = store.resource("bar", "bar").unwrap();
        let rel = CompiledRelation::implicit("full", &bar);
        assert!(rel.needs_data());

        let data = json!([{"id": 1}, {"id": 2}]);
        let target = rel
            .evaluate(&data, &Pointer::root().child("1"), &bar)
            .unwrap();
        assert_eq!(target.vars["id"], json!(2));
    }
}
