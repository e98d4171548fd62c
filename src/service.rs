//! Entry points: a [`Runtime`] ties the store, the connection manager and
//! the configuration together; a [`Service`] is one document on one host.

use std::sync::Arc;

use crate::catalog::ResourceDef;
use crate::config::RuntimeConfig;
use crate::connection::Connection;
use crate::datarep::DataRep;
use crate::document::SchemaDocument;
use crate::error::{Error, LoadError, ResolutionError};
use crate::manager::ConnectionManager;
use crate::store::SchemaStore;
use crate::types::Vars;

struct RuntimeInner {
    store: Arc<SchemaStore>,
    manager: Arc<ConnectionManager>,
    config: RuntimeConfig,
}

/// Shared context of every representation.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new(store: Arc<SchemaStore>, manager: Arc<ConnectionManager>, config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                store,
                manager,
                config,
            }),
        }
    }

    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.inner.store
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.inner.manager
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Document `document` served by `host` (and `instance`, if any).
    ///
    /// # Errors
    ///
    /// Returns `LoadError::UnknownDocument` when the document is not loaded
    /// and `ConfigError` for an invalid host.
    pub fn service(&self, document: &str, host: &str, instance: Option<&str>) -> Result<Service, Error> {
        let document = self
            .store()
            .document(document)
            .ok_or_else(|| LoadError::UnknownDocument {
                id: document.to_string(),
            })?;
        let connection = self.manager().connection_for(host, instance)?;
        Ok(Service {
            runtime: self.clone(),
            document,
            connection,
        })
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("documents", &self.store().documents().len())
            .field("manager", self.manager())
            .field("config", self.config())
            .finish()
    }
}

/// A loaded document bound to the connection that serves it.
#[derive(Debug, Clone)]
pub struct Service {
    runtime: Runtime,
    document: Arc<SchemaDocument>,
    connection: Arc<Connection>,
}

impl Service {
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn document(&self) -> &Arc<SchemaDocument> {
        &self.document
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn resource(&self, name: &str) -> Result<Arc<ResourceDef>, ResolutionError> {
        self.runtime.store().resource(self.document.id(), name)
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.document.resource_names()
    }

    /// Representation of resource `name` at the URI its `self` link gives.
    ///
    /// Names that are placeholders of the `self` path bind it; the rest must
    /// be declared parameters of the `self` link and become query
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns `NotBindable` for a resource without a `self` link,
    /// `MissingPathVariable` for an unbound placeholder and
    /// `InvalidParameter` for an undeclared extra name.
    pub fn bind(&self, name: &str, vars: Vars) -> Result<DataRep, ResolutionError> {
        let resource = self.resource(name)?;
        let template = resource
            .self_path()
            .ok_or_else(|| ResolutionError::NotBindable {
                resource: resource.id().to_string(),
            })?;

        let mut path_vars = Vars::new();
        let mut params = Vars::new();
        for (key, value) in vars {
            if template.has_variable(&key) {
                path_vars.insert(key, value);
            } else if resource.self_params().contains(&key) {
                params.insert(key, value);
            } else {
                return Err(ResolutionError::InvalidParameter {
                    template: template.to_string(),
                    parameter: key,
                });
            }
        }

        DataRep::bound(
            self.runtime.clone(),
            resource,
            path_vars,
            params,
            self.connection.clone(),
        )
    }
}
