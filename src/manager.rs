//! Connection pooling, per-host credentials and process-wide hooks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::connection::{Connection, Credentials, Hook, Hooks, Target, Transport};
use crate::error::ConfigError;

/// Produces a transport for each new pooled connection.
pub trait Connector: Send + Sync {
    /// # Errors
    ///
    /// Returns `ConfigError` when no transport can be built for `target`.
    fn connect(&self, target: &Target) -> Result<Arc<dyn Transport>, ConfigError>;
}

/// Pools connections by host and instance.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    pool: Mutex<HashMap<Target, Arc<Connection>>>,
    hooks: Hooks,
    credentials: Mutex<HashMap<String, Credentials>>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::with_connector(Arc::new(connector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pool: Mutex::new(HashMap::new()),
            hooks: Hooks::default(),
            credentials: Mutex::new(HashMap::new()),
        }
    }

    /// Register a hook for every connection, including existing ones.
    pub fn add_hook(&self, hook: impl Hook + 'static) {
        self.hooks.write().push(Arc::new(hook));
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.read().len()
    }

    /// Use `credentials` for every request to `host`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHost` when `host` cannot be normalised.
    pub fn set_credentials(&self, host: &str, credentials: Credentials) -> Result<(), ConfigError> {
        let host = normalize_host(host)?;
        for (target, connection) in self.pool.lock().iter() {
            if target.host == host {
                connection.set_credentials(Some(credentials.clone()));
            }
        }
        self.credentials.lock().insert(host, credentials);
        Ok(())
    }

    /// The pooled connection for `host`/`instance`, created on first use.
    ///
    /// A connection that was closed is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an invalid host or a connector failure.
    pub fn connection_for(&self, host: &str, instance: Option<&str>) -> Result<Arc<Connection>, ConfigError> {
        let target = pool_target(host, instance)?;

        let mut pool = self.pool.lock();
        if let Some(connection) = pool.get(&target) {
            if !connection.is_closed() {
                return Ok(connection.clone());
            }
        }

        let transport = self.connector.connect(&target)?;
        let credentials = self.credentials.lock().get(&target.host).cloned();
        let connection = Arc::new(Connection::new(
            target.clone(),
            transport,
            self.hooks.clone(),
            credentials,
        ));
        debug!(target = %target, "opened connection");
        pool.insert(target, connection.clone());
        Ok(connection)
    }

    /// Close and forget the connection for `host`/`instance`, if pooled.
    pub fn close(&self, host: &str, instance: Option<&str>) -> bool {
        let Ok(target) = pool_target(host, instance) else {
            return false;
        };
        match self.pool.lock().remove(&target) {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Close every pooled connection.
    pub fn close_all(&self) {
        for connection in self.pool.lock().values() {
            connection.close();
        }
    }

    /// Close every connection and forget the pool.
    pub fn reset(&self) {
        let drained: Vec<_> = self.pool.lock().drain().collect();
        for (_, connection) in drained {
            connection.close();
        }
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.pool.lock().values().cloned().collect()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.pool.lock().len())
            .field("hooks", &self.hook_count())
            .field("credentials", &*self.credentials.lock())
            .finish()
    }
}

/// Pool key for `host`/`instance`; an empty instance means none.
fn pool_target(host: &str, instance: Option<&str>) -> Result<Target, ConfigError> {
    Ok(Target {
        host: normalize_host(host)?,
        instance: instance.filter(|i| !i.is_empty()).map(String::from),
    })
}

/// Normalise a host to its origin, `scheme://host[:port]`.
///
/// A host without a scheme gets `https`, except on port 80, which gets
/// `http`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidHost` for anything that is not an origin.
pub fn normalize_host(host: &str) -> Result<String, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidHost {
        host: host.to_string(),
        message: message.to_string(),
    };

    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid("empty host"));
    }
    let full = if trimmed.contains("://") {
        trimmed.to_string()
    } else if trimmed.ends_with(":80") {
        format!("http://{}", trimmed)
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&full).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("no host name"));
    }
    if url.path() != "/" || url.query().is_some() {
        return Err(invalid("a host may not carry a path or query"));
    }
    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{TransportError, TransportRequest, TransportResponse};
    use async_trait::async_trait;

    struct Null;

    #[async_trait]
    impl Transport for Null {
        async fn send(&self, _: TransportRequest) -> Result<TransportResponse, TransportError> {
            Err(TransportError::new("offline"))
        }
    }

    struct NullConnector;

    impl Connector for NullConnector {
        fn connect(&self, _: &Target) -> Result<Arc<dyn Transport>, ConfigError> {
            Ok(Arc::new(Null))
        }
    }

    #[test]
    fn normalize_host_defaults() {
        assert_eq!(normalize_host("h1").unwrap(), "https://h1");
        assert_eq!(normalize_host("h1:80").unwrap(), "http://h1");
        assert_eq!(normalize_host("h1:8443").unwrap(), "https://h1:8443");
        assert_eq!(normalize_host("http://h1:8080/").unwrap(), "http://h1:8080");
        assert_eq!(normalize_host("https://h1:443").unwrap(), "https://h1");
        assert!(normalize_host("").is_err());
        assert!(normalize_host("https://h1/api").is_err());
    }

    #[test]
    fn connections_are_pooled_by_target() {
        let manager = ConnectionManager::new(NullConnector);
        let a = manager.connection_for("h1", None).unwrap();
        let b = manager.connection_for("https://h1", None).unwrap();
        let c = manager.connection_for("h1", Some("i2")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(manager.connections().len(), 2);
    }

    #[test]
    fn closed_connection_is_replaced() {
        let manager = ConnectionManager::new(NullConnector);
        let a = manager.connection_for("h1", None).unwrap();
        assert!(manager.close("h1", None));
        assert!(a.is_closed());
        let b = manager.connection_for("h1", None).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!manager.close("h9", None));
    }

    #[test]
    fn empty_instance_is_no_instance() {
        let manager = ConnectionManager::new(NullConnector);
        let a = manager.connection_for("h1", Some("")).unwrap();
        assert_eq!(a.instance(), None);
        assert!(Arc::ptr_eq(&a, &manager.connection_for("h1", None).unwrap()));
        assert!(manager.close("h1", Some("")));
        assert!(a.is_closed());
    }

    #[test]
    fn reset_closes_and_forgets() {
        let manager = ConnectionManager::new(NullConnector);
        let a = manager.connection_for("h1", None).unwrap();
        manager.reset();
        assert!(a.is_closed());
        assert!(manager.connections().is_empty());
    }

    #[test]
    fn credentials_reach_existing_connections() {
        let manager = ConnectionManager::new(NullConnector);
        let a = manager.connection_for("h1", None).unwrap();
        manager
            .set_credentials("h1", Credentials::Bearer("tok".into()))
            .unwrap();
        assert!(format!("{:?}", a).contains("Bearer"));
        assert!(!format!("{:?}", manager).contains("tok"));
    }
}
