//! Runtime configuration.
//!
//! Defaults suit a server that mounts its resources at the bare host root.
//! Override via environment variables or the builder-style setters.

use crate::error::ConfigError;

/// How the `$` at the start of a path template expands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathRoot {
    /// `$` expands to nothing.
    #[default]
    Bare,
    /// `$` expands to `/api/{name}/{version}`, with the instance inserted
    /// after `/api` when the target has one.
    Api,
}

impl PathRoot {
    /// Expand the service root for a document's `name`/`version`.
    pub fn expand(&self, name: Option<&str>, version: Option<&str>, instance: Option<&str>) -> String {
        match self {
            PathRoot::Bare => String::new(),
            PathRoot::Api => {
                let mut root = String::from("/api");
                for part in [instance, name, version].into_iter().flatten() {
                    root.push('/');
                    root.push_str(part);
                }
                root
            }
        }
    }
}

impl std::str::FromStr for PathRoot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bare" => Ok(PathRoot::Bare),
            "api" => Ok(PathRoot::Api),
            _ => Err(s.to_string()),
        }
    }
}

/// Settings shared by every representation of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub path_root: PathRoot,
    /// Shape-check payloads before sending.
    pub validate_requests: bool,
    /// Shape-check responses against their declared type.
    pub validate_responses: bool,
    /// Request timeout used by the default transport.
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            path_root: PathRoot::Bare,
            validate_requests: true,
            validate_responses: true,
            timeout_secs: 30,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `RESTWALK_PATH_ROOT`: `bare` or `api` (default: `bare`)
    /// - `RESTWALK_VALIDATE_REQUESTS`: `true` or `false` (default: `true`)
    /// - `RESTWALK_VALIDATE_RESPONSES`: `true` or `false` (default: `true`)
    /// - `RESTWALK_TIMEOUT_SECS` (default: 30)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            path_root: env_parse("RESTWALK_PATH_ROOT", defaults.path_root)?,
            validate_requests: env_parse("RESTWALK_VALIDATE_REQUESTS", defaults.validate_requests)?,
            validate_responses: env_parse("RESTWALK_VALIDATE_RESPONSES", defaults.validate_responses)?,
            timeout_secs: env_parse("RESTWALK_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }

    pub fn with_path_root(mut self, path_root: PathRoot) -> Self {
        self.path_root = path_root;
        self
    }

    pub fn with_request_validation(mut self, enabled: bool) -> Self {
        self.validate_requests = enabled;
        self
    }

    pub fn with_response_validation(mut self, enabled: bool) -> Self {
        self.validate_responses = enabled;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.path_root, PathRoot::Bare);
        assert!(config.validate_requests);
        assert!(config.validate_responses);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn api_root_includes_instance() {
        let root = PathRoot::Api;
        assert_eq!(root.expand(Some("catalog"), Some("1.0"), None), "/api/catalog/1.0");
        assert_eq!(
            root.expand(Some("catalog"), Some("1.0"), Some("east")),
            "/api/east/catalog/1.0"
        );
        assert_eq!(PathRoot::Bare.expand(Some("catalog"), Some("1.0"), Some("east")), "");
    }

    #[test]
    fn env_parse_uses_default_when_var_absent() {
        let value = env_parse("RESTWALK_NONEXISTENT_12345", 7u64).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn env_parse_rejects_invalid_value() {
        std::env::set_var("RESTWALK_TEST_BAD_BOOL", "maybe");
        let result = env_parse("RESTWALK_TEST_BAD_BOOL", true);
        std::env::remove_var("RESTWALK_TEST_BAD_BOOL");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn builders_override_single_fields() {
        let config = RuntimeConfig::default()
            .with_path_root(PathRoot::Api)
            .with_response_validation(false)
            .with_timeout_secs(5);
        assert_eq!(config.path_root, PathRoot::Api);
        assert!(config.validate_requests);
        assert!(!config.validate_responses);
        assert_eq!(config.timeout_secs, 5);
    }
}
