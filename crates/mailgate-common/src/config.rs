//! Configuration for Mailgate

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `MAILGATE__LOGGING__LEVEL=debug`
const ENV_PREFIX: &str = "MAILGATE";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// DNS resolver configuration
    #[serde(default)]
    pub dns: DnsConfig,

    /// Declared check instances, in pipeline order
    #[serde(default)]
    pub checks: Vec<CheckDeclaration>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// DNS resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Use the system resolver configuration (`/etc/resolv.conf`)
    #[serde(default = "default_use_system")]
    pub system: bool,

    /// Explicit nameservers (`ip` or `ip:port`), used when `system` is false
    #[serde(default)]
    pub nameservers: Vec<String>,

    /// Per-query timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            system: default_use_system(),
            nameservers: Vec::new(),
            timeout_secs: default_dns_timeout(),
        }
    }
}

fn default_use_system() -> bool {
    true
}

fn default_dns_timeout() -> u64 {
    5
}

/// One `[[checks]]` entry: a module name, an optional instance name and the
/// directives handed to the instance at init time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDeclaration {
    /// Registered module name
    pub module: String,

    /// Instance name, defaults to the module name
    pub instance: Option<String>,

    /// Remaining keys of the entry
    #[serde(flatten)]
    pub directives: toml::Table,
}

impl CheckDeclaration {
    /// Create a declaration with no directives
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            instance: None,
            directives: toml::Table::new(),
        }
    }

    /// Set the instance name
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Add a directive
    pub fn with_directive(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.directives.insert(key.to_string(), value.into());
        self
    }

    /// Effective instance name
    pub fn instance_name(&self) -> &str {
        self.instance.as_deref().unwrap_or(&self.module)
    }
}

impl Config {
    /// Load configuration from file, with environment overrides applied on top
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let source = config::File::from(path).format(config::FileFormat::Toml);
        Self::build(source)
    }

    /// Parse configuration from a TOML string, with environment overrides
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        Self::build(config::File::from_str(content, config::FileFormat::Toml))
    }

    fn build<S>(source: S) -> crate::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./mailgate.toml"),
            PathBuf::from("/etc/mailgate/mailgate.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert!(config.dns.system);
        assert_eq!(config.dns.timeout_secs, 5);
        assert!(config.checks.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[logging]
level = "debug"

[dns]
system = false
nameservers = ["127.0.0.53"]

[[checks]]
module = "require_mx_record"

[[checks]]
module = "require_matching_rdns"
instance = "rdns_soft"
debug = false
fail_action = "score 3"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(!config.dns.system);
        assert_eq!(config.dns.nameservers, vec!["127.0.0.53".to_string()]);
        assert_eq!(config.checks.len(), 2);

        let first = &config.checks[0];
        assert_eq!(first.instance_name(), "require_mx_record");
        assert!(first.directives.is_empty());

        let second = &config.checks[1];
        assert_eq!(second.instance_name(), "rdns_soft");
        assert_eq!(second.directives.get("debug"), Some(&toml::Value::Boolean(false)));
        assert_eq!(
            second.directives.get("fail_action"),
            Some(&toml::Value::String("score 3".to_string()))
        );
    }

    #[test]
    fn test_missing_module_is_error() {
        let toml = r#"
[[checks]]
instance = "orphan"
"#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_declaration_builder() {
        let decl = CheckDeclaration::new("spf")
            .with_instance("spf_soft")
            .with_directive("fail_action", "quarantine");
        assert_eq!(decl.instance_name(), "spf_soft");
        assert_eq!(decl.directives.len(), 1);
    }
}
