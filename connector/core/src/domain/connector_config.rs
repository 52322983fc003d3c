// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Connector Configuration Types
//
// Defines the configuration schema for a Crest connector, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Console prompt and listener ports (an absent port disables the transport)
// - Worker pool sizing for the work dispatcher
// - Static console users
// - Logging settings consumed by the CLI

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::session::Transport;

pub const API_VERSION: &str = "crest/v1";
pub const KIND: &str = "ConnectorConfig";

/// Top-level Kubernetes-style connector configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfigManifest {
    /// API version (must be "crest/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ConnectorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ConnectorConfigSpec,
}

/// Convenience alias used by the CLI
pub type ConnectorConfig = ConnectorConfigManifest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable connector name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfigSpec {
    /// Console prompt, a trailing space is added by the session server
    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default)]
    pub listeners: ListenerConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// SSH-like transport port; absent disables the transport
    #[serde(default)]
    pub ssh_port: Option<u16>,

    /// Line-oriented transport port; absent disables the transport
    #[serde(default = "default_line_port")]
    pub line_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker threads available to dispatched work
    #[serde(default = "default_worker_threads")]
    pub threads: usize,

    /// Queued plus running units before submissions are rejected
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Upper bound for blocking submissions; absent blocks indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Skip the console login exchange entirely
    #[serde(default)]
    pub anonymous: bool,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,

    /// Hex-encoded SHA-256 digest of the password
    pub password_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_prompt() -> String {
    "prompt>".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_line_port() -> Option<u16> {
    Some(2020)
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_pending() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ssh_port: None,
            line_port: default_line_port(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: default_worker_threads(),
            max_pending: default_max_pending(),
            execute_timeout_ms: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ConnectorConfigSpec {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            listeners: ListenerConfig::default(),
            workers: WorkerConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ConnectorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "crest-connector".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: ConnectorConfigSpec::default(),
        }
    }
}

impl WorkerConfig {
    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_ms.map(Duration::from_millis)
    }
}

impl ListenerConfig {
    /// Transports with a configured port, SSH first
    pub fn enabled_transports(&self) -> Vec<(Transport, u16)> {
        let mut enabled = Vec::new();
        if let Some(port) = self.ssh_port {
            enabled.push((Transport::Ssh, port));
        }
        if let Some(port) = self.line_port {
            enabled.push((Transport::Line, port));
        }
        enabled
    }
}

impl ConnectorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CREST_CONFIG_PATH environment variable
    /// 2. ./crest-config.yaml (working directory)
    /// 3. ~/.crest/config.yaml (user home)
    /// 4. /etc/crest/config.yaml (system, Unix) or C:\ProgramData\Crest\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CREST_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./crest-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".crest").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/crest/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Crest\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Locate and parse configuration: explicit path, discovery, then
    /// defaults. Logs nothing and applies no environment overrides, so it is
    /// safe to call before logging is initialised.
    pub fn resolve(cli_path: Option<PathBuf>) -> anyhow::Result<(Self, ConfigSource)> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            let config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            return Ok((config, ConfigSource::Explicit(path)));
        }

        match Self::discover_config() {
            Some(path) => {
                let config = Self::from_yaml_file(&path)?;
                Ok((config, ConfigSource::Discovered(path)))
            }
            None => Ok((Self::default(), ConfigSource::Defaults)),
        }
    }

    /// Log where a resolved configuration came from and apply environment
    /// overrides.
    pub fn finish(mut self, source: &ConfigSource) -> Self {
        source.log();
        self.apply_env_overrides();
        self
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (config, source) = Self::resolve(cli_path)?;
        Ok(config.finish(&source))
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(prompt) = lookup("CREST_PROMPT") {
            tracing::info!("Environment override: CREST_PROMPT");
            self.spec.prompt = prompt;
        }

        if let Some(address) = lookup("CREST_BIND_ADDRESS") {
            tracing::info!("Environment override: CREST_BIND_ADDRESS={}", address);
            self.spec.listeners.bind_address = address;
        }

        if let Some(val) = lookup("CREST_LINE_PORT") {
            if let Some(port) = parse_port_override("CREST_LINE_PORT", &val) {
                self.spec.listeners.line_port = port;
            }
        }

        if let Some(val) = lookup("CREST_SSH_PORT") {
            if let Some(port) = parse_port_override("CREST_SSH_PORT", &val) {
                self.spec.listeners.ssh_port = port;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.prompt.trim().is_empty() {
            anyhow::bail!("spec.prompt cannot be empty");
        }

        let listeners = &self.spec.listeners;
        if listeners.bind_address.is_empty() {
            anyhow::bail!("spec.listeners.bind_address cannot be empty");
        }
        if let (Some(ssh), Some(line)) = (listeners.ssh_port, listeners.line_port) {
            // Port 0 asks the OS for an ephemeral port, so two of them never clash
            if ssh == line && ssh != 0 {
                anyhow::bail!("spec.listeners.ssh_port and line_port must differ (both {})", ssh);
            }
        }

        if self.spec.workers.threads == 0 {
            anyhow::bail!("spec.workers.threads must be at least 1");
        }
        if self.spec.workers.max_pending == 0 {
            anyhow::bail!("spec.workers.max_pending must be at least 1");
        }

        let mut seen = HashSet::new();
        for user in &self.spec.security.users {
            if user.name.is_empty() {
                anyhow::bail!("User name cannot be empty");
            }
            if !seen.insert(user.name.as_str()) {
                anyhow::bail!("Duplicate user: {}", user.name);
            }
            if user.password_sha256.len() != 64
                || !user.password_sha256.chars().all(|c| c.is_ascii_hexdigit())
            {
                anyhow::bail!(
                    "password_sha256 for user '{}' must be 64 hex characters",
                    user.name
                );
            }
        }

        match self.spec.observability.log_format.as_str() {
            "compact" | "json" => {}
            other => anyhow::bail!("Invalid log_format: '{}'. Expected compact or json", other),
        }

        Ok(())
    }
}

/// Where [`ConnectorConfigManifest::resolve`] found the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Discovered(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => {
                tracing::info!("Loading configuration from explicit path: {:?}", path)
            }
            ConfigSource::Discovered(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path)
            }
            ConfigSource::Defaults => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.")
            }
        }
    }
}

/// `Some(None)` disables the transport, `None` means the value was ignored
fn parse_port_override(key: &str, value: &str) -> Option<Option<u16>> {
    match value.trim().to_lowercase().as_str() {
        "off" | "none" | "disabled" => {
            tracing::info!("Environment override: {}=off", key);
            Some(None)
        }
        other => match other.parse::<u16>() {
            Ok(port) => {
                tracing::info!("Environment override: {}={}", key, port);
                Some(Some(port))
            }
            Err(_) => {
                tracing::warn!(
                    "Invalid value for {}: '{}'. Expected a port number or 'off'. Ignoring.",
                    key,
                    value
                );
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    #[test]
    fn test_default_manifest() {
        let manifest = ConnectorConfigManifest::default();
        assert_eq!(manifest.api_version, "crest/v1");
        assert_eq!(manifest.kind, "ConnectorConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.prompt, "prompt>");
        assert_eq!(manifest.spec.listeners.line_port, Some(2020));
        assert_eq!(manifest.spec.listeners.ssh_port, None);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: crest/v1
kind: ConnectorConfig
metadata:
  name: test-connector
"#;
        let manifest = ConnectorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "test-connector");
        assert_eq!(manifest.spec.listeners.line_port, Some(2020));
        assert_eq!(manifest.spec.workers.threads, 4);
        assert_eq!(manifest.spec.workers.execute_timeout(), None);
    }

    #[test]
    fn test_null_port_disables_transport() {
        let yaml = r#"
apiVersion: crest/v1
kind: ConnectorConfig
metadata:
  name: ssh-only
spec:
  listeners:
    ssh_port: 2222
    line_port: null
  workers:
    execute_timeout_ms: 1500
"#;
        let manifest = ConnectorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(
            manifest.spec.listeners.enabled_transports(),
            vec![(Transport::Ssh, 2222)]
        );
        assert_eq!(
            manifest.spec.workers.execute_timeout(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crest-config.yaml");

        let mut manifest = ConnectorConfigManifest::default();
        manifest.metadata.name = "roundtrip".to_string();
        manifest.spec.security.users.push(UserConfig {
            name: "admin".to_string(),
            password_sha256: DIGEST.to_string(),
        });
        manifest.to_yaml_file(&path).unwrap();

        let parsed = ConnectorConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(parsed.metadata.name, "roundtrip");
        assert_eq!(parsed.spec.security.users.len(), 1);
        assert_eq!(parsed.spec.security.users[0].password_sha256, DIGEST);
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crest-config.yaml");
        let mut manifest = ConnectorConfigManifest::default();
        manifest.spec.observability.log_format = "json".to_string();
        manifest.to_yaml_file(&path).unwrap();

        let (config, source) = ConnectorConfigManifest::resolve(Some(path.clone())).unwrap();
        assert_eq!(source, ConfigSource::Explicit(path));
        assert_eq!(config.spec.observability.log_format, "json");

        let missing = dir.path().join("missing.yaml");
        assert!(ConnectorConfigManifest::resolve(Some(missing)).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut manifest = ConnectorConfigManifest::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("CREST_PROMPT", "crest>"),
            ("CREST_LINE_PORT", "off"),
            ("CREST_SSH_PORT", "2222"),
        ]);
        manifest.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.prompt, "crest>");
        assert_eq!(manifest.spec.listeners.line_port, None);
        assert_eq!(manifest.spec.listeners.ssh_port, Some(2222));
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut manifest = ConnectorConfigManifest::default();
        manifest.apply_overrides_from(|key| {
            (key == "CREST_LINE_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(manifest.spec.listeners.line_port, Some(2020));
    }

    #[test]
    fn test_validation() {
        let mut manifest = ConnectorConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.prompt = "  ".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.prompt = "prompt>".to_string();

        manifest.spec.listeners.ssh_port = Some(2020);
        assert!(manifest.validate().is_err());
        manifest.spec.listeners.ssh_port = None;

        manifest.spec.workers.threads = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.workers.threads = 2;

        manifest.spec.security.users.push(UserConfig {
            name: "admin".to_string(),
            password_sha256: "abc".to_string(),
        });
        assert!(manifest.validate().is_err());
        manifest.spec.security.users[0].password_sha256 = DIGEST.to_string();
        assert!(manifest.validate().is_ok());

        manifest.spec.security.users.push(UserConfig {
            name: "admin".to_string(),
            password_sha256: DIGEST.to_string(),
        });
        assert!(manifest.validate().is_err());
    }
}
