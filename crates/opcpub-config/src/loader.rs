// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Settings loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse into [`PublisherSettings`]
//! 4. Apply `OPCPUB_*` environment overrides
//! 5. Resolve relative paths against the settings file's directory
//! 6. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! OPCPUB_PRODUCT_INFO=LineA-Publisher
//! OPCPUB_PUBLISHED_NODES_FILE=/etc/opcpub/publishednodes.json
//! OPCPUB_DISPATCH_ENDPOINT_URL=https://ingest.example.com/telemetry
//! OPCPUB_DISPATCH_WORKERS=8
//! OPCPUB_DIAGNOSTICS_INTERVAL=30
//! OPCPUB_REARM_SKIP_FIRST=true
//! OPCPUB_LOG_LEVEL=debug
//! OPCPUB_LOG_FORMAT=json
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{SettingsError, SettingsResult};
use crate::schema::{LogFormat, LogLevel, PublisherSettings};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "OPCPUB";

// =============================================================================
// SettingsLoader
// =============================================================================

/// Loads [`PublisherSettings`] from YAML, TOML or JSON files.
///
/// ```no_run
/// use opcpub_config::loader::SettingsLoader;
///
/// let settings = SettingsLoader::new().load("opcpub.yaml").unwrap();
/// println!("{}", settings.dispatch.endpoint_url);
/// ```
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    base_path: Option<PathBuf>,
    env_prefix: String,
    resolve_env_vars: bool,
    resolve_paths: bool,
}

impl SettingsLoader {
    /// Creates a loader with default behaviour.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment placeholders and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads settings from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> SettingsResult<PublisherSettings> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading settings");

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(&content)
        } else {
            content
        };

        let mut settings: PublisherSettings = parse_str(&content, format).map_err(|e| match e {
            SettingsError::Serialization { message } => SettingsError::parse(path, message),
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut settings)?;
        }
        if self.resolve_paths {
            resolve_relative_paths(&mut settings, &base_path);
        }

        settings.validate()?;

        debug!(
            product_info = %settings.publisher.product_info,
            nodes_file = %settings.nodes.published_nodes_file.display(),
            endpoint = %settings.dispatch.endpoint_url,
            "Settings loaded"
        );
        Ok(settings)
    }

    /// Parses settings from a string. Relative paths are left untouched.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> SettingsResult<PublisherSettings> {
        let mut settings: PublisherSettings = parse_str(content, format)?;
        if self.resolve_env_vars {
            self.apply_env_overrides(&mut settings)?;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn var(&self, suffix: &str) -> Option<(String, String)> {
        let name = format!("{}_{}", self.env_prefix, suffix);
        env::var(&name).ok().map(|value| (name, value))
    }

    fn apply_env_overrides(&self, settings: &mut PublisherSettings) -> SettingsResult<()> {
        if let Some((_, value)) = self.var("PRODUCT_INFO") {
            settings.publisher.product_info = value;
        }
        if let Some((_, value)) = self.var("PUBLISHED_NODES_FILE") {
            settings.nodes.published_nodes_file = PathBuf::from(value);
        }
        if let Some((_, value)) = self.var("DISPATCH_ENDPOINT_URL") {
            settings.dispatch.endpoint_url = value;
        }
        if let Some((name, value)) = self.var("DISPATCH_WORKERS") {
            settings.dispatch.workers = value
                .parse()
                .map_err(|_| SettingsError::invalid_env_var(name, "expected a positive number"))?;
        }
        if let Some((name, value)) = self.var("DIAGNOSTICS_INTERVAL") {
            let secs: u64 = value
                .parse()
                .map_err(|_| SettingsError::invalid_env_var(name, "expected seconds"))?;
            settings.diagnostics.interval = Duration::from_secs(secs);
        }
        if let Some((_, value)) = self.var("REARM_SKIP_FIRST") {
            settings.session.rearm_skip_first_on_reconnect = parse_bool(&value);
        }
        if let Some((name, value)) = self.var("LOG_LEVEL") {
            settings.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| SettingsError::invalid_env_var(name, "expected trace, debug, info, warn or error"))?;
        }
        if let Some((name, value)) = self.var("LOG_FORMAT") {
            settings.logging.format = LogFormat::parse(&value)
                .ok_or_else(|| SettingsError::invalid_env_var(name, "expected text, json or compact"))?;
        }
        Ok(())
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported settings file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> SettingsResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(SettingsError::unsupported_format(other)),
            None => Err(SettingsError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn read_file(path: &Path) -> SettingsResult<String> {
    if !path.exists() {
        return Err(SettingsError::file_not_found(path));
    }
    fs::read_to_string(path).map_err(|e| SettingsError::io(path, e))
}

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> SettingsResult<T> {
    match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| SettingsError::serialization(e.to_string())),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| SettingsError::serialization(e.to_string()))
        }
    }
}

fn parse_yaml<T: DeserializeOwned>(content: &str) -> SettingsResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| SettingsError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| SettingsError::serialization(e.to_string()))
}

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
///
/// Unknown variables without a default are kept verbatim.
fn resolve_env_placeholders(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };

        let inner = &after[..end];
        let (name, default) = match inner.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (inner, None),
        };

        match (env::var(name), default) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => {
                warn!(variable = name, "Environment variable not found");
                result.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

fn resolve_relative_paths(settings: &mut PublisherSettings, base_path: &Path) {
    let nodes_file = &mut settings.nodes.published_nodes_file;
    if nodes_file.is_relative() {
        *nodes_file = base_path.join(&*nodes_file);
    }
    if let Some(ref mut prom) = settings.diagnostics.prometheus_path {
        if prom.is_relative() {
            *prom = base_path.join(&*prom);
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads settings from a file with the default loader.
pub fn load_settings(path: impl AsRef<Path>) -> SettingsResult<PublisherSettings> {
    SettingsLoader::new().load(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
publisher:
  product_info: LineA
nodes:
  published_nodes_file: nodes/published.json
  default_heartbeat_interval: 5
  default_skip_first: true
session:
  connect_timeout: 2500
  rearm_skip_first_on_reconnect: true
dispatch:
  endpoint_url: https://ingest.example.com/telemetry
  workers: 2
  queue_capacity: 16
diagnostics:
  interval: 0
logging:
  level: debug
  format: json
"#;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn loader(prefix: &str) -> SettingsLoader {
        SettingsLoader::new().with_env_prefix(prefix)
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(".yaml", YAML);
        let settings = loader("OPCPUB_TEST_YAML").load(file.path()).unwrap();

        assert_eq!(settings.publisher.product_info, "LineA");
        assert_eq!(settings.nodes.default_heartbeat_interval, Duration::from_secs(5));
        assert!(settings.nodes.default_skip_first);
        assert_eq!(settings.session.connect_timeout, Duration::from_millis(2500));
        assert!(settings.session.rearm_skip_first_on_reconnect);
        assert_eq!(settings.dispatch.workers, 2);
        assert_eq!(settings.dispatch.max_send_attempts, 3);
        assert!(!settings.diagnostics.is_enabled());
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);

        let parent = file.path().parent().unwrap();
        assert_eq!(
            settings.nodes.published_nodes_file,
            parent.join("nodes/published.json")
        );
    }

    #[test]
    fn test_load_toml_and_json() {
        let toml = "[dispatch]\nendpoint_url = \"http://127.0.0.1:9000/ingest\"\nworkers = 1\n";
        let file = write_temp(".toml", toml);
        let settings = loader("OPCPUB_TEST_TOML").load(file.path()).unwrap();
        assert_eq!(settings.dispatch.endpoint_url, "http://127.0.0.1:9000/ingest");
        assert_eq!(settings.dispatch.workers, 1);

        let json = r#"{"publisher": {"product_info": "FromJson"}}"#;
        let file = write_temp(".json", json);
        let settings = loader("OPCPUB_TEST_JSON").load(file.path()).unwrap();
        assert_eq!(settings.publisher.product_info, "FromJson");
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("a.ini")),
            Err(SettingsError::UnsupportedFormat { .. })
        ));
        assert!(ConfigFormat::from_path(Path::new("settings")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let prefix = "OPCPUB_TEST_OVERRIDE";
        env::set_var(format!("{prefix}_PRODUCT_INFO"), "FromEnv");
        env::set_var(format!("{prefix}_DISPATCH_WORKERS"), "6");
        env::set_var(format!("{prefix}_REARM_SKIP_FIRST"), "yes");
        env::set_var(format!("{prefix}_LOG_FORMAT"), "compact");

        let settings = loader(prefix).load_from_str("{}", ConfigFormat::Json).unwrap();
        assert_eq!(settings.publisher.product_info, "FromEnv");
        assert_eq!(settings.dispatch.workers, 6);
        assert!(settings.session.rearm_skip_first_on_reconnect);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_env_override() {
        let prefix = "OPCPUB_TEST_BADENV";
        env::set_var(format!("{prefix}_DISPATCH_WORKERS"), "many");
        let result = loader(prefix).load_from_str("{}", ConfigFormat::Json);
        assert!(matches!(result, Err(SettingsError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_env_placeholders() {
        env::set_var("OPCPUB_TEST_PLACEHOLDER_URL", "https://a.example.com/t");
        let resolved = resolve_env_placeholders(
            "url: ${OPCPUB_TEST_PLACEHOLDER_URL}\nname: ${OPCPUB_TEST_MISSING:fallback}\nkeep: ${OPCPUB_TEST_MISSING}",
        );
        assert_eq!(
            resolved,
            "url: https://a.example.com/t\nname: fallback\nkeep: ${OPCPUB_TEST_MISSING}"
        );
        assert_eq!(resolve_env_placeholders("open ${NOPE"), "open ${NOPE");
    }

    #[test]
    fn test_validation_error_surfaces() {
        let file = write_temp(".yaml", "dispatch:\n  workers: 0\n");
        let result = loader("OPCPUB_TEST_INVALID").load(file.path());
        assert!(matches!(result, Err(SettingsError::Validation { .. })));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let file = write_temp(".json", "{ not json");
        let result = loader("OPCPUB_TEST_PARSE").load(file.path());
        match result {
            Err(SettingsError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_file_not_found() {
        let result = load_settings("/nonexistent/opcpub.yaml");
        assert!(matches!(result, Err(SettingsError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("ON"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
    }
}
