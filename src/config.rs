use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

/// Dotted paths that must be present in the configuration document.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "bot.name",
    "bot.version",
    "server.host",
    "server.port",
    "line.webhook_path",
];

/// Environment variable consulted by the CLI when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "LINEBOT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "default.yaml";

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub line: LineSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotSection {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_bot_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    /// Upper bound for buffered webhook bodies.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineSection {
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Base URL of the Messaging API. Overridable so the reply endpoint can
    /// be pointed at a local stand-in.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Timeout for reply calls. `None` keeps the HTTP client defaults.
    #[serde(default)]
    pub reply_timeout_ms: Option<u64>,
}

fn default_bot_name() -> String {
    "LINE Bot".to_owned()
}
fn default_bot_version() -> String {
    "1.0.0".to_owned()
}
fn default_host() -> String {
    "0.0.0.0".to_owned()
}
fn default_port() -> u16 {
    8000
}
fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
fn default_webhook_path() -> String {
    "/callback".to_owned()
}
fn default_api_base_url() -> String {
    "https://api.line.me".to_owned()
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            version: default_bot_version(),
            description: None,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LineSection {
    fn default() -> Self {
        Self {
            webhook_path: default_webhook_path(),
            api_base_url: default_api_base_url(),
            reply_timeout_ms: None,
        }
    }
}

impl BotConfig {
    /// `host:port` as given in the document.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn normalize(&mut self) {
        if !self.line.webhook_path.starts_with('/') {
            self.line.webhook_path = format!("/{}", self.line.webhook_path);
        }
        while self.line.api_base_url.ends_with('/') {
            self.line.api_base_url.pop();
        }
    }
}

/// Result of checking one required dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCheck {
    pub field: &'static str,
    /// Rendered value when present.
    pub value: Option<String>,
}

/// A parsed configuration document together with its typed view.
#[derive(Debug)]
pub struct LoadedConfig {
    pub path: String,
    raw: config::Config,
    pub config: BotConfig,
}

impl LoadedConfig {
    /// Inspect every required field. A YAML `null` counts as missing.
    pub fn check_required(&self) -> Vec<FieldCheck> {
        REQUIRED_FIELDS
            .iter()
            .map(|&field| {
                let value = match self.raw.get::<config::Value>(field) {
                    Ok(v) if !matches!(v.kind, config::ValueKind::Nil) => v.into_string().ok(),
                    _ => None,
                };
                FieldCheck { field, value }
            })
            .collect()
    }

    /// Names of all required fields absent from the document.
    pub fn missing_fields(&self) -> Vec<String> {
        self.check_required()
            .into_iter()
            .filter(|c| c.value.is_none())
            .map(|c| c.field.to_string())
            .collect()
    }

    /// Fails with every missing field, not only the first.
    pub fn validate(&self) -> Result<(), StartupError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StartupError::MissingConfigFields(missing))
        }
    }
}

/// Read and parse the YAML document at `path`.
pub fn load_config(path: &Path) -> Result<LoadedConfig, StartupError> {
    let shown = path.display().to_string();
    if !path.is_file() {
        return Err(StartupError::ConfigNotFound { path: shown });
    }

    let parse_err = |err: config::ConfigError| StartupError::ConfigParse {
        path: shown.clone(),
        detail: err.to_string(),
    };

    let raw = config::Config::builder()
        .add_source(config::File::new(&shown, config::FileFormat::Yaml).required(true))
        .build()
        .map_err(parse_err)?;

    // Null entries fall back to their defaults in the typed view; the
    // required-field check still sees them through `raw`.
    let mut tree: config::Value = raw.clone().try_deserialize().map_err(parse_err)?;
    drop_nulls(&mut tree);
    let mut typed: BotConfig = tree.try_deserialize().map_err(parse_err)?;
    typed.normalize();

    Ok(LoadedConfig {
        path: shown,
        raw,
        config: typed,
    })
}

fn drop_nulls(value: &mut config::Value) {
    if let config::ValueKind::Table(table) = &mut value.kind {
        table.retain(|_, v| !matches!(v.kind, config::ValueKind::Nil));
        table.values_mut().for_each(drop_nulls);
    }
}
