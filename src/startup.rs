//! Pre-flight checks and operator-facing startup output.
//!
//! Everything here runs before a listener binds. Rendering functions return
//! strings so the binary decides where they go.

use secrecy::SecretString;

use crate::config::{BotConfig, FieldCheck};
use crate::error::StartupError;

pub const CHANNEL_SECRET_ENV: &str = "LINE_CHANNEL_SECRET";
pub const ACCESS_TOKEN_ENV: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const REQUIRED_ENV_VARS: [&str; 2] = [CHANNEL_SECRET_ENV, ACCESS_TOKEN_ENV];

const MASK: &str = "**********";
const RULE_WIDTH: usize = 50;

/// Channel credentials sourced from the environment.
#[derive(Debug)]
pub struct Credentials {
    pub channel_secret: SecretString,
    pub access_token: SecretString,
}

impl Credentials {
    pub fn new(channel_secret: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            channel_secret: SecretString::from(channel_secret.into()),
            access_token: SecretString::from(access_token.into()),
        }
    }
}

/// Presence of one required variable.
#[derive(Debug, Clone)]
pub struct EnvVarStatus {
    pub name: &'static str,
    value: Option<String>,
}

impl EnvVarStatus {
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Masked rendering, `None` when absent.
    pub fn masked(&self) -> Option<String> {
        self.value.as_deref().map(mask_secret)
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentReport {
    pub entries: Vec<EnvVarStatus>,
}

impl EnvironmentReport {
    /// Check the required variables through `lookup`. Empty values count
    /// as absent.
    pub fn collect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let entries = REQUIRED_ENV_VARS
            .iter()
            .map(|name| EnvVarStatus {
                name: *name,
                value: lookup(*name).filter(|v| !v.is_empty()),
            })
            .collect();
        Self { entries }
    }

    pub fn from_process_env() -> Self {
        Self::collect(|name| std::env::var(name).ok())
    }

    pub fn missing(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_present())
            .map(|e| e.name.to_string())
            .collect()
    }

    /// One line per variable, values masked.
    pub fn render(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| match e.masked() {
                Some(masked) => format!("[ok] {}: {}", e.name, masked),
                None => format!("[missing] {}: not set", e.name),
            })
            .collect()
    }

    pub fn into_credentials(self) -> Result<Credentials, StartupError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(StartupError::MissingEnvVars(missing));
        }
        let mut values = self.entries.into_iter().map(|e| e.value.unwrap_or_default());
        let channel_secret = values.next().unwrap_or_default();
        let access_token = values.next().unwrap_or_default();
        Ok(Credentials::new(channel_secret, access_token))
    }
}

/// Ten asterisks followed by the last four characters. Values of four
/// characters or fewer are masked entirely.
pub fn mask_secret(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return MASK.to_owned();
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("{}{}", MASK, tail)
}

/// Shell lines an operator can paste to set the missing variables.
pub fn export_hints(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("  export {}=your_{}", name, name.to_lowercase()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_field_checks(checks: &[FieldCheck]) -> Vec<String> {
    checks
        .iter()
        .map(|c| match &c.value {
            Some(v) => format!("[ok] {}: {}", c.field, v),
            None => format!("[missing] required field {}", c.field),
        })
        .collect()
}

pub fn render_banner(config: &BotConfig) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let base = format!("http://{}", config.listen_address());
    [
        rule.clone(),
        format!("  {} v{}", config.bot.name, config.bot.version),
        rule.clone(),
        format!("listening on:  {}", base),
        format!("webhook path:  {}", config.line.webhook_path),
        format!("health check:  {}/", base),
        rule,
        "press Ctrl+C to stop".to_owned(),
    ]
    .join("\n")
}
