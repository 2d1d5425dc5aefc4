//! Configuration types, built from environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// Funnel identifier stamped on leads that don't carry their own source.
pub const DEFAULT_LEAD_SOURCE: &str = "ai_career_funnel";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Path of the libSQL database file. `None` runs on the in-memory mirror only.
    pub db_path: Option<PathBuf>,
    /// Optional override for the email template file.
    pub templates_path: Option<PathBuf>,
    /// Link substituted for `{{ctaLink}}`.
    pub cta_url: String,
    /// Name substituted for `{{advisorName}}`.
    pub advisor_name: String,
    /// Default `source` for captured leads.
    pub lead_source: String,
    /// How often the persistent backend is probed for connectivity.
    pub db_probe_interval: Duration,
    /// Directory for rolling log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            db_path: Some(PathBuf::from("./data/lead-funnel.db")),
            templates_path: None,
            cta_url: "https://academy.example.com/enroll".to_string(),
            advisor_name: "Sarah Mitchell".to_string(),
            lead_source: DEFAULT_LEAD_SOURCE.to_string(),
            db_probe_interval: Duration::from_secs(30), // 30 seconds
            log_dir: None,
        }
    }
}

impl FunnelConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// Setting `FUNNEL_DB_PATH` to an empty string disables the persistent backend.
    /// A set but unparsable numeric variable is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = match std::env::var("FUNNEL_DB_PATH") {
            Ok(p) if p.trim().is_empty() => None,
            Ok(p) => Some(PathBuf::from(p)),
            Err(_) => defaults.db_path,
        };

        let db_probe_interval = Duration::from_secs(parse_var(
            "FUNNEL_DB_PROBE_SECS",
            std::env::var("FUNNEL_DB_PROBE_SECS").ok(),
            defaults.db_probe_interval.as_secs(),
        )?);

        Ok(Self {
            bind_addr: std::env::var("FUNNEL_BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_path,
            templates_path: std::env::var("FUNNEL_TEMPLATES_PATH").ok().map(PathBuf::from),
            cta_url: std::env::var("FUNNEL_CTA_URL").unwrap_or(defaults.cta_url),
            advisor_name: std::env::var("FUNNEL_ADVISOR_NAME").unwrap_or(defaults.advisor_name),
            lead_source: std::env::var("FUNNEL_LEAD_SOURCE").unwrap_or(defaults.lead_source),
            db_probe_interval,
            log_dir: std::env::var("FUNNEL_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

/// Parse an optional raw value, using `default` when it is unset or blank.
fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value:?}: {e}"),
        }),
    }
}

/// Default SMTP network timeout. Well under lettre's own 60 s default.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP transport configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Per-command SMTP network timeout.
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if the host or credentials are missing (transport disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let (Some(host), Some(username), Some(password)) =
            (var("SMTP_HOST"), var("SMTP_USERNAME"), var("SMTP_PASSWORD"))
        else {
            return Ok(None);
        };

        let port: u16 = parse_var("SMTP_PORT", var("SMTP_PORT"), 587)?;
        let timeout_secs: u64 = parse_var(
            "SMTP_TIMEOUT_SECS",
            var("SMTP_TIMEOUT_SECS"),
            DEFAULT_SMTP_TIMEOUT.as_secs(),
        )?;

        let from_address = var("EMAIL_FROM").unwrap_or_else(|| username.clone());

        Ok(Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
            timeout: Duration::from_secs(timeout_secs),
        }))
    }
}

/// Settings for the optional LLM-backed recommendation path.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

impl LlmSettings {
    /// Returns `Ok(None)` when no API key is available for the selected backend.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let backend: LlmBackend = parse_var(
            "FUNNEL_LLM_BACKEND",
            std::env::var("FUNNEL_LLM_BACKEND").ok(),
            LlmBackend::Anthropic,
        )?;

        let Some(api_key) = std::env::var(backend.api_key_var())
            .ok()
            .filter(|k| !k.is_empty())
        else {
            return Ok(None);
        };
        let model = std::env::var("FUNNEL_LLM_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        Ok(Some(Self {
            backend,
            api_key: SecretString::from(api_key),
            model,
        }))
    }
}
