use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secrets::SecretSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file. Defaults to `~/.mailcast/data/mailcast.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Sender address stamped on every outgoing message.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_from_address() -> String {
    "mailcast@localhost".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            from_address: default_from_address(),
            transport: TransportKind::default(),
            smtp: SmtpConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// The configured database file (`~/` expanded), or the per-user default.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(
                &path.to_string_lossy(),
            ))),
            None => crate::db::default_database_path(),
        }
    }
}

/// Which outbound transport the dispatcher uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Smtp,
    /// Write envelopes to the log and report success.
    #[default]
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: TlsMode,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: SecretSource,
    /// Connection and command timeout. Unset keeps the transport default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            tls: TlsMode::default(),
            username: None,
            password: SecretSource::default(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain text. Only sensible for a local relay.
    None,
    /// Upgrade with STARTTLS if the server offers it.
    Opportunistic,
    /// Require STARTTLS.
    #[default]
    Starttls,
    /// Implicit TLS from the first byte (usually port 465).
    Wrapper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_job_id")]
    pub job_id: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How long a dispatch claim on a mailing is honoured before another
    /// worker may take it over.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
}

fn default_job_id() -> String {
    "mailing_job".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_claim_ttl_secs() -> u64 {
    15 * 60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_id: default_job_id(),
            interval_secs: default_interval_secs(),
            claim_ttl_secs: default_claim_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `mailcast=debug,warn`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
