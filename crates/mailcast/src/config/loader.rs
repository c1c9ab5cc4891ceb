use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::config::schema::{Config, TransportKind};
use crate::error::ConfigError;

/// `~/.mailcast/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailcast").join("config.yaml"))
}

/// Loads and validates a config file. `.json` files are read as JSON,
/// everything else as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: Config = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    validate_config(&config)?;
    Ok(config)
}

/// Parses YAML (a superset of JSON) from a string and validates it.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads `path` if given, otherwise the default location if a file exists
/// there, otherwise built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }
    match default_config_path() {
        Some(default) if default.exists() => load_config(default),
        _ => {
            let config = Config::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let from = config.from_address.trim();
    if from.is_empty() || !from.contains('@') {
        return Err(ConfigError::Validation {
            message: format!("from_address '{}' is not an email address", from),
        });
    }

    if config.scheduler.job_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "scheduler.job_id must not be empty".to_string(),
        });
    }
    if config.scheduler.interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "scheduler.interval_secs must be greater than zero".to_string(),
        });
    }
    if config.scheduler.claim_ttl_secs < config.scheduler.interval_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "scheduler.claim_ttl_secs ({}) must be at least interval_secs ({})",
                config.scheduler.claim_ttl_secs, config.scheduler.interval_secs
            ),
        });
    }

    if config.transport == TransportKind::Smtp {
        if config.smtp.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "smtp.host must not be empty".to_string(),
            });
        }
        if config.smtp.port == 0 {
            return Err(ConfigError::Validation {
                message: "smtp.port must not be zero".to_string(),
            });
        }
        if config.smtp.username.is_some() && !config.smtp.password.is_configured() {
            return Err(ConfigError::Validation {
                message: "smtp.username is set but smtp.password has no source".to_string(),
            });
        }
    }

    if let Err(e) = EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::InvalidLogFilter {
            filter: config.logging.level.clone(),
            reason: e.to_string(),
        });
    }

    Ok(())
}
