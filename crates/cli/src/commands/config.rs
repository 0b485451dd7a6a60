use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use routedesk_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, to_details, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

struct FieldSpec {
    key: &'static str,
    env_keys: &'static [&'static str],
    overridden: bool,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let entries = fields(&config, options)
        .into_iter()
        .map(|(spec, value)| ConfigEntry {
            key: spec.key,
            value,
            source: field_source(&spec, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect::<Vec<_>>();

    match to_details("entries", entries) {
        Ok(details) => CommandResult::success_with(
            "config",
            "effective config (source precedence: override > env > file > default)",
            details,
        ),
        Err(failure) => CommandResult::from_failure("config", failure),
    }
}

fn fields(config: &AppConfig, options: &LoadOptions) -> Vec<(FieldSpec, String)> {
    let overrides = &options.overrides;
    vec![
        (
            FieldSpec {
                key: "database.url",
                env_keys: &["ROUTEDESK_DATABASE_URL"],
                overridden: overrides.database_url.is_some(),
            },
            config.database.url.clone(),
        ),
        (
            FieldSpec {
                key: "database.max_connections",
                env_keys: &["ROUTEDESK_DATABASE_MAX_CONNECTIONS"],
                overridden: false,
            },
            config.database.max_connections.to_string(),
        ),
        (
            FieldSpec {
                key: "database.timeout_secs",
                env_keys: &["ROUTEDESK_DATABASE_TIMEOUT_SECS"],
                overridden: false,
            },
            config.database.timeout_secs.to_string(),
        ),
        (
            FieldSpec {
                key: "sweep.grace_period_hours",
                env_keys: &["ROUTEDESK_SWEEP_GRACE_PERIOD_HOURS"],
                overridden: overrides.sweep_grace_period_hours.is_some(),
            },
            config.sweep.grace_period_hours.to_string(),
        ),
        (
            FieldSpec {
                key: "sweep.auto_rating",
                env_keys: &["ROUTEDESK_SWEEP_AUTO_RATING"],
                overridden: false,
            },
            config.sweep.auto_rating.to_string(),
        ),
        (
            FieldSpec {
                key: "sweep.batch_limit",
                env_keys: &["ROUTEDESK_SWEEP_BATCH_LIMIT"],
                overridden: false,
            },
            config.sweep.batch_limit.to_string(),
        ),
        (
            FieldSpec {
                key: "logging.level",
                env_keys: &["ROUTEDESK_LOGGING_LEVEL", "ROUTEDESK_LOG_LEVEL"],
                overridden: overrides.log_level.is_some(),
            },
            config.logging.level.clone(),
        ),
        (
            FieldSpec {
                key: "logging.format",
                env_keys: &["ROUTEDESK_LOGGING_FORMAT", "ROUTEDESK_LOG_FORMAT"],
                overridden: false,
            },
            config.logging.format.as_str().to_string(),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("routedesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/routedesk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    spec: &FieldSpec,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if spec.overridden {
        return "override".to_string();
    }

    if let Some(env_key) = spec.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, spec.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
