use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppSettings;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 6] = [
    "api_key",
    "secret",
    "password",
    "credential",
    "access_token",
    "bearer",
];

/// Reads and writes `config.yml`, keeping credentials in a separate `secrets.yaml`.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    config_override: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        let config_override = env::var("DOCCHAT_CONFIG_PATH").ok().map(PathBuf::from);
        Self {
            paths,
            config_override,
        }
    }

    pub fn with_config_path(paths: Arc<AppPaths>, config_path: PathBuf) -> Self {
        Self {
            paths,
            config_override: Some(config_path),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config_override {
            return path.clone();
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    fn config_write_path(&self) -> PathBuf {
        self.config_override
            .clone()
            .unwrap_or_else(|| self.paths.user_data_dir.join("config.yml"))
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.paths.secrets_path);
        Ok(deep_merge(&public_config, &secrets_config))
    }

    /// Loads the merged config and resolves it into typed settings.
    pub fn load_settings(&self) -> Result<AppSettings, ApiError> {
        let config = self.load_config()?;
        AppSettings::from_config(&config)
    }

    /// Replaces (or merges into) the stored config. Redacted placeholders in
    /// `config_data` keep the currently stored secret.
    pub fn update_config(&self, config_data: Value, merge: bool) -> Result<(), ApiError> {
        let current = self.load_config()?;
        let restored = restore_redacted_values(&config_data, &current);
        let to_save = if merge {
            deep_merge(&current, &restored)
        } else {
            restored
        };

        validate_config(&to_save)?;
        self.save(&to_save)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }

    fn save(&self, config: &Value) -> Result<(), ApiError> {
        let (public_config, secrets_config) = split_config(config);
        write_yaml_file(&self.config_write_path(), &public_config)?;
        write_yaml_file(&self.paths.secrets_path, &secrets_config)?;
        tracing::info!("Config saved to {}", self.config_write_path().display());
        Ok(())
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!("Failed to read {}: {}", path.display(), err);
            return Value::Object(Map::new());
        }
    };

    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => Value::Object(Map::new()),
        Err(err) => {
            tracing::warn!("Ignoring malformed YAML in {}: {}", path.display(), err);
            Value::Object(Map::new())
        }
    }
}

fn write_yaml_file(path: &Path, value: &Value) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let yaml = serde_yaml::to_string(value).map_err(ApiError::internal)?;
    fs::write(path, yaml).map_err(ApiError::internal)
}

fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

fn split_config(config: &Value) -> (Value, Value) {
    let Value::Object(map) = config else {
        return (config.clone(), Value::Object(Map::new()));
    };

    let mut public_map = Map::new();
    let mut secret_map = Map::new();
    for (key, value) in map {
        if value.is_object() {
            let (public_sub, secret_sub) = split_config(value);
            if !is_empty_object(&public_sub) {
                public_map.insert(key.clone(), public_sub);
            }
            if !is_empty_object(&secret_sub) {
                secret_map.insert(key.clone(), secret_sub);
            }
        } else if is_sensitive_key(key) && !value.is_null() {
            secret_map.insert(key.clone(), value.clone());
        } else {
            public_map.insert(key.clone(), value.clone());
        }
    }

    (Value::Object(public_map), Value::Object(secret_map))
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let redacted = if is_sensitive_key(key) && !val.is_null() {
                        Value::String(REDACT_PLACEHOLDER.to_string())
                    } else {
                        redact_sensitive_values(val)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn restore_redacted_values(incoming: &Value, stored: &Value) -> Value {
    let Value::Object(map) = incoming else {
        return incoming.clone();
    };

    let stored_map = stored.as_object();
    let mut restored = Map::new();
    for (key, value) in map {
        let previous = stored_map.and_then(|m| m.get(key));
        if value.as_str() == Some(REDACT_PLACEHOLDER) {
            if let Some(previous) = previous {
                restored.insert(key.clone(), previous.clone());
            }
            continue;
        }
        let next = if value.is_object() {
            restore_redacted_values(value, previous.unwrap_or(&Value::Null))
        } else {
            value.clone()
        };
        restored.insert(key.clone(), next);
    }
    Value::Object(restored)
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
