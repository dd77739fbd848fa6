use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::Settings;
use super::validation::validate_config;
use crate::core::errors::RagError;

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    explicit_path: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self {
            paths,
            explicit_path: None,
        }
    }

    /// Uses `path` instead of the discovered `config.yml`.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.explicit_path {
            return path.clone();
        }

        if let Ok(path) = env::var("AUTOMENTOR_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    /// Raw configuration: the YAML file deep-merged over the defaults.
    pub fn load_config(&self) -> Result<Value, RagError> {
        let defaults = serde_json::to_value(Settings::default())
            .map_err(|e| RagError::InvalidConfig(e.to_string()))?;
        let file_config = load_yaml_file(&self.config_path())?;
        Ok(deep_merge(&defaults, &file_config))
    }

    /// Validated, typed settings with paths resolved against the project root.
    pub fn load_settings(&self) -> Result<Settings, RagError> {
        let merged = self.load_config()?;
        validate_config(&merged)?;

        let mut settings: Settings = serde_json::from_value(merged)
            .map_err(|e| RagError::InvalidConfig(e.to_string()))?;
        settings.paths.source_dir = self.paths.resolve(&settings.paths.source_dir);
        settings.paths.index_dir = self.paths.resolve(&settings.paths.index_dir);

        tracing::debug!(path = %self.config_path().display(), "configuration loaded");
        Ok(settings)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, RagError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| RagError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let value = serde_yaml::from_str::<Value>(&contents)
        .map_err(|e| RagError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(RagError::InvalidConfig(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}
