use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::properties::Properties;
use super::settings::SessionSettings;
use crate::error::{Result, SolverError};

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default
    Default,
    /// JSON properties file
    File(PathBuf),
    /// Environment variable
    Environment(String),
    /// Programmatically set
    Command,
}

impl ConfigSource {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::File(_) => "file",
            ConfigSource::Environment(var) => var,
            ConfigSource::Command => "command",
        }
    }
}

/// Solver properties every session starts from.
pub fn default_properties() -> Properties {
    [
        ("General.CommonItypes", "lec"),
        ("General.UseAmPm", "true"),
        ("General.StartSolver", "false"),
        ("General.Save", "false"),
        ("General.Unload", "false"),
        ("Termination.MaxIters", "10000"),
        ("Termination.TimeOut", "60"),
    ]
    .into_iter()
    .collect()
}

/// Loads solver properties and session settings from files and the environment.
#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Get a TASSIGN_* environment variable
    pub fn get_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// Converts "passivation-time" to "TASSIGN_PASSIVATION_TIME"
    pub fn get_env_config(&self, key: &str) -> Option<String> {
        let env_var = format!("TASSIGN_{}", key.replace('-', "_").to_uppercase());
        self.get_env(&env_var)
    }

    pub fn get_env_bool(&self, key: &str) -> Option<bool> {
        self.get_env_config(key)
            .map(|val| !matches!(val.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
    }

    pub fn get_env_u64(&self, key: &str) -> Option<u64> {
        self.get_env_config(key).and_then(|val| val.parse().ok())
    }

    /// Load solver properties from a JSON object file. Missing files yield
    /// empty properties; non-string values are stored in their JSON form.
    pub fn load_properties_file<P: AsRef<Path>>(&self, path: P) -> Result<Properties> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Properties::new());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| SolverError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let raw: IndexMap<String, serde_json::Value> = serde_json::from_str(&contents)
            .map_err(|e| SolverError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(raw
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect())
    }

    /// Merges defaults < file < command properties.
    pub fn load_properties(&self, file: Option<&Path>, command: &Properties) -> Result<Properties> {
        let mut properties = default_properties();
        if let Some(file) = file {
            log::debug!("Loading solver properties from {}", file.display());
            properties.extend(&self.load_properties_file(file)?);
        }
        properties.extend(command);
        Ok(properties)
    }

    /// Applies TASSIGN_* overrides on top of the given settings.
    pub fn apply_env(&self, settings: &mut SessionSettings) -> Vec<ConfigSource> {
        let mut sources = Vec::new();
        if let Some(minutes) = self.get_env_u64("passivation-time") {
            settings.passivation_time = minutes;
            sources.push(ConfigSource::Environment("TASSIGN_PASSIVATION_TIME".to_string()));
        }
        if let Some(dir) = self.get_env_config("backup-dir") {
            settings.backup_dir = PathBuf::from(dir);
            sources.push(ConfigSource::Environment("TASSIGN_BACKUP_DIR".to_string()));
        }
        if let Some(names) = self.get_env_bool("export-names") {
            settings.export_names = names;
            sources.push(ConfigSource::Environment("TASSIGN_EXPORT_NAMES".to_string()));
        }
        if let Some(convert) = self.get_env_bool("export-convert-ids") {
            settings.export_convert_ids = convert;
            sources.push(ConfigSource::Environment("TASSIGN_EXPORT_CONVERT_IDS".to_string()));
        }
        if let Some(configuration) = self.get_env_bool("export-configuration") {
            settings.export_configuration = configuration;
            sources.push(ConfigSource::Environment("TASSIGN_EXPORT_CONFIGURATION".to_string()));
        }
        sources
    }
}
