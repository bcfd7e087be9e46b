use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tassign_solver::{Properties, SessionSettings};

pub const CONFIG_FILE: &str = "tassign.toml";

/// The tassign configuration file structure (tassign.toml)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TassignConfig {
    /// Solver properties (e.g., "General.SessionId" = 42)
    pub solver: IndexMap<String, toml::Value>,

    /// Application-level session settings
    pub session: SessionSettings,

    /// Directory the file was found in, relative paths resolve against it
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl TassignConfig {
    /// Load configuration from tassign.toml, searching upward from the given directory
    pub fn load(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);

            if config_path.exists() {
                let content = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                let mut config: TassignConfig = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?;
                config.root = Some(current);
                return Ok(Some(config));
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    pub fn load_from_cwd() -> Result<Option<Self>> {
        let cwd = std::env::current_dir()?;
        Self::load(&cwd)
    }

    /// Solver properties with TOML scalars flattened to strings.
    pub fn properties(&self) -> Properties {
        self.solver
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Array(items) => items
                        .iter()
                        .map(|item| match item {
                            toml::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Session settings with `backup-dir` anchored at the config file's directory.
    pub fn settings(&self) -> SessionSettings {
        let mut settings = self.session.clone();
        if let Some(root) = &self.root {
            if settings.backup_dir.is_relative() {
                settings.backup_dir = root.join(&settings.backup_dir);
            }
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let config: TassignConfig = toml::from_str("").unwrap();
        assert!(config.solver.is_empty());
        assert_eq!(config.session, SessionSettings::default());
    }

    #[test]
    fn test_parse_solver_properties() {
        let toml = r#"
[solver]
"General.SessionId" = 42
"General.SolverGroupId" = [1, 2]
"General.CommonItypes" = "lec"
"General.StartSolver" = true
"Weight.TeachingPreferences" = 2.5
"#;
        let config: TassignConfig = toml::from_str(toml).unwrap();
        let props = config.properties();
        assert_eq!(props.get_i64("General.SessionId"), Some(42));
        assert_eq!(props.get_i64_list("General.SolverGroupId"), vec![1, 2]);
        assert_eq!(props.get("General.CommonItypes"), Some("lec"));
        assert!(props.get_bool("General.StartSolver", false));
        assert_eq!(props.get_f64("Weight.TeachingPreferences", 0.0), 2.5);
    }

    #[test]
    fn test_parse_session_settings() {
        let toml = r#"
[session]
passivation-time = 5
backup-dir = "/var/lib/tassign"
export-names = true
"#;
        let config: TassignConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.session.passivation_time, 5);
        assert_eq!(config.session.backup_dir, PathBuf::from("/var/lib/tassign"));
        assert!(config.session.export_names);
        assert!(config.session.export_configuration);
    }

    #[test]
    fn test_load_searches_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[session]\nbackup-dir = \"backups\"\n",
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = TassignConfig::load(&nested).unwrap().unwrap();
        assert_eq!(config.root.as_deref(), Some(dir.path()));
        assert_eq!(config.settings().backup_dir, dir.path().join("backups"));
    }

    #[test]
    fn test_load_without_config() {
        let dir = TempDir::new().unwrap();
        assert!(TassignConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_invalid_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[solver\n").unwrap();
        assert!(TassignConfig::load(dir.path()).is_err());
    }
}
