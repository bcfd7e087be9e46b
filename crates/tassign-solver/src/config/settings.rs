use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application-level settings shared by every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionSettings {
    /// Idle minutes before a session is passivated, 0 disables passivation.
    pub passivation_time: u64,
    /// Folder holding backups and passivated sessions.
    pub backup_dir: PathBuf,
    /// Keep names when exporting.
    pub export_names: bool,
    /// Renumber identifiers when exporting anonymized.
    pub export_convert_ids: bool,
    /// Include the configuration block when exporting.
    pub export_configuration: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            passivation_time: 30,
            backup_dir: PathBuf::from("backup"),
            export_names: false,
            export_convert_ids: false,
            export_configuration: true,
        }
    }
}

impl SessionSettings {
    /// Idle threshold, `None` when passivation is disabled.
    pub fn idle_threshold(&self) -> Option<Duration> {
        if self.passivation_time == 0 {
            None
        } else {
            Some(Duration::from_secs(self.passivation_time * 60))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_threshold() {
        let mut settings = SessionSettings::default();
        assert_eq!(settings.idle_threshold(), Some(Duration::from_secs(1800)));
        settings.passivation_time = 0;
        assert_eq!(settings.idle_threshold(), None);
    }
}
