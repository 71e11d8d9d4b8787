use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::path::PathBuf;

/// Directory name used under the platform config/data directories.
const APP_DIR_NAME: &str = "pdfmaker";

/// Settings manager for loading and saving `settings.json`.
///
/// Settings are process-scoped: they are loaded once at startup and saved
/// explicitly when the user changes them. Nothing else writes the file.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: Utf8PathBuf,
}

impl SettingsManager {
    /// Create a manager for the settings file at the platform default location.
    pub fn new() -> Self {
        Self::with_path(settings_path())
    }

    /// Create a manager for an explicit settings file path.
    pub fn with_path<P: AsRef<Utf8Path>>(settings_path: P) -> Self {
        Self {
            settings_path: settings_path.as_ref().to_path_buf(),
        }
    }

    /// Load settings.
    ///
    /// A missing file yields the defaults. So does an unreadable or malformed
    /// file: the problem is logged, never surfaced. An empty
    /// `fixed_output_dir` is replaced by the computed default directory.
    pub fn load(&self) -> Settings {
        if !self.settings_path.exists() {
            tracing::info!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Settings::default();
        }

        let mut settings = match self.read_file() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings file: {:#}", e);
                return Settings::default();
            }
        };

        if settings.fixed_output_dir.trim().is_empty() {
            settings.fixed_output_dir = default_output_dir().to_string();
        }

        tracing::info!(
            "Loaded settings from {} (fixed output: {}, dir: {})",
            self.settings_path,
            settings.use_fixed_output,
            settings.fixed_output_dir
        );
        settings
    }

    /// Save settings, creating the parent directory if needed.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {}", parent))?;
        }

        let json = serde_json::to_string_pretty(settings)
            .context("Failed to serialize settings to JSON")?;

        fs::write(&self.settings_path, json)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Path of the settings file this manager reads and writes.
    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    fn read_file(&self) -> Result<Settings> {
        let contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Default location of `settings.json` (per-user config directory).
pub fn settings_path() -> Utf8PathBuf {
    app_dir(dirs::config_dir()).join("settings.json")
}

/// Default directory for generated PDFs (per-user local data directory).
pub fn default_output_dir() -> Utf8PathBuf {
    app_dir(dirs::data_local_dir()).join("output")
}

/// Directory for rotating log files.
pub fn log_dir() -> Utf8PathBuf {
    app_dir(dirs::data_local_dir()).join("logs")
}

/// `<base>/pdfmaker`, falling back to the home directory, then the working directory.
fn app_dir(base: Option<PathBuf>) -> Utf8PathBuf {
    let base = base
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let base = Utf8PathBuf::from_path_buf(base)
        .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()));

    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_settings_manager() -> (SettingsManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = SettingsManager::with_path(dir.join("nested").join("settings.json"));
        (manager, temp_dir)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_settings_manager();
        let settings = manager.load();

        assert!(settings.use_fixed_output);
        assert_eq!(settings.fixed_output_dir, default_output_dir().to_string());
    }

    #[test]
    fn test_save_creates_parent_and_round_trips() {
        let (manager, _temp_dir) = create_test_settings_manager();

        let settings = Settings {
            use_fixed_output: false,
            fixed_output_dir: "/srv/pdfs".into(),
        };
        manager.save(&settings).unwrap();

        assert!(manager.settings_path().exists());
        assert_eq!(manager.load(), settings);
    }

    #[test]
    fn test_default_paths_are_app_scoped() {
        assert!(settings_path().as_str().contains(APP_DIR_NAME));
        assert!(default_output_dir().ends_with("output"));
        assert!(log_dir().ends_with("logs"));
    }
}
