use serde::{Deserialize, Serialize};

/// User settings persisted to `settings.json`.
///
/// Both fields fall back to defaults individually, so a file written by an
/// older build (or edited by hand) still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Write every PDF into `fixed_output_dir` instead of next to the input.
    #[serde(default = "default_use_fixed_output")]
    pub use_fixed_output: bool,

    #[serde(default)]
    pub fixed_output_dir: String,
}

impl Settings {
    /// Settings with fixed output enabled and pointing at `dir`.
    pub fn with_output_dir(dir: impl Into<String>) -> Self {
        Self {
            use_fixed_output: true,
            fixed_output_dir: dir.into(),
        }
    }

    /// Fixed output directory, if enabled and non-blank.
    pub fn effective_fixed_dir(&self) -> Option<&str> {
        let dir = self.fixed_output_dir.trim();
        (self.use_fixed_output && !dir.is_empty()).then_some(dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_output_dir(crate::config::default_output_dir().to_string())
    }
}

fn default_use_fixed_output() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(settings.use_fixed_output);
        assert!(settings.fixed_output_dir.ends_with("output"));
    }

    #[test]
    fn test_effective_fixed_dir() {
        let mut settings = Settings::with_output_dir("/out");
        assert_eq!(settings.effective_fixed_dir(), Some("/out"));

        settings.fixed_output_dir = "   ".into();
        assert_eq!(settings.effective_fixed_dir(), None);

        settings.fixed_output_dir = "/out".into();
        settings.use_fixed_output = false;
        assert_eq!(settings.effective_fixed_dir(), None);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.use_fixed_output);
        assert!(settings.fixed_output_dir.is_empty());
    }
}
