use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::builder::FormOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub forms: FormsConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// How builder responses are matched to requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correlation {
    /// Match by event name; the latest response always renders
    #[default]
    LastWriteWins,
    /// Tag requests with an id and render only the latest outstanding one
    RequestId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub eager_handshake: bool,
    pub correlation: Correlation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub tiles_target: String,
    pub builder_target: String,
    pub test_target: String,
    pub fallback_colour: String,
    /// Where the binary writes rendered targets; defaults to the data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormsConfig {
    pub form_id: String,
    pub submit_label: String,
    pub enforce_unique_names: bool,
    pub strict_field_types: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    pub console_enabled: bool,
    pub console_max_entries: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            eager_handshake: true,
            correlation: Correlation::LastWriteWins,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tiles_target: "div_service_select".to_string(),
            builder_target: "plugin_builder".to_string(),
            test_target: "plugin_test".to_string(),
            fallback_colour: "#dddddd".to_string(),
            output_dir: None,
        }
    }
}

impl Default for FormsConfig {
    fn default() -> Self {
        let options = FormOptions::default();
        Self {
            form_id: options.form_id,
            submit_label: options.submit_label,
            enforce_unique_names: options.enforce_unique_names,
            strict_field_types: options.strict_field_types,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            console_max_entries: 1000,
        }
    }
}

impl FormsConfig {
    pub fn form_options(&self) -> FormOptions {
        FormOptions {
            form_id: self.form_id.clone(),
            submit_label: self.submit_label.clone(),
            enforce_unique_names: self.enforce_unique_names,
            strict_field_types: self.strict_field_types,
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))?
            .join("plugin-panel");

        fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load_or_default() -> Result<Self> {
        Self::load_or_default_at(&Self::config_path()?)
    }

    /// Defaults are written out only when no config file exists yet. A file
    /// that fails to parse is left alone for the user to fix.
    pub fn load_or_default_at(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("Ignoring invalid config {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Directory the binary renders targets into
    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.render.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Failed to get data directory"))?
                .join("plugin-panel")
                .join("render")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.channel.correlation = Correlation::RequestId;
        config.forms.submit_label = "Save".to_string();
        config.render.output_dir = Some(dir.path().join("out"));
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_or_default_at(&path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn invalid_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let broken = "[channel]\neager_handshake = \"sometimes\"\ncorrelation = \"request_id\"\n";
        fs::write(&path, broken).unwrap();

        let config = Config::load_or_default_at(&path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), broken);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[channel]\neager_handshake = false\ncorrelation = \"request_id\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.channel.eager_handshake);
        assert_eq!(config.channel.correlation, Correlation::RequestId);
        assert_eq!(config.render, RenderConfig::default());
        assert!(config.ui.console_enabled);
    }

    #[test]
    fn load_from_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "channel = 3").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn forms_config_maps_to_options() {
        let forms = FormsConfig {
            strict_field_types: true,
            ..FormsConfig::default()
        };
        let options = forms.form_options();
        assert!(options.strict_field_types);
        assert!(options.enforce_unique_names);
        assert_eq!(options.submit_label, "Submit");
    }
}
