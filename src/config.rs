use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration for refwatch
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Base directory holding per-user settings: `<data_dir>/<provider>/<user>/`
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// File name of the per-user settings file inside the user directory
    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    /// Provider endpoint configuration
    #[serde(default)]
    pub providers: ProviderEndpoints,

    /// Webhook integrations accepted in user settings
    #[serde(default = "default_webhook_integrations")]
    pub webhook_integrations: Vec<String>,
}

/// Endpoint configuration for all supported providers.
///
/// Passed explicitly into provider client constructors; tests point `api_url`
/// at a mock server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderEndpoints {
    #[serde(default = "Endpoints::github")]
    pub github: Endpoints,

    #[serde(default = "Endpoints::gitlab")]
    pub gitlab: Endpoints,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            github: Endpoints::github(),
            gitlab: Endpoints::gitlab(),
        }
    }
}

/// Web and API base URLs for one provider
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Endpoints {
    /// Base URL for user-facing links (repo, tree, compare pages)
    pub web_url: String,

    /// Base URL for REST API calls
    pub api_url: String,
}

impl Endpoints {
    pub fn github() -> Self {
        Self {
            web_url: "https://github.com".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }

    pub fn gitlab() -> Self {
        Self {
            web_url: "https://gitlab.com".to_string(),
            api_url: "https://gitlab.com/api/v4".to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::github()
    }
}

// Default value functions
fn default_data_dir() -> String {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        format!("{}/refwatch/data", data_home)
    } else {
        "${HOME}/.local/share/refwatch/data".to_string()
    }
}

fn default_settings_file() -> String {
    "settings.yml".to_string()
}

fn default_webhook_integrations() -> Vec<String> {
    vec!["slack".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            settings_file: default_settings_file(),
            providers: ProviderEndpoints {
                github: Endpoints::github(),
                gitlab: Endpoints::gitlab(),
            },
            webhook_integrations: default_webhook_integrations(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("refwatch").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.data_dir = shellexpand::full(&self.data_dir)
            .context("Failed to expand data_dir path")?
            .into_owned();

        Ok(())
    }

    /// Directory holding one user's settings and change-set history
    pub fn user_dir(&self, provider: &str, username: &str) -> PathBuf {
        Path::new(&self.data_dir).join(provider).join(username)
    }

    /// Path to one user's settings file
    pub fn user_settings_file(&self, provider: &str, username: &str) -> PathBuf {
        self.user_dir(provider, username).join(&self.settings_file)
    }

    /// Endpoints for a provider by name; unknown names fall back to GitHub
    /// shapes, which is harmless since unknown providers get the null client.
    pub fn endpoints_for(&self, provider: &str) -> &Endpoints {
        match provider {
            "gitlab" => &self.providers.gitlab,
            _ => &self.providers.github,
        }
    }
}
