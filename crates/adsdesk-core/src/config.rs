use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const ENV_CONFIG: &str = "ADSDESK_CONFIG";
const TOKEN_ENV_VARS: &[&str] = &["ADS_DEV_KEY", "ADS_API_TOKEN"];

/// Root application configuration, loaded from `~/.config/adsdesk/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub ads: AdsConfig,
    pub proxy: ProxyConfig,
    pub options: OptionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub library_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// SSH relay used to reach paywalled publisher links.
///
/// The relay is considered configured only when both `ssh_user` and
/// `ssh_server` are set. Authentication is left to the user's SSH keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_server: Option<String>,
    pub ssh_port: u16,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub download_pdf: bool,
    pub debug: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    pub fetch_timeout_secs: u64,
    pub concurrency: usize,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("adsdesk");
        Self {
            library_path: data_dir.to_string_lossy().to_string(),
        }
    }
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: "https://api.adsabs.harvard.edu/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            ssh_user: None,
            ssh_server: None,
            ssh_port: 22,
            connect_timeout_secs: 15,
        }
    }
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            download_pdf: true,
            debug: false,
            log_file: None,
            fetch_timeout_secs: 60,
            concurrency: 4,
        }
    }
}

impl ProxyConfig {
    pub fn is_configured(&self) -> bool {
        non_empty(self.ssh_user.as_deref()).is_some()
            && non_empty(self.ssh_server.as_deref()).is_some()
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/adsdesk/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("adsdesk")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    // ─── Derived paths ─────────────────────────────────────

    /// Path to the SQLite collection database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.core.library_path).join("collection.db")
    }

    /// Directory where attached documents are stored.
    pub fn files_dir(&self) -> PathBuf {
        PathBuf::from(&self.core.library_path).join("files")
    }

    // ─── Credentials ───────────────────────────────────────

    /// Resolves the ADS API token: config value, then `ADS_DEV_KEY` /
    /// `ADS_API_TOKEN`, then `~/.ads/dev_key`.
    pub fn resolve_ads_token(&self) -> Option<String> {
        let dev_key = dirs::home_dir().map(|home| home.join(".ads").join("dev_key"));
        self.resolve_ads_token_with(|key| std::env::var(key).ok(), dev_key.as_deref())
    }

    pub fn resolve_ads_token_with<F>(&self, env: F, dev_key_file: Option<&Path>) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = non_empty(self.ads.token.as_deref()) {
            return Some(token.to_string());
        }
        for key in TOKEN_ENV_VARS {
            let value = env(key).unwrap_or_default();
            if let Some(token) = non_empty(Some(value.as_str())) {
                return Some(token.to_string());
            }
        }
        let contents = std::fs::read_to_string(dev_key_file?).ok()?;
        non_empty(Some(contents.as_str())).map(ToOwned::to_owned)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
