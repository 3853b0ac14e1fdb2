use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;

fn default_portal_url() -> String {
    "https://www.hsbcnet.com".to_string()
}

fn default_bank() -> String {
    "HSBC".to_string()
}

/// Browser launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit Chrome/Chromium binary. Auto-discovered when unset.
    pub chrome_path: Option<PathBuf>,

    /// Headless is possible but pointless here: the user has to log in and
    /// clear 2FA interactively before a run can start.
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
        }
    }
}

fn default_login_wait() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_table_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_details_wait() -> Duration {
    Duration::from_secs(15)
}

fn default_confirm_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_context_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_quiet_window() -> Duration {
    Duration::from_secs(1)
}

fn default_settle_cap() -> Duration {
    Duration::from_secs(10)
}

fn default_menu_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_row_settle_pause() -> Duration {
    Duration::from_millis(500)
}

fn default_table_populate_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_excel_option_wait() -> Duration {
    Duration::from_secs(5)
}

/// Every bounded wait in the automation, as duration strings ("60s", "500ms").
///
/// The defaults mirror what the portal has been observed to need; none of
/// them is load-bearing beyond that, so they are all tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// How long to wait for the user to log in and reach the accounts list.
    #[serde(deserialize_with = "deserialize_duration")]
    pub login_wait: Duration,

    /// Accounts table (re)appearance after navigation.
    #[serde(deserialize_with = "deserialize_duration")]
    pub table_wait: Duration,

    /// Export control appearance after opening an account's details.
    #[serde(deserialize_with = "deserialize_duration")]
    pub details_wait: Duration,

    /// Download confirmation per account.
    #[serde(deserialize_with = "deserialize_duration")]
    pub confirm_wait: Duration,

    /// How long a published download context stays valid unconsumed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub context_ttl: Duration,

    /// Mutation quiet window that counts as "settled".
    #[serde(deserialize_with = "deserialize_duration")]
    pub quiet_window: Duration,

    /// Hard cap on any settle wait.
    #[serde(deserialize_with = "deserialize_duration")]
    pub settle_cap: Duration,

    /// Fixed pause after opening the export dropdown.
    #[serde(deserialize_with = "deserialize_duration")]
    pub menu_pause: Duration,

    /// Brief pause after the details view renders.
    #[serde(deserialize_with = "deserialize_duration")]
    pub row_settle_pause: Duration,

    /// Pause for the list table to populate after it reappears.
    #[serde(deserialize_with = "deserialize_duration")]
    pub table_populate_pause: Duration,

    /// Wait for the Excel option to show up in the opened dropdown.
    #[serde(deserialize_with = "deserialize_duration")]
    pub excel_option_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_wait: default_login_wait(),
            table_wait: default_table_wait(),
            details_wait: default_details_wait(),
            confirm_wait: default_confirm_wait(),
            context_ttl: default_context_ttl(),
            quiet_window: default_quiet_window(),
            settle_cap: default_settle_cap(),
            menu_pause: default_menu_pause(),
            row_settle_pause: default_row_settle_pause(),
            table_populate_pause: default_table_populate_pause(),
            excel_option_wait: default_excel_option_wait(),
        }
    }
}

fn default_ping_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Reconciliation host process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconSettings {
    /// Host executable. Reconciliation commands are unavailable when unset.
    pub host_command: Option<PathBuf>,

    /// Extra arguments passed to the host on every invocation.
    pub host_args: Vec<String>,

    /// Availability probe deadline.
    #[serde(deserialize_with = "deserialize_duration")]
    pub ping_timeout: Duration,

    /// Reconciliation is a genuinely long batch job.
    #[serde(deserialize_with = "deserialize_duration")]
    pub run_timeout: Duration,
}

impl Default for ReconSettings {
    fn default() -> Self {
        Self {
            host_command: None,
            host_args: Vec::new(),
            ping_timeout: default_ping_timeout(),
            run_timeout: default_run_timeout(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory (run history). If relative, resolved from the
    /// config file location. Defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// Where exported statements end up, in one folder per run date.
    /// Defaults to `<data_dir>/exports`.
    pub download_root: Option<PathBuf>,

    /// Portal entry URL.
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Bank identifier passed to the reconciliation host.
    #[serde(default = "default_bank")]
    pub bank: String,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub recon: ReconSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            download_root: None,
            portal_url: default_portal_url(),
            bank: default_bank(),
            browser: BrowserSettings::default(),
            timeouts: Timeouts::default(),
            recon: ReconSettings::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./hsbc-exporter.toml` if it exists in current directory
/// 2. `~/.local/share/hsbc-exporter/hsbc-exporter.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("hsbc-exporter.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("hsbc-exporter").join("hsbc-exporter.toml");
    }

    local_config
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub download_root: PathBuf,
    /// Where the browser drops files before they are renamed and relocated.
    pub staging_dir: PathBuf,
    pub portal_url: String,
    pub bank: String,
    pub browser: BrowserSettings,
    pub timeouts: Timeouts,
    pub recon: ReconSettings,
}

impl ResolvedConfig {
    /// Load and resolve config from a file path, using defaults when the file
    /// doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        let data_dir = match &config.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        };
        let download_root = match &config.download_root {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => data_dir.join("exports"),
        };
        // Same filesystem as the final location, so relocation is a rename.
        let staging_dir = download_root.join(".staging");

        Ok(Self {
            data_dir,
            download_root,
            staging_dir,
            portal_url: config.portal_url,
            bank: config.bank,
            browser: config.browser,
            timeouts: config.timeouts,
            recon: config.recon,
        })
    }
}
