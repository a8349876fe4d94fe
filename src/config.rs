// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "CMESCRAPER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "cmescraper.yaml";

/// Everything a run needs, passed explicitly to each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub browser: BrowserConfig,
    pub site: SiteConfig,
    pub wait: WaitPolicy,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// URL scheme, e.g. `postgresql`.
    pub program: String,
    pub user: String,
    pub passwd: String,
    pub host: String,
    pub port: u16,
    /// Target database, created on first connect.
    pub name: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            program: "postgresql".to_string(),
            user: "postgres".to_string(),
            passwd: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            name: "testdb".to_string(),
            pool_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowserConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium).
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/98.0.4758.102 Safari/537.36"
                .to_string(),
            window_width: 1920,
            window_height: 1080,
        }
    }
}

/// Page URLs and the element ids/selectors the scraper is coupled to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub source_url: String,
    pub date_select_id: String,
    pub dropdown_id: String,
    pub table_container_id: String,
    pub link_list_selector: String,
    pub link_selector: String,
    pub current_page_label: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.cmegroup.com".to_string(),
            source_url:
                "https://www.cmegroup.com/market-data/volume-open-interest/exchange-volume.html"
                    .to_string(),
            date_select_id: "tradedate".to_string(),
            dropdown_id: "tradesDropdown".to_string(),
            table_container_id: "loadTable".to_string(),
            link_list_selector: "ul.cmeHorizontalList.cmeListSeparator".to_string(),
            link_selector: "a.none".to_string(),
            current_page_label: "VOI By Exchange".to_string(),
        }
    }
}

/// How long to wait for the report to re-render after switching dates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaitPolicy {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            poll_interval_ms: 250,
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

impl WaitPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before retry number `attempt` (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnumerateVia {
    Browser,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub main_table: String,
    pub staging_table: String,
    pub key_column: String,
    pub snapshot_path: PathBuf,
    pub enumerate_with: EnumerateVia,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            main_table: "cme".to_string(),
            staging_table: "cme_all_staging".to_string(),
            key_column: "uid".to_string(),
            snapshot_path: PathBuf::from("check.csv"),
            enumerate_with: EnumerateVia::Browser,
        }
    }
}

impl Config {
    /// Parse a YAML document; absent keys keep their defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing config YAML")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Resolve the config the binary runs with: the file named by
    /// `CMESCRAPER_CONFIG` (must exist), else `cmescraper.yaml` if present,
    /// else defaults. Database credentials from the libpq env vars win.
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => {
                info!("no config file, using defaults");
                Self::default()
            }
        };
        cfg.database
            .apply_env(|key| env::var(key).ok())
            .context("applying database env overrides")?;
        Ok(cfg)
    }
}

impl DatabaseConfig {
    /// Override fields from `PGUSER`, `PGPASSWORD`, `PGHOST`, `PGPORT`, `PGDATABASE`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PGUSER") {
            self.user = v;
        }
        if let Some(v) = lookup("PGPASSWORD") {
            self.passwd = v;
        }
        if let Some(v) = lookup("PGHOST") {
            self.host = v;
        }
        if let Some(v) = lookup("PGPORT") {
            self.port = v
                .parse()
                .with_context(|| format!("PGPORT `{}` is not a port", v))?;
        }
        if let Some(v) = lookup("PGDATABASE") {
            self.name = v;
        }
        debug!(host = %self.host, port = self.port, db = %self.name, "database target");
        Ok(())
    }
}
