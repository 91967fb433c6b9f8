//! Tracker configuration
//!
//! Loaded from TOML (`KVK_CONFIG_PATH`, default `kvk_tracker.toml`); every
//! field has a default so an absent file yields a working setup over
//! `./data`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::engine::{EventSources, PipelineOptions, RankMode, ScoringWeights};
use crate::periods::{default_periods, PeriodSources};
use crate::snapshots::CoercionMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base directory for every relative source path
    pub data_dir: PathBuf,
    pub roster_file: PathBuf,
    pub before_file: PathBuf,
    pub after_file: PathBuf,
    /// Optional source; a missing file means all requirements are 0
    pub requirements_file: Option<PathBuf>,
    /// SQLite artifact written after each full computation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_db_path: Option<PathBuf>,

    pub weights: ScoringWeights,
    pub rank_mode: RankMode,
    pub coercion: CoercionMode,

    pub load_timeout_secs: u64,
    pub page_size: usize,
    pub bind_addr: String,

    pub periods: BTreeMap<String, PeriodSources>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            roster_file: PathBuf::from("kvk_start_power.xlsx"),
            before_file: PathBuf::from("kvk_before_metrics.xlsx"),
            after_file: PathBuf::from("kvk_after_metrics.xlsx"),
            requirements_file: Some(PathBuf::from("kvk_requirements.xlsx")),
            export_db_path: None,
            weights: ScoringWeights::default(),
            rank_mode: RankMode::default(),
            coercion: CoercionMode::default(),
            load_timeout_secs: 30,
            page_size: 20,
            bind_addr: "0.0.0.0:3000".to_string(),
            periods: default_periods(),
        }
    }
}

impl TrackerConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// `.env`, then the TOML file if present, then env overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let path =
            std::env::var("KVK_CONFIG_PATH").unwrap_or_else(|_| "kvk_tracker.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            Self::load(&path)?
        } else {
            tracing::debug!("Using default tracker config ({} not found)", path);
            Self::default()
        };

        if let Ok(dir) = std::env::var("KVK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(db) = std::env::var("KVK_EXPORT_DB") {
            config.export_db_path = (!db.trim().is_empty()).then(|| PathBuf::from(db));
        }
        if let Ok(addr) = std::env::var("KVK_BIND_ADDR") {
            config.bind_addr = addr;
        }

        Ok(config)
    }

    /// Save to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }

    pub fn event_sources(&self) -> EventSources {
        EventSources {
            roster: self.resolve(&self.roster_file),
            before: self.resolve(&self.before_file),
            after: self.resolve(&self.after_file),
            requirements: self.requirements_file.as_deref().map(|p| self.resolve(p)),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            weights: self.weights,
            rank_mode: self.rank_mode,
            coercion: self.coercion,
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs.max(1))
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.bind_addr))
    }
}
