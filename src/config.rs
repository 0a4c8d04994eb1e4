use std::path::PathBuf;

use serde::Deserialize;

use crate::services::recommender::RankingMode;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// SQLite database connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Directory holding the model, encoders and processed dataset
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// CSV mirror of submitted tourist spots
    #[serde(default = "default_spots_export_path")]
    pub spots_export_path: PathBuf,

    /// `per_row` or `broadcast`
    #[serde(default = "default_ranking_mode")]
    pub ranking_mode: String,

    /// Recommendation count used when the form leaves it blank
    #[serde(default = "default_recommendations")]
    pub default_recommendations: usize,

    /// Seconds a login stays valid
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_database_url() -> String {
    "sqlite://tourist_spots.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_spots_export_path() -> PathBuf {
    PathBuf::from("data/tourist_spots_export.csv")
}

fn default_ranking_mode() -> String {
    "per_row".to_string()
}

fn default_recommendations() -> usize {
    5
}

fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from explicit key/value pairs
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.ranking()?;
        Ok(config)
    }

    /// Parsed ranking mode
    pub fn ranking(&self) -> anyhow::Result<RankingMode> {
        self.ranking_mode
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid RANKING_MODE: {}", e))
    }

    /// Session lifetime
    pub fn session_ttl(&self) -> chrono::Duration {
        i64::try_from(self.session_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
