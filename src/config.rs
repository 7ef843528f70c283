//! Application configuration loaded from environment variables.
//!
//! Engine tuning constants live in [`SyncSettings`]; everything else
//! (credentials, storage location, polling cadence) comes from the
//! environment once at startup.

use chrono::Duration;
use std::env;
use std::path::PathBuf;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Tidepool API base URL
    pub api_url: String,
    /// Caregiver's own Tidepool user ID
    pub user_id: String,
    /// Directory holding one persisted record per followee
    pub data_dir: PathBuf,
    /// Seconds between roster/data refresh passes
    pub poll_interval_secs: u64,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Tidepool session token
    pub session_token: String,

    /// Followee sync engine settings
    pub sync: SyncSettings,
}

/// Timing constants for the followee sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Age beyond which the latest glucose reading is hidden.
    pub freshness_threshold: Duration,
    /// How far back from the latest reading to look for the previous one.
    pub delta_lookback: Duration,
    /// Upper bound on how far back a single refresh reaches.
    pub max_backfill: Duration,
    /// Extra overlap added to every backfill window.
    pub safety_margin: Duration,
    /// Items older than this are pruned from the time-series caches.
    pub retention: Duration,
    /// Scheduled basal rate (U/hr) used when no rate is known from dose history.
    pub fallback_scheduled_basal_rate: Option<f64>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            freshness_threshold: Duration::minutes(15),
            delta_lookback: Duration::minutes(6),
            max_backfill: Duration::hours(6),
            safety_margin: Duration::minutes(10),
            retention: Duration::days(7),
            fallback_scheduled_basal_rate: None,
        }
    }
}

impl Config {
    /// Fixed configuration for tests.
    pub fn test_default() -> Self {
        Self {
            api_url: "http://localhost:9999".to_string(),
            user_id: "caregiver-test".to_string(),
            data_dir: PathBuf::from("target/test-followees"),
            poll_interval_secs: 300,
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            session_token: "test_session_token".to_string(),
            sync: SyncSettings::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let fallback_scheduled_basal_rate = match env::var("SCHEDULED_BASAL_RATE") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| ConfigError::Invalid("SCHEDULED_BASAL_RATE"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            api_url: env::var("TIDEPOOL_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.tidepool.org".to_string()),
            user_id: env::var("TIDEPOOL_USER_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TIDEPOOL_USER_ID"))?,
            data_dir: env::var("CAREPARTNER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/followees")),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            session_token: env::var("TIDEPOOL_SESSION_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TIDEPOOL_SESSION_TOKEN"))?,

            sync: SyncSettings {
                fallback_scheduled_basal_rate,
                ..SyncSettings::default()
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
