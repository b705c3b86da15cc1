//! Application-level configuration loading: session timeouts, code generation and sweep cadence.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SUSHI_STREAK_CONFIG_PATH";

const DEFAULT_JOIN_WINDOW_SECS: u64 = 10 * 60;
const DEFAULT_IDLE_WINDOW_SECS: u64 = 10 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CODE_LENGTH: usize = 6;
const DEFAULT_CODE_ATTEMPTS: u32 = 10;
const DEFAULT_ATTACH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHARE_BASE_URL: &str = "https://sushi.dietalab.net";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How long after creation new players may still join a session.
    pub join_window: Duration,
    /// How long a session may stay untouched before the sweep evicts it.
    pub idle_window: Duration,
    /// Period of the idle sweep.
    pub sweep_interval: Duration,
    /// Length of generated session codes.
    pub code_length: usize,
    /// Upper bound on generated-code collisions tolerated by a single create.
    pub code_attempts: u32,
    /// Deadline for a real-time client to send its `attach` message.
    pub attach_timeout: Duration,
    /// Public base URL used to build share links on the join page.
    pub share_base_url: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        join_window_secs = config.join_window.as_secs(),
                        idle_window_secs = config.idle_window.as_secs(),
                        "loaded session settings from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent keys keep their default value.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    join_window_secs: u64,
    idle_window_secs: u64,
    sweep_interval_secs: u64,
    code_length: usize,
    code_attempts: u32,
    attach_timeout_secs: u64,
    share_base_url: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            join_window_secs: DEFAULT_JOIN_WINDOW_SECS,
            idle_window_secs: DEFAULT_IDLE_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            code_length: DEFAULT_CODE_LENGTH,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
            attach_timeout_secs: DEFAULT_ATTACH_TIMEOUT_SECS,
            share_base_url: DEFAULT_SHARE_BASE_URL.into(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            join_window: Duration::from_secs(value.join_window_secs),
            idle_window: Duration::from_secs(value.idle_window_secs),
            // A zero period would make `tokio::time::interval` panic.
            sweep_interval: Duration::from_secs(value.sweep_interval_secs.max(1)),
            code_length: value.code_length.clamp(3, 12),
            code_attempts: value.code_attempts.max(1),
            attach_timeout: Duration::from_secs(value.attach_timeout_secs.max(1)),
            share_base_url: value.share_base_url.trim_end_matches('/').to_owned(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
