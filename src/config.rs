use std::path::PathBuf;

use tracing::trace;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub targets: Vec<TargetConfig>,

    /// Telegram credentials (optional - alerts become a no-op without them)
    pub telegram: Option<TelegramConfig>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default = "crate::util::get_state_path")]
    pub state_file: PathBuf,
}

/// One monitored instance together with the account it lives in.
///
/// Credentials and region are opaque to the decision engine; they are
/// only handed through to the cloud gateway.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TargetConfig {
    pub instance_id: String,
    pub name: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub region_id: String,
    #[serde(default = "default_traffic_quota_gb")]
    pub traffic_quota_gb: f64,
}

impl TargetConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key_id: self.access_key_id.clone(),
            access_key_secret: self.access_key_secret.clone(),
            region_id: self.region_id.clone(),
        }
    }
}

/// Account credentials passed through to the gateway per request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub region_id: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Engine tunables. All optional in the file; the defaults mirror the
/// values the agent has been operated with.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_notify_cooldown_secs")]
    pub notify_cooldown_secs: u64,
    #[serde(default = "default_overlimit_cooldown_secs")]
    pub overlimit_cooldown_secs: u64,
    #[serde(default = "default_max_start_failures")]
    pub max_start_failures: u32,
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    #[serde(default = "default_start_poll_secs")]
    pub start_poll_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            notify_cooldown_secs: default_notify_cooldown_secs(),
            overlimit_cooldown_secs: default_overlimit_cooldown_secs(),
            max_start_failures: default_max_start_failures(),
            start_timeout_secs: default_start_timeout_secs(),
            start_poll_secs: default_start_poll_secs(),
        }
    }
}

fn default_traffic_quota_gb() -> f64 {
    180.0
}

// Repeat notifications for the same event at most once per hour.
fn default_notify_cooldown_secs() -> u64 {
    3600
}

// Overlimit reminders only once a day.
fn default_overlimit_cooldown_secs() -> u64 {
    86400
}

fn default_max_start_failures() -> u32 {
    3
}

fn default_start_timeout_secs() -> u64 {
    120
}

fn default_start_poll_secs() -> u64 {
    10
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))?;

    for target in &config.targets {
        if target.traffic_quota_gb <= 0.0 {
            anyhow::bail!(
                "target {} has a non-positive traffic quota ({})",
                target.instance_id,
                target.traffic_quota_gb
            );
        }
    }

    trace!("loaded config: {} target(s)", config.targets.len());
    Ok(config)
}
