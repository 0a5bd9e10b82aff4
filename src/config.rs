use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LLM_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_TEXT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free";
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/Llama-Vision-Free";
const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";
pub const DEFAULT_RATE_LIMIT_SECONDS: u64 = 5;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// An id list contained something that is not a numeric snowflake.
    InvalidId { key: &'static str, value: String },
    /// Unknown IANA time zone name.
    InvalidTimezone(String),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidId { key, value } => {
                write!(f, "invalid id '{}' in {}", value, key)
            }
            Self::InvalidTimezone(name) => write!(f, "unknown time zone '{}'", name),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidId { .. } | Self::InvalidTimezone(_) | Self::Validation(_) => None,
        }
    }
}

/// What to do when the trends endpoint fails for a trend-related message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendFailurePolicy {
    /// Give up on the message and send the fallback reply.
    #[default]
    Abort,
    /// Log the failure and answer without trends.
    Degrade,
}

impl TrendFailurePolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "degrade" => Ok(Self::Degrade),
            other => Err(ConfigError::Validation(format!(
                "trend_failure_policy must be 'abort' or 'degrade', got '{other}'"
            ))),
        }
    }
}

/// On-disk shape. Every field is optional because the environment may supply it.
#[derive(Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    discord_token: Option<String>,
    together_api_key: Option<String>,
    allowed_servers: Vec<u64>,
    excluded_users: Vec<u64>,
    enable_trend: bool,
    trend_failure_policy: Option<String>,
    llm_base_url: Option<String>,
    llm_text_model: Option<String>,
    llm_vision_model: Option<String>,
    timezone: Option<String>,
    rate_limit_seconds: Option<u64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
}

pub struct Config {
    pub discord_token: String,
    pub together_api_key: String,
    /// Guilds the bot may answer in. Direct messages are not subject to this list.
    pub allowed_servers: HashSet<u64>,
    pub excluded_users: HashSet<u64>,
    pub enable_trend: bool,
    pub trend_failure_policy: TrendFailurePolicy,
    pub llm_base_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub timezone: Tz,
    pub rate_limit_window: Duration,
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from an optional JSON file, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an explicit variable lookup.
    pub fn load_with<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut file = match path {
            Some(path) => {
                let config_path = path.to_path_buf();
                let content = std::fs::read_to_string(&config_path)
                    .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
                serde_json::from_str::<ConfigFile>(&content)
                    .map_err(|e| ConfigError::ParseJson { path: config_path, source: e })?
            }
            None => ConfigFile::default(),
        };

        if let Some(v) = env("DISCORD_TOKEN") {
            file.discord_token = Some(v);
        }
        if let Some(v) = env("TOGETHER_API_KEY") {
            file.together_api_key = Some(v);
        }
        if let Some(v) = env("ALLOWED_SERVERS") {
            file.allowed_servers = parse_id_list("ALLOWED_SERVERS", &v)?;
        }
        if let Some(v) = env("EXCLUDED_USERS") {
            file.excluded_users = parse_id_list("EXCLUDED_USERS", &v)?;
        }
        if let Some(v) = env("ENABLE_TREND") {
            file.enable_trend = v == "true";
        }
        if let Some(v) = env("TREND_FAILURE_POLICY") {
            file.trend_failure_policy = Some(v);
        }
        if let Some(v) = env("LLM_BASE_URL") {
            file.llm_base_url = Some(v);
        }
        if let Some(v) = env("LLM_TEXT_MODEL") {
            file.llm_text_model = Some(v);
        }
        if let Some(v) = env("LLM_VISION_MODEL") {
            file.llm_vision_model = Some(v);
        }
        if let Some(v) = env("BOT_TIMEZONE") {
            file.timezone = Some(v);
        }
        if let Some(v) = env("RATE_LIMIT_SECONDS") {
            let seconds = v.trim().parse::<u64>().map_err(|_| {
                ConfigError::Validation(format!("RATE_LIMIT_SECONDS must be a number, got '{v}'"))
            })?;
            file.rate_limit_seconds = Some(seconds);
        }
        if let Some(v) = env("DATA_DIR") {
            file.data_dir = Some(v);
        }

        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let discord_token = file.discord_token.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            ConfigError::Validation("discord_token (DISCORD_TOKEN) is required".into())
        })?;
        let together_api_key = file.together_api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            ConfigError::Validation("together_api_key (TOGETHER_API_KEY) is required".into())
        })?;

        let timezone_name = file.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = timezone_name
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(timezone_name.clone()))?;

        let trend_failure_policy = match file.trend_failure_policy {
            Some(ref policy) => TrendFailurePolicy::parse(policy)?,
            None => TrendFailurePolicy::default(),
        };

        let rate_limit_seconds = file.rate_limit_seconds.unwrap_or(DEFAULT_RATE_LIMIT_SECONDS);
        if rate_limit_seconds == 0 {
            return Err(ConfigError::Validation("rate_limit_seconds must be at least 1".into()));
        }

        Ok(Self {
            discord_token,
            together_api_key,
            allowed_servers: file.allowed_servers.into_iter().collect(),
            excluded_users: file.excluded_users.into_iter().collect(),
            enable_trend: file.enable_trend,
            trend_failure_policy,
            llm_base_url: file
                .llm_base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            text_model: file.llm_text_model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            vision_model: file.llm_vision_model.unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            timezone,
            rate_limit_window: Duration::from_secs(rate_limit_seconds),
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

/// Parse a comma-separated id list, ignoring blanks (`"1, 2,"` → `[1, 2]`).
fn parse_id_list(key: &'static str, raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| ConfigError::InvalidId { key, value: s.to_string() })
        })
        .collect()
}
