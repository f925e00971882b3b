// Configuration loading and parsing (bot.toml, credentials.toml, environment).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rankboard_core::format::MarkerTable;
use rankboard_core::orchestrator::RefreshSettings;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("default config {} is missing; reinstall the defaults/ directory", path.display())]
    MissingDefault { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

pub const ENV_BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";
pub const ENV_RIOT_API_KEY: &str = "RIOT_API_KEY";
pub const ENV_CHANNEL_ID: &str = "DEFAULT_CHANNEL_ID";
pub const ENV_APPLICATION_ID: &str = "DISCORD_CLIENT_ID";
pub const ENV_HOME: &str = "RANKBOARD_HOME";

const CONFIG_DIR: &str = "config";
const DEFAULTS_DIR: &str = "defaults";
const BOT_FILE: &str = "bot.toml";
const CREDENTIALS_FILE: &str = "credentials.toml";
const SEEDED_FILES: &[&str] = &[BOT_FILE];

const MIN_PAGE_BUDGET: usize = 16;
const MIN_INTERVAL_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    pub riot: RiotConfig,
    pub refresh: RefreshConfig,
    pub leaderboard: LeaderboardConfig,
    pub storage: StorageConfig,
    /// Tier name (or `UNRANKED`) to emoji markup.
    pub emojis: BTreeMap<String, String>,
    pub credentials: CredentialsConfig,
}

impl Config {
    pub fn marker_table(&self) -> Result<MarkerTable, ConfigError> {
        MarkerTable::from_entries(&self.emojis).map_err(|e| ConfigError::ValidationError {
            field: format!("emojis.{}", e.0),
            message: "must be a tier name or UNRANKED".into(),
        })
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            interval: Duration::from_secs(self.refresh.interval_secs),
            fetch_timeout: Duration::from_secs(self.refresh.fetch_timeout_secs),
            fetch_concurrency: self.refresh.fetch_concurrency,
            page_budget: self.leaderboard.page_budget,
            placeholder: self.leaderboard.placeholder.clone(),
        }
    }

    /// Bot token; present once the config has been validated.
    pub fn bot_token(&self) -> &str {
        self.credentials.discord_bot_token.as_deref().unwrap_or_default()
    }

    /// Riot API key; present once the config has been validated.
    pub fn riot_api_key(&self) -> &str {
        self.credentials.riot_api_key.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// bot.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire bot.toml file.
#[derive(Debug, Clone, Deserialize)]
struct BotFile {
    discord: DiscordConfig,
    #[serde(default)]
    riot: RiotConfig,
    #[serde(default)]
    refresh: RefreshConfig,
    #[serde(default)]
    leaderboard: LeaderboardConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    emojis: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub channel_id: String,
    /// Empty means "learn it from the gateway".
    #[serde(default)]
    pub application_id: String,
    #[serde(default = "default_true")]
    pub register_commands: bool,
    #[serde(default = "default_embed_title")]
    pub embed_title: String,
    #[serde(default = "default_footer_label")]
    pub footer_label: String,
}

impl DiscordConfig {
    pub fn application_id(&self) -> Option<&str> {
        Some(self.application_id.as_str()).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiotConfig {
    #[serde(default = "default_account_region")]
    pub account_region: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RiotConfig {
    fn default() -> Self {
        Self {
            account_region: default_account_region(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fetch_timeout_secs: default_timeout_secs(),
            fetch_concurrency: default_fetch_concurrency(),
            refresh_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default = "default_page_budget")]
    pub page_budget: usize,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            page_budget: default_page_budget(),
            placeholder: default_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_roster_path")]
    pub roster_path: String,
    #[serde(default = "default_publish_state_path")]
    pub publish_state_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            roster_path: default_roster_path(),
            publish_state_path: default_publish_state_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_embed_title() -> String {
    "🏆 Leaderboard".into()
}

fn default_footer_label() -> String {
    "rankboard".into()
}

fn default_account_region() -> String {
    "europe".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    15 * 60
}

fn default_fetch_concurrency() -> usize {
    rankboard_core::orchestrator::DEFAULT_FETCH_CONCURRENCY
}

fn default_page_budget() -> usize {
    rankboard_core::paginate::DEFAULT_PAGE_BUDGET
}

fn default_placeholder() -> String {
    rankboard_core::orchestrator::DEFAULT_PLACEHOLDER.into()
}

fn default_roster_path() -> String {
    "players.json".into()
}

fn default_publish_state_path() -> String {
    "config.json".into()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub discord_bot_token: Option<String>,
    pub riot_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/bot.toml` and (optionally)
/// `config/credentials.toml` under `base_dir`, with overrides taken from the
/// process environment.
///
/// Nothing is seeded here; [`load_config`] does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    load_config_with_env(base_dir, |name| std::env::var(name).ok())
}

/// Like [`load_config_from`], reading overrides through `env`.
pub fn load_config_with_env<F>(base_dir: &Path, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = base_dir.join(CONFIG_DIR);

    let bot_path = config_dir.join(BOT_FILE);
    let bot_text = read_optional(&bot_path)?.ok_or_else(|| ConfigError::FileNotFound {
        path: bot_path.clone(),
    })?;
    let bot: BotFile = parse_toml(&bot_path, &bot_text)?;

    let credentials_path = config_dir.join(CREDENTIALS_FILE);
    let credentials = match read_optional(&credentials_path)? {
        Some(text) => parse_toml(&credentials_path, &text)?,
        None => CredentialsConfig::default(),
    };

    let mut config = Config {
        discord: bot.discord,
        riot: bot.riot,
        refresh: bot.refresh,
        leaderboard: bot.leaderboard,
        storage: bot.storage,
        emojis: bot.emojis,
        credentials,
    };

    apply_env_overrides(&mut config, env);
    validate(&config)?;

    Ok(config)
}

/// Environment values win over file values. Empty variables are ignored.
fn apply_env_overrides<F>(config: &mut Config, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(token) = get(ENV_BOT_TOKEN) {
        config.credentials.discord_bot_token = Some(token);
    }
    if let Some(key) = get(ENV_RIOT_API_KEY) {
        config.credentials.riot_api_key = Some(key);
    }
    if let Some(channel) = get(ENV_CHANNEL_ID) {
        config.discord.channel_id = channel;
    }
    if let Some(app) = get(ENV_APPLICATION_ID) {
        config.discord.application_id = app;
    }
}

/// Seed `config/` from `defaults/` on first run. Only the bot settings are
/// seeded; credentials come from `credentials.toml` or the environment and
/// have a `.example` template only. Returns the files written. Existing files
/// are left as the operator edited them.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join(CONFIG_DIR);
    let mut seeded = Vec::new();

    for name in SEEDED_FILES {
        let target = config_dir.join(name);
        if target.exists() {
            continue;
        }
        let template = base_dir.join(DEFAULTS_DIR).join(name);
        if !template.is_file() {
            return Err(ConfigError::MissingDefault { path: template });
        }
        std::fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
            path: config_dir.clone(),
            source,
        })?;
        std::fs::copy(&template, &target).map_err(|source| ConfigError::Io {
            path: target.clone(),
            source,
        })?;
        info!("Seeded {} from {}", target.display(), template.display());
        seeded.push(target);
    }

    Ok(seeded)
}

/// Directory holding `config/` and `defaults/`: `RANKBOARD_HOME` when set,
/// otherwise the working directory.
pub fn bot_home() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(ENV_HOME).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    std::env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })
}

/// Seed missing files under [`bot_home`] and load the configuration.
pub fn load_config() -> Result<Config, ConfigError> {
    let home = bot_home()?;
    ensure_config_files(&home)?;
    load_config_from(&home)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a config file. `Ok(None)` when it does not exist.
fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_toml<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.discord.channel_id.trim().is_empty() {
        return Err(invalid(
            "discord.channel_id",
            format!("must be set (or provide {ENV_CHANNEL_ID})"),
        ));
    }

    if config.leaderboard.page_budget < MIN_PAGE_BUDGET {
        return Err(invalid(
            "leaderboard.page_budget",
            format!(
                "must be at least {MIN_PAGE_BUDGET}, got {}",
                config.leaderboard.page_budget
            ),
        ));
    }

    if config.refresh.interval_secs < MIN_INTERVAL_SECS {
        return Err(invalid(
            "refresh.interval_secs",
            format!(
                "must be at least {MIN_INTERVAL_SECS}, got {}",
                config.refresh.interval_secs
            ),
        ));
    }

    let positive: &[(&str, u64)] = &[
        ("refresh.fetch_timeout_secs", config.refresh.fetch_timeout_secs),
        ("riot.request_timeout_secs", config.riot.request_timeout_secs),
        ("refresh.fetch_concurrency", config.refresh.fetch_concurrency as u64),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(invalid(name, "must be > 0"));
        }
    }

    if config.riot.account_region.trim().is_empty() {
        return Err(invalid("riot.account_region", "must not be empty"));
    }

    config.marker_table()?;

    if is_blank(&config.credentials.discord_bot_token) {
        return Err(invalid(
            "credentials.discord_bot_token",
            format!("missing; set it in credentials.toml or {ENV_BOT_TOKEN}"),
        ));
    }
    if is_blank(&config.credentials.riot_api_key) {
        return Err(invalid(
            "credentials.riot_api_key",
            format!("missing; set it in credentials.toml or {ENV_RIOT_API_KEY}"),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
