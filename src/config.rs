use std::collections::HashSet;
use std::time::Duration;

use teloxide::types::{ChatId, UserId};

use crate::error::BotResult;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub genai: GenAiConfig,
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub limits: LimitsConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig(pub String);

#[derive(Clone, Debug)]
pub struct GenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub chat_model: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub mongo_uri: String,
    pub database: String,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    /// Callers allowed to run owner commands. Single-owner deployments keep
    /// exactly one entry here.
    pub owner_ids: HashSet<UserId>,
    pub log_channel: Option<ChatId>,
}

impl AccessConfig {
    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

#[derive(Clone, Debug)]
pub struct LimitsConfig {
    pub ai_cooldown: Duration,
    pub proai_batch_count: usize,
    pub proai_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> BotResult<Self> {
        info!("Building AppConfig...");

        let owner_ids = required("BOT_OWNER_IDS")?
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u64>()
                    .map(UserId)
                    .map_err(|_| ConfigError::Invalid("BOT_OWNER_IDS"))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        if owner_ids.is_empty() {
            return Err(ConfigError::Invalid("BOT_OWNER_IDS").into());
        }

        let log_channel = match std::env::var("LOG_CHANNEL_ID") {
            Ok(raw) => Some(
                raw.parse::<i64>()
                    .map(ChatId)
                    .map_err(|_| ConfigError::Invalid("LOG_CHANNEL_ID"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            telegram: TelegramConfig(required("TELEGRAM_BOT_TOKEN")?),
            genai: GenAiConfig {
                api_key: required("OPENAI_API_KEY")?,
                base_url: optional("OPENAI_BASE_URL", "https://api.openai.com"),
                image_model: "dall-e-3".to_string(),
                chat_model: "gpt-4".to_string(),
            },
            storage: StorageConfig {
                mongo_uri: required("MONGODB_URI")?,
                database: optional("MONGODB_DATABASE", "musegen"),
            },
            access: AccessConfig { owner_ids, log_channel },
            limits: LimitsConfig {
                ai_cooldown: Duration::from_secs(parsed("AI_COOLDOWN_SECS", 5)?),
                proai_batch_count: parsed("PROAI_BATCH_COUNT", 15)? as usize,
                proai_delay: Duration::from_secs(parsed("PROAI_DELAY_SECS", 5)?),
            },
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}
