use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::BotResult;
use crate::service::{AuditLogger, EntitlementEngine, GenAiClient};
use crate::storage::{MongoStore, Store};

/// Shared application state, passed to every handler through dptree deps so
/// tests can swap in their own store and backend.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub entitlement: EntitlementEngine,
    pub genai: GenAiClient,
    pub audit: AuditLogger,
}

impl AppState {
    pub async fn new(config: AppConfig) -> BotResult<Self> {
        let store: Arc<dyn Store> =
            Arc::new(MongoStore::connect(&config.storage.mongo_uri, &config.storage.database).await?);

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let entitlement = EntitlementEngine::new(Arc::clone(&store), config.limits.ai_cooldown);
        let genai = GenAiClient::new(&config.genai);
        let audit = AuditLogger::new(config.access.log_channel);

        Self {
            config: Arc::new(config),
            store,
            entitlement,
            genai,
            audit,
        }
    }
}
