use std::sync::Arc;

use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use self::storage::{BaseUrlStorage, FileStorage};
use self::turnstile_service::{BotVerifier, TurnstileVerifier};

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub bot_verifier: Arc<dyn BotVerifier>,
    pub file_storage: Arc<dyn FileStorage>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let bot_verifier: Arc<dyn BotVerifier> = Arc::new(TurnstileVerifier::new(
            config.security.turnstile_secret_key.clone(),
        ));
        let file_storage: Arc<dyn FileStorage> =
            Arc::new(BaseUrlStorage::new(config.uploads_base_url.clone()));

        Ok(Self {
            config,
            mongo,
            redis,
            bot_verifier,
            file_storage,
        })
    }
}

pub mod abuse_gate;
pub mod storage;
pub mod submission_service;
pub mod survey_service;
pub mod turnstile_service;
