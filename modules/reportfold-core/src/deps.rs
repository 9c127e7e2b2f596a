use crate::config::AppConfig;
use crate::embedder::TextEmbedder;
use crate::file_config::FileConfig;
use sqlx::PgPool;
use std::sync::Arc;

/// Central dependency container passed to runs and activities.
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub embedder: Arc<dyn TextEmbedder>,
    pub config: AppConfig,
    pub file_config: Arc<FileConfig>,
}

impl ServerDeps {
    pub fn new(
        db_pool: PgPool,
        embedder: Arc<dyn TextEmbedder>,
        config: AppConfig,
        file_config: Arc<FileConfig>,
    ) -> Self {
        Self {
            db_pool,
            embedder,
            config,
            file_config,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}
