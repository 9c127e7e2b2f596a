use anyhow::Result;

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; model names and
/// clustering params live in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // Embeddings
    pub openai_api_key: String,
    pub embedding_base_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")?,
            openai_api_key: std::env::var("OPENAI_API_KEY")?,
            embedding_base_url: std::env::var("EMBEDDING_BASE_URL").ok(),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!(
            "  EMBEDDING_BASE_URL: {}",
            self.embedding_base_url.as_deref().unwrap_or("<default>")
        );
    }
}
