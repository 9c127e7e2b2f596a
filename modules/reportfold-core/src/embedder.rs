use ai_client::openai::OpenAi;
use ai_client::traits::EmbedAgent;
use anyhow::Result;

// --- TextEmbedder trait ---

#[async_trait::async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Production embedder over an OpenAI-compatible embeddings API.
/// Vectors are unit-norm and deterministic for a fixed model version.
pub struct Embedder {
    client: OpenAi,
}

impl Embedder {
    pub fn new(api_key: &str, model: &str) -> Self {
        let client = OpenAi::new(api_key).with_embedding_model(model);
        Self { client }
    }

    /// Point at a non-default endpoint (proxy, self-hosted model).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait::async_trait]
impl TextEmbedder for Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client.embed(text.to_string()).await
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.client.embed_batch(texts).await
    }
}
