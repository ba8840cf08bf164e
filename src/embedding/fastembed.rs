//! FastEmbed embedding provider implementation.
//!
//! Runs a sentence-transformer model locally through the fastembed library.
//! The default is `all-MiniLM-L6-v2`, a 384-dimension model that is small
//! enough to embed a few dozen article sections per query on a CPU.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Local embedding provider backed by a fastembed model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// Inference requires exclusive access; shared across clones
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier
    model_name: String,

    /// Dimension of the embedding vectors
    embedding_dimension: usize,
}

/// Resolve a user-facing model name to a fastembed model.
///
/// Accepts the Hugging Face style names (`all-MiniLM-L6-v2`,
/// `bge-small-en-v1.5`, ...) case-insensitively.
pub fn parse_model(name: &str) -> EmbeddingResult<EmbeddingModel> {
    let key = name.trim().to_ascii_lowercase();
    let key = key.rsplit('/').next().unwrap_or(&key);
    match key {
        "all-minilm-l6-v2" | "allminilml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" | "nomicembedtextv15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "paraphrase-multilingual-minilm-l12-v2" | "paraphrasemlminilml12v2" => {
            Ok(EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        other => Err(EmbeddingError::ConfigError(format!(
            "Unknown FastEmbed model '{}'",
            other
        ))),
    }
}

fn model_dimension(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::AllMiniLML6V2 => 384,
        EmbeddingModel::BGESmallENV15 => 384,
        EmbeddingModel::BGEBaseENV15 => 768,
        EmbeddingModel::BGELargeENV15 => 1024,
        EmbeddingModel::NomicEmbedTextV15 => 768,
        EmbeddingModel::ParaphraseMLMiniLML12V2 => 384,
        _ => 384,
    }
}

impl FastEmbedProvider {
    /// Load a FastEmbed model, downloading weights into `cache_dir` if needed.
    ///
    /// # Arguments
    /// * `model` - Model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the model cannot be loaded
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let model_name = format!("{:?}", model_type);
        let embedding_dimension = model_dimension(&model_type);

        let mut options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "All texts must be non-empty".to_string(),
            ));
        }

        let owned: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let model = Arc::clone(&self.model);

        // Inference is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Other("FastEmbed model lock poisoned".to_string()))?;
            model
                .embed(owned, None)
                .map_err(|e| EmbeddingError::Other(format!("Batch embedding generation failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Other(format!("Embedding task failed: {}", e)))?
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}
