//! Local Semantic Embeddings
//!
//! Uses fastembed v5.11 for local inference with nomic-embed-text-v1.5
//! (ONNX, 768d truncated to 256d via Matryoshka).

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{Embedder, Embedding, EmbeddingError, BATCH_SIZE};

/// Embedding dimensions after Matryoshka truncation
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

const MODEL_NAME: &str = "nomic-ai/nomic-embed-text-v1.5";

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Model cache directory: FASTEMBED_CACHE_PATH, else the platform cache dir
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "strata", "strata") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/strata/fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize {} embedding model: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                MODEL_NAME, e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

/// Truncate to [`EMBEDDING_DIMENSIONS`] and L2-normalize
#[inline]
pub fn matryoshka_truncate(mut vector: Vec<f32>) -> Vec<f32> {
    if vector.len() > EMBEDDING_DIMENSIONS {
        vector.truncate(EMBEDDING_DIMENSIONS);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

fn truncate_text(text: &str) -> &str {
    if text.len() <= MAX_TEXT_LENGTH {
        return text;
    }
    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// fastembed-backed [`Embedder`]
///
/// The ONNX model is loaded lazily on first use and shared process-wide.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastEmbedder;

impl FastEmbedder {
    /// Create the embedder (does not load the model)
    pub fn new() -> Self {
        Self
    }

    /// Load the model now, downloading it if necessary
    pub fn init(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }
}

impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = get_model()?;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            // Empty strings are rejected by the tokenizer; embed a single space instead
            let prepared: Vec<&str> = chunk
                .iter()
                .map(|t| if t.trim().is_empty() { " " } else { truncate_text(t) })
                .collect();

            let embeddings = model
                .embed(prepared, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

            for emb in embeddings {
                all_embeddings.push(Embedding::new(matryoshka_truncate(emb)));
            }
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "model returned {} embeddings for {} texts",
                all_embeddings.len(),
                texts.len()
            )));
        }

        Ok(all_embeddings)
    }
}
