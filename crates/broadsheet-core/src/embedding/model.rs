//! BGE embedding model inference.
//!
//! Runs a BERT-family encoder (`BAAI/bge-base-en-v1.5` in the production
//! configuration) with the Candle ML framework. BGE models take the
//! sequence embedding from the `[CLS]` token and L2-normalize it; queries
//! and documents are embedded the same way, with no instruction prefix.

use super::Embedder;
use crate::error::EmbeddingError;
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::info;

/// BERT-family embedder with CLS pooling and L2 normalization.
pub struct BgeEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl BgeEmbedder {
    /// Loads the model from safetensors weights, a tokenizer file, and the
    /// model's `config.json`.
    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        config_path: &Path,
        model_id: &str,
    ) -> Result<Self, EmbeddingError> {
        let config_json = std::fs::read_to_string(config_path)
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to read config: {e}")))?;
        let config: Config = serde_json::from_str(&config_json)
            .map_err(|e| EmbeddingError::InvalidConfig(format!("failed to parse config: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to load tokenizer: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_position_embeddings,
                ..TruncationParams::default()
            }))
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to set truncation: {e}")))?;

        let weights = std::fs::read(model_path)
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to read weights: {e}")))?;
        info!(
            model = model_id,
            weights_mb = weights.len() / 1_000_000,
            hidden = config.hidden_size,
            "loading embedding model"
        );

        let device = Self::select_device();
        let vb = VarBuilder::from_buffered_safetensors(weights, DTYPE, &device)
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to create VarBuilder: {e}")))?;
        let dimension = config.hidden_size;
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to build BertModel: {e}")))?;

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    /// Picks CUDA, then Metal, then CPU.
    fn select_device() -> Device {
        if let Ok(device) = Device::new_cuda(0) {
            info!("embedding on CUDA");
            return device;
        }
        if let Ok(device) = Device::new_metal(0) {
            info!("embedding on Metal");
            return device;
        }
        info!("embedding on CPU");
        Device::Cpu
    }

    /// L2-normalizes each row of a `[batch, hidden]` tensor.
    fn normalize_l2(v: &Tensor) -> Result<Tensor, EmbeddingError> {
        let norms = v
            .sqr()
            .map_err(|e| EmbeddingError::Inference(format!("failed to square: {e}")))?
            .sum_keepdim(1)
            .map_err(|e| EmbeddingError::Inference(format!("failed to sum: {e}")))?
            .sqrt()
            .map_err(|e| EmbeddingError::Inference(format!("failed to sqrt: {e}")))?;
        v.broadcast_div(&norms)
            .map_err(|e| EmbeddingError::Inference(format!("failed to normalize: {e}")))
    }
}

impl Embedder for BgeEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;

        let batch = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let ids: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().copied())
            .collect();
        let mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().copied())
            .collect();

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)
            .map_err(|e| EmbeddingError::TensorCreation(e.to_string()))?;
        let attention_mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)
            .map_err(|e| EmbeddingError::TensorCreation(e.to_string()))?;
        let token_type_ids = input_ids
            .zeros_like()
            .map_err(|e| EmbeddingError::TensorCreation(e.to_string()))?;

        // [batch, seq, hidden]
        let sequence = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EmbeddingError::Inference(format!("forward pass failed: {e}")))?;

        // CLS pooling: [batch, seq, hidden] -> [batch, hidden]
        let pooled = sequence
            .i((.., 0))
            .map_err(|e| EmbeddingError::Inference(format!("failed to select CLS: {e}")))?;
        let normalized = Self::normalize_l2(&pooled)?;

        let mut embeddings = Vec::with_capacity(batch);
        for row in 0..batch {
            let vector = normalized
                .i(row)
                .map_err(|e| EmbeddingError::Inference(e.to_string()))?
                .to_vec1::<f32>()
                .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
            embeddings.push(vector);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_surface_model_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = BgeEmbedder::from_files(
            &dir.path().join("model.safetensors"),
            &dir.path().join("tokenizer.json"),
            &dir.path().join("config.json"),
            "BAAI/bge-base-en-v1.5",
        );
        assert!(matches!(result, Err(EmbeddingError::ModelLoad(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "not json").unwrap();
        let result = BgeEmbedder::from_files(
            &dir.path().join("model.safetensors"),
            &dir.path().join("tokenizer.json"),
            &dir.path().join("config.json"),
            "BAAI/bge-base-en-v1.5",
        );
        assert!(matches!(result, Err(EmbeddingError::InvalidConfig(_))));
    }
}
