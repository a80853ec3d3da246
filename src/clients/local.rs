//! Local embedding engine using ONNX Runtime.
//!
//! This module loads the model and tokenizer from disk according to an
//! [`EnginePlan`] and runs forward passes entirely on-device.

use anyhow::{anyhow, Context, Result};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use crate::services::pipeline::{Accelerator, Device, EnginePlan};
use crate::services::VectorOps;
use crate::traits::InferenceEngine;

/// Configuration for the local embedding model.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to the base ONNX model file.
    pub model_path: String,
    /// Path to the tokenizer.json file.
    pub tokenizer_path: String,
    /// Output embedding dimension (the model's hidden size).
    pub dimension: usize,
    /// Maximum sequence length in tokens.
    pub max_length: usize,
    /// Model name for identification.
    pub model_name: String,
    pub use_cuda: bool,
    pub half_precision: bool,
    pub graph_compile: bool,
    pub quantization: bool,
    /// ORT intra-op thread count.
    pub intra_threads: usize,
    /// L2-normalize pooled vectors.
    pub normalize: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: "./models/model.onnx".to_string(),
            tokenizer_path: "./models/tokenizer.json".to_string(),
            dimension: 768,
            max_length: 512,
            model_name: "scibert-scivocab-uncased".to_string(),
            use_cuda: true,
            half_precision: true,
            graph_compile: true,
            quantization: true,
            intra_threads: 4,
            normalize: false,
        }
    }
}

/// Probe once for a usable CUDA execution provider.
pub fn probe_accelerator(enabled: bool) -> Accelerator {
    if !enabled {
        return Accelerator::Unavailable;
    }
    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => {
            info!("✓ CUDA execution provider available");
            Accelerator::Available
        }
        Ok(false) => {
            info!("CUDA execution provider not available");
            Accelerator::Unavailable
        }
        Err(e) => {
            warn!("CUDA probe failed: {}", e);
            Accelerator::Unavailable
        }
    }
}

/// ONNX Runtime engine: a committed session plus its tokenizer.
pub struct OnnxEngine {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    normalize: bool,
}

impl OnnxEngine {
    /// Resolve the optimization pipeline against the files on disk and load.
    pub fn load(config: &RuntimeConfig, accelerator: Accelerator) -> Result<Self> {
        let plan = EnginePlan::resolve(config, accelerator, |path| path.exists());
        Self::from_plan(plan, config)
    }

    /// Build the engine from an already-resolved plan.
    pub fn from_plan(plan: EnginePlan, config: &RuntimeConfig) -> Result<Self> {
        info!("Initializing local embedding model: {}", config.model_name);

        if !Path::new(&plan.weights_path).exists() {
            return Err(anyhow!(
                "Model file not found: {}. Please download the model first.",
                plan.weights_path.display()
            ));
        }
        if !Path::new(&plan.tokenizer_path).exists() {
            return Err(anyhow!(
                "Tokenizer file not found: {}. Please download the tokenizer first.",
                plan.tokenizer_path.display()
            ));
        }

        let mut tokenizer = Tokenizer::from_file(&plan.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        info!("✓ Tokenizer loaded (max length {})", config.max_length);

        let level = if plan.graph_optimized {
            GraphOptimizationLevel::Level3
        } else {
            GraphOptimizationLevel::Disable
        };
        let mut builder = Session::builder()?
            .with_optimization_level(level)?
            .with_intra_threads(config.intra_threads.max(1))?;
        if plan.device == Device::Cuda {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }

        // Committed sessions carry no training state.
        let session = builder
            .commit_from_file(&plan.weights_path)
            .with_context(|| format!("Failed to load {}", plan.weights_path.display()))?;

        info!("✓ ONNX session created for {} ({})", config.model_name, plan.describe());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            normalize: config.normalize,
        })
    }

    /// Tokenize a batch, padded to its longest member.
    ///
    /// Returns flattened `[batch, seq_len]` ids, attention mask and token
    /// type ids, plus `seq_len`.
    fn encode_batch(&self, texts: &[String]) -> Result<(Vec<i64>, Vec<i64>, Vec<i64>, usize)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());
        let capacity = encodings.len() * seq_len;
        let mut input_ids = Vec::with_capacity(capacity);
        let mut attention_mask = Vec::with_capacity(capacity);
        let mut token_type_ids = Vec::with_capacity(capacity);

        for encoding in &encodings {
            if encoding.get_ids().len() != seq_len {
                return Err(anyhow!("Tokenizer produced ragged batch"));
            }
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
            token_type_ids.extend(encoding.get_type_ids().iter().map(|&t| t as i64));
        }

        Ok((input_ids, attention_mask, token_type_ids, seq_len))
    }
}

impl InferenceEngine for OnnxEngine {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch = texts.len();
        let (input_ids, attention_mask, token_type_ids, seq_len) = self.encode_batch(texts)?;
        debug!("Running forward pass: batch {} x {} tokens", batch, seq_len);

        let input_ids_tensor = Tensor::from_array(([batch, seq_len], input_ids.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array(([batch, seq_len], attention_mask.clone().into_boxed_slice()))?;
        let token_type_ids_tensor =
            Tensor::from_array(([batch, seq_len], token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
        let outputs = session.run(ort::inputs![
            input_ids_tensor,
            attention_mask_tensor,
            token_type_ids_tensor,
        ])?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow!("No output tensor found"))?
            .1;

        let (shape, data) = output.try_extract_tensor::<f32>()?;

        // Shape is [batch, seq_len, hidden_size] or, for exports with pooling baked in, [batch, hidden_size]
        let mut embeddings = if shape.len() == 3 {
            if shape[0] as usize != batch || shape[1] as usize != seq_len {
                return Err(anyhow!("Unexpected output tensor shape: {:?}", shape));
            }
            let hidden_size = shape[2] as usize;
            VectorOps::mean_pool(data, &attention_mask, batch, seq_len, hidden_size)
        } else if shape.len() == 2 {
            if shape[0] as usize != batch {
                return Err(anyhow!("Unexpected output tensor shape: {:?}", shape));
            }
            let hidden_size = shape[1] as usize;
            data.chunks(hidden_size.max(1)).map(|row| row.to_vec()).collect()
        } else {
            return Err(anyhow!("Unexpected output tensor shape: {:?}", shape));
        };

        if self.normalize {
            VectorOps::batch_normalize(&mut embeddings);
        }

        Ok(embeddings)
    }
}
