//! Model runtime: one-time engine initialization and prediction.
//!
//! The engine is built behind a [`OnceLock`] that memoizes the outcome,
//! success or failure. Concurrent first callers wait on the same build, and a
//! failed build is never retried: every later call reports
//! [`GatewayError::ModelUnavailable`] until the process restarts.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use crate::clients::{OnnxEngine, RuntimeConfig};
use crate::error::GatewayError;
use crate::services::pipeline::Accelerator;
use crate::traits::{Embedder, InferenceEngine};

type EngineLoader = dyn Fn() -> Result<Arc<dyn InferenceEngine>> + Send + Sync;
type EngineOutcome = Result<Arc<dyn InferenceEngine>, String>;

pub struct ModelRuntime {
    loader: Arc<EngineLoader>,
    handle: Arc<OnceLock<EngineOutcome>>,
    accelerator: Accelerator,
    dimension: usize,
}

impl ModelRuntime {
    /// Runtime backed by the ONNX engine described by `config`.
    pub fn new(config: RuntimeConfig, accelerator: Accelerator) -> Self {
        let dimension = config.dimension;
        Self::with_loader(dimension, accelerator, move || {
            let engine = OnnxEngine::load(&config, accelerator)?;
            Ok(Arc::new(engine) as Arc<dyn InferenceEngine>)
        })
    }

    /// Runtime with a custom engine loader.
    pub fn with_loader<F>(dimension: usize, accelerator: Accelerator, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn InferenceEngine>> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            handle: Arc::new(OnceLock::new()),
            accelerator,
            dimension,
        }
    }

    /// Build the engine now instead of on the first request.
    pub async fn initialize(&self) -> Result<(), GatewayError> {
        self.engine().await.map(|_| ())
    }

    async fn engine(&self) -> Result<Arc<dyn InferenceEngine>, GatewayError> {
        let outcome = match self.handle.get() {
            Some(outcome) => outcome.clone(),
            None => {
                // Both the build and the wait happen on the blocking pool, so a
                // caller dropped mid-load leaves the build running to completion.
                let handle = Arc::clone(&self.handle);
                let loader = Arc::clone(&self.loader);
                tokio::task::spawn_blocking(move || {
                    handle.get_or_init(|| build(loader.as_ref())).clone()
                })
                .await
                .map_err(|e| {
                    GatewayError::ModelUnavailable(format!("initialization aborted: {}", e))
                })?
            }
        };

        outcome.map_err(GatewayError::ModelUnavailable)
    }

    /// Forward pass on the blocking pool; checks count and dimension.
    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, GatewayError> {
        let engine = self.engine().await?;
        let expected = texts.len();

        let embeddings = tokio::task::spawn_blocking(move || engine.embed(&texts))
            .await
            .map_err(|e| GatewayError::Inference(format!("forward pass aborted: {}", e)))?
            .map_err(|e| GatewayError::Inference(format!("{:#}", e)))?;

        if embeddings.len() != expected {
            return Err(GatewayError::Inference(format!(
                "expected {} embeddings, got {}",
                expected,
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(GatewayError::Inference(format!(
                "expected dimension {}, got {}",
                self.dimension,
                bad.len()
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for ModelRuntime {
    async fn predict_one(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.run(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| GatewayError::Inference("empty model output".to_string()))
    }

    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.run(texts.to_vec()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_loaded(&self) -> bool {
        matches!(self.handle.get(), Some(Ok(_)))
    }

    fn accelerator_available(&self) -> bool {
        self.accelerator.is_available()
    }
}

fn build(loader: &EngineLoader) -> EngineOutcome {
    match loader() {
        Ok(engine) => {
            info!("✓ Model runtime initialized");
            Ok(engine)
        }
        Err(e) => {
            error!("Model initialization failed: {:#}", e);
            Err(format!("{:#}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Embeds each text as `[len, len, ...]`; fails on "boom".
    struct LengthEngine {
        dimension: usize,
    }

    impl InferenceEngine for LengthEngine {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    if t == "boom" {
                        Err(anyhow!("kernel failure"))
                    } else {
                        Ok(vec![t.len() as f32; self.dimension])
                    }
                })
                .collect()
        }
    }

    fn counting_runtime(loads: Arc<AtomicUsize>) -> ModelRuntime {
        ModelRuntime::with_loader(4, Accelerator::Unavailable, move || {
            loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(LengthEngine { dimension: 4 }) as Arc<dyn InferenceEngine>)
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_builds_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let runtime = Arc::new(counting_runtime(loads.clone()));
        assert!(!runtime.is_loaded());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let runtime = Arc::clone(&runtime);
                tokio::spawn(async move { runtime.predict_one(&"x".repeat(i + 1)).await })
            })
            .collect();

        for (i, task) in tasks.into_iter().enumerate() {
            let embedding = task.await.unwrap().unwrap();
            assert_eq!(embedding, vec![(i + 1) as f32; 4]);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(runtime.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aborted_first_caller_does_not_restart_build() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let runtime = Arc::new(ModelRuntime::with_loader(4, Accelerator::Unavailable, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            Ok(Arc::new(LengthEngine { dimension: 4 }) as Arc<dyn InferenceEngine>)
        }));

        let first = {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move { runtime.predict_one("abandoned").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();
        assert!(first.await.is_err());

        assert_eq!(runtime.predict_one("kept").await.unwrap(), vec![4.0; 4]);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(runtime.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_initialization_is_sticky() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let runtime = ModelRuntime::with_loader(4, Accelerator::Unavailable, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("weights unavailable"))
        });

        for _ in 0..3 {
            match runtime.predict_one("hello").await {
                Err(GatewayError::ModelUnavailable(reason)) => {
                    assert!(reason.contains("weights unavailable"))
                }
                other => panic!("expected ModelUnavailable, got {:?}", other),
            }
        }

        assert!(matches!(
            runtime.initialize().await,
            Err(GatewayError::ModelUnavailable(_))
        ));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(!runtime.is_loaded());
    }

    #[tokio::test]
    async fn test_forward_failure_does_not_poison_handle() {
        let runtime = counting_runtime(Arc::new(AtomicUsize::new(0)));

        assert!(matches!(
            runtime.predict_one("boom").await,
            Err(GatewayError::Inference(_))
        ));
        assert_eq!(runtime.predict_one("fine").await.unwrap(), vec![4.0; 4]);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let runtime = counting_runtime(Arc::new(AtomicUsize::new(0)));
        let texts: Vec<String> = ["ccc", "a", "bb"].iter().map(|s| s.to_string()).collect();

        let embeddings = runtime.predict_batch(&texts).await.unwrap();
        let firsts: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(firsts, vec![3.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_initialization() {
        let loads = Arc::new(AtomicUsize::new(0));
        let runtime = counting_runtime(loads.clone());

        assert!(runtime.predict_batch(&[]).await.unwrap().is_empty());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_inference_error() {
        let runtime = ModelRuntime::with_loader(8, Accelerator::Available, || {
            Ok(Arc::new(LengthEngine { dimension: 4 }) as Arc<dyn InferenceEngine>)
        });

        assert!(runtime.accelerator_available());
        assert!(matches!(
            runtime.predict_one("x").await,
            Err(GatewayError::Inference(_))
        ));
    }
}
