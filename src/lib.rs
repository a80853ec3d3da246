//! Embedding Gateway - Library Entry Point
//!
//! A rate-limited, cache-aside gateway in front of a local ONNX text-embedding
//! model. Runs the model on-device; the only network dependency is the
//! shared cache store.

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use clients::{OnnxEngine, RuntimeConfig};
pub use config::Config;
pub use error::{CacheError, GatewayError};
pub use services::{InferenceService, ModelRuntime, RateLimiter, ResponseCache};
pub use traits::{CacheStore, Embedder, InferenceEngine};
