//! Services module.

pub mod cache;
pub mod inference;
pub mod memory_store;
pub mod pipeline;
pub mod rate_limiter;
pub mod runtime;
pub mod vector_ops;

pub use cache::ResponseCache;
pub use inference::{InferenceService, ServiceSettings};
pub use memory_store::MemoryStore;
pub use pipeline::{Accelerator, EnginePlan};
pub use rate_limiter::RateLimiter;
pub use runtime::ModelRuntime;
pub use vector_ops::VectorOps;
