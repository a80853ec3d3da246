//! Clients for the machinery the gateway fronts: the local model and the
//! shared cache store.

pub mod local;
pub mod redis;

pub use local::{probe_accelerator, OnnxEngine, RuntimeConfig};
pub use self::redis::RedisStore;
