//! Configuration module for the gateway.

use std::str::FromStr;
use std::time::Duration;

use crate::clients::RuntimeConfig;
use crate::services::ServiceSettings;

/// Which store backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend: {}", other)),
        }
    }
}

/// Main service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub workers: usize,
    // Model
    pub model_name: String,
    pub model_path: String,
    pub tokenizer_path: String,
    pub model_dimension: usize,
    pub max_length: usize,
    pub batch_size: usize,
    pub use_cuda: bool,
    pub half_precision: bool,
    pub graph_compile: bool,
    pub quantization: bool,
    pub intra_threads: usize,
    pub normalize_embeddings: bool,
    pub eager_model_load: bool,
    // Cache
    pub cache_backend: CacheBackend,
    pub cache_ttl: Duration,
    pub cache_size: usize,
    pub redis_url_override: Option<String>,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub redis_db: u32,
    pub redis_timeout: Duration,
    // Limits
    pub rate_limit_per_second: usize,
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = Vars(lookup);

        Self {
            port: vars.parse("PORT").unwrap_or(8080),
            host: vars.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            workers: vars.parse("NUM_WORKERS").unwrap_or(2),
            model_name: vars
                .get("MODEL_NAME")
                .unwrap_or_else(|| "scibert-scivocab-uncased".to_string()),
            model_path: vars
                .get("MODEL_PATH")
                .unwrap_or_else(|| "./models/model.onnx".to_string()),
            tokenizer_path: vars
                .get("TOKENIZER_PATH")
                .unwrap_or_else(|| "./models/tokenizer.json".to_string()),
            model_dimension: vars.parse("MODEL_DIMENSION").unwrap_or(768),
            max_length: vars.parse("MODEL_MAX_LENGTH").unwrap_or(512),
            batch_size: vars.parse("BATCH_SIZE").unwrap_or(32),
            use_cuda: vars.flag("USE_CUDA", true),
            half_precision: vars.flag("HALF_PRECISION", true),
            graph_compile: vars.flag("ENABLE_GRAPH_COMPILE", true),
            quantization: vars.flag("QUANTIZATION", true),
            intra_threads: vars.parse("INTRA_THREADS").unwrap_or(4),
            normalize_embeddings: vars.flag("NORMALIZE_EMBEDDINGS", false),
            eager_model_load: vars.flag("EAGER_MODEL_LOAD", true),
            cache_backend: vars.parse("CACHE_BACKEND").unwrap_or(CacheBackend::Redis),
            cache_ttl: Duration::from_secs(vars.parse("CACHE_TTL").unwrap_or(3600)),
            cache_size: vars.parse("CACHE_SIZE").unwrap_or(1000),
            redis_url_override: vars.get("REDIS_URL").filter(|v| !v.trim().is_empty()),
            redis_host: vars.get("REDIS_HOST").unwrap_or_else(|| "redis".to_string()),
            redis_port: vars.parse("REDIS_PORT").unwrap_or(6379),
            redis_password: vars.get("REDIS_PASSWORD").filter(|v| !v.is_empty()),
            redis_db: vars.parse("REDIS_DB").unwrap_or(0),
            redis_timeout: Duration::from_millis(vars.parse("REDIS_TIMEOUT_MS").unwrap_or(500)),
            rate_limit_per_second: vars.parse("RATE_LIMIT_PER_SECOND").unwrap_or(10),
            json_logs: vars
                .get("LOG_FORMAT")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("json")),
        }
    }

    /// Connection URL for the Redis store.
    pub fn redis_url(&self) -> String {
        if let Some(url) = &self.redis_url_override {
            return url.clone();
        }
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }

    /// Convert to a runtime configuration.
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            model_path: self.model_path.clone(),
            tokenizer_path: self.tokenizer_path.clone(),
            dimension: self.model_dimension,
            max_length: self.max_length,
            model_name: self.model_name.clone(),
            use_cuda: self.use_cuda,
            half_precision: self.half_precision,
            graph_compile: self.graph_compile,
            quantization: self.quantization,
            intra_threads: self.intra_threads,
            normalize: self.normalize_embeddings,
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            model_name: self.model_name.clone(),
            cache_ttl: self.cache_ttl,
            max_batch_size: self.batch_size,
            rate_limit_per_second: self.rate_limit_per_second,
        }
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}
