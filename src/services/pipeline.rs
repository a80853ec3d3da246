//! Model optimization pipeline.
//!
//! Resolves the configured stages against the startup capability probe and
//! the weight files on disk, producing the [`EnginePlan`] the engine is
//! built from. Stages run in a fixed order and a stage that cannot apply is
//! skipped, never fatal.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::clients::RuntimeConfig;

/// Outcome of the one-time accelerator probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    Available,
    Unavailable,
}

impl Accelerator {
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Full,
    Half,
}

/// File-name suffix of the fp16 weight export.
pub const HALF_PRECISION_SUFFIX: &str = "fp16";
/// File-name suffix of the dynamically-quantized int8 weight export.
pub const QUANTIZED_SUFFIX: &str = "quantized";

/// The resolved set of optimizations an engine is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePlan {
    pub weights_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub device: Device,
    pub precision: Precision,
    pub graph_optimized: bool,
    pub quantized: bool,
}

impl EnginePlan {
    /// Run the pipeline stages in order.
    ///
    /// `exists` is consulted for optional weight variants so the resolution
    /// can be exercised without touching the filesystem.
    pub fn resolve(
        config: &RuntimeConfig,
        accelerator: Accelerator,
        exists: impl Fn(&Path) -> bool,
    ) -> Self {
        // 1. Base weights and tokenizer.
        let mut plan = Self {
            weights_path: PathBuf::from(&config.model_path),
            tokenizer_path: PathBuf::from(&config.tokenizer_path),
            device: Device::Cpu,
            precision: Precision::Full,
            graph_optimized: false,
            quantized: false,
        };

        // 2. Device placement.
        if config.use_cuda {
            if accelerator.is_available() {
                plan.device = Device::Cuda;
                info!("Placing model on CUDA");
            } else {
                info!("CUDA requested but unavailable, using CPU");
            }
        }

        // 3. Reduced precision, accelerator only.
        if config.half_precision {
            if plan.device == Device::Cuda {
                let variant = weight_variant(&plan.weights_path, HALF_PRECISION_SUFFIX);
                if exists(&variant) {
                    plan.weights_path = variant;
                    plan.precision = Precision::Half;
                    info!("Using half-precision weights");
                } else {
                    warn!(
                        "Half precision requested but {} not found, keeping full precision",
                        variant.display()
                    );
                }
            } else {
                debug!("Skipping half precision without an accelerator");
            }
        }

        // 4. Graph optimization.
        plan.graph_optimized = config.graph_compile;

        // 5. Dynamic quantization, from full-precision weights only.
        if config.quantization {
            if plan.precision == Precision::Half {
                debug!("Skipping quantization of half-precision weights");
            } else {
                let variant = weight_variant(&plan.weights_path, QUANTIZED_SUFFIX);
                if exists(&variant) {
                    plan.weights_path = variant;
                    plan.quantized = true;
                    info!("Using dynamically quantized weights");
                } else {
                    warn!(
                        "Quantization requested but {} not found, keeping base weights",
                        variant.display()
                    );
                }
            }
        }

        // 6. The engine commits an inference-only session from this plan.
        plan
    }

    /// Short human-readable summary for startup logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("{:?}", self.device).to_lowercase()];
        if self.precision == Precision::Half {
            parts.push("fp16".to_string());
        }
        if self.graph_optimized {
            parts.push("graph-optimized".to_string());
        }
        if self.quantized {
            parts.push("int8-dynamic".to_string());
        }
        parts.join(", ")
    }
}

/// `model.onnx` + `fp16` → `model_fp16.onnx`, in the same directory.
pub fn weight_variant(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    base.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            model_path: "/models/model.onnx".to_string(),
            tokenizer_path: "/models/tokenizer.json".to_string(),
            use_cuda: true,
            half_precision: true,
            graph_compile: true,
            quantization: true,
            ..RuntimeConfig::default()
        }
    }

    fn all_exist(_: &Path) -> bool {
        true
    }

    #[test]
    fn test_weight_variant_naming() {
        assert_eq!(
            weight_variant(Path::new("/models/model.onnx"), "fp16"),
            PathBuf::from("/models/model_fp16.onnx")
        );
        assert_eq!(
            weight_variant(Path::new("weights"), "quantized"),
            PathBuf::from("weights_quantized")
        );
    }

    #[test]
    fn test_accelerator_path_prefers_half_precision() {
        let plan = EnginePlan::resolve(&config(), Accelerator::Available, all_exist);

        assert_eq!(plan.device, Device::Cuda);
        assert_eq!(plan.precision, Precision::Half);
        assert!(plan.graph_optimized);
        assert!(!plan.quantized);
        assert_eq!(plan.weights_path, PathBuf::from("/models/model_fp16.onnx"));
    }

    #[test]
    fn test_half_precision_silently_skipped_without_accelerator() {
        let plan = EnginePlan::resolve(&config(), Accelerator::Unavailable, all_exist);

        assert_eq!(plan.device, Device::Cpu);
        assert_eq!(plan.precision, Precision::Full);
        assert!(plan.quantized);
        assert_eq!(plan.weights_path, PathBuf::from("/models/model_quantized.onnx"));
    }

    #[test]
    fn test_cuda_disabled_ignores_probe() {
        let config = RuntimeConfig {
            use_cuda: false,
            ..config()
        };
        let plan = EnginePlan::resolve(&config, Accelerator::Available, all_exist);
        assert_eq!(plan.device, Device::Cpu);
        assert_eq!(plan.precision, Precision::Full);
    }

    #[test]
    fn test_missing_variants_fall_back_to_base_weights() {
        let plan = EnginePlan::resolve(&config(), Accelerator::Unavailable, |_| false);

        assert_eq!(plan.weights_path, PathBuf::from("/models/model.onnx"));
        assert!(!plan.quantized);
        assert_eq!(plan.describe(), "cpu, graph-optimized");
    }

    #[test]
    fn test_everything_disabled() {
        let config = RuntimeConfig {
            use_cuda: false,
            half_precision: false,
            graph_compile: false,
            quantization: false,
            ..config()
        };
        let plan = EnginePlan::resolve(&config, Accelerator::Unavailable, all_exist);

        assert_eq!(
            plan,
            EnginePlan {
                weights_path: PathBuf::from("/models/model.onnx"),
                tokenizer_path: PathBuf::from("/models/tokenizer.json"),
                device: Device::Cpu,
                precision: Precision::Full,
                graph_optimized: false,
                quantized: false,
            }
        );
        assert_eq!(plan.describe(), "cpu");
    }
}
