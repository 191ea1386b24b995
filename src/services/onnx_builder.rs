// Shared ONNX Runtime session builder for the detector, CTC recognizer and local translator

use anyhow::{bail, Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

/// Thread count for CPU inference.
///
/// Windows loses throughput past ~6 intra-op threads.
/// Reference: https://github.com/microsoft/onnxruntime/issues/3713
pub fn optimal_intra_op_threads() -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = std::cmp::min(6, total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = total_cores.max(1);

    debug!("CPU threads: {} total cores, using {} for inference", total_cores, optimal);
    optimal
}

/// Execution provider requested through `INFERENCE_BACKEND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Auto,
    Cpu,
    Cuda,
}

impl Backend {
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(|v| v.trim().to_uppercase()).as_deref() {
            None | Some("") | Some("AUTO") => Ok(Backend::Auto),
            Some("CPU") => Ok(Backend::Cpu),
            Some("CUDA") => Ok(Backend::Cuda),
            Some(other) => bail!("Unknown inference backend '{}'. Valid options: CUDA, CPU, AUTO", other),
        }
    }
}

/// Build a session for the model at `model_path`.
///
/// `inference_backend` forces a provider (`CPU`, `CUDA`); `None` or `AUTO` tries CUDA
/// when compiled in and falls back to CPU.
///
/// # Returns
/// (backend_name, Session)
pub fn build_session(
    model_path: &Path,
    model_name: &str,
    inference_backend: Option<&str>,
) -> Result<(String, Session)> {
    if !model_path.is_file() {
        bail!("{} model not found at {}", model_name, model_path.display());
    }

    match Backend::parse(inference_backend)? {
        Backend::Cpu => {
            let session = commit(model_path, model_name, false)?;
            info!("✓ Forced CPU backend for {}", model_name);
            Ok(("CPU (forced)".to_string(), session))
        }
        Backend::Cuda => {
            if !cfg!(feature = "cuda") {
                bail!("CUDA requested for {} but this build has no `cuda` feature", model_name);
            }
            let session = commit(model_path, model_name, true)?;
            info!("✓ Forced CUDA backend for {}", model_name);
            Ok(("CUDA (forced)".to_string(), session))
        }
        Backend::Auto => {
            if cfg!(feature = "cuda") {
                match commit(model_path, model_name, true) {
                    Ok(session) => {
                        info!("✓ Using CUDA acceleration for {}", model_name);
                        return Ok(("CUDA".to_string(), session));
                    }
                    Err(e) => warn!("CUDA unavailable for {}: {:#}", model_name, e),
                }
            }
            let session = commit(model_path, model_name, false)?;
            debug!("Using CPU inference for {}", model_name);
            Ok(("CPU".to_string(), session))
        }
    }
}

fn commit(model_path: &Path, model_name: &str, gpu: bool) -> Result<Session> {
    let builder = Session::builder()
        .with_context(|| format!("Failed to create ONNX session builder for {}", model_name))?;

    let builder = if gpu {
        with_cuda(builder)?
    } else {
        builder.with_execution_providers([CPUExecutionProvider::default().build()])?
    };

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(optimal_intra_op_threads())?
        .with_inter_threads(1)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load {} model from {}", model_name, model_path.display()))
}

#[cfg(feature = "cuda")]
fn with_cuda(builder: SessionBuilder) -> Result<SessionBuilder> {
    Ok(builder.with_execution_providers([CUDAExecutionProvider::default().build()])?)
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(_builder: SessionBuilder) -> Result<SessionBuilder> {
    bail!("built without the `cuda` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_reported() {
        let err = build_session(Path::new("/nonexistent/detector.onnx"), "detection", None)
            .unwrap_err();
        assert!(err.to_string().contains("detection model not found"));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(Backend::parse(None).unwrap(), Backend::Auto);
        assert_eq!(Backend::parse(Some(" auto ")).unwrap(), Backend::Auto);
        assert_eq!(Backend::parse(Some("cpu")).unwrap(), Backend::Cpu);
        assert_eq!(Backend::parse(Some("CUDA")).unwrap(), Backend::Cuda);
        assert!(Backend::parse(Some("DirectML")).is_err());
    }

    #[test]
    fn test_thread_count_is_positive() {
        assert!(optimal_intra_op_threads() >= 1);
    }
}
