use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    session::builder::GraphOptimizationLevel,
    session::Session,
};
use std::path::Path;
use std::process::Command;
use std::str;
use tracing::{debug, info};

use crate::config::{EngineConfig, ExecutionProvider};
use crate::{Error, Result};

fn is_cuda_available() -> bool {
    // `nvidia-smi` answers only when a driver and at least one device are present
    if let Ok(output) = Command::new("nvidia-smi").output() {
        if let Ok(stdout) = str::from_utf8(&output.stdout) {
            if !stdout.contains("No devices were found") && !stdout.is_empty() {
                return true;
            }
        }
    }

    false
}

fn wants_cuda(provider: ExecutionProvider) -> bool {
    match provider {
        ExecutionProvider::Cuda => true,
        ExecutionProvider::Cpu => false,
        ExecutionProvider::Auto => is_cuda_available(),
    }
}

pub fn create_model_session(config: &EngineConfig) -> Result<Session> {
    let model_path: &Path = &config.model_path;
    if !model_path.is_file() {
        return Err(Error::ModelLoad(format!(
            "model not found: {}",
            model_path.display()
        )));
    }

    let session_builder = Session::builder()?;

    let session_builder = if wants_cuda(config.execution_provider) {
        info!("using CUDA execution provider");
        session_builder.with_execution_providers([CUDAExecutionProvider::default().build()])?
    } else {
        info!("using CPU execution provider");
        session_builder.with_execution_providers([CPUExecutionProvider::default().build()])?
    };

    let model = session_builder
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads)?
        .commit_from_file(model_path)?;

    for input in &model.inputs {
        debug!(name = %input.name, "model input");
    }
    if !model.outputs.iter().any(|o| o.name == config.output_name) {
        let available: Vec<&str> = model.outputs.iter().map(|o| o.name.as_str()).collect();
        return Err(Error::ModelLoad(format!(
            "model has no output named '{}' (available: {available:?})",
            config.output_name
        )));
    }

    Ok(model)
}
