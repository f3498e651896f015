use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// CUDA when a GPU is detected, CPU otherwise.
    #[default]
    Auto,
    Cuda,
    Cpu,
}

/// Engine settings, read from a YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// ONNX model file
    pub model_path: PathBuf,

    /// Where rendered results are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_input_name")]
    pub input_name: String,

    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Side length of the square model input
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Probability above which a pixel counts as detected
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default = "num_cpus::get")]
    pub intra_threads: usize,

    #[serde(default)]
    pub execution_provider: ExecutionProvider,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_input_name() -> String {
    "input".to_string()
}

fn default_output_name() -> String {
    "output".to_string()
}

fn default_input_size() -> u32 {
    256
}

fn default_threshold() -> f32 {
    0.5
}

impl EngineConfig {
    /// Read and validate a config file. Relative paths inside it resolve against the
    /// directory that holds the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_yaml(&text)?;

        if let Some(base) = path.parent() {
            config.model_path = resolve(base, &config.model_path);
            config.output_dir = resolve(base, &config.output_dir);
        }
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(Error::Config("input_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.intra_threads == 0 {
            return Err(Error::Config("intra_threads must be positive".to_string()));
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = EngineConfig::from_yaml("model_path: models/best.onnx\n").unwrap();
        assert_eq!(config.model_path, PathBuf::from("models/best.onnx"));
        assert_eq!(config.output_dir, PathBuf::from("results"));
        assert_eq!(config.input_name, "input");
        assert_eq!(config.output_name, "output");
        assert_eq!(config.input_size, 256);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.intra_threads, num_cpus::get());
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
    }

    #[test]
    fn full_config_parses() {
        let yaml = "\
model_path: /opt/models/smoke.onnx
output_dir: /var/out
input_name: images
output_name: mask
input_size: 320
threshold: 0.35
intra_threads: 2
execution_provider: cpu
";
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.input_name, "images");
        assert_eq!(config.output_name, "mask");
        assert_eq!(config.input_size, 320);
        assert_eq!(config.intra_threads, 2);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
    }

    #[test]
    fn missing_model_path_is_rejected() {
        assert!(matches!(
            EngineConfig::from_yaml("input_size: 256\n"),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(EngineConfig::from_yaml("model_path: a.onnx\nbatch: 4\n").is_err());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for yaml in [
            "model_path: a.onnx\nthreshold: 1.5\n",
            "model_path: a.onnx\nthreshold: -0.1\n",
            "model_path: a.onnx\ninput_size: 0\n",
            "model_path: a.onnx\nintra_threads: 0\n",
        ] {
            assert!(matches!(EngineConfig::from_yaml(yaml), Err(Error::Config(_))), "{yaml}");
        }
    }

    #[test]
    fn relative_paths_follow_config_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "model_path: weights/best.onnx\noutput_dir: /abs/out\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.model_path, dir.path().join("weights/best.onnx"));
        assert_eq!(config.output_dir, PathBuf::from("/abs/out"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("absent.yaml"));
    }
}
