//! Command-line and environment configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::clip::DevicePreference;
use crate::error::ConfigError;

/// File name of the CLIP ONNX export inside the model directory.
pub const MODEL_FILE: &str = "model.onnx";
/// File name of the HuggingFace tokenizer inside the model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// HTTP service that tells whether an image at a URL contains a bird.
#[derive(Debug, Clone, Parser)]
#[command(name = "bird-classifier", version, about)]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 12000)]
    pub port: u16,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[arg(long, env = "MODEL_DIR", default_value = "models/clip-vit-base-patch32")]
    pub model_dir: PathBuf,

    /// Compute device for inference.
    #[arg(long, env = "DEVICE", value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// Timeout for downloading an image, in seconds.
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Largest image body accepted, in bytes.
    #[arg(long, env = "MAX_IMAGE_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_image_bytes: u64,

    /// Number of HTTP worker threads (defaults to one per core).
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_image_bytes == 0 {
            return Err(ConfigError::ZeroImageLimit);
        }
        if self.workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(MODEL_FILE)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join(TOKENIZER_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["bird-classifier"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn explicit_flags_are_parsed() {
        let config = parse(&[
            "--port",
            "8081",
            "--model-dir",
            "/opt/clip",
            "--device",
            "cpu",
            "--fetch-timeout-secs",
            "3",
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.device, DevicePreference::Cpu);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
        assert_eq!(config.model_path(), PathBuf::from("/opt/clip/model.onnx"));
        assert_eq!(
            config.tokenizer_path(),
            PathBuf::from("/opt/clip/tokenizer.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = parse(&["--fetch-timeout-secs", "0"]);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));

        let config = parse(&["--max-image-bytes", "0"]);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroImageLimit)));

        let config = parse(&["--workers", "0"]);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWorkers)));
    }

    #[test]
    fn invalid_device_is_rejected() {
        let result = Config::try_parse_from(["bird-classifier", "--device", "tpu"]);
        assert!(result.is_err());
    }
}
