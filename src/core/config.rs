use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::info;

pub const MODEL_PATH_ENV_KEY: &str = "ACTSPOTTER_TF_MODEL_PATH";
pub const DEFAULT_MODEL_PATH: &str = "./model";
pub const DEFAULT_INPUT_DIMENSION: (u32, u32) = (150, 150);

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    /// (height, width)
    pub input_dimension: (u32, u32),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_dimension: DEFAULT_INPUT_DIMENSION,
        }
    }
}

impl ModelConfig {
    /// `ACTSPOTTER_TF_MODEL_PATH` 非空时覆盖默认模型路径
    pub fn from_env() -> Self {
        Self::with_model_path_override(env::var(MODEL_PATH_ENV_KEY).ok())
    }

    fn with_model_path_override(value: Option<String>) -> Self {
        let mut config = Self::default();
        match value {
            Some(path) if !path.is_empty() => config.model_path = PathBuf::from(path),
            _ => info!(
                "Model path {} not set. Using {:?}",
                MODEL_PATH_ENV_KEY, config.model_path
            ),
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// 触发一次分类的目标批量大小，会被限制在 1..=32
    pub buffer_size: usize,
    pub poll_interval: Duration,
    /// 每次取多数表决结果时以 info 级别打印投票
    pub debug: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4,
            poll_interval: Duration::from_millis(1),
            debug: false,
        }
    }
}

impl WorkerConfig {
    pub fn for_low_latency() -> Self {
        Self {
            buffer_size: 2,
            ..Default::default()
        }
    }

    pub fn for_smoothing() -> Self {
        Self {
            buffer_size: 16,
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.model_path, PathBuf::from("./model"));
        assert_eq!(config.input_dimension, (150, 150));
    }

    #[test]
    fn test_model_path_override() {
        let config = ModelConfig::with_model_path_override(Some("/opt/models/act".to_string()));
        assert_eq!(config.model_path, PathBuf::from("/opt/models/act"));

        let empty = ModelConfig::with_model_path_override(Some(String::new()));
        assert_eq!(empty.model_path, PathBuf::from(DEFAULT_MODEL_PATH));

        let unset = ModelConfig::with_model_path_override(None);
        assert_eq!(unset.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }

    #[test]
    fn test_worker_presets() {
        assert_eq!(WorkerConfig::default().buffer_size, 4);
        assert_eq!(WorkerConfig::default().poll_interval, Duration::from_millis(1));
        assert_eq!(WorkerConfig::for_low_latency().buffer_size, 2);
        assert!(WorkerConfig::for_smoothing().buffer_size <= 32);
        assert!(WorkerConfig::default().with_debug(true).debug);
    }
}
