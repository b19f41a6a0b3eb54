use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model inference failed: {0}")]
    Inference(String),
    #[error("Model load failed: {0}")]
    LoadFailed(String),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// 调用方违反批量上限约定，不重试
    #[error("max_32_images_allowed_in_buffer")]
    TooManyImages { count: usize },
    #[error("Image shape mismatch in batch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum LabelsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid class labels: {0}")]
    InvalidLabels(String),
}

#[derive(Debug, Error)]
pub enum ContextLoadError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Labels(#[from] LabelsError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker already started")]
    AlreadyStarted,
    #[error("Worker has been stopped and cannot be restarted")]
    Terminated,
    #[error("Classification failed: {0}")]
    Classification(#[from] ClassifierError),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
    #[error("Worker thread panicked")]
    Panicked,
}
