//! 视频动作识别器 - 对外入口

use std::sync::Arc;

use image::DynamicImage;
use log::info;
use thiserror::Error;

use crate::core::{
    ContextLoadError, Image, ModelConfig, ModelContext, ModelLoader, VideoClassifier, VoteList,
    WorkerConfig, WorkerError, WorkerState,
};

#[derive(Debug, Error)]
pub enum SpotterError {
    #[error("Failed to load model context: {0}")]
    Context(#[from] ContextLoadError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// 视频动作识别器 - 预处理帧并交给后台分类线程
///
/// ```no_run
/// # use actspotter::{ActivitySpotter, ModelConfig, WorkerConfig, ModelLoader};
/// # fn demo(loader: &dyn ModelLoader, frame: image::DynamicImage) -> Result<(), actspotter::SpotterError> {
/// let spotter = ActivitySpotter::create(loader, ModelConfig::from_env(), WorkerConfig::default())?;
/// spotter.start()?;
/// spotter.add_frame(&frame);
/// let activity = spotter.classification();
/// # Ok(())
/// # }
/// ```
pub struct ActivitySpotter {
    worker: VideoClassifier,
    input_dimension: (u32, u32),
}

impl ActivitySpotter {
    /// 加载模型和标签，创建识别器（尚未启动）
    pub fn create(
        loader: &dyn ModelLoader,
        model_config: ModelConfig,
        worker_config: WorkerConfig,
    ) -> Result<Self, SpotterError> {
        crate::init_logging();
        info!(
            "🎬 ActivitySpotter: initializing with model_path: {:?}",
            model_config.model_path
        );

        let context = ModelContext::load(loader, &model_config.model_path)?;
        Ok(Self::with_context(context, model_config, worker_config))
    }

    pub fn with_context(
        context: Arc<ModelContext>,
        model_config: ModelConfig,
        worker_config: WorkerConfig,
    ) -> Self {
        info!("🎬 ActivitySpotter: created");
        Self {
            worker: VideoClassifier::new(context, worker_config),
            input_dimension: model_config.input_dimension,
        }
    }

    /// 同 [`with_context`](Self::with_context)，每次分类完成后回调
    pub fn with_callback<F>(
        context: Arc<ModelContext>,
        model_config: ModelConfig,
        worker_config: WorkerConfig,
        callback: F,
    ) -> Self
    where
        F: FnMut(&VoteList) + Send + 'static,
    {
        info!("🎬 ActivitySpotter: created with callback");
        Self {
            worker: VideoClassifier::with_callback(context, worker_config, callback),
            input_dimension: model_config.input_dimension,
        }
    }

    pub fn start(&self) -> Result<(), SpotterError> {
        Ok(self.worker.start()?)
    }

    pub fn exit(&self) {
        self.worker.exit()
    }

    pub fn join(&self) -> Result<(), SpotterError> {
        Ok(self.worker.join()?)
    }

    /// 缩放到模型输入尺寸并归一化后入队
    pub fn add_frame(&self, frame: &DynamicImage) {
        self.worker
            .add_image(Image::from_dynamic(frame, self.input_dimension));
    }

    /// 已预处理的图像直接入队
    pub fn add_image(&self, image: Image) {
        self.worker.add_image(image);
    }

    pub fn votes(&self) -> Arc<VoteList> {
        self.worker.last_classification_votes()
    }

    pub fn classification(&self) -> String {
        self.worker.last_classification()
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn is_alive(&self) -> bool {
        self.worker.is_alive()
    }

    pub fn last_error(&self) -> Option<String> {
        self.worker.last_error()
    }
}

impl Drop for ActivitySpotter {
    fn drop(&mut self) {
        info!("🗑️ ActivitySpotter: released");
    }
}
