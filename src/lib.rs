pub mod api;
pub mod core;

pub use crate::api::video::{ActivitySpotter, SpotterError};
pub use crate::core::{
    ClassLabels, ClassifierError, Image, ImageClassifier, Model, ModelConfig, ModelContext,
    ModelError, ModelLoader, VideoClassifier, VoteList, WorkerConfig, WorkerError, WorkerState,
};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("actspotter"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 已初始化时 try_init 直接返回 Err，忽略即可
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .format_timestamp_secs()
        .try_init();
    }
}
