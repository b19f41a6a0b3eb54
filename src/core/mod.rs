//! 视频动作分类核心
//!
//! 帧缓冲（生产者/消费者）→ 后台分类线程 → 投票列表 → 多数表决

pub mod buffer;
pub mod classifier;
pub mod config;
pub mod error;
pub mod frame;
pub mod labels;
pub mod model;
pub mod votes;
pub mod worker;

pub use buffer::{FrameBuffer, HARD_CAP};
pub use classifier::{ImageClassifier, MAX_BATCH_SIZE};
pub use config::{ModelConfig, WorkerConfig};
pub use error::{ClassifierError, ContextLoadError, LabelsError, ModelError, WorkerError};
pub use frame::{Batch, Image, TimestampedImage};
pub use labels::ClassLabels;
pub use model::{MockModel, Model, ModelContext, ModelLoader};
pub use votes::{majority, VoteList, NONE_LABEL};
pub use worker::{VideoClassifier, VoteCallback, WorkerState};
