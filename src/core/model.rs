use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::core::error::{ContextLoadError, ModelError};
use crate::core::frame::Batch;
use crate::core::labels::ClassLabels;

/// 不透明的推理模型：每张输入图像返回一行概率向量（列数 = 类别数）
pub trait Model: Send + Sync {
    fn predict(&self, batch: &Batch) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// 外部提供的模型加载器
pub trait ModelLoader {
    fn load(&self, model_path: &Path) -> Result<Box<dyn Model>, ModelError>;
}

/// 启动时创建一次、只读共享的推理上下文（模型 + 标签）
pub struct ModelContext {
    model: Box<dyn Model>,
    labels: ClassLabels,
}

impl ModelContext {
    pub fn new(model: Box<dyn Model>, labels: ClassLabels) -> Arc<Self> {
        Arc::new(Self { model, labels })
    }

    /// 加载模型和同目录下的 meta.json
    pub fn load(
        loader: &dyn ModelLoader,
        model_path: &Path,
    ) -> Result<Arc<Self>, ContextLoadError> {
        info!("[ ] Loading model from {:?}", model_path);
        let model = loader.load(model_path)?;
        info!("[x] Model loaded");

        let labels = ClassLabels::load(model_path)?;
        Ok(Self::new(model, labels))
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

type PredictFn = dyn Fn(&Batch) -> Result<Vec<Vec<f32>>, ModelError> + Send + Sync;

/// 测试和降级场景用的模型
pub struct MockModel {
    predict_fn: Box<PredictFn>,
}

impl MockModel {
    pub fn with_fn<F>(predict_fn: F) -> Self
    where
        F: Fn(&Batch) -> Result<Vec<Vec<f32>>, ModelError> + Send + Sync + 'static,
    {
        Self {
            predict_fn: Box::new(predict_fn),
        }
    }

    /// 每张图像都取第一个像素值作为类别索引
    pub fn by_first_pixel(num_classes: usize) -> Self {
        Self::with_fn(move |batch| {
            Ok((0..batch.len())
                .map(|i| {
                    let class = batch
                        .image(i)
                        .and_then(|data| data.first())
                        .map(|&v| v.max(0.0) as usize)
                        .unwrap_or(0)
                        .min(num_classes.saturating_sub(1));
                    one_hot(class, num_classes)
                })
                .collect())
        })
    }

    /// 所有图像都判为同一类别
    pub fn constant(class: usize, num_classes: usize) -> Self {
        Self::with_fn(move |batch| Ok(vec![one_hot(class, num_classes); batch.len()]))
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::with_fn(move |_| Err(ModelError::Inference(message.clone())))
    }
}

impl Model for MockModel {
    fn predict(&self, batch: &Batch) -> Result<Vec<Vec<f32>>, ModelError> {
        (self.predict_fn)(batch)
    }
}

fn one_hot(class: usize, num_classes: usize) -> Vec<f32> {
    let mut row = vec![0.0; num_classes];
    if let Some(slot) = row.get_mut(class) {
        *slot = 1.0;
    }
    row
}
