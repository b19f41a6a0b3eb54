use std::sync::Arc;

use log::debug;

use crate::core::error::ClassifierError;
use crate::core::frame::{Batch, Image};
use crate::core::model::ModelContext;
use crate::core::votes::VoteList;

/// 单次分类允许的最大图像数，同时也是帧缓冲区的硬上限
pub const MAX_BATCH_SIZE: usize = 32;

pub struct ImageClassifier {
    context: Arc<ModelContext>,
}

impl ImageClassifier {
    pub fn new(context: Arc<ModelContext>) -> Self {
        Self { context }
    }

    /// 对一批图像做分类，按输入顺序每张返回一个标签
    ///
    /// 空批量返回哨兵 `["none"]`；超过 32 张直接报错。
    pub fn classify(&self, images: &[Image]) -> Result<VoteList, ClassifierError> {
        if images.is_empty() {
            return Ok(VoteList::none());
        }

        if images.len() > MAX_BATCH_SIZE {
            return Err(ClassifierError::TooManyImages {
                count: images.len(),
            });
        }

        let batch = Batch::stack(images)?;
        let rows = self.context.model().predict(&batch)?;

        if rows.len() != batch.len() {
            return Err(ClassifierError::MalformedOutput(format!(
                "expected {} rows, got {}",
                batch.len(),
                rows.len()
            )));
        }

        let labels = self.context.labels();
        let votes = rows
            .iter()
            .map(|row| {
                let index = argmax(row).ok_or_else(|| {
                    ClassifierError::MalformedOutput("empty probability row".to_string())
                })?;
                labels.get(index).map(str::to_string).ok_or_else(|| {
                    ClassifierError::MalformedOutput(format!(
                        "class index {} out of range ({} labels)",
                        index,
                        labels.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Classified {} images: {:?}", votes.len(), votes);
        Ok(VoteList::new(votes))
    }
}

/// 最大值下标；并列取最小下标，NaN 不参与
fn argmax(row: &[f32]) -> Option<usize> {
    row.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
