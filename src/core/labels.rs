//! 类别标签表（从模型目录下的 meta.json 加载）

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use crate::core::error::LabelsError;

pub const META_FILE_NAME: &str = "meta.json";

#[derive(Debug, Deserialize)]
struct ModelMeta {
    classes: BTreeMap<String, String>,
}

/// 按类别索引排列的只读标签表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    /// 标签必须非空，且位置即类别索引
    pub fn new(names: Vec<String>) -> Result<Self, LabelsError> {
        if names.is_empty() {
            return Err(LabelsError::InvalidLabels("no classes defined".to_string()));
        }
        Ok(Self { names })
    }

    /// 解析 `{"classes": {"0": "walking", "1": "running"}}`
    ///
    /// 键按整数排序，必须从 0 开始连续。
    pub fn from_meta_json(json: &str) -> Result<Self, LabelsError> {
        let meta: ModelMeta = serde_json::from_str(json)?;

        let mut indexed = Vec::with_capacity(meta.classes.len());
        for (key, name) in meta.classes {
            let index: usize = key.trim().parse().map_err(|_| {
                LabelsError::InvalidLabels(format!("class key {:?} is not an index", key))
            })?;
            indexed.push((index, name));
        }
        indexed.sort_by_key(|(index, _)| *index);

        for (position, (index, _)) in indexed.iter().enumerate() {
            if *index != position {
                return Err(LabelsError::InvalidLabels(format!(
                    "class indices must be contiguous from 0, missing {}",
                    position
                )));
            }
        }

        Self::new(indexed.into_iter().map(|(_, name)| name).collect())
    }

    /// 从模型目录读取 meta.json
    pub fn load(model_dir: &Path) -> Result<Self, LabelsError> {
        let meta_path = model_dir.join(META_FILE_NAME);
        debug!("Reading class metadata from {:?}", meta_path);

        let json = fs::read_to_string(&meta_path)?;
        let labels = Self::from_meta_json(&json)?;

        info!("Classes: {:?}", labels.names);
        Ok(labels)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.names.iter().any(|name| name == label)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
