use std::sync::Arc;
use std::time::SystemTime;

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};

use crate::core::error::ClassifierError;

/// 单帧图像：height × width × channels，行优先 f32
///
/// 像素数据放在 `Arc<[f32]>` 里，克隆只增加引用计数。
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    height: usize,
    width: usize,
    channels: usize,
    data: Arc<[f32]>,
}

impl Image {
    /// 数据长度与形状不符时返回 None
    pub fn from_raw(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != height * width * channels {
            return None;
        }
        Some(Self {
            height,
            width,
            channels,
            data: data.into(),
        })
    }

    pub fn filled(height: usize, width: usize, channels: usize, value: f32) -> Self {
        Self {
            height,
            width,
            channels,
            data: vec![value; height * width * channels].into(),
        }
    }

    /// RGB8 -> [0, 1] 归一化
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let data: Vec<f32> = rgb.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Self {
            height: rgb.height() as usize,
            width: rgb.width() as usize,
            channels: 3,
            data: data.into(),
        }
    }

    /// 缩放到模型输入尺寸 (height, width) 后转 RGB
    pub fn from_dynamic(image: &DynamicImage, dimension: (u32, u32)) -> Self {
        let (height, width) = dimension;
        let rgb = if image.width() == width && image.height() == height {
            image.to_rgb8()
        } else {
            image
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8()
        };
        Self::from_rgb(&rgb)
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.height * self.width
    }
}

/// 缓冲区中的帧 + 采集时间（仅用于排序信息）
#[derive(Debug, Clone)]
pub struct TimestampedImage {
    pub image: Image,
    pub captured_at: SystemTime,
}

impl TimestampedImage {
    pub fn now(image: Image) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
        }
    }
}

/// 堆叠后的批量输入，形状 [n, h, w, c]
#[derive(Debug, Clone)]
pub struct Batch {
    len: usize,
    shape: (usize, usize, usize),
    data: Vec<f32>,
}

impl Batch {
    /// 所有图像必须同形状
    pub fn stack(images: &[Image]) -> Result<Self, ClassifierError> {
        let shape = images.first().map(Image::shape).unwrap_or((0, 0, 0));
        let per_image = shape.0 * shape.1 * shape.2;
        let mut data = Vec::with_capacity(per_image * images.len());

        for image in images {
            if image.shape() != shape {
                return Err(ClassifierError::ShapeMismatch {
                    expected: shape,
                    actual: image.shape(),
                });
            }
            data.extend_from_slice(image.data());
        }

        Ok(Self {
            len: images.len(),
            shape,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// (n, h, w, c)
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.len, self.shape.0, self.shape.1, self.shape.2)
    }

    /// 行优先的 [n, h, w, c] 张量，模型实现直接读取
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn image(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len {
            return None;
        }
        let per_image = self.shape.0 * self.shape.1 * self.shape.2;
        Some(&self.data[index * per_image..(index + 1) * per_image])
    }
}
