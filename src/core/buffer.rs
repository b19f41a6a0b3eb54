//! 生产者/消费者共享的帧缓冲区

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::core::classifier::MAX_BATCH_SIZE;
use crate::core::frame::{Image, TimestampedImage};

/// 缓冲区绝对上限，与分类器单批上限一致
pub const HARD_CAP: usize = MAX_BATCH_SIZE;

/// 带锁的有序帧队列
///
/// 超过 `target_size` 时只保留最新的 `target_size` 帧；无论如何不超过 [`HARD_CAP`]。
/// 所有修改都在同一把锁内完成，分类和回调都在锁外执行。
pub struct FrameBuffer {
    entries: Mutex<VecDeque<TimestampedImage>>,
    ready: Condvar,
    target_size: usize,
}

impl FrameBuffer {
    /// `target_size` 会被限制在 `1..=HARD_CAP`
    pub fn new(target_size: usize) -> Self {
        let clamped = target_size.clamp(1, HARD_CAP);
        if clamped != target_size {
            warn!(
                "Buffer target size {} out of range, using {}",
                target_size, clamped
            );
        }

        Self {
            entries: Mutex::new(VecDeque::with_capacity(clamped + 1)),
            ready: Condvar::new(),
            target_size: clamped,
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// 追加一帧，返回因溢出被丢弃的旧帧数量
    pub fn add_image(&self, image: Image) -> usize {
        let mut entries = self.lock();
        entries.push_back(TimestampedImage::now(image));

        let mut dropped = 0;
        if entries.len() > self.target_size {
            let excess = entries.len() - self.target_size;
            entries.drain(..excess);
            dropped += excess;
        }

        if entries.len() > HARD_CAP {
            let excess = entries.len() - HARD_CAP;
            entries.drain(..excess);
            dropped += excess;
        }

        let ready = entries.len() >= self.target_size;
        drop(entries);

        if dropped > 0 {
            debug!("Frame buffer full, dropped {} oldest frame(s)", dropped);
        }
        if ready {
            self.ready.notify_one();
        }

        dropped
    }

    /// 达到目标大小时取走全部图像（丢弃时间戳）并清空缓冲区
    pub fn take_if_ready(&self) -> Option<Vec<Image>> {
        let mut entries = self.lock();
        self.drain_if_ready(&mut entries)
    }

    /// 同 [`take_if_ready`](Self::take_if_ready)，未就绪时最多等待 `timeout`
    ///
    /// 醒来后仍持有锁时再调用一次 `keep_running`，返回 false 则不取走任何帧。
    pub fn wait_for_batch<F>(&self, timeout: Duration, keep_running: F) -> Option<Vec<Image>>
    where
        F: Fn() -> bool,
    {
        let mut entries = self.lock();
        if entries.len() < self.target_size {
            entries = match self.ready.wait_timeout(entries, timeout) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        if !keep_running() {
            return None;
        }
        self.drain_if_ready(&mut entries)
    }

    /// 唤醒正在等待的消费者（用于退出）
    pub fn wake(&self) {
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn drain_if_ready(&self, entries: &mut VecDeque<TimestampedImage>) -> Option<Vec<Image>> {
        if entries.len() < self.target_size {
            return None;
        }
        Some(entries.drain(..).map(|entry| entry.image).collect())
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TimestampedImage>> {
        // 缓冲区内容在其他线程 panic 后依然有效
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
