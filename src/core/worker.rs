//! 后台视频分类线程
//!
//! 生产者（调用方线程）通过 [`VideoClassifier::add_image`] 写入帧；
//! 后台线程在缓冲区达到目标大小时整批取出、分类，并发布新的投票列表。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::core::buffer::FrameBuffer;
use crate::core::classifier::ImageClassifier;
use crate::core::config::WorkerConfig;
use crate::core::error::{ClassifierError, WorkerError};
use crate::core::frame::Image;
use crate::core::model::ModelContext;
use crate::core::votes::VoteList;

const THREAD_NAME: &str = "actspotter-classifier";

pub type VoteCallback = Box<dyn FnMut(&VoteList) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// 已创建，尚未启动
    Idle,
    Running,
    /// 已请求退出，循环在下一次检查时结束
    Stopping,
    /// 终态，不可重启
    Stopped,
}

struct Shared {
    buffer: FrameBuffer,
    state: Mutex<WorkerState>,
    votes: RwLock<Arc<VoteList>>,
    last_error: Mutex<Option<String>>,
    completed_cycles: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, votes: Arc<VoteList>) {
        let mut current = self.votes.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = votes;
    }

    fn snapshot(&self) -> Arc<VoteList> {
        let current = self.votes.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }
}

/// 线程结束时（包括 panic）把状态置为 Stopped
struct StopOnExit<'a>(&'a Shared);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        *self.0.state() = WorkerState::Stopped;
        info!("VideoClassifier: worker stopped");
    }
}

pub struct VideoClassifier {
    shared: Arc<Shared>,
    classifier: Mutex<Option<ImageClassifier>>,
    callback: Mutex<Option<VoteCallback>>,
    handle: Mutex<Option<JoinHandle<Result<(), ClassifierError>>>>,
    config: WorkerConfig,
}

impl VideoClassifier {
    pub fn new(context: Arc<ModelContext>, config: WorkerConfig) -> Self {
        Self::build(context, config, None)
    }

    /// 每完成一次分类，在后台线程上同步调用一次 `callback`
    pub fn with_callback<F>(context: Arc<ModelContext>, config: WorkerConfig, callback: F) -> Self
    where
        F: FnMut(&VoteList) + Send + 'static,
    {
        Self::build(context, config, Some(Box::new(callback)))
    }

    fn build(
        context: Arc<ModelContext>,
        config: WorkerConfig,
        callback: Option<VoteCallback>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer: FrameBuffer::new(config.buffer_size),
                state: Mutex::new(WorkerState::Idle),
                votes: RwLock::new(Arc::new(VoteList::none())),
                last_error: Mutex::new(None),
                completed_cycles: AtomicU64::new(0),
            }),
            classifier: Mutex::new(Some(ImageClassifier::new(context))),
            callback: Mutex::new(callback),
            handle: Mutex::new(None),
            config,
        }
    }

    /// 启动后台分类线程；只能调用一次
    pub fn start(&self) -> Result<(), WorkerError> {
        {
            let mut state = self.shared.state();
            match *state {
                WorkerState::Idle => *state = WorkerState::Running,
                WorkerState::Running => return Err(WorkerError::AlreadyStarted),
                WorkerState::Stopping | WorkerState::Stopped => {
                    return Err(WorkerError::Terminated)
                }
            }
        }

        let classifier = self
            .classifier
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(WorkerError::Terminated)?;
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run_loop(&shared, &classifier, callback, &config));

        match spawned {
            Ok(handle) => {
                info!(
                    "VideoClassifier: started (buffer_size={}, poll_interval={:?})",
                    self.shared.buffer.target_size(),
                    self.config.poll_interval
                );
                *self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
                    Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("VideoClassifier: failed to spawn worker thread: {}", e);
                *self.shared.state() = WorkerState::Stopped;
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// 请求停止。正在进行的分类和回调会执行完；不会等待线程结束
    pub fn exit(&self) {
        {
            let mut state = self.shared.state();
            match *state {
                WorkerState::Idle => *state = WorkerState::Stopped,
                WorkerState::Running => *state = WorkerState::Stopping,
                WorkerState::Stopping | WorkerState::Stopped => return,
            }
        }
        debug!("VideoClassifier: exit requested");
        self.shared.buffer.wake();
    }

    /// 等待后台线程结束，返回导致其终止的分类错误（如有）
    pub fn join(&self) -> Result<(), WorkerError> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match handle {
            None => Ok(()),
            Some(handle) => match handle.join() {
                Ok(result) => result.map_err(WorkerError::from),
                Err(_) => Err(WorkerError::Panicked),
            },
        }
    }

    pub fn add_image(&self, image: Image) {
        self.shared.buffer.add_image(image);
    }

    pub fn state(&self) -> WorkerState {
        *self.shared.state()
    }

    /// 后台线程是否仍在运行；分类失败后为 false
    pub fn is_alive(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn completed_cycles(&self) -> u64 {
        self.shared.completed_cycles.load(Ordering::Acquire)
    }

    pub fn buffered_frames(&self) -> usize {
        self.shared.buffer.len()
    }

    /// 最近一次分类的投票（完整快照）
    pub fn last_classification_votes(&self) -> Arc<VoteList> {
        self.shared.snapshot()
    }

    /// 最近一次分类的多数表决结果
    pub fn last_classification(&self) -> String {
        let votes = self.shared.snapshot();
        let label = votes.majority();

        if self.config.debug {
            info!("Classification: {}. Votes: {:?}", label, votes.labels());
        } else {
            debug!("Classification: {}. Votes: {:?}", label, votes.labels());
        }

        label.to_string()
    }
}

impl Drop for VideoClassifier {
    fn drop(&mut self) {
        self.exit();

        let handle = self
            .handle
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            // 回调里持有最后一个引用时，不能在自己的线程上 join
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run_loop(
    shared: &Shared,
    classifier: &ImageClassifier,
    mut callback: Option<VoteCallback>,
    config: &WorkerConfig,
) -> Result<(), ClassifierError> {
    let _stop = StopOnExit(shared);

    let running = || *shared.state() == WorkerState::Running;

    while running() {
        // exit() 之后加入的帧不会再被取走
        let images = match shared.buffer.wait_for_batch(config.poll_interval, running) {
            Some(images) => images,
            None => continue,
        };

        debug!("Classifying batch of {} frames", images.len());
        let votes = match classifier.classify(&images) {
            Ok(votes) => Arc::new(votes),
            Err(e) => {
                error!("❌ Classification failed, worker terminating: {}", e);
                *shared
                    .last_error
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(e.to_string());
                return Err(e);
            }
        };

        shared.publish(Arc::clone(&votes));
        shared.completed_cycles.fetch_add(1, Ordering::AcqRel);

        if let Some(callback) = callback.as_mut() {
            callback(&votes);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::labels::ClassLabels;
    use crate::core::model::{MockModel, Model};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    fn context(model: MockModel, names: &[&str]) -> Arc<ModelContext> {
        let labels = ClassLabels::new(names.iter().map(|s| s.to_string()).collect()).unwrap();
        ModelContext::new(Box::new(model), labels)
    }

    fn frame(class: f32) -> Image {
        Image::filled(2, 2, 3, class)
    }

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    /// 记录每次 predict 收到的批量（每张图第一个像素）
    fn recording_model(calls: Arc<Mutex<Vec<Vec<f32>>>>) -> MockModel {
        let inner = MockModel::by_first_pixel(2);
        MockModel::with_fn(move |batch| {
            let firsts = (0..batch.len())
                .map(|i| batch.image(i).map(|data| data[0]).unwrap_or(-1.0))
                .collect();
            calls.lock().unwrap().push(firsts);
            inner.predict(batch)
        })
    }

    #[test]
    fn test_initial_votes_are_none() {
        let worker = VideoClassifier::new(
            context(MockModel::constant(0, 1), &["idle"]),
            WorkerConfig::default(),
        );

        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(worker.last_classification_votes().is_none());
        assert_eq!(worker.last_classification(), "none");
        assert!(!worker.is_alive());
    }

    #[test]
    fn test_two_frames_classified_once_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let worker = VideoClassifier::new(
            context(recording_model(Arc::clone(&calls)), &["cat", "dog"]),
            WorkerConfig::default().with_buffer_size(2),
        );
        worker.start().unwrap();

        worker.add_image(frame(1.0));
        worker.add_image(frame(0.0));

        assert!(wait_until(|| worker.completed_cycles() == 1));
        thread::sleep(Duration::from_millis(20));

        assert_eq!(*calls.lock().unwrap(), vec![vec![1.0, 0.0]]);
        assert_eq!(
            *worker.last_classification_votes(),
            VoteList::from(vec!["dog", "cat"])
        );

        worker.exit();
        worker.join().unwrap();
    }

    #[test]
    fn test_majority_of_last_cycle() {
        let (tx, rx) = mpsc::channel();
        let worker = VideoClassifier::with_callback(
            context(MockModel::by_first_pixel(2), &["cat", "dog"]),
            WorkerConfig::default().with_buffer_size(3).with_debug(true),
            move |votes| {
                let _ = tx.send(votes.clone());
            },
        );
        worker.start().unwrap();

        worker.add_image(frame(0.0));
        worker.add_image(frame(1.0));
        worker.add_image(frame(0.0));

        let votes = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(votes, VoteList::from(vec!["cat", "dog", "cat"]));
        assert_eq!(worker.last_classification(), "cat");
    }

    #[test]
    fn test_callback_once_per_cycle() {
        let (tx, rx) = mpsc::channel();
        let worker = VideoClassifier::with_callback(
            context(MockModel::by_first_pixel(2), &["sitting", "walking"]),
            WorkerConfig::default().with_buffer_size(2),
            move |votes| {
                let _ = tx.send(votes.clone());
            },
        );
        worker.start().unwrap();

        worker.add_image(frame(0.0));
        worker.add_image(frame(0.0));
        let first = rx.recv_timeout(WAIT).unwrap();

        worker.add_image(frame(1.0));
        worker.add_image(frame(1.0));
        let second = rx.recv_timeout(WAIT).unwrap();

        assert_eq!(first, VoteList::from(vec!["sitting", "sitting"]));
        assert_eq!(second, VoteList::from(vec!["walking", "walking"]));
        assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
        assert_eq!(worker.completed_cycles(), 2);
        assert_eq!(worker.last_classification(), "walking");
    }

    #[test]
    fn test_no_classification_below_target() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let worker = VideoClassifier::new(
            context(recording_model(Arc::clone(&calls)), &["cat", "dog"]),
            WorkerConfig::default().with_buffer_size(3),
        );
        worker.start().unwrap();

        worker.add_image(frame(0.0));
        worker.add_image(frame(1.0));
        thread::sleep(Duration::from_millis(30));

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(worker.buffered_frames(), 2);
    }

    #[test]
    fn test_exit_mid_run_stops_new_cycles() {
        let calls = Arc::new(AtomicU64::new(0));
        let model = {
            let calls = Arc::clone(&calls);
            MockModel::with_fn(move |batch| {
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                Ok(vec![vec![1.0]; batch.len()])
            })
        };
        let worker = VideoClassifier::new(
            context(model, &["moving"]),
            WorkerConfig::default().with_buffer_size(1),
        );
        worker.start().unwrap();

        worker.add_image(frame(0.0));
        assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1));

        // 正在分类时请求退出
        worker.exit();
        assert!(matches!(
            worker.state(),
            WorkerState::Stopping | WorkerState::Stopped
        ));
        worker.join().unwrap();

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(worker.completed_cycles(), 1);
        assert_eq!(worker.last_classification(), "moving");

        worker.add_image(frame(0.0));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(matches!(worker.start(), Err(WorkerError::Terminated)));
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_exit_then_add_image_never_classified() {
        for _ in 0..20 {
            let calls = Arc::new(AtomicU64::new(0));
            let model = {
                let calls = Arc::clone(&calls);
                MockModel::with_fn(move |batch| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![vec![1.0]; batch.len()])
                })
            };
            let worker = VideoClassifier::new(
                context(model, &["moving"]),
                WorkerConfig::default().with_buffer_size(1),
            );
            worker.start().unwrap();
            thread::sleep(Duration::from_millis(5));

            worker.exit();
            worker.add_image(frame(0.0));
            worker.join().unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), 0);
            assert_eq!(worker.completed_cycles(), 0);
            assert_eq!(worker.buffered_frames(), 1);
            assert_eq!(worker.last_classification(), "none");
        }
    }

    #[test]
    fn test_callback_panic_stops_worker() {
        let worker = VideoClassifier::with_callback(
            context(MockModel::constant(0, 1), &["idle"]),
            WorkerConfig::default().with_buffer_size(1),
            |_| panic!("callback failed"),
        );
        worker.start().unwrap();

        worker.add_image(frame(0.0));

        assert!(matches!(worker.join(), Err(WorkerError::Panicked)));
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(!worker.is_alive());
        assert_eq!(worker.completed_cycles(), 1);
    }

    #[test]
    fn test_start_twice_and_exit_before_start() {
        let worker = VideoClassifier::new(
            context(MockModel::constant(0, 1), &["idle"]),
            WorkerConfig::default(),
        );
        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(WorkerError::AlreadyStarted)));
        worker.exit();
        worker.join().unwrap();

        let never_started = VideoClassifier::new(
            context(MockModel::constant(0, 1), &["idle"]),
            WorkerConfig::default(),
        );
        never_started.exit();
        assert_eq!(never_started.state(), WorkerState::Stopped);
        assert!(matches!(never_started.start(), Err(WorkerError::Terminated)));
        assert!(never_started.join().is_ok());
    }

    #[test]
    fn test_model_failure_kills_worker() {
        let worker = VideoClassifier::new(
            context(MockModel::failing("tensor allocation failed"), &["cat"]),
            WorkerConfig::default().with_buffer_size(2),
        );
        worker.start().unwrap();

        worker.add_image(frame(0.0));
        worker.add_image(frame(0.0));

        let result = worker.join();
        assert!(matches!(
            result,
            Err(WorkerError::Classification(ClassifierError::Model(_)))
        ));
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(!worker.is_alive());
        assert!(worker
            .last_error()
            .unwrap()
            .contains("tensor allocation failed"));
        assert_eq!(worker.last_classification(), "none");
    }

    #[test]
    fn test_drop_stops_worker() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let worker = VideoClassifier::new(
            context(recording_model(Arc::clone(&calls)), &["cat", "dog"]),
            WorkerConfig::default(),
        );
        worker.start().unwrap();
        drop(worker);

        assert!(calls.lock().unwrap().is_empty());
    }
}
