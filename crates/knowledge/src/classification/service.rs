//! Classification cache and worker pool.
//!
//! The request path only reads the cache and enqueues work with a
//! non-blocking send. A fixed set of workers drains the queue, reads the
//! tail of each file under a short deadline, and writes the verdict into the
//! cache. Workers outlive the request that enqueued the task, so a verdict
//! that misses one request's wait ceiling is ready for the next.

use super::file_store::FileStore;
use super::markers::{decode_tail, is_eligible, last_chars, MarkerSet, MAX_UTF8_BYTES};
use super::ClassificationError;
use crate::types::DocumentGroup;
use dashmap::DashMap;
use kbqa_core::config::ClassificationConfig;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

type Verdict = Result<bool, ClassificationError>;

/// Pool sizing and policy.
#[derive(Debug, Clone)]
pub struct ClassificationSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Longest a request waits for pending verdicts
    pub wait_ceiling: Duration,
    /// Longest a worker spends reading one file
    pub read_deadline: Duration,
    pub tail_chars: usize,
    /// Value used when no verdict is available in time
    pub fail_closed: bool,
    pub markers: MarkerSet,
}

impl ClassificationSettings {
    pub fn from_config(config: &ClassificationConfig) -> Self {
        let markers = if config.markers.is_empty() {
            MarkerSet::default()
        } else {
            MarkerSet::new(config.markers.iter().cloned())
        };

        Self {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            wait_ceiling: Duration::from_millis(config.wait_ceiling_ms),
            read_deadline: Duration::from_millis(config.read_deadline_ms),
            tail_chars: config.tail_chars,
            fail_closed: config.fail_closed,
            markers,
        }
    }
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self::from_config(&ClassificationConfig::default())
    }
}

/// Snapshot of the pool's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStats {
    /// Tasks accepted by the queue
    pub submitted: u64,
    /// Tasks rejected because the queue was full
    pub overflowed: u64,
    /// Files read and classified
    pub completed: u64,
    /// Files that could not be read or parsed
    pub failed: u64,
    pub panicked: u64,
    /// Verdicts served from the cache, on the request path or in a worker
    pub cache_hits: u64,
    /// Groups that received the fail-safe value
    pub fallbacks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    overflowed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ClassificationStats {
        ClassificationStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

struct ClassificationTask {
    file_id: String,
    title: String,
    file_type: String,
    reply: Option<oneshot::Sender<Verdict>>,
}

/// State shared by every worker.
#[derive(Clone)]
struct WorkerContext {
    cache: Arc<DashMap<String, bool>>,
    store: Arc<dyn FileStore>,
    markers: MarkerSet,
    tail_chars: usize,
    read_deadline: Duration,
    counters: Arc<Counters>,
}

impl WorkerContext {
    #[instrument(skip(self, task), fields(file_id = %task.file_id))]
    async fn process(&self, task: &ClassificationTask) -> Verdict {
        // A concurrent request may have queued the same file
        if let Some(cached) = self.cache.get(&task.file_id) {
            Counters::bump(&self.counters.cache_hits);
            return Ok(*cached);
        }

        let store = Arc::clone(&self.store);
        let markers = self.markers.clone();
        let file_id = task.file_id.clone();
        let title = task.title.clone();
        let file_type = task.file_type.clone();
        let tail_chars = self.tail_chars;

        let read = tokio::task::spawn_blocking(move || {
            classify_file(store.as_ref(), &markers, &file_id, &title, &file_type, tail_chars)
        });

        // A blocking read that overruns keeps its thread until it returns;
        // only the verdict is abandoned.
        let outcome = match tokio::time::timeout(self.read_deadline, read).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(join_err)) if join_err.is_panic() => Err(ClassificationError::WorkerPanic(
                panic_message(join_err.into_panic()),
            )),
            Ok(Err(join_err)) => Err(ClassificationError::WorkerPanic(join_err.to_string())),
            Err(_) => Err(ClassificationError::ReadTimeout(self.read_deadline)),
        };

        match outcome {
            Ok(restricted) => {
                let stored = *self
                    .cache
                    .entry(task.file_id.clone())
                    .or_insert(restricted);
                Counters::bump(&self.counters.completed);
                debug!("Classified '{}': restricted={}", task.title, stored);
                Ok(stored)
            }
            Err(ClassificationError::WorkerPanic(msg)) => {
                Counters::bump(&self.counters.panicked);
                warn!("Classification of '{}' panicked: {}", task.title, msg);
                Err(ClassificationError::WorkerPanic(msg))
            }
            Err(e) => {
                Counters::bump(&self.counters.failed);
                warn!("Classification of '{}' failed: {}", task.title, e);
                Err(e)
            }
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<ClassificationTask>>>,
    context: WorkerContext,
) {
    debug!("Classification worker {} started", id);
    loop {
        let task = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some(mut task) = task else {
            break;
        };

        let verdict = context.process(&task).await;
        if let Some(reply) = task.reply.take() {
            // The request may have stopped waiting
            let _ = reply.send(verdict);
        }
    }
    debug!("Classification worker {} stopped", id);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Classify the stored file behind `file_id`.
pub fn classify_file(
    store: &dyn FileStore,
    markers: &MarkerSet,
    file_id: &str,
    title: &str,
    file_type: &str,
    tail_chars: usize,
) -> Verdict {
    let path = store.locate(file_id, title)?;
    classify_path(store, markers, &path, file_type, tail_chars)
}

/// Classify a file by path.
///
/// Plain text is read from the end of the file only. Other formats are
/// loaded through the store and the tail of their last non-empty page is
/// inspected.
pub fn classify_path(
    store: &dyn FileStore,
    markers: &MarkerSet,
    path: &Path,
    file_type: &str,
    tail_chars: usize,
) -> Verdict {
    let tail = if file_type.eq_ignore_ascii_case("txt") {
        let bytes = store.read_last_bytes(path, tail_chars.saturating_mul(MAX_UTF8_BYTES))?;
        decode_tail(&bytes, tail_chars)
    } else {
        let pages = store.load_document(path)?;
        let last = pages
            .iter()
            .rev()
            .find(|page| !page.trim().is_empty())
            .ok_or(ClassificationError::EmptyDocument)?;
        last_chars(last.trim_end(), tail_chars).to_string()
    };

    Ok(markers.matches(&tail))
}

/// Process-wide classification cache and worker pool.
///
/// Build once with [`ClassificationService::start`] inside a Tokio runtime
/// and share it by `Arc`.
pub struct ClassificationService {
    cache: Arc<DashMap<String, bool>>,
    store: Arc<dyn FileStore>,
    sender: Mutex<Option<mpsc::Sender<ClassificationTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    settings: ClassificationSettings,
}

impl std::fmt::Debug for ClassificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationService")
            .field("cached", &self.cache.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ClassificationService {
    /// Spawn the worker pool.
    pub fn start(settings: ClassificationSettings, store: Arc<dyn FileStore>) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let queue = Arc::new(tokio::sync::Mutex::new(receiver));
        let cache = Arc::new(DashMap::new());
        let counters = Arc::new(Counters::default());

        let context = WorkerContext {
            cache: Arc::clone(&cache),
            store: Arc::clone(&store),
            markers: settings.markers.clone(),
            tail_chars: settings.tail_chars,
            read_deadline: settings.read_deadline,
            counters: Arc::clone(&counters),
        };

        let workers = (0..settings.workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&queue), context.clone())))
            .collect();

        info!(
            "Started {} classification workers (queue capacity {})",
            settings.workers, settings.queue_capacity
        );

        Self {
            cache,
            store,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            counters,
            settings,
        }
    }

    pub fn settings(&self) -> &ClassificationSettings {
        &self.settings
    }

    /// Value used when a verdict is not available.
    pub fn fail_safe(&self) -> bool {
        self.settings.fail_closed
    }

    /// Cached verdict for `file_id`.
    pub fn cached(&self, file_id: &str) -> Option<bool> {
        self.cache.get(file_id).map(|v| *v)
    }

    /// Forget the verdict for a deleted file.
    pub fn evict(&self, file_id: &str) -> Option<bool> {
        self.cache.remove(file_id).map(|(_, v)| v)
    }

    pub fn stats(&self) -> ClassificationStats {
        self.counters.snapshot()
    }

    /// Enqueue a file without waiting for room.
    ///
    /// Returns `QueueFull` immediately when the queue is at capacity.
    pub fn submit(
        &self,
        file_id: &str,
        title: &str,
        file_type: &str,
    ) -> Result<oneshot::Receiver<Verdict>, ClassificationError> {
        let (reply, receiver) = oneshot::channel();
        let task = ClassificationTask {
            file_id: file_id.to_string(),
            title: title.to_string(),
            file_type: file_type.to_lowercase(),
            reply: Some(reply),
        };

        let guard = self
            .sender
            .lock()
            .map_err(|_| ClassificationError::PoolClosed)?;
        let sender = guard.as_ref().ok_or(ClassificationError::PoolClosed)?;

        match sender.try_send(task) {
            Ok(()) => {
                Counters::bump(&self.counters.submitted);
                Ok(receiver)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Counters::bump(&self.counters.overflowed);
                warn!(
                    "Classification queue full (capacity {}), dropping '{}'",
                    self.settings.queue_capacity, title
                );
                Err(ClassificationError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ClassificationError::PoolClosed),
        }
    }

    /// Set `has_restricted_form` on every group.
    ///
    /// Ineligible groups and groups without a file ID are never restricted.
    /// Cached verdicts are applied without I/O. Formats the store cannot read
    /// get the fail-safe value without being queued. The rest are submitted once
    /// per file ID and awaited until the wait ceiling or `wait_until`,
    /// whichever comes first; anything still unknown gets the fail-safe
    /// value.
    pub async fn classify_groups(&self, groups: &mut [DocumentGroup], wait_until: Instant) {
        let deadline = (Instant::now() + self.settings.wait_ceiling).min(wait_until);

        let mut pending: HashMap<String, Vec<usize>> = HashMap::new();
        let mut receivers = Vec::new();

        for (i, group) in groups.iter_mut().enumerate() {
            let file_id = match group.file_id.as_deref() {
                Some(id) if is_eligible(group.file_type.as_deref()) && !id.is_empty() => id,
                _ => {
                    group.has_restricted_form = false;
                    continue;
                }
            };

            if let Some(verdict) = self.cached(file_id) {
                Counters::bump(&self.counters.cache_hits);
                group.has_restricted_form = verdict;
                continue;
            }

            let file_type = group.file_type.as_deref().unwrap_or_default();
            if !self.store.supports(file_type) {
                Counters::bump(&self.counters.fallbacks);
                debug!(
                    "Cannot read {} files, using fail-safe value for '{}'",
                    file_type, group.title
                );
                group.has_restricted_form = self.fail_safe();
                continue;
            }

            if let Some(indices) = pending.get_mut(file_id) {
                indices.push(i);
                continue;
            }
            pending.insert(file_id.to_string(), vec![i]);

            match self.submit(file_id, &group.title, file_type) {
                Ok(receiver) => receivers.push((file_id.to_string(), receiver)),
                Err(e) => debug!("Not classifying '{}' this time: {}", group.title, e),
            }
        }

        if pending.is_empty() {
            return;
        }

        let waits = receivers.into_iter().map(|(file_id, receiver)| async move {
            let verdict = match tokio::time::timeout_at(deadline, receiver).await {
                Ok(Ok(Ok(restricted))) => Some(restricted),
                _ => None,
            };
            (file_id, verdict)
        });
        let verdicts: HashMap<String, Option<bool>> =
            futures::future::join_all(waits).await.into_iter().collect();

        let fail_safe = self.fail_safe();
        for (file_id, indices) in pending {
            let verdict = verdicts
                .get(&file_id)
                .copied()
                .flatten()
                .or_else(|| self.cached(&file_id));

            let restricted = match verdict {
                Some(restricted) => restricted,
                None => {
                    self.counters
                        .fallbacks
                        .fetch_add(indices.len() as u64, Ordering::Relaxed);
                    warn!(
                        "No verdict for file '{}' in time, using fail-safe value {}",
                        file_id, fail_safe
                    );
                    fail_safe
                }
            };

            for i in indices {
                groups[i].has_restricted_form = restricted;
            }
        }
    }

    /// Close the queue and wait for workers to drain it.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or_default();
        drop(sender);

        let handles = self
            .workers
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Classification worker ended abnormally: {}", e);
            }
        }
        info!("Classification workers stopped");
    }
}
