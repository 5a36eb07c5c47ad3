use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Milliseconds since the Unix epoch on the client clock.
pub fn now_unix_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Which capture stream a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

/// One discrete unit of captured media.
///
/// Owned by exactly one upload for the duration of one request; never buffered
/// or retried after a failed send.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub payload: Bytes,
    pub timestamp_ms: u128,
    pub seq: u64,
}

/// Capture session state shared across tasks.
///
/// Replaces ad-hoc global stream handles: capture loops run while the session
/// is active, and `stop` aborts every task registered with the session.
#[derive(Clone)]
pub struct CaptureSession {
    active: Arc<AtomicBool>,
    audio_seq: Arc<AtomicU64>,
    video_seq: Arc<AtomicU64>,
    chunks_captured: Arc<AtomicU64>,
    frames_captured: Arc<AtomicU64>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        CaptureSession {
            active: Arc::new(AtomicBool::new(false)),
            audio_seq: Arc::new(AtomicU64::new(0)),
            video_seq: Arc::new(AtomicU64::new(0)),
            chunks_captured: Arc::new(AtomicU64::new(0)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop capturing. Capture loops exit and registered tasks are aborted;
    /// requests already in flight are left to resolve on their own.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for t in tasks.drain(..) {
            t.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn register_task(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Monotonic sequence number for the given stream.
    pub fn next_seq(&self, kind: StreamKind) -> u64 {
        let counter = match kind {
            StreamKind::Audio => &self.audio_seq,
            StreamKind::Video => &self.video_seq,
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn note_captured(&self, kind: StreamKind) {
        match kind {
            StreamKind::Audio => self.chunks_captured.fetch_add(1, Ordering::Relaxed),
            StreamKind::Video => self.frames_captured.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn chunks_captured(&self) -> u64 {
        self.chunks_captured.load(Ordering::Acquire)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Acquire)
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}
