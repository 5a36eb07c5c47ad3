use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Alert text for the resume flow when no file has been chosen.
pub const MSG_RESUME_REQUIRED: &str = "请先上传简历";
/// Alert text for the answer flow when question or answer is empty.
pub const MSG_QA_REQUIRED: &str = "请填写问题和回答";

/// Everything that can go wrong on the client side.
///
/// None of these are retried: device and transport failures absorb the payload,
/// missing-input errors are surfaced as an alert before any request is sent, and
/// malformed responses are reported instead of rendered.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("device access failed: {0}")]
    DeviceAccess(String),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("malformed {endpoint} response: {detail}")]
    MalformedResponse {
        endpoint: &'static str,
        detail: String,
    },

    #[error("{0}")]
    MissingInput(&'static str),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn is_missing_input(&self) -> bool {
        matches!(self, ClientError::MissingInput(_))
    }
}

#[derive(Debug, Clone)]
pub struct ReportedError {
    pub at_unix_ms: u128,
    pub message: String,
}

/// Single sink for every recoverable failure.
///
/// Reporting logs the error and appends it to a capped recent list for the
/// dashboard; nothing is retried and nothing escalates past here.
#[derive(Clone)]
pub struct ErrorSink {
    recent: Arc<Mutex<VecDeque<ReportedError>>>,
    max_recent: usize,
    total: Arc<std::sync::atomic::AtomicU64>,
}

impl ErrorSink {
    pub fn new(max_recent: usize) -> Self {
        ErrorSink {
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(max_recent))),
            max_recent,
            total: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub fn report(&self, err: &ClientError) {
        tracing::error!("{}", err);
        self.total
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(ReportedError {
            at_unix_ms: crate::capture::now_unix_ms(),
            message: err.to_string(),
        });
        if recent.len() > self.max_recent {
            recent.pop_front();
        }
    }

    pub fn recent(&self) -> Vec<ReportedError> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn total_reported(&self) -> u64 {
        self.total.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_counts_reports() {
        let sink = ErrorSink::new(8);
        sink.report(&ClientError::MissingInput(MSG_QA_REQUIRED));
        sink.report(&ClientError::DeviceAccess("no microphone".into()));
        assert_eq!(sink.total_reported(), 2);
        assert_eq!(sink.recent().len(), 2);
        assert_eq!(sink.recent()[0].message, MSG_QA_REQUIRED);
    }

    #[test]
    fn test_sink_caps_recent_list() {
        let sink = ErrorSink::new(3);
        for _ in 0..10 {
            sink.report(&ClientError::MissingInput(MSG_RESUME_REQUIRED));
        }
        assert_eq!(sink.recent().len(), 3);
        assert_eq!(sink.total_reported(), 10);
    }

    #[test]
    fn test_missing_input_detection() {
        assert!(ClientError::MissingInput(MSG_QA_REQUIRED).is_missing_input());
        assert!(!ClientError::DeviceAccess("x".into()).is_missing_input());
    }
}
