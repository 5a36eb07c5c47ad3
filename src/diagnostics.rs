use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::capture::{now_unix_ms, CaptureSession};
use crate::client::ApiClient;

/// Point-in-time capture and upload counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: u128,
    pub chunks_captured: u64,
    pub frames_captured: u64,
    pub requests_sent: u64,
    pub responses_ok: u64,
    pub upload_errors: u64,
    pub request_rate_hz: f32,
    pub last_latency_ms: f32,
}

/// Circular history buffer for metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    history: Arc<Mutex<VecDeque<MetricsSnapshot>>>,
    max_history: usize,
}

impl MetricsCollector {
    pub fn new(max_history: usize) -> Self {
        MetricsCollector {
            history: Arc::new(Mutex::new(VecDeque::with_capacity(max_history))),
            max_history,
        }
    }

    pub fn record_snapshot(&self, snapshot: MetricsSnapshot) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(snapshot);
        if history.len() > self.max_history {
            history.pop_front();
        }
    }

    pub fn get_history(&self) -> Vec<MetricsSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn get_latest(&self) -> Option<MetricsSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }
}

/// Samples session and upload counters once per second for the dashboard.
pub fn start_metrics_sampler(
    session: CaptureSession,
    client: ApiClient,
    collector: MetricsCollector,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut prev_sent: u64 = 0;
        loop {
            ticker.tick().await;
            let status = client.status_snapshot();
            let rate = status.requests_sent.saturating_sub(prev_sent) as f32;
            prev_sent = status.requests_sent;
            collector.record_snapshot(MetricsSnapshot {
                timestamp: now_unix_ms(),
                chunks_captured: session.chunks_captured(),
                frames_captured: session.frames_captured(),
                requests_sent: status.requests_sent,
                responses_ok: status.responses_ok,
                upload_errors: status.upload_errors,
                request_rate_hz: rate,
                last_latency_ms: status.last_latency_ms.unwrap_or(0) as f32,
            });
        }
    })
}
