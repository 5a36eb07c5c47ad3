use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::capture::{now_unix_ms, MediaChunk};
use crate::display::Renderer;
use crate::error::{ClientError, ErrorSink, MSG_QA_REQUIRED, MSG_RESUME_REQUIRED};
use crate::protocol::{
    self, AnalysisResult, AnswerAnalysisResponse, AnswerPayload, AudioStreamResponse,
    CombinedAnalysisResponse, Endpoint, ResumeAnalysisResponse, VideoFramePayload,
    VideoFrameResponse,
};

/// Upload counters shared with the dashboard and the metrics sampler.
#[derive(Debug, Clone, Default)]
pub struct UploadStatus {
    pub requests_sent: u64,
    pub responses_ok: u64,
    pub upload_errors: u64,
    pub last_latency_ms: Option<u64>,
    pub last_response_unix_ms: Option<u128>,
}

/// HTTP client for the assessment endpoints.
///
/// One outbound request per captured unit or user action: no retry, no queue,
/// no coalescing. Concurrent requests are bounded by the in-flight limiter;
/// a failed payload is discarded after the error is returned to the caller.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    in_flight: Arc<Semaphore>,
    status: Arc<Mutex<UploadStatus>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, max_in_flight: usize) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
            status: Arc::new(Mutex::new(UploadStatus::default())),
        }
    }

    pub fn status_snapshot(&self) -> UploadStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path())
    }

    /// Audio chunks go out as multipart form data, matching the server contract
    /// (the video path uses JSON instead; the asymmetry is intentional).
    pub async fn send_audio_chunk(
        &self,
        chunk: &MediaChunk,
    ) -> Result<AudioStreamResponse, ClientError> {
        let endpoint = Endpoint::AudioStream;
        let part = Part::bytes(chunk.payload.to_vec())
            .file_name("audio_chunk.wav")
            .mime_str("audio/wav")
            .map_err(|e| ClientError::Transport {
                endpoint: endpoint.name(),
                source: e,
            })?;
        let form = Form::new()
            .part("audio", part)
            .text("timestamp", chunk.timestamp_ms.to_string());
        let req = self.http.post(self.url(endpoint)).multipart(form);
        self.execute(endpoint, req).await
    }

    pub async fn send_video_frame(
        &self,
        payload: &VideoFramePayload,
    ) -> Result<VideoFrameResponse, ClientError> {
        let endpoint = Endpoint::VideoFrame;
        let req = self.http.post(self.url(endpoint)).json(payload);
        let resp: VideoFrameResponse = self.execute(endpoint, req).await?;
        resp.validate()?;
        Ok(resp)
    }

    /// Manual flow: requires a chosen resume file; without one no request is
    /// sent and the caller gets the alert text back.
    pub async fn analyze_resume(
        &self,
        resume_path: Option<&Path>,
        job_description: &str,
    ) -> Result<ResumeAnalysisResponse, ClientError> {
        let path = match resume_path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return Err(ClientError::MissingInput(MSG_RESUME_REQUIRED)),
        };
        let endpoint = Endpoint::AnalyzeResume;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::FileRead {
                path: path.display().to_string(),
                source: e,
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("resume")
            .to_string();
        let form = Form::new()
            .part("resume", Part::bytes(data).file_name(file_name))
            .text("job_description", job_description.to_string());
        let req = self.http.post(self.url(endpoint)).multipart(form);
        self.execute(endpoint, req).await
    }

    /// Manual flow: both question and answer must be non-empty before anything
    /// is sent.
    pub async fn analyze_answer(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<AnswerAnalysisResponse, ClientError> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(ClientError::MissingInput(MSG_QA_REQUIRED));
        }
        let endpoint = Endpoint::AnalyzeAnswer;
        let payload = AnswerPayload {
            question: question.to_string(),
            answer: answer.to_string(),
        };
        let req = self.http.post(self.url(endpoint)).json(&payload);
        self.execute(endpoint, req).await
    }

    /// Pull-based report flow, a bare GET.
    pub async fn combined_analysis(&self) -> Result<CombinedAnalysisResponse, ClientError> {
        let endpoint = Endpoint::CombinedAnalysis;
        let req = self.http.get(self.url(endpoint));
        self.execute(endpoint, req).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        // The limiter is never closed.
        let _permit = self.in_flight.acquire().await.ok();
        self.mark_sent();
        let started = Instant::now();
        let result = self.perform(endpoint, req).await;
        match &result {
            Ok(_) => self.mark_ok(started.elapsed()),
            Err(_) => self.mark_error(),
        }
        result
    }

    async fn perform<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let resp = req.send().await.map_err(|e| ClientError::Transport {
            endpoint: endpoint.name(),
            source: e,
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: endpoint.name(),
                status,
            });
        }
        let body = resp.bytes().await.map_err(|e| ClientError::Transport {
            endpoint: endpoint.name(),
            source: e,
        })?;
        protocol::decode(endpoint, &body)
    }

    fn mark_sent(&self) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.requests_sent += 1;
    }

    fn mark_ok(&self, latency: Duration) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.responses_ok += 1;
        status.last_latency_ms = Some(latency.as_millis() as u64);
        status.last_response_unix_ms = Some(now_unix_ms());
    }

    fn mark_error(&self) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.upload_errors += 1;
    }
}

/// User actions forwarded from the dashboard to the async worker.
#[derive(Debug, Clone)]
pub enum UiCommand {
    AnalyzeResume { path: PathBuf, job_description: String },
    AnalyzeAnswer { question: String, answer: String },
    GenerateReport,
}

/// Runs the on-demand flows: each command is one request/response round trip,
/// rendered on success and reported to the sink on failure.
pub fn start_command_worker(
    mut rx: UnboundedReceiver<UiCommand>,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                UiCommand::AnalyzeResume {
                    path,
                    job_description,
                } => match client.analyze_resume(Some(&path), &job_description).await {
                    Ok(resp) => {
                        renderer.apply(0, &AnalysisResult::Resume(resp));
                    }
                    Err(e) => sink.report(&e),
                },
                UiCommand::AnalyzeAnswer { question, answer } => {
                    match client.analyze_answer(&question, &answer).await {
                        Ok(resp) => {
                            renderer.apply(0, &AnalysisResult::Answer(resp));
                        }
                        Err(e) => sink.report(&e),
                    }
                }
                UiCommand::GenerateReport => match client.combined_analysis().await {
                    Ok(resp) => {
                        renderer.apply(0, &AnalysisResult::Combined(resp));
                    }
                    Err(e) => sink.report(&e),
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_stub(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn chunk(bytes: &[u8]) -> MediaChunk {
        MediaChunk {
            payload: Bytes::copy_from_slice(bytes),
            timestamp_ms: now_unix_ms(),
            seq: 1,
        }
    }

    #[tokio::test]
    async fn test_missing_inputs_never_send() {
        // Unroutable base URL: if a request were sent these would fail with a
        // transport error instead of the alert text.
        let client = ApiClient::new("http://127.0.0.1:9", 4);

        let err = client.analyze_answer("", "回答").await.unwrap_err();
        assert!(err.is_missing_input());
        let err = client.analyze_answer("问题", "   ").await.unwrap_err();
        assert!(err.is_missing_input());
        let err = client.analyze_resume(None, "职位").await.unwrap_err();
        assert!(err.is_missing_input());

        let status = client.status_snapshot();
        assert_eq!(status.requests_sent, 0);
    }

    #[tokio::test]
    async fn test_audio_chunk_multipart_roundtrip() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            "/api/audio_stream",
            post(move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "transcript": "你好",
                        "analysis": {"speaking_speed": 118.2, "pause_count": 1}
                    }))
                }
            }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 4);

        let resp = client.send_audio_chunk(&chunk(b"pcm-bytes")).await.unwrap();
        assert_eq!(resp.transcript, "你好");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let status = client.status_snapshot();
        assert_eq!(status.requests_sent, 1);
        assert_eq!(status.responses_ok, 1);
        assert_eq!(status.upload_errors, 0);
    }

    #[tokio::test]
    async fn test_http_error_status_is_reported() {
        let app = Router::new().route(
            "/api/analyze_answer",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 4);

        let err = client.analyze_answer("问题", "回答").await.unwrap_err();
        match err {
            ClientError::Status { endpoint, status } => {
                assert_eq!(endpoint, "analyze_answer");
                assert_eq!(status.as_u16(), StatusCode::INTERNAL_SERVER_ERROR.as_u16());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.status_snapshot().upload_errors, 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_a_panic() {
        let app = Router::new().route(
            "/api/combined_analysis",
            get(|| async { Json(serde_json::json!({"analysis": {"audio": {}}})) }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 4);

        let err = client.combined_analysis().await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_face_detected_without_fields_is_malformed() {
        let app = Router::new().route(
            "/api/video_frame",
            post(|| async { Json(serde_json::json!({"analysis": {"face_detected": true}})) }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 4);

        let payload = VideoFramePayload {
            frame: "data:image/jpeg;base64,AAAA".to_string(),
            timestamp: now_unix_ms(),
        };
        let err = client.send_video_frame(&payload).await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_in_flight_uploads_are_bounded() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (c, p) = (current.clone(), peak.clone());
        let app = Router::new().route(
            "/api/video_frame",
            post(move || {
                let (c, p) = (c.clone(), p.clone());
                async move {
                    let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    c.fetch_sub(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "analysis": {"face_detected": false}
                    }))
                }
            }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 2);

        let mut futs = Vec::new();
        for i in 0..6u128 {
            let client = client.clone();
            futs.push(async move {
                let payload = VideoFramePayload {
                    frame: "data:image/jpeg;base64,AAAA".to_string(),
                    timestamp: i,
                };
                client.send_video_frame(&payload).await
            });
        }
        let results = futures::future::join_all(futs).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_command_worker_renders_report() {
        let app = Router::new().route(
            "/api/combined_analysis",
            get(|| async {
                Json(serde_json::json!({
                    "analysis": {
                        "audio": {"speaking_speed": 120, "pause_count": 4},
                        "video": {"emotion": {"tension": 0.35}, "eye_contact": true},
                        "text": {"star_score": 7, "professional_term_score": 6}
                    }
                }))
            }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 4);
        let renderer = Renderer::new(false);
        let sink = ErrorSink::new(8);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = start_command_worker(rx, client, renderer.clone(), sink.clone());

        tx.send(UiCommand::GenerateReport).unwrap();
        drop(tx);
        worker.await.unwrap();

        let report = renderer.snapshot().combined_report;
        assert!(report.contains("语速: 120 字/分钟"));
        assert_eq!(sink.total_reported(), 0);
    }

    #[tokio::test]
    async fn test_resume_flow_reads_file_and_uploads() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            "/api/analyze_resume",
            post(move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "match_score": 85.0,
                        "resume_text": "候选人简历内容"
                    }))
                }
            }),
        );
        let addr = spawn_stub(app).await;
        let client = ApiClient::new(format!("http://{addr}"), 4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"fake pdf bytes").unwrap();

        let resp = client
            .analyze_resume(Some(&path), "Python开发工程师")
            .await
            .unwrap();
        assert_eq!(resp.match_score, 85.0);
        assert_eq!(resp.resume_text, "候选人简历内容");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
