use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::capture::{now_unix_ms, CaptureSession, StreamKind};
use crate::client::ApiClient;
use crate::config::VideoCaptureConfig;
use crate::display::Renderer;
use crate::error::ErrorSink;
use crate::protocol::{AnalysisResult, VideoFramePayload};

const JPEG_SOI: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// A camera-like producer of encoded still frames. `None` ends the stream.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<Bytes>;
}

/// Synthesizes JPEG-framed payloads sized by the configured quality. There is
/// no camera crate in this stack, so the device path stays mock-backed and the
/// dashboard shows capture liveness instead of a pixel preview.
pub struct MockCamera {
    frame_len: usize,
}

impl MockCamera {
    pub fn new(jpeg_quality: f32) -> Self {
        let quality = jpeg_quality.clamp(0.1, 1.0);
        MockCamera {
            frame_len: (quality * 24_000.0) as usize,
        }
    }
}

impl FrameSource for MockCamera {
    fn next_frame(&mut self) -> Option<Bytes> {
        let mut buf = Vec::with_capacity(self.frame_len + JPEG_SOI.len() + JPEG_EOI.len());
        buf.extend_from_slice(&JPEG_SOI);
        for _ in 0..self.frame_len {
            buf.push(fastrand::u8(..));
        }
        buf.extend_from_slice(&JPEG_EOI);
        Some(Bytes::from(buf))
    }
}

/// Encode a JPEG frame the way the server expects it: a base64 data URL.
pub fn to_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Camera path: one frame per interval, every frame uploaded as a JSON payload.
///
/// No frame is skipped or coalesced; when the network is slower than the frame
/// interval, requests overlap and responses resolve out of capture order.
pub fn start_video_capture(
    session: CaptureSession,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
    cfg: VideoCaptureConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let source = Box::new(MockCamera::new(cfg.jpeg_quality));
        run_video_loop(source, session, client, renderer, sink, cfg.frame_interval_ms).await;
    })
}

pub(crate) async fn run_video_loop(
    mut source: Box<dyn FrameSource>,
    session: CaptureSession,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
    interval_ms: u64,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    while session.is_active() {
        ticker.tick().await;
        let Some(frame) = source.next_frame() else {
            break;
        };
        let seq = session.next_seq(StreamKind::Video);
        session.note_captured(StreamKind::Video);
        let payload = VideoFramePayload {
            frame: to_data_url(&frame),
            timestamp: now_unix_ms(),
        };

        let client = client.clone();
        let renderer = renderer.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            match client.send_video_frame(&payload).await {
                Ok(resp) => {
                    renderer.apply(seq, &AnalysisResult::Video(resp));
                }
                // The frame is discarded here; nothing is retried.
                Err(e) => sink.report(&e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedCamera {
        frames_left: usize,
    }

    impl FrameSource for ScriptedCamera {
        fn next_frame(&mut self) -> Option<Bytes> {
            if self.frames_left == 0 {
                return None;
            }
            self.frames_left -= 1;
            Some(Bytes::from_static(b"\xFF\xD8\xFF\xE0frame\xFF\xD9"))
        }
    }

    #[test]
    fn test_data_url_round_trips() {
        let jpeg = b"\xFF\xD8\xFF\xE0hello\xFF\xD9";
        let url = to_data_url(jpeg);
        let encoded = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), jpeg);
    }

    #[test]
    fn test_mock_camera_frames_are_jpeg_framed() {
        let mut camera = MockCamera::new(0.8);
        let frame = camera.next_frame().unwrap();
        assert_eq!(&frame[..4], &JPEG_SOI[..]);
        assert_eq!(&frame[frame.len() - 2..], &JPEG_EOI[..]);
    }

    #[test]
    fn test_quality_scales_frame_size() {
        let mut low = MockCamera::new(0.2);
        let mut high = MockCamera::new(0.8);
        assert!(low.next_frame().unwrap().len() < high.next_frame().unwrap().len());
    }

    #[tokio::test]
    async fn test_every_frame_is_uploaded() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            "/api/video_frame",
            post(move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"analysis": {"face_detected": false}}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let session = CaptureSession::new();
        session.start();
        let client = ApiClient::new(format!("http://{addr}"), 8);
        let renderer = Renderer::new(false);
        let sink = ErrorSink::new(8);

        let source = Box::new(ScriptedCamera { frames_left: 3 });
        run_video_loop(
            source,
            session.clone(),
            client,
            renderer.clone(),
            sink.clone(),
            5,
        )
        .await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(session.frames_captured(), 3);
        assert_eq!(renderer.snapshot().face_status, "未检测到人脸");
        assert_eq!(sink.total_reported(), 0);
    }
}
