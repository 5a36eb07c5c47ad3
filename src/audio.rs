use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::capture::{now_unix_ms, CaptureSession, MediaChunk, StreamKind};
use crate::client::ApiClient;
use crate::config::AudioCaptureConfig;
use crate::display::Renderer;
use crate::error::ErrorSink;
use crate::protocol::AnalysisResult;

/// A microphone-like producer. Each call returns the bytes captured since the
/// previous tick; `None` means the underlying stream ended.
pub trait AudioSource: Send {
    fn next_chunk(&mut self) -> Option<Bytes>;
}

/// Default source when the `device` feature is off: synthesizes opaque chunk
/// payloads, occasionally empty so the drop path stays exercised.
pub struct MockMicrophone;

impl AudioSource for MockMicrophone {
    fn next_chunk(&mut self) -> Option<Bytes> {
        if fastrand::u8(..16) == 0 {
            return Some(Bytes::new());
        }
        let len = fastrand::usize(800..1600);
        let mut buf = vec![0u8; len];
        for b in &mut buf {
            *b = fastrand::u8(..);
        }
        Some(Bytes::from(buf))
    }
}

#[cfg(feature = "device")]
mod device {
    use super::AudioSource;
    use crate::error::ClientError;
    use bytes::Bytes;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Microphone capture backed by cpal. The stream lives on its own thread
    /// because cpal streams are not Send; the callback appends 16-bit PCM to a
    /// shared buffer and each tick drains whatever accumulated.
    pub struct DeviceMicrophone {
        buffer: Arc<Mutex<Vec<u8>>>,
        stop: Arc<AtomicBool>,
    }

    impl DeviceMicrophone {
        pub fn open() -> Result<Self, ClientError> {
            let buffer = Arc::new(Mutex::new(Vec::new()));
            let stop = Arc::new(AtomicBool::new(false));
            let sink = Arc::clone(&buffer);
            let stop_flag = Arc::clone(&stop);
            let (ready_tx, ready_rx) = std::sync::mpsc::channel();

            std::thread::spawn(move || {
                let stream = match build_input_stream(sink) {
                    Ok(s) => {
                        let _ = ready_tx.send(Ok(()));
                        s
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while !stop_flag.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(100));
                }
                drop(stream);
            });

            ready_rx
                .recv()
                .map_err(|_| ClientError::DeviceAccess("capture thread exited".to_string()))??;
            Ok(DeviceMicrophone { buffer, stop })
        }
    }

    fn build_input_stream(sink: Arc<Mutex<Vec<u8>>>) -> Result<cpal::Stream, ClientError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| ClientError::DeviceAccess("no default input device".to_string()))?;
        let config = device
            .default_input_config()
            .map_err(|e| ClientError::DeviceAccess(e.to_string()))?;

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut buf = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    for sample in data {
                        let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        buf.extend_from_slice(&s.to_le_bytes());
                    }
                },
                |err| tracing::error!("microphone stream error: {}", err),
                None,
            )
            .map_err(|e| ClientError::DeviceAccess(e.to_string()))?;
        stream
            .play()
            .map_err(|e| ClientError::DeviceAccess(e.to_string()))?;
        Ok(stream)
    }

    impl AudioSource for DeviceMicrophone {
        fn next_chunk(&mut self) -> Option<Bytes> {
            let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            Some(Bytes::from(std::mem::take(&mut *buf)))
        }
    }

    impl Drop for DeviceMicrophone {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

fn open_microphone() -> Result<Box<dyn AudioSource>, crate::error::ClientError> {
    #[cfg(feature = "device")]
    {
        tracing::info!("opening default input device");
        Ok(Box::new(device::DeviceMicrophone::open()?))
    }

    #[cfg(not(feature = "device"))]
    {
        tracing::info!("starting mock microphone (device feature not enabled)");
        Ok(Box::new(MockMicrophone))
    }
}

/// Microphone path: one chunk per interval while the session is active.
///
/// Access failure is reported once and capture never starts. Uploads are
/// fire-and-forget; the loop never waits for the network, so requests may
/// overlap when the network is slower than the capture interval.
pub fn start_audio_capture(
    session: CaptureSession,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
    cfg: AudioCaptureConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let source = match open_microphone() {
            Ok(s) => s,
            Err(e) => {
                sink.report(&e);
                return;
            }
        };
        run_audio_loop(source, session, client, renderer, sink, cfg.chunk_interval_ms).await;
    })
}

pub(crate) async fn run_audio_loop(
    mut source: Box<dyn AudioSource>,
    session: CaptureSession,
    client: ApiClient,
    renderer: Renderer,
    sink: ErrorSink,
    interval_ms: u64,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    while session.is_active() {
        ticker.tick().await;
        let Some(payload) = source.next_chunk() else {
            break;
        };
        if payload.is_empty() {
            tracing::debug!("dropping empty audio chunk");
            continue;
        }
        let chunk = MediaChunk {
            payload,
            timestamp_ms: now_unix_ms(),
            seq: session.next_seq(StreamKind::Audio),
        };
        session.note_captured(StreamKind::Audio);

        let client = client.clone();
        let renderer = renderer.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            match client.send_audio_chunk(&chunk).await {
                Ok(resp) => {
                    renderer.apply(chunk.seq, &AnalysisResult::Audio(resp));
                }
                // The chunk is discarded here; nothing is retried.
                Err(e) => sink.report(&e),
            }
        });
    }
}
