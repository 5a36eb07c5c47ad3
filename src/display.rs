use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::StreamKind;
use crate::protocol::{
    AnalysisResult, AnswerAnalysisResponse, AudioStreamResponse, CombinedAnalysis,
    CombinedAnalysisResponse, ResumeAnalysisResponse, VideoFrameResponse,
};

const FACE_DETECTED: &str = "检测到人脸";
const FACE_NOT_DETECTED: &str = "未检测到人脸";
const EYE_CONTACT_YES: &str = "是";
const EYE_CONTACT_NO: &str = "否";
const EYE_CONTACT_GOOD: &str = "良好";
const EYE_CONTACT_IMPROVE: &str = "需要改进";

/// The named display regions the analysis fields are written into.
///
/// Plain text, written by whichever response resolves; there is no ordering
/// reconciliation beyond the optional staleness check in [`Renderer`].
#[derive(Debug, Clone, Default)]
pub struct DisplayRegions {
    pub transcript: String,
    pub speaking_speed: String,
    pub pause_count: String,
    pub face_status: String,
    pub emotion_tension: String,
    pub eye_contact: String,
    pub match_score: String,
    pub resume_text: String,
    pub star_score: String,
    pub term_score: String,
    pub relevance_score: String,
    pub feedback: String,
    pub combined_report: String,
}

struct RendererInner {
    regions: DisplayRegions,
    // Highest sequence applied per stream, used only when discard_stale is on.
    audio_watermark: u64,
    video_watermark: u64,
}

/// Applies decoded responses to the display regions.
///
/// With `discard_stale` off (default) the policy is last-resolved-wins, exactly
/// as the overlapping-request behavior of the capture loops implies. With it on,
/// a response carrying a sequence below the stream's watermark is dropped.
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<Mutex<RendererInner>>,
    discard_stale: bool,
}

impl Renderer {
    pub fn new(discard_stale: bool) -> Self {
        Renderer {
            inner: Arc::new(Mutex::new(RendererInner {
                regions: DisplayRegions::default(),
                audio_watermark: 0,
                video_watermark: 0,
            })),
            discard_stale,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendererInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DisplayRegions {
        self.lock().regions.clone()
    }

    fn admit(inner: &mut RendererInner, kind: StreamKind, seq: u64, discard_stale: bool) -> bool {
        let watermark = match kind {
            StreamKind::Audio => &mut inner.audio_watermark,
            StreamKind::Video => &mut inner.video_watermark,
        };
        if discard_stale && seq < *watermark {
            return false;
        }
        if seq > *watermark {
            *watermark = seq;
        }
        true
    }

    /// Returns false when the response was discarded as stale.
    pub fn apply_audio(&self, seq: u64, resp: &AudioStreamResponse) -> bool {
        let mut inner = self.lock();
        if !Self::admit(&mut inner, StreamKind::Audio, seq, self.discard_stale) {
            return false;
        }
        let regions = &mut inner.regions;
        regions.transcript.push(' ');
        regions.transcript.push_str(&resp.transcript);
        regions.speaking_speed = format!("{:.1}", resp.analysis.speaking_speed);
        regions.pause_count = resp.analysis.pause_count.to_string();
        true
    }

    /// Returns false when the response was discarded as stale. A response with
    /// no detected face only touches the face-status region.
    pub fn apply_video(&self, seq: u64, resp: &VideoFrameResponse) -> bool {
        let mut inner = self.lock();
        if !Self::admit(&mut inner, StreamKind::Video, seq, self.discard_stale) {
            return false;
        }
        let regions = &mut inner.regions;
        let analysis = &resp.analysis;
        if !analysis.face_detected {
            regions.face_status = FACE_NOT_DETECTED.to_string();
            return true;
        }
        regions.face_status = FACE_DETECTED.to_string();
        if let Some(emotion) = &analysis.emotion {
            regions.emotion_tension = format!("{:.1}%", emotion.tension * 100.0);
        }
        if let Some(eye_contact) = analysis.eye_contact {
            regions.eye_contact = if eye_contact {
                EYE_CONTACT_YES.to_string()
            } else {
                EYE_CONTACT_NO.to_string()
            };
        }
        true
    }

    pub fn apply_resume(&self, resp: &ResumeAnalysisResponse) {
        let mut inner = self.lock();
        inner.regions.match_score = format!("{:.1}", resp.match_score);
        inner.regions.resume_text = resp.resume_text.clone();
    }

    pub fn apply_answer(&self, resp: &AnswerAnalysisResponse) {
        let mut inner = self.lock();
        let a = &resp.analysis;
        inner.regions.star_score = a.star_score.to_string();
        inner.regions.term_score = a.professional_term_score.to_string();
        inner.regions.relevance_score = a.relevance_score.to_string();
        inner.regions.feedback = a.feedback.clone();
    }

    /// One composite render replacing the whole report region. The decoded type
    /// already guarantees all three groups are present.
    pub fn apply_combined(&self, resp: &CombinedAnalysisResponse) {
        let block = format_combined_report(&resp.analysis);
        self.lock().regions.combined_report = block;
    }

    /// Dispatch on the endpoint tag. Streamed results carry their sequence;
    /// on-demand results are applied unconditionally.
    pub fn apply(&self, seq: u64, result: &AnalysisResult) -> bool {
        match result {
            AnalysisResult::Audio(r) => self.apply_audio(seq, r),
            AnalysisResult::Video(r) => self.apply_video(seq, r),
            AnalysisResult::Resume(r) => {
                self.apply_resume(r);
                true
            }
            AnalysisResult::Answer(r) => {
                self.apply_answer(r);
                true
            }
            AnalysisResult::Combined(r) => {
                self.apply_combined(r);
                true
            }
        }
    }
}

pub fn format_combined_report(analysis: &CombinedAnalysis) -> String {
    format!(
        "语音分析\n\
         语速: {} 字/分钟\n\
         停顿次数: {}\n\
         \n\
         视频分析\n\
         紧张程度: {:.1}%\n\
         眼神接触: {}\n\
         \n\
         内容分析\n\
         回答结构(STAR): {}/10\n\
         专业术语: {}/10",
        analysis.audio.speaking_speed,
        analysis.audio.pause_count,
        analysis.video.emotion.tension * 100.0,
        if analysis.video.eye_contact {
            EYE_CONTACT_GOOD
        } else {
            EYE_CONTACT_IMPROVE
        },
        analysis.text.star_score,
        analysis.text.professional_term_score,
    )
}
