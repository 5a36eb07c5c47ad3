use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// The five server endpoints this client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    AudioStream,
    VideoFrame,
    AnalyzeResume,
    AnalyzeAnswer,
    CombinedAnalysis,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::AudioStream => "/api/audio_stream",
            Endpoint::VideoFrame => "/api/video_frame",
            Endpoint::AnalyzeResume => "/api/analyze_resume",
            Endpoint::AnalyzeAnswer => "/api/analyze_answer",
            Endpoint::CombinedAnalysis => "/api/combined_analysis",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::AudioStream => "audio_stream",
            Endpoint::VideoFrame => "video_frame",
            Endpoint::AnalyzeResume => "analyze_resume",
            Endpoint::AnalyzeAnswer => "analyze_answer",
            Endpoint::CombinedAnalysis => "combined_analysis",
        }
    }
}

/// JSON body for /api/video_frame. The audio path uses multipart instead;
/// the asymmetry mirrors the server contract and is intentional.
#[derive(Debug, Clone, Serialize)]
pub struct VideoFramePayload {
    pub frame: String,
    pub timestamp: u128,
}

/// JSON body for /api/analyze_answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerPayload {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioStreamResponse {
    pub transcript: String,
    pub analysis: SpeechAnalysis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechAnalysis {
    pub speaking_speed: f64,
    pub pause_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoFrameResponse {
    pub analysis: FaceAnalysis,
}

/// When no face is detected the server omits the dependent fields, so they are
/// optional here; `validate` enforces their presence for the detected case.
#[derive(Debug, Clone, Deserialize)]
pub struct FaceAnalysis {
    pub face_detected: bool,
    #[serde(default)]
    pub emotion: Option<EmotionScores>,
    #[serde(default)]
    pub eye_contact: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotionScores {
    pub tension: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeAnalysisResponse {
    pub match_score: f64,
    pub resume_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerAnalysisResponse {
    pub analysis: AnswerScores,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerScores {
    pub star_score: f64,
    pub professional_term_score: f64,
    pub relevance_score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedAnalysisResponse {
    pub analysis: CombinedAnalysis,
}

/// All three groups must be present; a missing group fails decoding and the
/// report is never partially rendered.
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedAnalysis {
    pub audio: CombinedAudio,
    pub video: CombinedVideo,
    pub text: CombinedText,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedAudio {
    pub speaking_speed: f64,
    pub pause_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedVideo {
    pub emotion: EmotionScores,
    pub eye_contact: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedText {
    pub star_score: f64,
    pub professional_term_score: f64,
}

/// One decoded response, tagged by the endpoint it came from.
#[derive(Debug, Clone)]
pub enum AnalysisResult {
    Audio(AudioStreamResponse),
    Video(VideoFrameResponse),
    Resume(ResumeAnalysisResponse),
    Answer(AnswerAnalysisResponse),
    Combined(CombinedAnalysisResponse),
}

/// Decode a response body against the endpoint's schema. Any shape mismatch is
/// reported as a malformed response rather than surfacing at render time.
pub fn decode<T: DeserializeOwned>(endpoint: Endpoint, body: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(body).map_err(|e| ClientError::MalformedResponse {
        endpoint: endpoint.name(),
        detail: e.to_string(),
    })
}

impl VideoFrameResponse {
    /// A face-detected response must carry emotion and eye-contact fields.
    pub fn validate(&self) -> Result<(), ClientError> {
        let a = &self.analysis;
        if a.face_detected && (a.emotion.is_none() || a.eye_contact.is_none()) {
            return Err(ClientError::MalformedResponse {
                endpoint: Endpoint::VideoFrame.name(),
                detail: "face_detected without emotion/eye_contact".to_string(),
            });
        }
        Ok(())
    }
}
