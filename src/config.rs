use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    /// Optional environment variable that overrides `base_url` when set.
    pub base_url_env: Option<String>,
}

impl ServerConfig {
    pub fn resolved_base_url(&self) -> String {
        if let Some(var) = &self.base_url_env {
            if let Ok(url) = std::env::var(var) {
                if !url.is_empty() {
                    return url;
                }
            }
        }
        self.base_url.clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioCaptureConfig {
    pub chunk_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoCaptureConfig {
    pub frame_interval_ms: u64,
    pub jpeg_quality: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_in_flight: usize,
    #[serde(default)]
    pub discard_stale: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeConfig {
    pub job_description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioCaptureConfig,
    pub video: VideoCaptureConfig,
    pub upload: UploadConfig,
    pub resume: ResumeConfig,
}

impl AppConfig {
    pub fn load_default() -> anyhow::Result<Self> {
        let default = include_str!("../config/default.toml");
        let cfg: AppConfig = toml::from_str(default)?;
        Ok(cfg)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let p = path.into();
        let s = fs::read_to_string(&p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        Ok(cfg)
    }
}
