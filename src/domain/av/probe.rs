use super::video_stream::{first_video_stream, VideoStream};
use crate::error::ProbeError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Dimensions of the primary video stream.
    async fn probe(&self, path: &Path) -> Result<VideoStream, ProbeError>;
}

pub struct FfprobeProber {
    binary: PathBuf,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<VideoStream, ProbeError> {
        let output = Command::new(&self.binary)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=codec_type,width,height")
            .arg("-of")
            .arg("json")
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout)
    }
}

pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoStream, ProbeError> {
    let document: Value = serde_json::from_slice(stdout)?;
    first_video_stream(&document).ok_or(ProbeError::NoVideoStream)
}
