//! Encoder trait and the ffmpeg process runner.

use super::filter::filter_graph;
use crate::imaging::AspectRatio;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Encoder '{0}' not found on PATH")]
    NotFound(String),
    #[error("Failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Encoding {} failed ({status}): {stderr}", .input.display())]
    Failed {
        input: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Codec profile for working-copy videos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Output height in pixels; width follows the aspect ratio.
    pub height: u32,
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
    pub audio_codec: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            height: 480,
            video_codec: "libx264".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

/// One encode: crop `input` to `ratio`, scale, write `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub ratio: AspectRatio,
}

/// Something that turns an archival video into a working copy.
///
/// `Sync` because derivation units share one encoder across the rayon pool.
pub trait VideoEncoder: Sync {
    /// Run the job to completion. A non-zero exit is an error.
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError>;
}

/// Runs the system `ffmpeg` binary, blocking the calling worker.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegEncoder {
    /// Resolve `program` (a name on `PATH` or a path) with `which`.
    pub fn locate(program: &str, settings: EncoderSettings) -> Result<Self, EncodeError> {
        let program =
            which::which(program).map_err(|_| EncodeError::NotFound(program.to_string()))?;
        Ok(Self { program, settings })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for a job, without the program name.
    pub fn build_args(&self, job: &EncodeJob) -> Vec<String> {
        let s = &self.settings;
        vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            job.input.to_string_lossy().into_owned(),
            "-vf".to_string(),
            filter_graph(job.ratio, s.height),
            "-vcodec".to_string(),
            s.video_codec.clone(),
            "-crf".to_string(),
            s.crf.to_string(),
            "-preset".to_string(),
            s.preset.clone(),
            "-acodec".to_string(),
            s.audio_codec.clone(),
            job.output.to_string_lossy().into_owned(),
        ]
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
        let args = self.build_args(job);
        debug!(program = %self.program.display(), ?args, "running encoder");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Failed {
                input: job.input.clone(),
                status: output.status.to_string(),
                stderr: stderr.lines().last().unwrap_or_default().trim().to_string(),
            });
        }
        Ok(())
    }
}
