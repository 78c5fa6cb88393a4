//! Video derivation through an external encoder.
//!
//! - **Filter**: the centred crop written as an ffmpeg expression over the
//!   stream's own `iw`/`ih`, so no probing is needed before encoding
//! - **Encoder**: [`VideoEncoder`] trait + [`FfmpegEncoder`], a blocking
//!   process runner located on `PATH`

pub mod encoder;
pub mod filter;

pub use encoder::{EncodeError, EncodeJob, EncoderSettings, FfmpegEncoder, VideoEncoder};
pub use filter::{crop_expression, filter_graph};
