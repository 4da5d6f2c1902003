//! Error types for the decode boundary.
//!
//! Setup failures carry stable numeric codes (`100..=103`) so hosts that only
//! see an integer can still tell them apart. Anything the media engine reports
//! on its own is passed through with its negative status unchanged.

use thiserror::Error;

/// Container could not be opened or its streams could not be probed.
pub const IO_ERROR: i32 = 100;
/// The container has no audio stream.
pub const AUDIO_STREAM_NOT_FOUND: i32 = 101;
/// No decoder is registered for the selected stream's codec.
pub const DECODER_NOT_FOUND: i32 = 102;
/// A decoder exists but refused to open for the stream parameters.
pub const DECODER_OPEN_FAILED: i32 = 103;

/// Failure reported by the media engine itself.
///
/// `code` is always negative; its meaning belongs to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {code})")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by [`crate::DecodeContext`] construction and seeking.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to open `{url}`: {source}")]
    Io {
        url: String,
        #[source]
        source: EngineError,
    },

    #[error("no audio stream found in `{url}`")]
    AudioStreamNotFound { url: String },

    #[error("no decoder available for codec {codec}")]
    DecoderNotFound { codec: String },

    #[error("unable to open decoder: {0}")]
    DecoderOpenFailed(#[source] EngineError),

    #[error("media engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("seek failed with status {status}")]
    Seek { status: i32 },
}

impl Error {
    /// Numeric code for this error.
    ///
    /// Setup errors map to `100..=103`; engine and seek failures return the
    /// engine's own status verbatim.
    pub fn code(&self) -> i32 {
        match self {
            Error::Io { .. } => IO_ERROR,
            Error::AudioStreamNotFound { .. } => AUDIO_STREAM_NOT_FOUND,
            Error::DecoderNotFound { .. } => DECODER_NOT_FOUND,
            Error::DecoderOpenFailed(_) => DECODER_OPEN_FAILED,
            Error::Engine(e) => e.code,
            Error::Seek { status } => *status,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
