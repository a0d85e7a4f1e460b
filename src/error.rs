//! Error types for the `rewave` crate.
//!
//! This module defines [`RewaveError`], the unified error type returned by all
//! fallible operations in the crate. Variants map to the pipeline stage that
//! failed, so callers can tell a malformed input apart from an encoder or
//! allocation problem without parsing message strings.

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `rewave` operations.
///
/// Every public method that can fail returns `Result<T, RewaveError>`.
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RewaveError {
    /// An FFmpeg object (context, frame, FIFO, or buffer) could not be
    /// allocated.
    #[error("Allocation failed: {0}")]
    AllocationFailure(String),

    /// The source buffer could not be opened or probed as a media container.
    #[error("Failed to open input: {0}")]
    OpenError(String),

    /// The input container does not hold exactly one stream, or its single
    /// stream is not audio.
    #[error("Expected exactly one audio stream, found {found} of {total} streams")]
    InvalidStreamCount {
        /// Number of audio streams among those the demuxer reported.
        found: usize,
        /// Total number of streams the demuxer reported.
        total: usize,
    },

    /// No decoder or encoder implementation exists for the requested codec.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// The encoder does not support the input channel layout, and channel
    /// remapping is out of scope.
    #[error("Encoder does not support channel layout: {0}")]
    UnsupportedChannelLayout(String),

    /// Demuxing or decoding the input failed.
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    /// Sample format or rate conversion failed.
    #[error("Failed to convert samples: {0}")]
    ConversionError(String),

    /// The sample FIFO rejected an append or returned fewer samples than
    /// requested on a drain.
    #[error("Sample FIFO error: {0}")]
    FifoError(String),

    /// Encoding a frame failed.
    #[error("Failed to encode audio: {0}")]
    EncodeError(String),

    /// Writing the container header, a packet, or the trailer failed.
    #[error("Failed to write output: {0}")]
    WriteError(String),

    /// The input was opened successfully but produced no decodable audio
    /// frames, so there is nothing to report a duration or bit rate for.
    #[error("Input contains no decodable audio frames")]
    EmptyStream,

    /// An error originating from the FFmpeg libraries that does not fit a
    /// more specific variant.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

impl From<FfmpegError> for RewaveError {
    fn from(error: FfmpegError) -> Self {
        RewaveError::FfmpegError(error.to_string())
    }
}
