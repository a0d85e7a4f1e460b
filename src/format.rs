//! Audio output formats.
//!
//! [`AudioFormat`] names the supported transcode targets and maps each one to
//! the FFmpeg container (muxer) and codec that implement it.

use std::fmt::{Display, Formatter, Result as FmtResult};

use ffmpeg_next::codec::Id;

/// Audio output format.
///
/// Determines the container format and codec used when encoding the
/// transcoded audio data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// WAV (PCM signed 16-bit little-endian). Lossless, universally supported.
    Wav,
    /// MP3 (MPEG Audio Layer III). Lossy, widely supported. Requires libmp3lame.
    Mp3,
    /// FLAC (Free Lossless Audio Codec). Lossless, good compression.
    Flac,
    /// AAC (Advanced Audio Coding). Lossy, high quality at low bitrates.
    Aac,
    /// Opus in an Ogg container. Lossy, excellent at low bitrates. The Opus
    /// codec only operates at 48 kHz, so output at any other rate is
    /// resampled.
    Opus,
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AudioFormat::Wav => write!(f, "WAV"),
            AudioFormat::Mp3 => write!(f, "MP3"),
            AudioFormat::Flac => write!(f, "FLAC"),
            AudioFormat::Aac => write!(f, "AAC"),
            AudioFormat::Opus => write!(f, "Opus"),
        }
    }
}

impl AudioFormat {
    /// FFmpeg muxer name for this format.
    ///
    /// AAC uses the ADTS muxer (raw AAC with frame headers) and Opus the Ogg
    /// muxer, since neither codec defines a standalone container of its own.
    pub fn container_name(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "adts",
            AudioFormat::Opus => "ogg",
        }
    }

    /// FFmpeg codec ID for this format.
    pub fn codec_id(&self) -> Id {
        match self {
            AudioFormat::Wav => Id::PCM_S16LE,
            AudioFormat::Mp3 => Id::MP3,
            AudioFormat::Flac => Id::FLAC,
            AudioFormat::Aac => Id::AAC,
            AudioFormat::Opus => Id::OPUS,
        }
    }

    /// Whether this codec operates at a single fixed sample rate.
    ///
    /// Opus is specified at 48 kHz only; the negotiator pins the encoder
    /// there regardless of the requested or input rate.
    pub fn locked_sample_rate(&self) -> Option<u32> {
        match self {
            AudioFormat::Opus => Some(48_000),
            _ => None,
        }
    }
}
