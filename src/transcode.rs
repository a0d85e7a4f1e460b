//! Audio transcoding (re-encoding between formats).
//!
//! This module provides [`Transcoder`], the crate's public entry point: it
//! takes a complete media file as a byte slice, re-encodes its single audio
//! stream, and returns the finished container bytes together with the
//! measured duration and bit rate.
//!
//! # Example
//!
//! ```no_run
//! use rewave::{AudioFormat, RewaveError, Transcoder};
//!
//! let source = std::fs::read("input.wav").unwrap();
//! let output = Transcoder::new(AudioFormat::Opus)
//!     .bit_rate(96_000)
//!     .run(&source)?;
//! assert_eq!(output.sample_rate, 48_000);
//! std::fs::write("output.ogg", &output.data).unwrap();
//! # Ok::<(), RewaveError>(())
//! ```

use crate::error::RewaveError;
use crate::format::AudioFormat;
use crate::pipeline::Pipeline;

/// Result of a completed transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    /// The complete output container: header, packets, and trailer.
    pub data: Vec<u8>,
    /// Output duration in seconds, derived from the sample count.
    pub duration: f64,
    /// Achieved bit rate in bits per second, rounded down to the nearest
    /// multiple of 1000.
    pub bit_rate: i64,
    /// Achieved output sample rate in Hz. May differ from the requested
    /// rate after negotiation (unsupported rates fall back to one the
    /// encoder advertises; Opus always reports 48000).
    pub sample_rate: u32,
}

/// Builder for audio transcoding operations.
///
/// Configure the target format, bit rate, and sample rate, then call
/// [`run`](Transcoder::run) with the source bytes. Unset options defer to
/// the encoder default (bit rate) or the input stream (sample rate).
#[derive(Debug, Clone, Copy)]
pub struct Transcoder {
    format: AudioFormat,
    bit_rate: Option<usize>,
    sample_rate: Option<u32>,
}

impl Transcoder {
    /// Create a new transcoder targeting `format`.
    pub fn new(format: AudioFormat) -> Self {
        Self { format, bit_rate: None, sample_rate: None }
    }

    /// Set the target bit rate in bits per second. If not set, the encoder
    /// default is used.
    pub fn bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    /// Set the target sample rate in Hz. If not set, the input rate is
    /// kept. Either way the rate is subject to negotiation against what
    /// the encoder supports.
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Run the transcode over `source` and return the encoded output.
    ///
    /// # Errors
    ///
    /// - [`RewaveError::OpenError`] if `source` is not a readable media
    ///   container.
    /// - [`RewaveError::InvalidStreamCount`] if it does not hold exactly
    ///   one audio stream.
    /// - [`RewaveError::EmptyStream`] if no audio frames could be decoded.
    /// - Stage-specific variants for decode, conversion, encode, and write
    ///   failures.
    pub fn run(&self, source: &[u8]) -> Result<TranscodeOutput, RewaveError> {
        crate::ffmpeg::init();
        log::debug!(
            "transcoding {} bytes to {} (bit_rate={:?}, sample_rate={:?})",
            source.len(),
            self.format,
            self.bit_rate,
            self.sample_rate,
        );

        let mut pipeline = Pipeline::new(source, self.format, self.sample_rate, self.bit_rate)?;
        pipeline.run()?;

        let samples = pipeline.samples_written();
        if samples <= 0 {
            return Err(RewaveError::EmptyStream);
        }
        let sample_rate = pipeline.sample_rate();
        let data = pipeline.take_data();

        let duration = samples as f64 / sample_rate as f64;
        let mut bit_rate = (8.0 * data.len() as f64 / duration) as i64;
        bit_rate -= bit_rate % 1000;

        log::debug!(
            "transcode finished: {} bytes, {duration:.3} s, {bit_rate} b/s",
            data.len(),
        );

        Ok(TranscodeOutput { data, duration, bit_rate, sample_rate })
    }
}

/// Transcode `source` to `format` with default settings.
///
/// Shorthand for `Transcoder::new(format).run(source)`.
pub fn transcode(source: &[u8], format: AudioFormat) -> Result<TranscodeOutput, RewaveError> {
    Transcoder::new(format).run(source)
}
