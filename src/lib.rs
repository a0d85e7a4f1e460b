//! # rewave
//!
//! Transcode in-memory audio buffers between formats, sample rates, and bit
//! rates, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! The input is a complete media file as a byte slice containing exactly one
//! audio stream; the output is a complete container (header, packets,
//! trailer) as a `Vec<u8>`, plus the measured duration and bit rate. No
//! filesystem or network I/O happens anywhere in between.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rewave::{AudioFormat, Transcoder};
//!
//! let source = std::fs::read("input.wav").unwrap();
//!
//! // One-liner with defaults.
//! let flac = rewave::transcode(&source, AudioFormat::Flac).unwrap();
//!
//! // Or with explicit parameters.
//! let aac = Transcoder::new(AudioFormat::Aac)
//!     .bit_rate(128_000)
//!     .sample_rate(48_000)
//!     .run(&source)
//!     .unwrap();
//!
//! println!("{:.2} s at {} b/s", aac.duration, aac.bit_rate);
//! ```
//!
//! ## Pipeline
//!
//! Internally each transcode runs a decode → resample → FIFO → encode → mux
//! pipeline. The FIFO rechunks whatever frame sizes the decoder produces
//! into the fixed frame size the encoder demands, and the resampler's
//! internal delay is accounted for so no samples are lost at either end of
//! the stream.
//!
//! ## Parameter negotiation
//!
//! The encoder keeps the input's channel layout (or fails if it cannot),
//! falls back to its first advertised sample format and rate when the
//! input's are unsupported, and pins rate-locked codecs to their fixed rate
//! (Opus: 48 kHz). [`TranscodeOutput::sample_rate`] reports what was
//! actually used.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

mod encoder;
pub mod error;
pub mod ffmpeg;
mod fifo;
pub mod format;
mod input;
mod io;
pub mod negotiate;
mod output;
mod pipeline;
mod resample;
pub mod transcode;

pub use error::RewaveError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use format::AudioFormat;
pub use negotiate::{EncoderSettings, StreamParams, default_channel_layout, negotiate};
pub use transcode::{TranscodeOutput, Transcoder, transcode};
