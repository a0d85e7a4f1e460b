//! Encoding and timestamping.
//!
//! [`EncoderStage`] owns the opened encoder and the running sample counter
//! that stamps presentation timestamps. Frames carry a PTS equal to the
//! number of samples emitted before them, in a 1/sample-rate time base, so
//! timestamps are monotonic by construction and the final counter value is
//! the exact output length in samples.

use ffmpeg_next::{
    Error as FfmpegError,
    Packet,
    Rational,
    codec::Context as CodecContext,
    encoder::Audio as AudioEncoder,
    error::EAGAIN,
    frame::Audio as AudioFrame,
};

use crate::{
    error::RewaveError,
    format::AudioFormat,
    negotiate::EncoderSettings,
    output::OutputMuxer,
};

/// Chunk size for encoders that accept arbitrary frame sizes.
///
/// PCM-family encoders report a frame size of zero; draining the FIFO in
/// fixed chunks keeps the loop finite for them.
const DEFAULT_FRAME_SIZE: usize = 4096;

/// The opened encoder plus its PTS counter.
pub struct EncoderStage {
    encoder: AudioEncoder,
    time_base: Rational,
    frame_size: usize,
    samples_written: i64,
    eof_sent: bool,
}

impl EncoderStage {
    /// Open an encoder for `format` with the negotiated settings.
    ///
    /// `needs_global_header` comes from the output container; formats that
    /// carry codec configuration out of band need the encoder to produce
    /// global extradata instead of in-band headers.
    pub fn open(
        format: AudioFormat,
        settings: &EncoderSettings,
        needs_global_header: bool,
    ) -> Result<Self, RewaveError> {
        let codec = ffmpeg_next::encoder::find(format.codec_id())
            .ok_or_else(|| RewaveError::UnsupportedCodec(format.to_string()))?;

        let time_base = Rational(1, settings.sample_rate as i32);
        let mut context = CodecContext::new_with_codec(codec);
        context.set_time_base(time_base);
        let mut encoder_context = context
            .encoder()
            .audio()
            .map_err(|error| RewaveError::EncodeError(error.to_string()))?;

        encoder_context.set_rate(settings.sample_rate as i32);
        encoder_context.set_channel_layout(settings.channel_layout);
        encoder_context.set_format(settings.format);
        encoder_context.set_time_base(time_base);
        if let Some(bit_rate) = settings.bit_rate {
            encoder_context.set_bit_rate(bit_rate);
        }
        if needs_global_header {
            unsafe {
                (*encoder_context.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder_context
            .open_as(codec)
            .map_err(|error| RewaveError::EncodeError(error.to_string()))?;

        let reported = encoder.frame_size() as usize;
        let frame_size = if reported == 0 { DEFAULT_FRAME_SIZE } else { reported };
        log::debug!(
            "opened {format} encoder: {} Hz, frame size {frame_size}",
            settings.sample_rate,
        );

        Ok(EncoderStage {
            encoder,
            time_base,
            frame_size,
            samples_written: 0,
            eof_sent: false,
        })
    }

    /// Fixed frame size the encoder demands, or the drain chunk size for
    /// encoders without one.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total samples sent to the encoder so far; equals the next PTS.
    pub fn samples_written(&self) -> i64 {
        self.samples_written
    }

    /// Reference to the opened encoder, for muxer stream setup.
    pub fn encoder(&self) -> &AudioEncoder {
        &self.encoder
    }

    /// Encoder time base (1 / output sample rate).
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Encode one frame, or flush when `frame` is `None`, writing every
    /// emitted packet through `muxer`.
    ///
    /// Returns whether any packet was written; during flushing, `false`
    /// means the encoder is fully drained.
    pub fn encode(
        &mut self,
        frame: Option<&mut AudioFrame>,
        muxer: &mut OutputMuxer,
    ) -> Result<bool, RewaveError> {
        if let Some(frame) = frame {
            frame.set_pts(Some(self.samples_written));
            self.samples_written += frame.samples() as i64;
            self.encoder
                .send_frame(frame)
                .map_err(|error| RewaveError::EncodeError(error.to_string()))?;
        } else if !self.eof_sent {
            match self.encoder.send_eof() {
                Ok(()) => {}
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                Err(FfmpegError::Eof) => {}
                Err(error) => return Err(RewaveError::EncodeError(error.to_string())),
            }
            self.eof_sent = true;
        }

        let mut wrote_packet = false;
        loop {
            let mut packet = Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    muxer.write_packet(&mut packet, self.time_base)?;
                    wrote_packet = true;
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => break,
                Err(FfmpegError::Eof) => break,
                Err(error) => return Err(RewaveError::EncodeError(error.to_string())),
            }
        }
        Ok(wrote_packet)
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::{ChannelLayout, format::Sample, format::sample::Type as SampleType};

    use super::*;

    fn silent_frame(samples: usize, rate: u32) -> AudioFrame {
        let mut frame =
            AudioFrame::new(Sample::I16(SampleType::Packed), samples, ChannelLayout::MONO);
        frame.set_rate(rate);
        frame.data_mut(0).fill(0);
        frame
    }

    #[test]
    fn pts_tracks_the_running_sample_count() {
        crate::ffmpeg::init();
        if ffmpeg_next::encoder::find(AudioFormat::Wav.codec_id()).is_none() {
            return;
        }
        let settings = EncoderSettings {
            sample_rate: 8_000,
            format: Sample::I16(SampleType::Packed),
            channel_layout: ChannelLayout::MONO,
            bit_rate: None,
        };
        let mut muxer = OutputMuxer::new(AudioFormat::Wav, 0).expect("muxer");
        let mut stage =
            EncoderStage::open(AudioFormat::Wav, &settings, muxer.needs_global_header())
                .expect("encoder");
        muxer.add_stream(stage.encoder(), stage.time_base()).expect("stream");
        muxer.write_header().expect("header");

        // Each frame must be stamped with the sum of all samples before it.
        let mut expected = 0i64;
        for samples in [480usize, 512, 128] {
            let mut frame = silent_frame(samples, settings.sample_rate);
            stage.encode(Some(&mut frame), &mut muxer).expect("encode");
            assert_eq!(frame.pts(), Some(expected));
            expected += samples as i64;
            assert_eq!(stage.samples_written(), expected);
        }
    }
}
