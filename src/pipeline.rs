//! Pipeline orchestration.
//!
//! [`Pipeline`] wires the stages together and drives them through an
//! explicit state machine:
//!
//! - **Filling**: decode and convert until the FIFO holds at least one
//!   encoder frame, or the input ends (the resampler tail is drained into
//!   the FIFO at that point).
//! - **Draining**: encode full frames from the FIFO; after end of input,
//!   also the final partial frame.
//! - **Flushing**: flush the encoder until it stops emitting packets.
//! - **Done**: write the trailer.
//!
//! Stage fields are declared in reverse acquisition order (FIFO, resampler,
//! encoder, muxer/sink, input) so that drop glue releases them as a strict
//! reverse of setup.

use ffmpeg_next::frame::Audio as AudioFrame;

use crate::{
    encoder::EncoderStage,
    error::RewaveError,
    fifo::SampleFifo,
    format::AudioFormat,
    input::InputStage,
    negotiate,
    output::OutputMuxer,
    resample::Resampler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Filling,
    Draining,
    Flushing,
    Done,
}

/// One transcoding session over a borrowed source buffer.
pub struct Pipeline<'a> {
    fifo: SampleFifo,
    resampler: Resampler,
    encoder: EncoderStage,
    muxer: OutputMuxer,
    input: InputStage<'a>,
    sample_rate: u32,
}

impl<'a> Pipeline<'a> {
    /// Open every stage against `source` and negotiate encoder parameters.
    pub fn new(
        source: &'a [u8],
        format: AudioFormat,
        requested_rate: Option<u32>,
        bit_rate: Option<usize>,
    ) -> Result<Self, RewaveError> {
        let input = InputStage::open(source)?;
        let params = input.params();
        let settings = negotiate::negotiate(format, &params, requested_rate, bit_rate)?;

        let capacity =
            estimate_capacity(source.len(), settings.bit_rate, input.duration_seconds());
        let mut muxer = OutputMuxer::new(format, capacity)?;
        let encoder = EncoderStage::open(format, &settings, muxer.needs_global_header())?;
        muxer.add_stream(encoder.encoder(), encoder.time_base())?;

        let resampler = Resampler::new(&params, &settings)?;
        let fifo = SampleFifo::new(settings.format, params.channels, settings.channel_layout)?;

        Ok(Pipeline {
            fifo,
            resampler,
            encoder,
            muxer,
            input,
            sample_rate: settings.sample_rate,
        })
    }

    /// Run the transcode to completion, header through trailer.
    pub fn run(&mut self) -> Result<(), RewaveError> {
        self.muxer.write_header()?;

        let frame_size = self.encoder.frame_size();
        let mut decoded = AudioFrame::empty();
        let mut input_done = false;
        let mut state = PipelineState::Filling;

        loop {
            state = match state {
                PipelineState::Filling => {
                    while self.fifo.len() < frame_size && !input_done {
                        if self.input.receive_next(&mut decoded)? {
                            if let Some(converted) = self.resampler.convert(Some(&decoded))? {
                                self.fifo.push(&converted)?;
                            }
                        } else {
                            input_done = true;
                            while let Some(converted) = self.resampler.convert(None)? {
                                self.fifo.push(&converted)?;
                            }
                        }
                    }
                    PipelineState::Draining
                }
                PipelineState::Draining => {
                    while self.fifo.len() >= frame_size
                        || (input_done && !self.fifo.is_empty())
                    {
                        let take = frame_size.min(self.fifo.len());
                        let mut frame = self.fifo.pop(take)?;
                        self.encoder.encode(Some(&mut frame), &mut self.muxer)?;
                    }
                    if input_done {
                        PipelineState::Flushing
                    } else {
                        PipelineState::Filling
                    }
                }
                PipelineState::Flushing => {
                    while self.encoder.encode(None, &mut self.muxer)? {}
                    PipelineState::Done
                }
                PipelineState::Done => break,
            };
        }

        self.muxer.write_trailer()
    }

    /// Total samples sent to the encoder; the output length in samples.
    pub fn samples_written(&self) -> i64 {
        self.encoder.samples_written()
    }

    /// Negotiated output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Take the finished container bytes.
    pub fn take_data(&mut self) -> Vec<u8> {
        self.muxer.take_data()
    }
}

/// Initial sink capacity: target size from the bit rate and declared
/// duration when both are known, otherwise a fixed fraction of the source.
fn estimate_capacity(source_len: usize, bit_rate: Option<usize>, duration: Option<f64>) -> usize {
    match (bit_rate, duration) {
        (Some(bit_rate), Some(duration)) if bit_rate > 0 && duration > 0.0 => {
            (bit_rate as f64 * duration / 8.0) as usize
        }
        _ => source_len / 18,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_uses_bit_rate_and_duration_when_known() {
        assert_eq!(estimate_capacity(1_000_000, Some(64_000), Some(10.0)), 80_000);
    }

    #[test]
    fn capacity_falls_back_to_a_source_fraction() {
        assert_eq!(estimate_capacity(1_800_000, None, Some(10.0)), 100_000);
        assert_eq!(estimate_capacity(1_800_000, Some(64_000), None), 100_000);
    }
}
