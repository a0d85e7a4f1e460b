//! Sample format and rate conversion with delay accounting.
//!
//! A resampler is never a one-in one-out box: rate conversion buffers
//! samples internally, so any call may return more or fewer samples than it
//! was given. [`Resampler::convert`] sizes its output frame from the
//! reported internal delay plus the incoming sample count (rounded up), and
//! the count the converter actually returns is authoritative. Passing
//! `None` as input drains the buffered tail at end of stream.

use std::os::raw::c_int;

use ffmpeg_next::{
    ChannelLayout,
    format::Sample,
    frame::Audio as AudioFrame,
    software::resampling::Context as ResamplingContext,
};
use ffmpeg_sys_next::AVRounding;

use crate::{error::RewaveError, negotiate::{EncoderSettings, StreamParams}};

/// Converter from the decoder's sample format/rate to the encoder's.
pub struct Resampler {
    context: ResamplingContext,
    in_rate: u32,
    out_rate: u32,
    out_format: Sample,
    out_layout: ChannelLayout,
}

impl Resampler {
    /// Build a converter between the input stream and the negotiated
    /// encoder parameters.
    pub fn new(input: &StreamParams, output: &EncoderSettings) -> Result<Self, RewaveError> {
        let context = ResamplingContext::get(
            input.format,
            input.channel_layout,
            input.sample_rate,
            output.format,
            output.channel_layout,
            output.sample_rate,
        )
        .map_err(|error| RewaveError::ConversionError(error.to_string()))?;

        Ok(Resampler {
            context,
            in_rate: input.sample_rate,
            out_rate: output.sample_rate,
            out_format: output.format,
            out_layout: output.channel_layout,
        })
    }

    /// Convert one decoded frame, or drain buffered samples when `input` is
    /// `None`.
    ///
    /// Returns `None` when the converter produced nothing, which is normal
    /// when downsampling small frames and terminal when draining.
    pub fn convert(
        &mut self,
        input: Option<&AudioFrame>,
    ) -> Result<Option<AudioFrame>, RewaveError> {
        let in_samples = input.map_or(0, |frame| frame.samples());

        // Upper bound on output: buffered delay plus this frame's samples,
        // rescaled to the output rate and rounded up.
        let upper_bound = unsafe {
            let delay =
                ffmpeg_sys_next::swr_get_delay(self.context.as_mut_ptr(), self.in_rate as i64);
            ffmpeg_sys_next::av_rescale_rnd(
                delay + in_samples as i64,
                self.out_rate as i64,
                self.in_rate as i64,
                AVRounding::AV_ROUND_UP,
            )
        };
        if upper_bound <= 0 {
            return Ok(None);
        }

        let mut output = AudioFrame::new(self.out_format, upper_bound as usize, self.out_layout);
        output.set_rate(self.out_rate);

        let converted = unsafe {
            let out_planes = (*output.as_mut_ptr()).extended_data;
            let (in_planes, in_count) = match input {
                Some(frame) => (
                    (*frame.as_ptr()).extended_data as *const *const u8,
                    frame.samples() as c_int,
                ),
                None => (std::ptr::null(), 0),
            };
            ffmpeg_sys_next::swr_convert(
                self.context.as_mut_ptr(),
                out_planes,
                upper_bound as c_int,
                in_planes,
                in_count,
            )
        };
        if converted < 0 {
            return Err(RewaveError::ConversionError(
                ffmpeg_next::Error::from(converted).to_string(),
            ));
        }
        if converted == 0 {
            return Ok(None);
        }

        // The converter's count is authoritative, not the allocation size.
        unsafe {
            (*output.as_mut_ptr()).nb_samples = converted;
        }
        Ok(Some(output))
    }
}
