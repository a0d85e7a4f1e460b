//! Sample FIFO between the resampler and the encoder.
//!
//! Decoders and resamplers emit frames of whatever size the input dictates,
//! while most encoders demand a fixed frame size. [`SampleFifo`] wraps
//! FFmpeg's `AVAudioFifo` to bridge the two: append whatever arrives, drain
//! in exact encoder-sized chunks. The FIFO stores samples in the encoder's
//! format; it never converts.

use std::os::raw::{c_int, c_void};

use ffmpeg_next::{ChannelLayout, format::Sample, frame};
use ffmpeg_sys_next::{AVAudioFifo, AVSampleFormat};

use crate::error::RewaveError;

/// Unbounded FIFO of interleaved or planar audio samples.
///
/// Appends grow the backing storage before writing, so a successful return
/// means every sample was stored. Sample counts are conserved: what goes in
/// comes out, in order, exactly once.
pub struct SampleFifo {
    ptr: *mut AVAudioFifo,
    format: Sample,
    channel_layout: ChannelLayout,
}

impl SampleFifo {
    /// Allocate a FIFO for the given sample format and channel layout.
    pub fn new(
        format: Sample,
        channels: u16,
        channel_layout: ChannelLayout,
    ) -> Result<Self, RewaveError> {
        let sample_format: AVSampleFormat = format.into();
        let ptr =
            unsafe { ffmpeg_sys_next::av_audio_fifo_alloc(sample_format, channels as c_int, 1) };
        if ptr.is_null() {
            return Err(RewaveError::AllocationFailure("audio FIFO".to_string()));
        }
        Ok(SampleFifo { ptr, format, channel_layout })
    }

    /// Number of samples (per channel) currently queued.
    pub fn len(&self) -> usize {
        let size = unsafe { ffmpeg_sys_next::av_audio_fifo_size(self.ptr) };
        size.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every sample of `frame` to the FIFO.
    ///
    /// The FIFO is grown first, so a short write afterwards indicates
    /// corrupted FIFO state and is reported as fatal.
    pub fn push(&mut self, frame: &frame::Audio) -> Result<(), RewaveError> {
        let count = frame.samples() as c_int;
        if count == 0 {
            return Ok(());
        }
        unsafe {
            let grown = ffmpeg_sys_next::av_audio_fifo_realloc(
                self.ptr,
                ffmpeg_sys_next::av_audio_fifo_size(self.ptr) + count,
            );
            if grown < 0 {
                return Err(RewaveError::AllocationFailure("audio FIFO growth".to_string()));
            }
            let written = ffmpeg_sys_next::av_audio_fifo_write(
                self.ptr,
                (*frame.as_ptr()).extended_data as *mut *mut c_void,
                count,
            );
            if written < count {
                return Err(RewaveError::FifoError(format!(
                    "wrote {written} of {count} samples"
                )));
            }
        }
        Ok(())
    }

    /// Drain exactly `count` samples into a freshly allocated frame.
    ///
    /// Callers must not ask for more than [`len`](Self::len) samples; the
    /// FIFO returning fewer than requested is reported as an error rather
    /// than a short frame.
    pub fn pop(&mut self, count: usize) -> Result<frame::Audio, RewaveError> {
        let mut frame = frame::Audio::new(self.format, count, self.channel_layout);
        unsafe {
            let read = ffmpeg_sys_next::av_audio_fifo_read(
                self.ptr,
                (*frame.as_mut_ptr()).extended_data as *mut *mut c_void,
                count as c_int,
            );
            if read < count as c_int {
                return Err(RewaveError::FifoError(format!(
                    "read {read} of {count} samples"
                )));
            }
        }
        Ok(frame)
    }
}

impl Drop for SampleFifo {
    fn drop(&mut self) {
        unsafe {
            ffmpeg_sys_next::av_audio_fifo_free(self.ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::format::sample::Type as SampleType;

    use super::*;

    fn filled_frame(samples: usize, seed: u8) -> frame::Audio {
        let mut frame =
            frame::Audio::new(Sample::I16(SampleType::Packed), samples, ChannelLayout::MONO);
        let plane = frame.data_mut(0);
        for (index, byte) in plane.iter_mut().take(samples * 2).enumerate() {
            *byte = seed.wrapping_add(index as u8);
        }
        frame
    }

    #[test]
    fn conserves_sample_counts_across_appends() {
        let mut fifo =
            SampleFifo::new(Sample::I16(SampleType::Packed), 1, ChannelLayout::MONO)
                .expect("fifo");
        assert!(fifo.is_empty());

        fifo.push(&filled_frame(480, 1)).expect("push");
        fifo.push(&filled_frame(512, 7)).expect("push");
        assert_eq!(fifo.len(), 992);

        let chunk = fifo.pop(600).expect("pop");
        assert_eq!(chunk.samples(), 600);
        assert_eq!(fifo.len(), 392);

        let rest = fifo.pop(392).expect("pop");
        assert_eq!(rest.samples(), 392);
        assert!(fifo.is_empty());
    }

    #[test]
    fn preserves_sample_bytes_in_order() {
        let mut fifo =
            SampleFifo::new(Sample::I16(SampleType::Packed), 1, ChannelLayout::MONO)
                .expect("fifo");
        let source = filled_frame(256, 42);
        fifo.push(&source).expect("push");

        let drained = fifo.pop(256).expect("pop");
        assert_eq!(&drained.data(0)[..512], &source.data(0)[..512]);
    }

    #[test]
    fn empty_frame_append_is_a_no_op() {
        let mut fifo =
            SampleFifo::new(Sample::I16(SampleType::Packed), 1, ChannelLayout::MONO)
                .expect("fifo");
        let empty = frame::Audio::empty();
        fifo.push(&empty).expect("push");
        assert!(fifo.is_empty());
    }
}
