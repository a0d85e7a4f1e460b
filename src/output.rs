//! Output muxing into the growable in-memory sink.
//!
//! [`OutputMuxer`] owns the raw output `AVFormatContext`, wired through a
//! custom AVIO context to a [`GrowableSink`]. The raw context is managed by
//! hand because the safe `Output` wrapper assumes file-backed I/O and would
//! try to close the AVIO context itself; instead the muxer detaches `pb`
//! before freeing, then releases the AVIO context and the sink in reverse
//! acquisition order.

use std::ffi::CString;

use ffmpeg_next::{
    Error as FfmpegError,
    Packet,
    Rational,
    encoder::Audio as AudioEncoder,
    packet::Mut as PacketMut,
};
use ffmpeg_sys_next::{AVFormatContext, AVIOContext, AVRational};

use crate::{
    error::RewaveError,
    format::AudioFormat,
    io::{self, GrowableSink},
};

/// Muxer writing one audio stream into an in-memory container.
pub struct OutputMuxer {
    ctx: *mut AVFormatContext,
    avio: *mut AVIOContext,
    sink: *mut GrowableSink,
    stream_time_base: Rational,
}

impl OutputMuxer {
    /// Allocate a muxer for `format`, with the sink pre-sized to
    /// `capacity_estimate` bytes.
    ///
    /// The estimate only tunes allocation; the sink grows past it freely.
    pub fn new(format: AudioFormat, capacity_estimate: usize) -> Result<Self, RewaveError> {
        let container_name = CString::new(format.container_name())
            .map_err(|error| RewaveError::WriteError(error.to_string()))?;

        unsafe {
            let mut ctx: *mut AVFormatContext = std::ptr::null_mut();
            let allocation_result = ffmpeg_sys_next::avformat_alloc_output_context2(
                &mut ctx,
                std::ptr::null_mut(),
                container_name.as_ptr(),
                std::ptr::null(),
            );
            if allocation_result < 0 || ctx.is_null() {
                return Err(RewaveError::AllocationFailure(format!(
                    "{format} muxer context"
                )));
            }

            let sink = Box::into_raw(Box::new(GrowableSink::with_capacity(capacity_estimate)));
            let avio = match io::alloc_writer_avio(sink) {
                Ok(avio) => avio,
                Err(error) => {
                    ffmpeg_sys_next::avformat_free_context(ctx);
                    drop(Box::from_raw(sink));
                    return Err(error);
                }
            };
            (*ctx).pb = avio;
            (*ctx).flags |= ffmpeg_sys_next::AVFMT_FLAG_CUSTOM_IO;

            Ok(OutputMuxer { ctx, avio, sink, stream_time_base: Rational(0, 1) })
        }
    }

    /// Whether the container wants codec configuration as global extradata
    /// rather than repeated in the stream.
    pub fn needs_global_header(&self) -> bool {
        unsafe {
            ((*(*self.ctx).oformat).flags & (ffmpeg_sys_next::AVFMT_GLOBALHEADER as i32)) != 0
        }
    }

    /// Add the single output stream, copying its parameters from the opened
    /// encoder.
    pub fn add_stream(&mut self, encoder: &AudioEncoder, time_base: Rational) -> Result<(), RewaveError> {
        unsafe {
            let stream = ffmpeg_sys_next::avformat_new_stream(self.ctx, std::ptr::null());
            if stream.is_null() {
                return Err(RewaveError::AllocationFailure("output stream".to_string()));
            }
            let copy_result =
                ffmpeg_sys_next::avcodec_parameters_from_context((*stream).codecpar, encoder.as_ptr());
            if copy_result < 0 {
                return Err(RewaveError::WriteError(
                    FfmpegError::from(copy_result).to_string(),
                ));
            }
            (*stream).time_base = AVRational {
                num: time_base.numerator(),
                den: time_base.denominator(),
            };
        }
        Ok(())
    }

    /// Write the container header.
    ///
    /// The muxer may adjust the stream time base here, so the value used
    /// for packet rescaling is captured afterwards.
    pub fn write_header(&mut self) -> Result<(), RewaveError> {
        unsafe {
            let result = ffmpeg_sys_next::avformat_write_header(self.ctx, std::ptr::null_mut());
            if result < 0 {
                return Err(RewaveError::WriteError(FfmpegError::from(result).to_string()));
            }
            let stream = *(*self.ctx).streams;
            self.stream_time_base =
                Rational((*stream).time_base.num, (*stream).time_base.den);
        }
        Ok(())
    }

    /// Write one encoded packet, rescaling its timestamps from the encoder
    /// time base to the stream time base.
    pub fn write_packet(
        &mut self,
        packet: &mut Packet,
        encoder_time_base: Rational,
    ) -> Result<(), RewaveError> {
        packet.set_stream(0);
        packet.rescale_ts(encoder_time_base, self.stream_time_base);
        unsafe {
            let result =
                ffmpeg_sys_next::av_interleaved_write_frame(self.ctx, packet.as_mut_ptr());
            if result < 0 {
                return Err(RewaveError::WriteError(FfmpegError::from(result).to_string()));
            }
        }
        Ok(())
    }

    /// Write the container trailer and flush the AVIO buffer into the sink.
    pub fn write_trailer(&mut self) -> Result<(), RewaveError> {
        unsafe {
            let result = ffmpeg_sys_next::av_write_trailer(self.ctx);
            if result < 0 {
                return Err(RewaveError::WriteError(FfmpegError::from(result).to_string()));
            }
            ffmpeg_sys_next::avio_flush(self.avio);
        }
        Ok(())
    }

    /// Take the finished container bytes out of the sink.
    pub fn take_data(&mut self) -> Vec<u8> {
        unsafe { (*self.sink).take() }
    }
}

impl Drop for OutputMuxer {
    fn drop(&mut self) {
        unsafe {
            // Detach pb first so avformat_free_context cannot touch the
            // AVIO context we own.
            (*self.ctx).pb = std::ptr::null_mut();
            ffmpeg_sys_next::avformat_free_context(self.ctx);
            io::free_avio(self.avio);
            drop(Box::from_raw(self.sink));
        }
    }
}
