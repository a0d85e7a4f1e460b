//! Input demuxing and decoding.
//!
//! [`InputStage`] opens the caller's byte buffer through a custom AVIO
//! context, validates that the container holds exactly one stream and that
//! it is audio, and exposes decoded frames one at a time. End of input is
//! handled inside [`InputStage::receive_next`]: when the demuxer runs dry
//! the decoder is flushed, so callers see every buffered frame before the
//! end-of-stream signal.

use std::marker::PhantomData;
use std::rc::Rc;

use ffmpeg_next::{
    Error as FfmpegError,
    Packet,
    codec::{Context as CodecContext, Id},
    decoder::Audio as AudioDecoder,
    error::EAGAIN,
    frame::Audio as AudioFrame,
    packet::Mut as PacketMut,
};
use ffmpeg_sys_next::{AVFormatContext, AVIOContext, AVMediaType, AVERROR_EOF, AV_NOPTS_VALUE};

use crate::{
    error::RewaveError,
    io::{self, SourceCursor},
    negotiate::{StreamParams, default_channel_layout},
};

/// Owner of the raw demuxer context and its custom AVIO plumbing.
///
/// Kept separate from the decoder so that teardown is a plain reverse of
/// acquisition: close the demuxer, free the AVIO context, then the cursor.
struct RawInput {
    ctx: *mut AVFormatContext,
    avio: *mut AVIOContext,
    cursor: *mut SourceCursor,
}

impl RawInput {
    fn open(source: &[u8]) -> Result<Self, RewaveError> {
        let cursor = Box::into_raw(Box::new(SourceCursor::new(source)));
        let avio = match unsafe { io::alloc_reader_avio(cursor) } {
            Ok(avio) => avio,
            Err(error) => {
                unsafe { drop(Box::from_raw(cursor)) };
                return Err(error);
            }
        };

        unsafe {
            let ctx = ffmpeg_sys_next::avformat_alloc_context();
            if ctx.is_null() {
                io::free_avio(avio);
                drop(Box::from_raw(cursor));
                return Err(RewaveError::AllocationFailure("demuxer context".to_string()));
            }
            (*ctx).pb = avio;

            let mut opened = ctx;
            let open_result = ffmpeg_sys_next::avformat_open_input(
                &mut opened,
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null_mut(),
            );
            if open_result < 0 {
                // avformat_open_input frees the context on failure; the
                // custom AVIO context stays ours.
                io::free_avio(avio);
                drop(Box::from_raw(cursor));
                return Err(RewaveError::OpenError(
                    FfmpegError::from(open_result).to_string(),
                ));
            }

            let raw = RawInput { ctx: opened, avio, cursor };
            let probe_result =
                ffmpeg_sys_next::avformat_find_stream_info(raw.ctx, std::ptr::null_mut());
            if probe_result < 0 {
                return Err(RewaveError::OpenError(
                    FfmpegError::from(probe_result).to_string(),
                ));
            }
            Ok(raw)
        }
    }
}

impl Drop for RawInput {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                ffmpeg_sys_next::avformat_close_input(&mut self.ctx);
            }
            io::free_avio(self.avio);
            drop(Box::from_raw(self.cursor));
        }
    }
}

/// Demuxer plus decoder for the single audio stream of the source buffer.
pub struct InputStage<'a> {
    decoder: AudioDecoder,
    raw: RawInput,
    demuxer_done: bool,
    _source: PhantomData<&'a [u8]>,
}

impl<'a> InputStage<'a> {
    /// Open `source` and prepare to decode its audio stream.
    ///
    /// Fails when the buffer cannot be probed as a media container, when it
    /// holds anything other than exactly one audio stream, or when no
    /// decoder exists for the stream's codec.
    pub fn open(source: &'a [u8]) -> Result<Self, RewaveError> {
        let raw = RawInput::open(source)?;

        let stream_count = unsafe { (*raw.ctx).nb_streams } as usize;
        let audio_count = (0..stream_count)
            .filter(|&index| unsafe {
                (*(*(*(*raw.ctx).streams.add(index))).codecpar).codec_type
                    == AVMediaType::AVMEDIA_TYPE_AUDIO
            })
            .count();
        if stream_count != 1 || audio_count != 1 {
            return Err(RewaveError::InvalidStreamCount {
                found: audio_count,
                total: stream_count,
            });
        }

        let codecpar = unsafe { (*(*(*raw.ctx).streams)).codecpar };
        let codec_id = Id::from(unsafe { (*codecpar).codec_id });
        if ffmpeg_next::decoder::find(codec_id).is_none() {
            return Err(RewaveError::UnsupportedCodec(format!("{codec_id:?}")));
        }

        // Copy the stream parameters into a safe handle and open the decoder
        // from them.
        let parameters = unsafe {
            let params = ffmpeg_sys_next::avcodec_parameters_alloc();
            if params.is_null() {
                return Err(RewaveError::AllocationFailure("codec parameters".to_string()));
            }
            ffmpeg_sys_next::avcodec_parameters_copy(params, codecpar);
            ffmpeg_next::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
        };
        let decoder = CodecContext::from_parameters(parameters)
            .map_err(|error| RewaveError::DecodeError(error.to_string()))?
            .decoder()
            .audio()
            .map_err(|error| RewaveError::DecodeError(error.to_string()))?;

        log::debug!(
            "opened input: codec {codec_id:?}, {} Hz, {} channels",
            decoder.rate(),
            decoder.channels(),
        );

        Ok(InputStage { decoder, raw, demuxer_done: false, _source: PhantomData })
    }

    /// Audio parameters of the decoded stream, with an unset channel layout
    /// replaced by the default layout for the channel count.
    pub fn params(&self) -> StreamParams {
        let channels = self.decoder.channels();
        let channel_layout = if self.decoder.channel_layout().bits() == 0 {
            default_channel_layout(channels)
        } else {
            self.decoder.channel_layout()
        };
        StreamParams {
            sample_rate: self.decoder.rate(),
            channels,
            format: self.decoder.format(),
            channel_layout,
        }
    }

    /// Declared duration of the stream in seconds, if the container knows it.
    ///
    /// Only used to size the output buffer estimate, so a missing duration
    /// is not an error.
    pub fn duration_seconds(&self) -> Option<f64> {
        unsafe {
            let stream = *(*self.raw.ctx).streams;
            let duration = (*stream).duration;
            if duration == AV_NOPTS_VALUE || duration <= 0 {
                return None;
            }
            let time_base = (*stream).time_base;
            if time_base.den == 0 {
                return None;
            }
            Some(duration as f64 * time_base.num as f64 / time_base.den as f64)
        }
    }

    /// Decode the next audio frame into `frame`.
    ///
    /// Returns `true` when a frame was produced and `false` at end of
    /// stream, after the decoder has been flushed of buffered frames.
    pub fn receive_next(&mut self, frame: &mut AudioFrame) -> Result<bool, RewaveError> {
        loop {
            match self.decoder.receive_frame(frame) {
                Ok(()) => return Ok(true),
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {
                    if self.demuxer_done {
                        return Ok(false);
                    }
                }
                Err(FfmpegError::Eof) => return Ok(false),
                Err(error) => return Err(RewaveError::DecodeError(error.to_string())),
            }

            let mut packet = Packet::empty();
            let read_result =
                unsafe { ffmpeg_sys_next::av_read_frame(self.raw.ctx, packet.as_mut_ptr()) };
            if read_result < 0 {
                if read_result != AVERROR_EOF {
                    return Err(RewaveError::DecodeError(
                        FfmpegError::from(read_result).to_string(),
                    ));
                }
                self.demuxer_done = true;
                match self.decoder.send_eof() {
                    Ok(()) => {}
                    Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                    Err(FfmpegError::Eof) => {}
                    Err(error) => return Err(RewaveError::DecodeError(error.to_string())),
                }
            } else {
                self.decoder
                    .send_packet(&packet)
                    .map_err(|error| RewaveError::DecodeError(error.to_string()))?;
            }
        }
    }
}
