//! Encoder parameter negotiation.
//!
//! Bridges whatever the input stream provides and whatever the target
//! encoder accepts, before any encoder is opened. The precedence is fixed:
//!
//! 1. **Channel layout**: the default layout for the input channel count,
//!    regardless of the layout the input actually carries (the input's real
//!    layout only matters on the resampler's input side). If the encoder
//!    declares a supported-layout list that does not include the default,
//!    negotiation fails; channel remapping is out of scope.
//! 2. **Sample format**: inherited when supported, otherwise silently
//!    replaced with the first format the encoder advertises (the resampler
//!    absorbs the difference).
//! 3. **Sample rate**: the requested rate, defaulting to the input rate.
//!    If unsupported, falls back to the first rate the encoder advertises,
//!    with a diagnostic when the caller explicitly asked for a rate. Codecs
//!    with a fixed operating rate (Opus: 48 kHz) override everything above.
//! 4. **Bit rate**: passed through verbatim when given, otherwise left to
//!    the encoder default.

use ffmpeg_next::{ChannelLayout, format::Sample};
use ffmpeg_sys_next::AVChannelOrder;

use crate::{error::RewaveError, format::AudioFormat};

/// Audio parameters of the decoded input stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamParams {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Decoded sample format.
    pub format: Sample,
    /// Channel layout; already defaulted from the channel count when the
    /// container left it unset.
    pub channel_layout: ChannelLayout,
}

/// Negotiated encoder parameters, ready to open an encoder with.
#[derive(Debug, Clone, Copy)]
pub struct EncoderSettings {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output sample format.
    pub format: Sample,
    /// Output channel layout (the default layout for the input channel
    /// count).
    pub channel_layout: ChannelLayout,
    /// Target bit rate in bits per second, if the caller requested one.
    pub bit_rate: Option<usize>,
}

/// Default channel layout for a bare channel count.
///
/// Containers carrying raw PCM often leave the layout unset; this mirrors
/// FFmpeg's own default-layout table for the common counts.
pub fn default_channel_layout(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        3 => ChannelLayout::_2POINT1,
        4 => ChannelLayout::_4POINT0,
        5 => ChannelLayout::_5POINT0_BACK,
        6 => ChannelLayout::_5POINT1_BACK,
        7 => ChannelLayout::_6POINT1,
        8 => ChannelLayout::_7POINT1,
        _ => ChannelLayout::STEREO,
    }
}

/// Negotiate encoder parameters for `format` against the input stream.
///
/// Pure parameter selection; no encoder is opened here, so this is cheap to
/// call and easy to test.
pub fn negotiate(
    format: AudioFormat,
    input: &StreamParams,
    requested_rate: Option<u32>,
    bit_rate: Option<usize>,
) -> Result<EncoderSettings, RewaveError> {
    let codec = ffmpeg_next::encoder::find(format.codec_id())
        .ok_or_else(|| RewaveError::UnsupportedCodec(format.to_string()))?;

    let channel_layout = default_channel_layout(input.channels);
    if !layout_supported(format, channel_layout) {
        return Err(RewaveError::UnsupportedChannelLayout(format!(
            "{} channels (mask {:#x}) not accepted by the {format} encoder",
            input.channels,
            channel_layout.bits(),
        )));
    }

    let capabilities = codec.audio().ok();

    let sample_format = match capabilities
        .as_ref()
        .and_then(|audio_codec| audio_codec.formats())
        .map(|formats| formats.collect::<Vec<Sample>>())
        .filter(|formats| !formats.is_empty())
    {
        Some(formats) if formats.contains(&input.format) => input.format,
        Some(formats) => formats[0],
        None => {
            log::warn!(
                "{format} encoder declares no sample formats, using input format blind"
            );
            input.format
        }
    };

    let preferred_rate = requested_rate.unwrap_or(input.sample_rate);
    let mut sample_rate = match capabilities
        .as_ref()
        .and_then(|audio_codec| audio_codec.rates())
        .map(|rates| rates.collect::<Vec<i32>>())
        .filter(|rates| !rates.is_empty())
    {
        Some(rates) if rates.contains(&(preferred_rate as i32)) => preferred_rate,
        Some(rates) => {
            let fallback = rates[0] as u32;
            if requested_rate.is_some() {
                log::warn!(
                    "{format} encoder does not support {preferred_rate} Hz, using {fallback} Hz"
                );
            }
            fallback
        }
        None => preferred_rate,
    };

    // Rate-locked codecs win over both the request and the fallback.
    if let Some(locked) = format.locked_sample_rate() {
        sample_rate = locked;
    }

    Ok(EncoderSettings {
        sample_rate,
        format: sample_format,
        channel_layout,
        bit_rate,
    })
}

/// Whether the encoder accepts `layout`.
///
/// Encoders that declare no supported-layout list accept anything. The list
/// is a null-terminated `AVChannelLayout` array only reachable through the
/// raw codec handle.
fn layout_supported(format: AudioFormat, layout: ChannelLayout) -> bool {
    let codec = unsafe { ffmpeg_sys_next::avcodec_find_encoder(format.codec_id().into()) };
    if codec.is_null() {
        return false;
    }
    unsafe {
        let mut entry = (*codec).ch_layouts;
        if entry.is_null() {
            return true;
        }
        while (*entry).nb_channels != 0 {
            if (*entry).order == AVChannelOrder::AV_CHANNEL_ORDER_NATIVE
                && (*entry).u.mask == layout.bits()
            {
                return true;
            }
            entry = entry.add(1);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::format::sample::Type as SampleType;

    use super::*;

    fn stereo_input(sample_rate: u32) -> StreamParams {
        StreamParams {
            sample_rate,
            channels: 2,
            format: Sample::I16(SampleType::Packed),
            channel_layout: ChannelLayout::STEREO,
        }
    }

    #[test]
    fn opus_is_pinned_to_48khz() {
        crate::ffmpeg::init();
        if ffmpeg_next::encoder::find(AudioFormat::Opus.codec_id()).is_none() {
            return;
        }
        let settings =
            negotiate(AudioFormat::Opus, &stereo_input(44_100), Some(44_100), None)
                .expect("negotiate");
        assert_eq!(settings.sample_rate, 48_000);
    }

    #[test]
    fn supported_rate_is_kept() {
        crate::ffmpeg::init();
        if ffmpeg_next::encoder::find(AudioFormat::Aac.codec_id()).is_none() {
            return;
        }
        let settings = negotiate(AudioFormat::Aac, &stereo_input(44_100), Some(44_100), None)
            .expect("negotiate");
        assert_eq!(settings.sample_rate, 44_100);
    }

    #[test]
    fn unsupported_rate_falls_back_to_advertised() {
        crate::ffmpeg::init();
        let Some(codec) = ffmpeg_next::encoder::find(AudioFormat::Aac.codec_id()) else {
            return;
        };
        let advertised: Vec<i32> = codec
            .audio()
            .ok()
            .and_then(|audio_codec| audio_codec.rates())
            .map(|rates| rates.collect())
            .unwrap_or_default();
        if advertised.is_empty() {
            return;
        }
        let settings = negotiate(AudioFormat::Aac, &stereo_input(44_100), Some(12_345), None)
            .expect("negotiate");
        assert_ne!(settings.sample_rate, 12_345);
        assert!(advertised.contains(&(settings.sample_rate as i32)));
    }

    #[test]
    fn pcm_inherits_the_input_rate() {
        crate::ffmpeg::init();
        if ffmpeg_next::encoder::find(AudioFormat::Wav.codec_id()).is_none() {
            return;
        }
        let settings =
            negotiate(AudioFormat::Wav, &stereo_input(22_050), None, None).expect("negotiate");
        assert_eq!(settings.sample_rate, 22_050);
    }

    #[test]
    fn bit_rate_passes_through_verbatim() {
        crate::ffmpeg::init();
        if ffmpeg_next::encoder::find(AudioFormat::Aac.codec_id()).is_none() {
            return;
        }
        let settings =
            negotiate(AudioFormat::Aac, &stereo_input(48_000), None, Some(96_000))
                .expect("negotiate");
        assert_eq!(settings.bit_rate, Some(96_000));
    }

    #[test]
    fn non_default_input_layout_is_replaced_by_the_default() {
        crate::ffmpeg::init();
        if ffmpeg_next::encoder::find(AudioFormat::Wav.codec_id()).is_none() {
            return;
        }
        let mut input = stereo_input(44_100);
        input.channel_layout = ChannelLayout::STEREO_DOWNMIX;
        let settings = negotiate(AudioFormat::Wav, &input, None, None).expect("negotiate");
        assert_eq!(settings.channel_layout.bits(), ChannelLayout::STEREO.bits());
    }

    #[test]
    fn default_layouts_cover_common_channel_counts() {
        assert_eq!(default_channel_layout(1).bits(), ChannelLayout::MONO.bits());
        assert_eq!(default_channel_layout(2).bits(), ChannelLayout::STEREO.bits());
        assert_eq!(default_channel_layout(6).bits(), ChannelLayout::_5POINT1_BACK.bits());
        assert_eq!(default_channel_layout(8).bits(), ChannelLayout::_7POINT1.bits());
    }
}
