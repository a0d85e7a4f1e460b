//! End-to-end transcoding tests over synthesized in-memory WAV input.
//!
//! Tests that need an encoder that may be missing from the local FFmpeg
//! build (MP3 needs libmp3lame) skip themselves when the codec is absent.

use rewave::{AudioFormat, RewaveError, TranscodeOutput, Transcoder};

/// Build a complete PCM S16LE WAV file in memory: a 440 Hz sine tone.
fn sine_wav(seconds: f64, sample_rate: u32, channels: u16) -> Vec<u8> {
    let total_samples = (seconds * sample_rate as f64) as usize;
    let data_len = total_samples * channels as usize * 2;
    let block_align = channels * 2;

    let mut wav = Vec::with_capacity(44 + data_len);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());

    for index in 0..total_samples {
        let t = index as f64 / sample_rate as f64;
        let sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 20_000.0) as i16;
        for _ in 0..channels {
            wav.extend_from_slice(&sample.to_le_bytes());
        }
    }
    wav
}

/// Run a transcode, skipping the test when the encoder is not built in.
fn run_or_skip(transcoder: Transcoder, source: &[u8]) -> Option<TranscodeOutput> {
    match transcoder.run(source) {
        Ok(output) => Some(output),
        Err(RewaveError::UnsupportedCodec(_)) => None,
        Err(error) => panic!("transcode failed: {error}"),
    }
}

#[test]
fn wav_to_aac_reports_consistent_stats() {
    let source = sine_wav(2.0, 44_100, 2);
    let Some(output) = run_or_skip(Transcoder::new(AudioFormat::Aac).bit_rate(64_000), &source)
    else {
        return;
    };

    assert!(!output.data.is_empty());
    // ADTS syncword.
    assert_eq!(output.data[0], 0xFF);
    assert_eq!(output.data[1] & 0xF0, 0xF0);

    assert_eq!(output.sample_rate, 44_100);
    assert!((output.duration - 2.0).abs() < 0.05, "duration {}", output.duration);
    assert!(output.bit_rate > 0);
    assert_eq!(output.bit_rate % 1000, 0);

    let expected =
        (8.0 * output.data.len() as f64 / output.duration) as i64 / 1000 * 1000;
    assert_eq!(output.bit_rate, expected);
}

#[test]
fn wav_to_wav_keeps_rate_and_patches_the_header() {
    let source = sine_wav(0.5, 8_000, 1);
    let Some(output) = run_or_skip(Transcoder::new(AudioFormat::Wav), &source) else {
        return;
    };

    assert_eq!(&output.data[..4], b"RIFF");
    assert_eq!(&output.data[8..12], b"WAVE");
    assert_eq!(output.sample_rate, 8_000);
    assert!((output.duration - 0.5).abs() < 0.01, "duration {}", output.duration);

    // The RIFF size field is patched by a backward seek after the trailer.
    let riff_size = u32::from_le_bytes(output.data[4..8].try_into().unwrap()) as usize;
    assert_eq!(riff_size + 8, output.data.len());
}

#[test]
fn wav_to_flac_produces_a_flac_container() {
    let source = sine_wav(1.0, 22_050, 2);
    let Some(output) = run_or_skip(Transcoder::new(AudioFormat::Flac), &source) else {
        return;
    };

    assert_eq!(&output.data[..4], b"fLaC");
    assert_eq!(output.sample_rate, 22_050);
    assert!((output.duration - 1.0).abs() < 0.05, "duration {}", output.duration);
}

#[test]
fn wav_to_mp3_when_lame_is_available() {
    let source = sine_wav(1.0, 44_100, 2);
    let Some(output) =
        run_or_skip(Transcoder::new(AudioFormat::Mp3).bit_rate(128_000), &source)
    else {
        return;
    };

    assert!(!output.data.is_empty());
    assert!((output.duration - 1.0).abs() < 0.1, "duration {}", output.duration);
}

#[test]
fn opus_output_is_always_48khz() {
    let source = sine_wav(1.0, 16_000, 1);
    let Some(output) = run_or_skip(Transcoder::new(AudioFormat::Opus), &source) else {
        return;
    };

    assert_eq!(&output.data[..4], b"OggS");
    assert_eq!(output.sample_rate, 48_000);
    // All 16 kHz input samples land in the 48 kHz output, delay included.
    assert!((output.duration - 1.0).abs() < 0.05, "duration {}", output.duration);
}

#[test]
fn requested_sample_rate_is_applied_when_supported() {
    let source = sine_wav(2.0, 44_100, 2);
    let Some(output) =
        run_or_skip(Transcoder::new(AudioFormat::Aac).sample_rate(22_050), &source)
    else {
        return;
    };

    assert_eq!(output.sample_rate, 22_050);
    assert!((output.duration - 2.0).abs() < 0.05, "duration {}", output.duration);
}

#[test]
fn convenience_function_matches_the_builder() {
    let source = sine_wav(0.25, 8_000, 1);
    let via_fn = rewave::transcode(&source, AudioFormat::Wav).expect("transcode");
    let via_builder = Transcoder::new(AudioFormat::Wav).run(&source).expect("transcode");
    assert_eq!(via_fn.data, via_builder.data);
}

#[test]
fn header_only_input_yields_empty_stream() {
    // A valid WAV header with a zero-length data chunk decodes to no frames.
    let source = sine_wav(0.0, 8_000, 1);
    let result = Transcoder::new(AudioFormat::Wav).run(&source);
    assert!(matches!(result, Err(RewaveError::EmptyStream)), "got {result:?}");
}

#[test]
fn garbage_input_is_rejected() {
    let garbage: Vec<u8> = (0..4096u32).map(|value| (value * 7 + 13) as u8).collect();
    let result = Transcoder::new(AudioFormat::Wav).run(&garbage);
    assert!(result.is_err());
}

#[test]
fn empty_input_is_rejected() {
    let result = Transcoder::new(AudioFormat::Wav).run(&[]);
    assert!(result.is_err());
}

#[test]
fn truncated_wav_header_is_rejected() {
    let mut source = sine_wav(0.5, 8_000, 1);
    source.truncate(20);
    let result = Transcoder::new(AudioFormat::Wav).run(&source);
    assert!(result.is_err());
}
