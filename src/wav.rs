//! Canonical uncompressed WAV (RIFF / PCM) container helpers.
//!
//! The gateway never decodes or resamples audio.  It only needs three things
//! from the container format:
//!
//! | Helper              | Used for                                          |
//! |---------------------|---------------------------------------------------|
//! | [`pcm16_header`]    | the fixed 44-byte header of a mono 16-bit stream  |
//! | [`silent_wav`]      | the degraded-mode response body                   |
//! | [`inspect`]         | read-back validation of backend output            |
//!
//! Header layout (all integers little-endian):
//!
//! | Offset | Size | Field                          |
//! |--------|------|--------------------------------|
//! | 0      | 4    | `"RIFF"`                       |
//! | 4      | 4    | total size − 8                 |
//! | 8      | 4    | `"WAVE"`                       |
//! | 12     | 4    | `"fmt "`                       |
//! | 16     | 4    | fmt chunk size (16)            |
//! | 20     | 2    | format tag (1 = PCM)           |
//! | 22     | 2    | channels                       |
//! | 24     | 4    | sample rate                    |
//! | 28     | 4    | byte rate                      |
//! | 32     | 2    | block align                    |
//! | 34     | 2    | bits per sample                |
//! | 36     | 4    | `"data"`                       |
//! | 40     | 4    | data size                      |

use std::io::Cursor;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;

/// Media type attached to every audio response.
pub const MEDIA_TYPE: &str = "audio/wav";

/// Size of the canonical PCM header produced by [`pcm16_header`].
pub const HEADER_LEN: usize = 44;

/// Sample rate of the silent fallback payload.
pub const SILENCE_SAMPLE_RATE: u32 = 8_000;

const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────────────

/// Build the 44-byte header for a mono, 16-bit PCM stream of `data_len` bytes.
pub fn pcm16_header(sample_rate: u32, data_len: u32) -> [u8; HEADER_LEN] {
    let channels: u16 = 1;
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * u32::from(block_align);

    let mut h = [0u8; HEADER_LEN];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    h[22..24].copy_from_slice(&channels.to_le_bytes());
    h[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    h[32..34].copy_from_slice(&block_align.to_le_bytes());
    h[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_len.to_le_bytes());
    h
}

/// Wrap raw little-endian 16-bit mono PCM bytes in a WAV container.
pub fn wrap_pcm16(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + pcm.len());
    out.extend_from_slice(&pcm16_header(sample_rate, pcm.len() as u32));
    out.extend_from_slice(pcm);
    out
}

static SILENT_WAV: Lazy<Vec<u8>> = Lazy::new(|| {
    // One second of zero-valued 16-bit samples.
    let pcm = vec![0u8; SILENCE_SAMPLE_RATE as usize * usize::from(BITS_PER_SAMPLE / 8)];
    wrap_pcm16(&pcm, SILENCE_SAMPLE_RATE)
});

/// The canonical silent-audio payload: one second of mono 16-bit silence at
/// [`SILENCE_SAMPLE_RATE`] Hz.  Identical bytes on every call.
pub fn silent_wav() -> &'static [u8] {
    &SILENT_WAV
}

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// Parse the header of `bytes` and return its format.
///
/// Fails on anything `hound` cannot read as a WAV stream, and on streams that
/// carry no samples at all.
pub fn inspect(bytes: &[u8]) -> Result<hound::WavSpec> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).context("not a readable WAV stream")?;
    if reader.duration() == 0 {
        bail!("WAV stream contains no samples");
    }
    Ok(reader.spec())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Header of the silent payload, pinned byte for byte.
    const SILENCE_HEADER: [u8; HEADER_LEN] = [
        0x52, 0x49, 0x46, 0x46, // "RIFF"
        0xA4, 0x3E, 0x00, 0x00, // 16036 = 36 + data size
        0x57, 0x41, 0x56, 0x45, // "WAVE"
        0x66, 0x6D, 0x74, 0x20, // "fmt "
        0x10, 0x00, 0x00, 0x00, // fmt chunk size
        0x01, 0x00, // PCM
        0x01, 0x00, // mono
        0x40, 0x1F, 0x00, 0x00, // 8000 Hz
        0x80, 0x3E, 0x00, 0x00, // byte rate 16000
        0x02, 0x00, // block align
        0x10, 0x00, // 16 bits
        0x64, 0x61, 0x74, 0x61, // "data"
        0x80, 0x3E, 0x00, 0x00, // data size 16000
    ];

    #[test]
    fn test_silent_payload_is_pinned() {
        let wav = silent_wav();
        assert_eq!(wav.len(), HEADER_LEN + 16_000);
        assert_eq!(&wav[..HEADER_LEN], &SILENCE_HEADER);
        assert!(wav[HEADER_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_silent_payload_is_stable() {
        assert_eq!(silent_wav().as_ptr(), silent_wav().as_ptr());
        assert_eq!(silent_wav(), silent_wav());
    }

    #[test]
    fn test_silent_payload_reads_as_one_second() {
        let mut reader = hound::WavReader::new(Cursor::new(silent_wav())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SILENCE_SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.duration(), SILENCE_SAMPLE_RATE);
        assert!(reader.samples::<i16>().all(|s| s.unwrap() == 0));
    }

    #[test]
    fn test_wrap_pcm16_round_trips_samples() {
        let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = wrap_pcm16(&pcm, 24_000);

        assert_eq!(&wav[HEADER_LEN..], pcm.as_slice());
        let mut reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn test_inspect_rejects_garbage_and_empty() {
        assert!(inspect(b"definitely not audio").is_err());
        assert!(inspect(&[]).is_err());
        assert!(inspect(&wrap_pcm16(&[], 8_000)).is_err());
        assert!(inspect(silent_wav()).is_ok());
    }
}
