//! Audio file decoding
//!
//! Decodes a whole file with symphonia into one byte stream of interleaved
//! signed 16-bit little-endian stereo, the layout the frame store and the
//! output sink both expect.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// PCM samples per channel in one frame (one MPEG audio frame)
pub const SAMPLES_PER_FRAME: usize = 1152;

/// Output channel count (always interleaved stereo)
pub const CHANNELS: u16 = 2;

/// Bytes per sample (signed 16-bit)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Size of one frame in bytes
pub const BYTES_PER_FRAME: usize = SAMPLES_PER_FRAME * CHANNELS as usize * BYTES_PER_SAMPLE;

/// Errors raised while opening a file for decoding
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Failed to open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to probe audio format: {0}")]
    Probe(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
}

/// Errors raised while turning a file into frames
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed audio data: {0}")]
    Malformed(String),

    #[error("Decoded stream is empty")]
    Empty,

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),

    #[error("Decoded stream ({len} bytes) is shorter than one frame ({frame_size} bytes)")]
    ShorterThanFrame { len: usize, frame_size: usize },
}

/// An opened audio stream ready to be decoded. Dropping it closes the file.
pub struct AudioDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl AudioDecoder {
    /// Open and probe an audio file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| OpenError::Probe(e.to_string()))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(OpenError::NoTracks)?;

        let codec_params = &track.codec_params;
        let track_id = track.id;
        let sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| OpenError::UnsupportedCodec(e.to_string()))?;

        log::info!(
            "Opened {:?}: {} Hz, {} channel(s)",
            path,
            sample_rate,
            channels
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source (output is always stereo)
    pub fn source_channels(&self) -> usize {
        self.channels
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the remaining stream into interleaved s16le stereo bytes
    pub fn read_all(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        let mut samples: Option<SampleBuffer<i16>> = None;
        let mut skipped = 0usize;

        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping corrupt packet: {}", e);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let needed = decoded.capacity() * channels;
            if samples.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                samples = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }

            if let Some(buf) = samples.as_mut() {
                buf.copy_interleaved_ref(decoded);
                append_stereo(&mut out, buf.samples(), channels);
            }
        }

        if out.is_empty() {
            return Err(if skipped > 0 {
                DecodeError::Malformed(format!("all {} packets failed to decode", skipped))
            } else {
                DecodeError::Empty
            });
        }

        if skipped > 0 {
            log::warn!("{} packet(s) could not be decoded", skipped);
        }
        log::info!("Decoded {} bytes from {:?}", out.len(), self.path);

        Ok(out)
    }
}

/// Append interleaved samples as s16le stereo, duplicating mono and
/// dropping channels past the second
fn append_stereo(out: &mut Vec<u8>, interleaved: &[i16], channels: usize) {
    if channels == 0 {
        return;
    }
    out.reserve(interleaved.len() / channels * CHANNELS as usize * BYTES_PER_SAMPLE);
    for frame in interleaved.chunks_exact(channels) {
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { left };
        out.extend_from_slice(&left.to_le_bytes());
        out.extend_from_slice(&right.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM WAV file
    fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    fn write_temp(bytes: &[u8], suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_frame_size_constant() {
        assert_eq!(BYTES_PER_FRAME, 4608);
    }

    #[test]
    fn test_open_missing_file() {
        let result = AudioDecoder::open("/definitely/not/here.mp3");
        assert!(matches!(result, Err(OpenError::Io(_))));
    }

    #[test]
    fn test_open_garbage_fails_probe() {
        let file = write_temp(&[0x42; 2048], ".bin");
        let result = AudioDecoder::open(file.path());
        assert!(matches!(result, Err(OpenError::Probe(_))));
    }

    #[test]
    fn test_read_all_stereo_wav() {
        let samples: Vec<i16> = (0..4000).map(|i| (i * 7 - 14000) as i16).collect();
        let file = write_temp(&wav_bytes(2, 22050, &samples), ".wav");

        let mut decoder = AudioDecoder::open(file.path()).unwrap();
        assert_eq!(decoder.sample_rate(), 22050);
        assert_eq!(decoder.source_channels(), 2);

        let raw = decoder.read_all().unwrap();
        let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(raw, expected);
    }

    #[test]
    fn test_read_all_duplicates_mono() {
        let samples: Vec<i16> = vec![100, -200, 300];
        let file = write_temp(&wav_bytes(1, 8000, &samples), ".wav");

        let raw = AudioDecoder::open(file.path()).unwrap().read_all().unwrap();
        let expected: Vec<u8> = [100i16, 100, -200, -200, 300, 300]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(raw, expected);
    }

    #[test]
    fn test_append_stereo_drops_extra_channels() {
        let mut out = Vec::new();
        append_stereo(&mut out, &[1, 2, 3, 4, 5, 6], 3);
        let expected: Vec<u8> = [1i16, 2, 4, 5].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(out, expected);
    }
}
