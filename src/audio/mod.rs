//! Audio module - decoding and output
//!
//! This module provides:
//! - Whole-file decoding to interleaved 16-bit stereo bytes
//! - Lock-free sample ring feeding the output callback
//! - Blocking audio sink on top of cpal

mod buffer;
mod decoder;
mod sink;

pub use decoder::{
    AudioDecoder, DecodeError, OpenError, BYTES_PER_FRAME, BYTES_PER_SAMPLE, CHANNELS,
    SAMPLES_PER_FRAME,
};
pub use sink::{AudioSink, OutputDevice, SinkConfig, SinkError};
