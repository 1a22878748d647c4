//! zstd framing for payloads.
//!
//! Frames are tiny (a few hundred bytes), so each one is compressed against
//! an embedded raw-content dictionary of phrases common in coding-agent
//! conversations. The dictionary bytes are part of format version 1.

use zstd::bulk::{Compressor, Decompressor};

use crate::body::{read_flags, write_envelope, FrameSlice, FLAG_PRESET_DICT, MAX_UNCOMPRESSED_LEN};
use crate::error::CodecError;
use crate::frame::Frame;

pub const DEFAULT_LEVEL: i32 = 3;

static PRESET_DICT: &[u8] = include_bytes!("preset.dict");

pub struct FrameEncoder {
    compressor: Compressor<'static>,
}

impl FrameEncoder {
    /// Encoder for a body with the given header flags.
    pub fn new(level: i32, flags: u8) -> Result<Self, CodecError> {
        let compressor = if flags & FLAG_PRESET_DICT != 0 {
            Compressor::with_dictionary(level, PRESET_DICT)?
        } else {
            Compressor::new(level)?
        };
        Ok(Self { compressor })
    }

    /// Encoder matching an existing body's header.
    pub fn for_body(body: &[u8], level: i32) -> Result<Self, CodecError> {
        Self::new(level, read_flags(body)?)
    }

    /// Envelope plus compressed payload, ready to append to a body.
    pub fn encode(&mut self, frame: &Frame) -> Result<Vec<u8>, CodecError> {
        let payload = frame.encode_payload();
        if payload.len() > MAX_UNCOMPRESSED_LEN {
            return Err(CodecError::PayloadTooLarge(payload.len()));
        }
        let compressed = self.compressor.compress(&payload)?;
        let envelope = write_envelope(frame.frame_type(), compressed.len(), payload.len())?;

        let mut out = Vec::with_capacity(envelope.len() + compressed.len());
        out.extend_from_slice(&envelope);
        out.extend_from_slice(&compressed);
        Ok(out)
    }
}

pub struct FrameDecoder {
    decompressor: Decompressor<'static>,
}

impl FrameDecoder {
    pub fn new(flags: u8) -> Result<Self, CodecError> {
        let decompressor = if flags & FLAG_PRESET_DICT != 0 {
            Decompressor::with_dictionary(PRESET_DICT)?
        } else {
            Decompressor::new()?
        };
        Ok(Self { decompressor })
    }

    pub fn for_body(body: &[u8]) -> Result<Self, CodecError> {
        Self::new(read_flags(body)?)
    }

    /// Decode one scanned frame. An error here concerns this frame only.
    pub fn decode(&mut self, body: &[u8], slice: &FrameSlice) -> Result<Frame, CodecError> {
        let frame_type = slice.frame_type()?;
        let compressed = slice.payload(body)?;
        let payload = if slice.uncompressed_len == 0 {
            Vec::new()
        } else {
            self.decompressor
                .decompress(compressed, slice.uncompressed_len)?
        };
        if payload.len() != slice.uncompressed_len {
            return Err(CodecError::LengthMismatch {
                declared: slice.uncompressed_len,
                actual: payload.len(),
            });
        }
        Frame::decode_payload(frame_type, &payload)
    }
}
