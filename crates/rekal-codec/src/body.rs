use crate::error::CodecError;

pub const BODY_MAGIC: &[u8; 7] = b"RKLBODY";
pub const BODY_VERSION: u8 = 0x01;
/// 7 magic + 1 version + 1 flags.
pub const BODY_HEADER_LEN: usize = 9;
/// 1 type + 3 compressed length + 2 uncompressed length.
pub const ENVELOPE_LEN: usize = 6;
/// Flag bit 0: frames are compressed against the embedded preset dictionary.
pub const FLAG_PRESET_DICT: u8 = 0x01;

pub const MAX_COMPRESSED_LEN: usize = 0x00FF_FFFF;
pub const MAX_UNCOMPRESSED_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Session,
    Checkpoint,
    Meta,
    /// Reserved for redaction; never written by the current protocol.
    Tombstone,
}

impl FrameType {
    pub fn as_byte(&self) -> u8 {
        match self {
            FrameType::Session => 0x01,
            FrameType::Checkpoint => 0x02,
            FrameType::Meta => 0x03,
            FrameType::Tombstone => 0xFF,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0x01 => Ok(FrameType::Session),
            0x02 => Ok(FrameType::Checkpoint),
            0x03 => Ok(FrameType::Meta),
            0xFF => Ok(FrameType::Tombstone),
            other => Err(CodecError::UnknownFrameType(other)),
        }
    }
}

/// Location of one frame inside a body. The tag is kept raw so that scanning
/// a body written by a newer version still succeeds; interpreting it is the
/// caller's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlice {
    pub tag: u8,
    /// Offset of the envelope from the start of the body.
    pub offset: usize,
    pub compressed_len: usize,
    pub uncompressed_len: usize,
}

impl FrameSlice {
    pub fn frame_type(&self) -> Result<FrameType, CodecError> {
        FrameType::from_byte(self.tag)
    }

    pub fn payload_offset(&self) -> usize {
        self.offset + ENVELOPE_LEN
    }

    /// Compressed payload bytes. `body` must be the buffer this slice was
    /// scanned from.
    pub fn payload<'a>(&self, body: &'a [u8]) -> Result<&'a [u8], CodecError> {
        let start = self.payload_offset();
        body.get(start..start + self.compressed_len)
            .ok_or(CodecError::Truncated {
                what: "body frame",
                offset: self.offset,
            })
    }

    /// End offset of the frame; the next frame starts here.
    pub fn end(&self) -> usize {
        self.payload_offset() + self.compressed_len
    }
}

/// A header-only body with the preset-dictionary flag set.
pub fn new_body() -> Vec<u8> {
    new_body_with_flags(FLAG_PRESET_DICT)
}

pub fn new_body_with_flags(flags: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(BODY_HEADER_LEN);
    buf.extend_from_slice(BODY_MAGIC);
    buf.push(BODY_VERSION);
    buf.push(flags);
    buf
}

/// Validate the header and return its flag byte.
pub fn read_flags(body: &[u8]) -> Result<u8, CodecError> {
    if body.len() < BODY_HEADER_LEN {
        return Err(CodecError::Truncated {
            what: "body header",
            offset: body.len(),
        });
    }
    if &body[0..7] != BODY_MAGIC {
        return Err(CodecError::BadMagic { artifact: "body" });
    }
    if body[7] != BODY_VERSION {
        return Err(CodecError::UnsupportedVersion {
            artifact: "body",
            version: body[7],
        });
    }
    Ok(body[8])
}

pub fn write_envelope(
    frame_type: FrameType,
    compressed_len: usize,
    uncompressed_len: usize,
) -> Result<[u8; ENVELOPE_LEN], CodecError> {
    if compressed_len > MAX_COMPRESSED_LEN {
        return Err(CodecError::PayloadTooLarge(compressed_len));
    }
    if uncompressed_len > MAX_UNCOMPRESSED_LEN {
        return Err(CodecError::PayloadTooLarge(uncompressed_len));
    }
    let c = (compressed_len as u32).to_le_bytes();
    let u = (uncompressed_len as u16).to_le_bytes();
    Ok([frame_type.as_byte(), c[0], c[1], c[2], u[0], u[1]])
}

/// Walk every envelope without decompressing.
///
/// Fails with `Truncated` if a declared length runs past the end of the
/// body, or if fewer than a full envelope's bytes trail the last frame.
pub fn scan_frames(body: &[u8]) -> Result<Vec<FrameSlice>, CodecError> {
    read_flags(body)?;

    let mut frames = Vec::new();
    let mut pos = BODY_HEADER_LEN;
    while pos < body.len() {
        let Some(env) = body.get(pos..pos + ENVELOPE_LEN) else {
            return Err(CodecError::Truncated {
                what: "body envelope",
                offset: pos,
            });
        };
        let compressed_len = u32::from_le_bytes([env[1], env[2], env[3], 0]) as usize;
        let uncompressed_len = u16::from_le_bytes([env[4], env[5]]) as usize;
        let slice = FrameSlice {
            tag: env[0],
            offset: pos,
            compressed_len,
            uncompressed_len,
        };
        if slice.end() > body.len() {
            return Err(CodecError::Truncated {
                what: "body frame",
                offset: pos,
            });
        }
        pos = slice.end();
        frames.push(slice);
    }
    Ok(frames)
}
