//! Rekal wire format.
//!
//! Two artifacts travel on the per-identity branch:
//!
//! ```text
//! dict.bin    RKDICT | ver | n_emails(u8) | n_sessions(u16le) | n_branches(u16le)
//!             sessions (26-byte slots) | branches (u8 len) | emails (u8 len)
//!             | paths (u16le len, until end of input)
//!
//! rekal.body  RKLBODY | ver | flags
//!             { type(u8) | compressed_len(u24le) | uncompressed_len(u16le) | zstd payload }*
//! ```
//!
//! Frames reference dictionary entries by index, so the dictionary must only
//! ever grow by appending.

pub mod body;
pub mod dict;
pub mod error;
pub mod frame;
pub mod zstd_codec;

mod wire;

pub use body::{
    new_body, new_body_with_flags, read_flags, scan_frames, write_envelope, FrameSlice,
    FrameType, BODY_HEADER_LEN, ENVELOPE_LEN, FLAG_PRESET_DICT,
};
pub use dict::{Dict, Namespace, DICT_HEADER_LEN, MAX_EMAILS, SESSION_SLOT_LEN};
pub use error::CodecError;
pub use frame::{
    CheckpointFrame, FileTouchedRecord, Frame, MetaFrame, PathRepr, SessionFrame,
    ToolCallRecord, TurnRecord, FORMAT_VERSION,
};
pub use zstd_codec::{FrameDecoder, FrameEncoder, DEFAULT_LEVEL};
