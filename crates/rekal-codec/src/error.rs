use crate::dict::Namespace;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{artifact}: bad magic")]
    BadMagic { artifact: &'static str },

    #[error("{artifact}: unsupported version {version}")]
    UnsupportedVersion { artifact: &'static str, version: u8 },

    #[error("{what}: truncated at offset {offset}")]
    Truncated { what: &'static str, offset: usize },

    #[error("dict: {namespace} ref {index} out of range ({len} entries)")]
    OutOfRange {
        namespace: Namespace,
        index: u64,
        len: usize,
    },

    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("{what}: invalid {field} value {value}")]
    InvalidValue {
        what: &'static str,
        field: &'static str,
        value: u64,
    },

    #[error("{0}: invalid utf-8")]
    InvalidUtf8(&'static str),

    #[error("{what}: {count} exceeds limit of {limit}")]
    Overflow {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("frame payload of {0} bytes does not fit in an envelope")]
    PayloadTooLarge(usize),

    #[error("frame declared {declared} uncompressed bytes, decoded {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("{what}: {count} trailing bytes")]
    TrailingBytes { what: &'static str, count: usize },

    #[error("compression: {0}")]
    Compression(#[from] std::io::Error),
}
