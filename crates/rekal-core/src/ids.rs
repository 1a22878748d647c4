//! Row identifiers.
//!
//! Every session, turn, tool call, checkpoint and file-touched row gets a
//! 26-character, time-ordered identifier. The generator is passed in
//! explicitly so tests can use a deterministic sequence.

/// Width of every identifier minted here. Matches the session slot width in
/// `dict.bin`.
pub const ID_LEN: usize = 26;

pub trait IdGen {
    fn next_id(&mut self) -> String;
}

/// Monotonic ULIDs: later calls always sort after earlier ones, even within
/// the same millisecond.
pub struct UlidGen {
    gen: ulid::Generator,
}

impl UlidGen {
    pub fn new() -> Self {
        Self {
            gen: ulid::Generator::new(),
        }
    }
}

impl Default for UlidGen {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGen for UlidGen {
    fn next_id(&mut self) -> String {
        match self.gen.generate() {
            Ok(id) => id.to_string(),
            // Random bits exhausted within one millisecond; fall back to a
            // fresh, non-monotonic ULID.
            Err(_) => ulid::Ulid::new().to_string(),
        }
    }
}

/// Deterministic identifiers `<prefix>000…N`, padded to [`ID_LEN`].
#[derive(Debug, Clone)]
pub struct SeqIdGen {
    prefix: String,
    next: u64,
}

impl SeqIdGen {
    /// The prefix is clipped to `ID_LEN - 1` bytes on a char boundary.
    pub fn new(prefix: &str) -> Self {
        let mut end = prefix.len().min(ID_LEN - 1);
        while !prefix.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            prefix: prefix[..end].to_string(),
            next: 1,
        }
    }
}

impl Default for SeqIdGen {
    fn default() -> Self {
        Self::new("T")
    }
}

impl IdGen for SeqIdGen {
    fn next_id(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        let width = ID_LEN - self.prefix.len();
        format!("{}{n:0width$}", self.prefix)
    }
}
