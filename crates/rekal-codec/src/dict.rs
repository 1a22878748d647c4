use std::collections::HashMap;
use std::fmt;

use crate::error::CodecError;

pub const DICT_MAGIC: &[u8; 6] = b"RKDICT";
pub const DICT_VERSION: u8 = 0x01;
pub const DICT_HEADER_LEN: usize = 12;
/// Session identifiers occupy fixed-width slots; shorter ids are NUL-padded,
/// longer ones truncated.
pub const SESSION_SLOT_LEN: usize = 26;

/// The emails count is a single header byte.
pub const MAX_EMAILS: usize = u8::MAX as usize;
const MAX_SESSIONS: usize = u16::MAX as usize;
const MAX_BRANCHES: usize = u16::MAX as usize;
const MAX_SHORT_STR: usize = u8::MAX as usize;
const MAX_PATH: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Sessions,
    Branches,
    Emails,
    Paths,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Sessions,
        Namespace::Branches,
        Namespace::Emails,
        Namespace::Paths,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Sessions => "sessions",
            Namespace::Branches => "branches",
            Namespace::Emails => "emails",
            Namespace::Paths => "paths",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    values: Vec<String>,
    index: HashMap<String, u64>,
}

impl Table {
    fn push(&mut self, value: String) -> u64 {
        let idx = self.values.len() as u64;
        // A damaged file may repeat a value; the first position stays canonical.
        self.index.entry(value.clone()).or_insert(idx);
        self.values.push(value);
        idx
    }
}

/// String-interning table over four namespaces.
///
/// Indices are assigned in insertion order and never change, so a frame
/// encoded against an older snapshot still resolves against a newer one.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    sessions: Table,
    branches: Table,
    emails: Table,
    paths: Table,
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        Namespace::ALL
            .iter()
            .all(|ns| self.values(*ns) == other.values(*ns))
    }
}

impl Eq for Dict {}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, ns: Namespace) -> &Table {
        match ns {
            Namespace::Sessions => &self.sessions,
            Namespace::Branches => &self.branches,
            Namespace::Emails => &self.emails,
            Namespace::Paths => &self.paths,
        }
    }

    fn table_mut(&mut self, ns: Namespace) -> &mut Table {
        match ns {
            Namespace::Sessions => &mut self.sessions,
            Namespace::Branches => &mut self.branches,
            Namespace::Emails => &mut self.emails,
            Namespace::Paths => &mut self.paths,
        }
    }

    /// Return the ref for `value`, interning it first if absent.
    pub fn lookup_or_add(&mut self, ns: Namespace, value: &str) -> u64 {
        let key = canonical(ns, value);
        if let Some(idx) = self.table(ns).index.get(key) {
            return *idx;
        }
        self.table_mut(ns).push(key.to_string())
    }

    pub fn lookup(&self, ns: Namespace, value: &str) -> Option<u64> {
        self.table(ns).index.get(canonical(ns, value)).copied()
    }

    pub fn get(&self, ns: Namespace, index: u64) -> Result<&str, CodecError> {
        let table = self.table(ns);
        usize::try_from(index)
            .ok()
            .and_then(|i| table.values.get(i))
            .map(String::as_str)
            .ok_or(CodecError::OutOfRange {
                namespace: ns,
                index,
                len: table.values.len(),
            })
    }

    pub fn values(&self, ns: Namespace) -> &[String] {
        &self.table(ns).values
    }

    pub fn len(&self, ns: Namespace) -> usize {
        self.table(ns).values.len()
    }

    pub fn total_entries(&self) -> usize {
        Namespace::ALL.iter().map(|ns| self.len(*ns)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }

    /// Serialize the full snapshot to the `dict.bin` layout.
    ///
    /// Fails with `Overflow` rather than wrapping a count field: more than
    /// 255 emails, more than 65535 sessions or branches, a branch or email
    /// over 255 bytes, or a path over 65535 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        check_count("dict emails", self.emails.values.len(), MAX_EMAILS)?;
        check_count("dict sessions", self.sessions.values.len(), MAX_SESSIONS)?;
        check_count("dict branches", self.branches.values.len(), MAX_BRANCHES)?;

        let mut size = DICT_HEADER_LEN + self.sessions.values.len() * SESSION_SLOT_LEN;
        size += self.branches.values.iter().map(|s| 1 + s.len()).sum::<usize>();
        size += self.emails.values.iter().map(|s| 1 + s.len()).sum::<usize>();
        size += self.paths.values.iter().map(|s| 2 + s.len()).sum::<usize>();

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(DICT_MAGIC);
        buf.push(DICT_VERSION);
        buf.push(self.emails.values.len() as u8);
        buf.extend_from_slice(&(self.sessions.values.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.branches.values.len() as u16).to_le_bytes());

        for s in &self.sessions.values {
            let mut slot = [0u8; SESSION_SLOT_LEN];
            slot[..s.len()].copy_from_slice(s.as_bytes());
            buf.extend_from_slice(&slot);
        }
        for s in &self.branches.values {
            check_count("dict branch entry", s.len(), MAX_SHORT_STR)?;
            buf.push(s.len() as u8);
            buf.extend_from_slice(s.as_bytes());
        }
        for s in &self.emails.values {
            check_count("dict email entry", s.len(), MAX_SHORT_STR)?;
            buf.push(s.len() as u8);
            buf.extend_from_slice(s.as_bytes());
        }
        for s in &self.paths.values {
            check_count("dict path entry", s.len(), MAX_PATH)?;
            buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < DICT_HEADER_LEN {
            return Err(CodecError::Truncated {
                what: "dict header",
                offset: data.len(),
            });
        }
        if &data[0..6] != DICT_MAGIC {
            return Err(CodecError::BadMagic { artifact: "dict" });
        }
        if data[6] != DICT_VERSION {
            return Err(CodecError::UnsupportedVersion {
                artifact: "dict",
                version: data[6],
            });
        }
        let n_emails = data[7] as usize;
        let n_sessions = u16::from_le_bytes([data[8], data[9]]) as usize;
        let n_branches = u16::from_le_bytes([data[10], data[11]]) as usize;

        let mut d = Dict::new();
        let mut pos = DICT_HEADER_LEN;

        for _ in 0..n_sessions {
            let slot = take(data, &mut pos, SESSION_SLOT_LEN, "dict session entry")?;
            let end = slot.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            d.sessions.push(utf8(&slot[..end], "dict session entry")?);
        }
        for _ in 0..n_branches {
            let n = take(data, &mut pos, 1, "dict branch entry")?[0] as usize;
            let raw = take(data, &mut pos, n, "dict branch entry")?;
            d.branches.push(utf8(raw, "dict branch entry")?);
        }
        for _ in 0..n_emails {
            let n = take(data, &mut pos, 1, "dict email entry")?[0] as usize;
            let raw = take(data, &mut pos, n, "dict email entry")?;
            d.emails.push(utf8(raw, "dict email entry")?);
        }
        while pos < data.len() {
            let len = take(data, &mut pos, 2, "dict path entry")?;
            let n = u16::from_le_bytes([len[0], len[1]]) as usize;
            let raw = take(data, &mut pos, n, "dict path entry")?;
            d.paths.push(utf8(raw, "dict path entry")?);
        }
        Ok(d)
    }
}

/// Session ids are compared in their slot form so that lookups agree before
/// and after an encode/decode cycle.
fn canonical(ns: Namespace, value: &str) -> &str {
    if ns != Namespace::Sessions {
        return value;
    }
    let mut end = value.len().min(SESSION_SLOT_LEN);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].trim_end_matches('\0')
}

fn check_count(what: &'static str, count: usize, limit: usize) -> Result<(), CodecError> {
    if count > limit {
        return Err(CodecError::Overflow { what, count, limit });
    }
    Ok(())
}

fn take<'a>(
    data: &'a [u8],
    pos: &mut usize,
    n: usize,
    what: &'static str,
) -> Result<&'a [u8], CodecError> {
    let slice = data
        .get(*pos..*pos + n)
        .ok_or(CodecError::Truncated { what, offset: *pos })?;
    *pos += n;
    Ok(slice)
}

fn utf8(raw: &[u8], what: &'static str) -> Result<String, CodecError> {
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8(what))
}
