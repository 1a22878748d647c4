//! Primitive readers and writers for frame payloads: LEB128 varints and
//! varint-length-prefixed UTF-8 strings.

use crate::error::CodecError;

const MAX_VARINT_LEN: usize = 10;

#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn len_usize(&mut self, n: usize) {
        self.varint(n as u64);
    }

    pub fn str(&mut self, s: &str) {
        self.len_usize(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    fn truncated(&self) -> CodecError {
        CodecError::Truncated {
            what: self.what,
            offset: self.pos,
        }
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(b)
    }

    pub fn varint(&mut self) -> Result<u64, CodecError> {
        let mut out: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let b = self.u8()?;
            let chunk = u64::from(b & 0x7f);
            if i == MAX_VARINT_LEN - 1 && chunk > 1 {
                break;
            }
            out |= chunk << (7 * i);
            if b & 0x80 == 0 {
                return Ok(out);
            }
        }
        Err(CodecError::Overflow {
            what: self.what,
            count: MAX_VARINT_LEN + 1,
            limit: MAX_VARINT_LEN,
        })
    }

    /// A count or length that must be satisfiable by the remaining input.
    pub fn len_usize(&mut self) -> Result<usize, CodecError> {
        let n = self.varint()?;
        match usize::try_from(n) {
            Ok(n) if n <= self.remaining() => Ok(n),
            _ => Err(self.truncated()),
        }
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.truncated())?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| self.truncated())?;
        self.pos = end;
        Ok(slice)
    }

    pub fn string(&mut self) -> Result<String, CodecError> {
        let n = self.len_usize()?;
        let raw = self.bytes(n)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8(self.what))
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(CodecError::TrailingBytes {
                what: self.what,
                count,
            }),
        }
    }
}
