// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Primitive codec: a cursor over an immutable payload and a bounded payload writer.

use byteorder::{ByteOrder, LittleEndian as LE};

use std::convert::TryFrom;

use crate::{constants::MAX_PAYLOAD_LEN, error::ProtocolError};

type CodecResult<T> = std::result::Result<T, ProtocolError>;

/// Returns length of a length-encoded integer representation of `x`.
pub fn lenenc_int_len(x: u64) -> usize {
    if x < 0xfb {
        1
    } else if x < 1 << 16 {
        3
    } else if x < 1 << 24 {
        4
    } else {
        9
    }
}

/// Returns length of a length-encoded string representation of `s`.
pub fn lenenc_str_len(s: &[u8]) -> usize {
    lenenc_int_len(s.len() as u64) + s.len()
}

/// Position-tracking reader over a packet payload.
///
/// Every read checks the remaining length first; crossing the end of the buffer
/// yields `ProtocolError::BufferUnderrun` and leaves the cursor untouched.
#[derive(Debug, Clone, Copy)]
pub struct ParseBuf<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ParseBuf<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Next byte without advancing the cursor.
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn ensure(&self, needed: usize) -> CodecResult<()> {
        if self.remaining() < needed {
            Err(ProtocolError::BufferUnderrun {
                needed,
                remaining: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.ensure(n)?;
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> CodecResult<()> {
        self.read_bytes(n).map(drop)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        self.read_bytes(1).map(|x| x[0])
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.read_bytes(2).map(LE::read_u16)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.read_bytes(4).map(LE::read_u32)
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.read_bytes(8).map(LE::read_u64)
    }

    /// Reads an `n`-byte little-endian unsigned integer, `n` in `1..=8`.
    pub fn read_uint(&mut self, n: usize) -> CodecResult<u64> {
        if n == 0 || n > 8 {
            return Err(ProtocolError::Malformed("integer width out of range"));
        }
        self.read_bytes(n).map(|x| LE::read_uint(x, n))
    }

    /// Reads an `n`-byte little-endian signed integer, `n` in `1..=8`.
    pub fn read_int(&mut self, n: usize) -> CodecResult<i64> {
        if n == 0 || n > 8 {
            return Err(ProtocolError::Malformed("integer width out of range"));
        }
        self.read_bytes(n).map(|x| LE::read_int(x, n))
    }

    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.read_bytes(4).map(LE::read_f32)
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        self.read_bytes(8).map(LE::read_f64)
    }

    /// Reads a length-encoded integer.
    ///
    /// `0xfb` (NULL marker) and `0xff` (ERR header) do not start an integer.
    pub fn read_lenenc_int(&mut self) -> CodecResult<u64> {
        let mut probe = *self;
        let value = match probe.read_u8()? {
            x @ 0x00..=0xfa => u64::from(x),
            0xfc => probe.read_uint(2)?,
            0xfd => probe.read_uint(3)?,
            0xfe => probe.read_uint(8)?,
            _ => return Err(ProtocolError::Malformed("invalid length-encoded integer")),
        };
        *self = probe;
        Ok(value)
    }

    pub fn read_lenenc_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let mut probe = *self;
        let len = probe.read_lenenc_int()?;
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::Malformed("length-encoded string is too long"))?;
        let bytes = probe.read_bytes(len)?;
        *self = probe;
        Ok(bytes)
    }

    /// Reads bytes up to a NUL byte and consumes the terminator.
    pub fn read_null_terminated(&mut self) -> CodecResult<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&x| x == 0x00) {
            Some(nul) => {
                self.pos += nul + 1;
                Ok(&rest[..nul])
            }
            None => Err(ProtocolError::Malformed("missing NUL terminator")),
        }
    }

    /// Reads everything up to the end of the buffer.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

/// Payload writer bounded by a byte limit.
///
/// A write that would push the payload past `limit` is rejected with
/// `ProtocolError::BufferOverrun` and nothing is written.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PacketWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::with_limit(MAX_PAYLOAD_LEN)
    }
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(std::cmp::min(limit, 1024)),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn reserve(&mut self, needed: usize) -> CodecResult<()> {
        match self.buf.len().checked_add(needed) {
            Some(total) if total <= self.limit => Ok(()),
            _ => Err(ProtocolError::BufferOverrun {
                needed,
                limit: self.limit,
            }),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes `n` copies of `byte` (reserved or padding regions).
    pub fn fill(&mut self, byte: u8, n: usize) -> CodecResult<()> {
        self.reserve(n)?;
        self.buf.resize(self.buf.len() + n, byte);
        Ok(())
    }

    pub fn write_u8(&mut self, x: u8) -> CodecResult<()> {
        self.write_bytes(&[x])
    }

    pub fn write_u16(&mut self, x: u16) -> CodecResult<()> {
        self.write_uint(u64::from(x), 2)
    }

    pub fn write_u32(&mut self, x: u32) -> CodecResult<()> {
        self.write_uint(u64::from(x), 4)
    }

    pub fn write_u64(&mut self, x: u64) -> CodecResult<()> {
        self.write_uint(x, 8)
    }

    /// Writes the low `n` bytes of `x`, little-endian, `n` in `1..=8`.
    pub fn write_uint(&mut self, x: u64, n: usize) -> CodecResult<()> {
        if n == 0 || n > 8 {
            return Err(ProtocolError::Malformed("integer width out of range"));
        }
        let mut bytes = [0_u8; 8];
        LE::write_u64(&mut bytes, x);
        self.write_bytes(&bytes[..n])
    }

    pub fn write_int(&mut self, x: i64, n: usize) -> CodecResult<()> {
        self.write_uint(x as u64, n)
    }

    pub fn write_f32(&mut self, x: f32) -> CodecResult<()> {
        let mut bytes = [0_u8; 4];
        LE::write_f32(&mut bytes, x);
        self.write_bytes(&bytes)
    }

    pub fn write_f64(&mut self, x: f64) -> CodecResult<()> {
        let mut bytes = [0_u8; 8];
        LE::write_f64(&mut bytes, x);
        self.write_bytes(&bytes)
    }

    /// Writes `x` using the smallest length-encoded representation.
    pub fn write_lenenc_int(&mut self, x: u64) -> CodecResult<()> {
        self.reserve(lenenc_int_len(x))?;
        if x < 0xfb {
            self.write_u8(x as u8)
        } else if x < 1 << 16 {
            self.write_u8(0xfc)?;
            self.write_uint(x, 2)
        } else if x < 1 << 24 {
            self.write_u8(0xfd)?;
            self.write_uint(x, 3)
        } else {
            self.write_u8(0xfe)?;
            self.write_uint(x, 8)
        }
    }

    pub fn write_lenenc_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.reserve(lenenc_str_len(bytes))?;
        self.write_lenenc_int(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }

    pub fn write_null_terminated(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.reserve(bytes.len() + 1)?;
        self.write_bytes(bytes)?;
        self.write_u8(0x00)
    }
}
