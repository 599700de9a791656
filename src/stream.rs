// sysfile - a reader for IBM SPSS Statistics system files.
// Copyright (C) 2025 Free Software Foundation, Inc.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! The byte source that record parsers and the case decoder draw from.
//!
//! A [Stream] starts out reading from a buffered upstream [Read]
//! implementation.  When a `.zsav` file's data region has been inflated into
//! memory, the stream is rebound so that all further consuming reads come
//! from the in-memory buffer while the upstream stays where the inflater
//! left it.

use std::borrow::Cow;
use std::io::{BufRead, Error as IoError, ErrorKind, Read};
use std::str::from_utf8;

use encoding_rs::mem::decode_latin1;

use crate::endian::{Endian, FromBytes, ToBytes};
use crate::error::Error;

/// Decodes `s` as UTF-8 if it is valid, otherwise as Latin-1 (bytes
/// interpreted as Unicode code points).  The character encoding named by the
/// dictionary is surfaced to the caller but never applied.
pub(crate) fn default_decode(s: &[u8]) -> Cow<str> {
    from_utf8(s).map_or_else(|_| decode_latin1(s), Cow::from)
}

const CHUNK: usize = 4096;

/// A buffered reader with unbounded lookahead and absolute position
/// tracking.
pub(crate) struct BufSource<R> {
    inner: R,
    buf: Vec<u8>,
    start: usize,
    position: u64,
    eof: bool,
}

impl<R: Read> BufSource<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            start: 0,
            position: 0,
            eof: false,
        }
    }

    /// Absolute offset of the next unconsumed byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn buffered(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Reads from the inner stream until at least `n` bytes are buffered or
    /// the stream ends.  Returns the number of buffered bytes, which is less
    /// than `n` only at end of stream.
    fn fill(&mut self, n: usize) -> Result<usize, IoError> {
        if self.start > 0 && self.buf.len() - self.start < n {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        while self.buf.len() - self.start < n && !self.eof {
            let old_len = self.buf.len();
            self.buf.resize(old_len + CHUNK.max(n), 0);
            match self.inner.read(&mut self.buf[old_len..]) {
                Ok(0) => {
                    self.buf.truncate(old_len);
                    self.eof = true;
                }
                Ok(count) => self.buf.truncate(old_len + count),
                Err(error) if error.kind() == ErrorKind::Interrupted => {
                    self.buf.truncate(old_len);
                }
                Err(error) => {
                    self.buf.truncate(old_len);
                    return Err(error);
                }
            }
        }
        Ok(self.buf.len() - self.start)
    }

    /// Returns up to `n` bytes of lookahead without consuming them.
    fn peek(&mut self, n: usize) -> Result<&[u8], IoError> {
        let available = self.fill(n)?;
        Ok(&self.buf[self.start..self.start + available.min(n)])
    }

    fn take(&mut self, n: usize) {
        debug_assert!(self.buf.len() - self.start >= n);
        self.start += n;
        self.position += n as u64;
    }
}

impl<R: Read> Read for BufSource<R> {
    fn read(&mut self, out: &mut [u8]) -> Result<usize, IoError> {
        let buffered = self.buffered();
        if !buffered.is_empty() {
            let n = buffered.len().min(out.len());
            out[..n].copy_from_slice(&buffered[..n]);
            self.take(n);
            return Ok(n);
        }
        let n = self.inner.read(out)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read> BufRead for BufSource<R> {
    fn fill_buf(&mut self) -> Result<&[u8], IoError> {
        if self.buffered().is_empty() {
            self.fill(1)?;
        }
        Ok(&self.buf[self.start..])
    }

    fn consume(&mut self, amt: usize) {
        self.take(amt);
    }
}

/// The decompressed data region of a `.zsav` file.
struct Region {
    data: Vec<u8>,
    pos: usize,
}

/// The reader's byte source: fixed-width integers, doubles, raw bytes, and
/// record-tag lookahead, drawn from the buffered upstream or, once a
/// compressed data region has been materialized, from memory.
pub(crate) struct Stream<R> {
    upstream: BufSource<R>,
    region: Option<Region>,
    endian: Endian,
}

impl<R: Read> Stream<R> {
    pub fn new(inner: R, endian: Endian) -> Self {
        Self {
            upstream: BufSource::new(inner),
            region: None,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Offset of the next byte of the active source: absolute in the file
    /// before rebinding, relative to the inflated region after.
    pub fn position(&self) -> u64 {
        match &self.region {
            Some(region) => region.pos as u64,
            None => self.upstream.position(),
        }
    }

    /// Offset of the next byte of the buffered upstream, regardless of
    /// whether a region is bound.
    pub fn upstream_position(&self) -> u64 {
        self.upstream.position()
    }

    /// The buffered upstream, for handing to an inflater.  A `BufRead`-based
    /// inflater consumes exactly the compressed bytes, leaving the upstream
    /// positioned at the first byte past the compressed stream.
    pub fn upstream_mut(&mut self) -> &mut BufSource<R> {
        &mut self.upstream
    }

    /// Makes `data` the active source for all subsequent consuming reads.
    pub fn bind_region(&mut self, data: Vec<u8>) {
        self.region = Some(Region { data, pos: 0 });
    }

    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), Error> {
        match &mut self.region {
            Some(region) => {
                let Some(bytes) = region.data[region.pos..].get(..out.len()) else {
                    return Err(Error::UnexpectedEof {
                        offset: region.pos as u64,
                    });
                };
                out.copy_from_slice(bytes);
                region.pos += out.len();
                Ok(())
            }
            None => self.upstream.read_exact(out).map_err(|error| {
                if error.kind() == ErrorKind::UnexpectedEof {
                    Error::UnexpectedEof {
                        offset: self.upstream.position(),
                    }
                } else {
                    Error::Io(error)
                }
            }),
        }
    }

    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut buf = [0; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let mut vec = vec![0; n];
        self.read_exact(&mut vec)?;
        Ok(vec)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(self.endian.parse(self.read_bytes()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.endian.parse(self.read_bytes()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(self.endian.parse(self.read_bytes()?))
    }

    /// Reads `n` bytes as text.  No character set conversion is applied
    /// beyond the UTF-8-else-Latin-1 fallback.
    pub fn read_string(&mut self, n: usize) -> Result<String, Error> {
        Ok(default_decode(&self.read_vec(n)?).into_owned())
    }

    /// Advances the active source by `n` bytes.
    pub fn discard(&mut self, n: usize) -> Result<(), Error> {
        match &mut self.region {
            Some(region) => {
                if region.data.len() - region.pos < n {
                    return Err(Error::UnexpectedEof {
                        offset: region.pos as u64,
                    });
                }
                region.pos += n;
                Ok(())
            }
            None => {
                let mut remaining = n;
                while remaining > 0 {
                    let available = self.upstream.fill(remaining)?;
                    if available == 0 {
                        return Err(Error::UnexpectedEof {
                            offset: self.upstream.position(),
                        });
                    }
                    let step = available.min(remaining);
                    let upstream = &mut self.upstream;
                    upstream.take(step);
                    remaining -= step;
                }
                Ok(())
            }
        }
    }

    /// Reports whether the next `4 * tag.len()` bytes of the upstream are
    /// the byte-for-byte encoding of `tag` under the stream's byte order.
    /// Short lookahead (end of stream) reports false.
    pub fn is_next(&mut self, tag: &[i32]) -> bool {
        let want: Vec<u8> = tag
            .iter()
            .flat_map(|&value| self.endian.to_bytes(value))
            .collect();
        match self.upstream.peek(want.len()) {
            Ok(peeked) => peeked == want,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(bytes: &[u8]) -> Stream<Cursor<Vec<u8>>> {
        Stream::new(Cursor::new(bytes.to_vec()), Endian::Little)
    }

    #[test]
    fn fixed_width_reads() {
        let mut s = stream(&[2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 89, 64]);
        assert_eq!(s.read_i32().unwrap(), 2);
        assert_eq!(s.read_f64().unwrap(), 100.0);
        assert_eq!(s.position(), 12);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut s = stream(&[3, 0, 0, 0, 7, 0, 0, 0]);
        assert!(s.is_next(&[3]));
        assert!(!s.is_next(&[4]));
        assert!(s.is_next(&[3, 7]));
        assert!(!s.is_next(&[3, 7, 0]));
        assert_eq!(s.position(), 0);
        assert_eq!(s.read_i32().unwrap(), 3);
    }

    #[test]
    fn big_endian_tags() {
        let mut s = stream(&[0, 0, 3, 231, 0, 0, 0, 0]);
        s.set_endian(Endian::Big);
        assert!(s.is_next(&[999, 0]));
    }

    #[test]
    fn short_read_is_eof() {
        let mut s = stream(&[1, 2, 3]);
        assert!(matches!(
            s.read_i32(),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn discard_skips_padding() {
        let mut s = stream(b"abcdefgh");
        s.discard(6).unwrap();
        assert_eq!(s.read_string(2).unwrap(), "gh");
        assert!(matches!(s.discard(1), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn region_takes_over_consuming_reads() {
        let mut s = stream(&[1, 0, 0, 0, 99, 99, 99, 99]);
        assert_eq!(s.read_i32().unwrap(), 1);
        s.bind_region(vec![5, 0, 0, 0]);
        assert_eq!(s.read_i32().unwrap(), 5);
        assert_eq!(s.position(), 4);
        assert_eq!(s.upstream_position(), 4);
        assert!(matches!(s.read_i32(), Err(Error::UnexpectedEof { offset: 4 })));
    }

    #[test]
    fn latin1_fallback_decoding() {
        assert_eq!(default_decode(b"caf\xe9"), "café");
        assert_eq!(default_decode("café".as_bytes()), "café");
    }
}
