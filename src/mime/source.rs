//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Mimetree.
//
// Mimetree is free software: you can  redistribute it and/or modify it under
// the  terms of  the GNU  General Public  License as  published by  the Free
// Software Foundation, either version 3 of  the License, or (at your option)
// any later version.
//
// Mimetree is distributed  in the hope that  it will be useful,  but WITHOUT
// ANY  WARRANTY; without  even the  implied warranty  of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE. See  the GNU  General Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along
// with Mimetree. If not, see <http://www.gnu.org/licenses/>.

//! Seekable, buffered, line-oriented access to the raw message bytes.
//!
//! All offsets are absolute stream positions. Lines end at CR, LF, or CRLF,
//! in any mixture; the terminator is part of the returned line. A lone CR at
//! the end of the internal buffer forces one more read, since the next byte
//! decides whether the terminator is CR or CRLF.

use std::io::{self, Read, Seek, SeekFrom};

const READ_CHUNK: usize = 8192;

/// Buffered reader over the message input with line primitives and rewind
/// to any previously observed offset.
pub struct ByteSource<R> {
    inner: R,
    buf: Vec<u8>,
    /// Stream offset of `buf[0]`.
    buf_offset: u64,
    /// Cursor within `buf`.
    pos: usize,
    /// Whether `inner` reported EOF at the end of `buf`.
    eof: bool,
}

impl<R: Read + Seek> ByteSource<R> {
    pub fn new(inner: R) -> Self {
        ByteSource {
            inner,
            buf: Vec::new(),
            buf_offset: 0,
            pos: 0,
            eof: false,
        }
    }

    /// The absolute offset of the next byte to be read.
    pub fn tell(&self) -> u64 {
        self.buf_offset + self.pos as u64
    }

    /// Reposition to `offset`. Offsets inside the current buffer are repaid
    /// without touching the underlying reader.
    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        let end = self.buf_offset + self.buf.len() as u64;
        if offset >= self.buf_offset && offset <= end {
            self.pos = (offset - self.buf_offset) as usize;
        } else {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.buf.clear();
            self.buf_offset = offset;
            self.pos = 0;
            self.eof = false;
        }
        Ok(())
    }

    /// Read the next line, terminator included. `None` at EOF. The final
    /// line of the stream may lack a terminator.
    pub fn read_line(&mut self) -> io::Result<Option<&[u8]>> {
        let len = self.next_line_len()?;
        if 0 == len {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += len;
        Ok(Some(&self.buf[start..start + len]))
    }

    /// Like `read_line`, but does not consume the line.
    pub fn peek_line(&mut self) -> io::Result<Option<&[u8]>> {
        let len = self.next_line_len()?;
        if 0 == len {
            return Ok(None);
        }
        Ok(Some(&self.buf[self.pos..self.pos + len]))
    }

    /// Length of the next line including its terminator; 0 at EOF.
    fn next_line_len(&mut self) -> io::Result<usize> {
        loop {
            let avail = &self.buf[self.pos..];
            if let Some(ix) = memchr::memchr2(b'\r', b'\n', avail) {
                if b'\n' == avail[ix] {
                    return Ok(ix + 1);
                }
                // CR; the terminator is CRLF if an LF follows
                if ix + 1 < avail.len() {
                    return Ok(if b'\n' == avail[ix + 1] {
                        ix + 2
                    } else {
                        ix + 1
                    });
                }
                if self.eof {
                    return Ok(ix + 1);
                }
            } else if self.eof {
                return Ok(avail.len());
            }

            self.fill()?;
        }
    }

    /// Copy the bytes in `from..to` onto the end of `out`. Short output if
    /// the stream ends before `to`.
    pub fn read_range(
        &mut self,
        from: u64,
        to: u64,
        out: &mut Vec<u8>,
    ) -> io::Result<()> {
        debug_assert!(from <= to);
        self.seek(from)?;

        let mut remaining = (to - from) as usize;
        out.reserve(remaining);
        while remaining > 0 {
            if self.pos >= self.buf.len() {
                if self.eof {
                    break;
                }
                self.fill()?;
                continue;
            }
            let take = remaining.min(self.buf.len() - self.pos);
            out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
            remaining -= take;
        }
        Ok(())
    }

    /// A bounded `Read` view over `from..to`, for streaming a content
    /// region without loading it whole.
    pub fn range_reader(&mut self, from: u64, to: u64) -> RangeReader<'_, R> {
        RangeReader {
            src: self,
            pos: from,
            end: to,
        }
    }

    fn read_into(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buf.len() {
            if self.eof {
                return Ok(0);
            }
            self.fill()?;
            if self.pos >= self.buf.len() {
                return Ok(0);
            }
        }
        let take = out.len().min(self.buf.len() - self.pos);
        out[..take].copy_from_slice(&self.buf[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }

    /// Pull another chunk from the underlying reader, discarding the
    /// already-consumed buffer prefix first.
    fn fill(&mut self) -> io::Result<()> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.buf_offset += self.pos as u64;
            self.pos = 0;
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = self.inner.read(&mut chunk)?;
        if 0 == n {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

/// Bounded streaming view over a byte range of a `ByteSource`.
pub struct RangeReader<'a, R> {
    src: &'a mut ByteSource<R>,
    pos: u64,
    end: u64,
}

impl<R: Read + Seek> Read for RangeReader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || out.is_empty() {
            return Ok(0);
        }
        self.src.seek(self.pos)?;
        let want = out.len().min((self.end - self.pos) as usize);
        let n = self.src.read_into(&mut out[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Length of the line terminator at the end of `line`, in bytes.
pub fn line_ending_len(line: &[u8]) -> usize {
    if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") || line.ends_with(b"\r") {
        1
    } else {
        0
    }
}

/// Strip the trailing CR, LF, or CRLF from `line`.
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    &line[..line.len() - line_ending_len(line)]
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn src(data: &[u8]) -> ByteSource<Cursor<Vec<u8>>> {
        ByteSource::new(Cursor::new(data.to_vec()))
    }

    #[test]
    fn reads_mixed_line_endings() {
        let mut s = src(b"one\r\ntwo\nthree\rfour");
        assert_eq!(b"one\r\n" as &[u8], s.read_line().unwrap().unwrap());
        assert_eq!(b"two\n" as &[u8], s.read_line().unwrap().unwrap());
        assert_eq!(b"three\r" as &[u8], s.read_line().unwrap().unwrap());
        assert_eq!(b"four" as &[u8], s.read_line().unwrap().unwrap());
        assert!(s.read_line().unwrap().is_none());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut s = src(b"alpha\nbeta\n");
        assert_eq!(b"alpha\n" as &[u8], s.peek_line().unwrap().unwrap());
        assert_eq!(b"alpha\n" as &[u8], s.read_line().unwrap().unwrap());
        assert_eq!(6, s.tell());
    }

    #[test]
    fn seek_and_tell_round_trip() {
        let mut s = src(b"alpha\nbeta\ngamma\n");
        s.read_line().unwrap();
        let beta = s.tell();
        s.read_line().unwrap();
        s.read_line().unwrap();
        s.seek(beta).unwrap();
        assert_eq!(b"beta\n" as &[u8], s.read_line().unwrap().unwrap());
    }

    #[test]
    fn read_range_is_exact() {
        let mut s = src(b"0123456789");
        let mut out = Vec::new();
        s.read_range(2, 7, &mut out).unwrap();
        assert_eq!(b"23456" as &[u8], &out[..]);

        // Short when the range runs past EOF
        out.clear();
        s.read_range(8, 20, &mut out).unwrap();
        assert_eq!(b"89" as &[u8], &out[..]);
    }

    #[test]
    fn cr_at_buffer_edge_joins_with_lf() {
        // Force the CR/LF pair to straddle the read chunk boundary.
        let mut data = vec![b'a'; READ_CHUNK - 1];
        data.push(b'\r');
        data.push(b'\n');
        data.extend_from_slice(b"tail\n");

        let mut s = ByteSource::new(Cursor::new(data));
        let line = s.read_line().unwrap().unwrap().to_vec();
        assert_eq!(READ_CHUNK + 1, line.len());
        assert!(line.ends_with(b"\r\n"));
        assert_eq!(b"tail\n" as &[u8], s.read_line().unwrap().unwrap());
    }

    #[test]
    fn range_reader_streams() {
        let mut s = src(b"abcdefghij");
        let mut r = s.range_reader(3, 8);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(b"defgh" as &[u8], &out[..]);
    }
}
