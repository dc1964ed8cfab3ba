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

//! Content decoding as a chain of `Read` adapters.
//!
//! The transfer decoding layer (identity, base64, quoted-printable, or
//! uudecode) wraps the raw content region; the optional charset layer wraps
//! that and converts text to UTF-8. Each adapter is a pure bytes-to-bytes
//! transform, so the layers compose in either direction of complexity.
//!
//! Decoding failures surface here, at stream read time, as
//! `io::ErrorKind::InvalidData`; parsing never looks inside content.

use std::io::{self, Read};

use super::quoted_printable::qp_decode;
use super::uuencode;

const CHUNK: usize = 4096;

/// Shared chunk-at-a-time plumbing: subtypes transform one input chunk
/// into an output buffer which `read` then drains.
struct Buffered<R> {
    inner: R,
    out_buf: Vec<u8>,
    out_pos: usize,
    done: bool,
}

impl<R: Read> Buffered<R> {
    fn new(inner: R) -> Self {
        Buffered {
            inner,
            out_buf: Vec::new(),
            out_pos: 0,
            done: false,
        }
    }

    fn serve(&mut self, out: &mut [u8]) -> Option<usize> {
        if self.out_pos < self.out_buf.len() {
            let n = (self.out_buf.len() - self.out_pos).min(out.len());
            out[..n].copy_from_slice(
                &self.out_buf[self.out_pos..self.out_pos + n],
            );
            self.out_pos += n;
            Some(n)
        } else {
            None
        }
    }

    fn next_chunk(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        self.out_buf.clear();
        self.out_pos = 0;
        let n = self.inner.read(chunk)?;
        if 0 == n {
            self.done = true;
        }
        Ok(n)
    }
}

/// Decodes a base64 transfer-encoded stream, ignoring whitespace and any
/// other bytes outside the base64 alphabet, the way mail in the wild
/// requires.
pub struct Base64Reader<R> {
    buffered: Buffered<R>,
    /// Alphabet bytes not yet forming a complete quantum.
    pending: Vec<u8>,
}

impl<R: Read> Base64Reader<R> {
    pub fn new(inner: R) -> Self {
        Base64Reader {
            buffered: Buffered::new(inner),
            pending: Vec::new(),
        }
    }
}

impl<R: Read> Read for Base64Reader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(n) = self.buffered.serve(out) {
                return Ok(n);
            }
            if self.buffered.done {
                return Ok(0);
            }

            let mut chunk = [0u8; CHUNK];
            let n = self.buffered.next_chunk(&mut chunk)?;
            if 0 == n {
                // Trailing bytes short of a full quantum are damage;
                // nothing useful can be decoded from them.
                if !self.pending.is_empty() && self.pending.len() % 4 != 0 {
                    self.pending.clear();
                    return Err(invalid_data("truncated base64 quantum"));
                }
                continue;
            }

            for &b in &chunk[..n] {
                match b {
                    b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'+' | b'/'
                    | b'=' => self.pending.push(b),
                    _ => (),
                }
            }

            let usable = self.pending.len() / 4 * 4;
            if usable > 0 {
                base64::decode_config_buf(
                    &self.pending[..usable],
                    base64::STANDARD,
                    &mut self.buffered.out_buf,
                )
                .map_err(|e| invalid_data(&e.to_string()))?;
                self.pending.copy_within(usable.., 0);
                self.pending.truncate(self.pending.len() - usable);
            }
        }
    }
}

/// Decodes a quoted-printable transfer-encoded stream.
pub struct QpReader<R> {
    buffered: Buffered<R>,
    /// Possible partial escape left dangling at a chunk edge.
    carry: Vec<u8>,
}

impl<R: Read> QpReader<R> {
    pub fn new(inner: R) -> Self {
        QpReader {
            buffered: Buffered::new(inner),
            carry: Vec::new(),
        }
    }
}

impl<R: Read> Read for QpReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(n) = self.buffered.serve(out) {
                return Ok(n);
            }
            if self.buffered.done {
                return Ok(0);
            }

            let mut chunk = [0u8; CHUNK];
            let n = self.buffered.next_chunk(&mut chunk)?;
            if 0 == n {
                // An escape dangling at EOF was never an escape; emit it
                // verbatim.
                self.buffered.out_buf.append(&mut self.carry);
                continue;
            }

            self.carry.extend_from_slice(&chunk[..n]);
            let (decoded, dangling) = qp_decode(&self.carry);
            let decoded = decoded.into_owned();
            let keep = self.carry.len() - dangling.len();
            self.buffered.out_buf = decoded;
            self.buffered.out_pos = 0;
            self.carry.drain(..keep);
        }
    }
}

/// Decodes the data lines of a uuencode stanza (the region between the
/// `begin` and `end` lines).
pub struct UuReader<R> {
    buffered: Buffered<R>,
    /// Incomplete line carried to the next chunk.
    carry: Vec<u8>,
}

impl<R: Read> UuReader<R> {
    pub fn new(inner: R) -> Self {
        UuReader {
            buffered: Buffered::new(inner),
            carry: Vec::new(),
        }
    }

    fn decode_lines(&mut self, eof: bool) {
        let mut start = 0;
        while let Some(nl) = memchr::memchr(b'\n', &self.carry[start..]) {
            let line = &self.carry[start..start + nl + 1];
            self.buffered
                .out_buf
                .extend_from_slice(&uuencode::decode_line(line));
            start += nl + 1;
        }
        self.carry.drain(..start);

        if eof && !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            self.buffered
                .out_buf
                .extend_from_slice(&uuencode::decode_line(&line));
        }
    }
}

impl<R: Read> Read for UuReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(n) = self.buffered.serve(out) {
                return Ok(n);
            }
            if self.buffered.done {
                return Ok(0);
            }

            let mut chunk = [0u8; CHUNK];
            let n = self.buffered.next_chunk(&mut chunk)?;
            if 0 == n {
                self.decode_lines(true);
                continue;
            }
            self.carry.extend_from_slice(&chunk[..n]);
            self.decode_lines(false);
        }
    }
}

/// Converts a byte stream in the given charset to UTF-8, incrementally.
///
/// Unknown charset labels behave as identity; the caller decides whether
/// to construct this layer at all.
pub struct CharsetReader<R> {
    buffered: Buffered<R>,
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl<R: Read> CharsetReader<R> {
    pub fn new(inner: R, encoding: &'static encoding_rs::Encoding) -> Self {
        CharsetReader {
            buffered: Buffered::new(inner),
            decoder: encoding.new_decoder_with_bom_removal(),
            finished: false,
        }
    }

    /// Build a converter for `label`, or `None` when the label is unknown
    /// (in which case no conversion layer should be applied).
    pub fn for_label(inner: R, label: &[u8]) -> Option<Self> {
        encoding_rs::Encoding::for_label_no_replacement(label)
            .map(|encoding| CharsetReader::new(inner, encoding))
    }
}

impl<R: Read> Read for CharsetReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(n) = self.buffered.serve(out) {
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }

            let mut chunk = [0u8; CHUNK];
            let n = self.buffered.next_chunk(&mut chunk)?;
            let last = 0 == n;

            self.buffered.out_buf.resize(
                self.decoder
                    .max_utf8_buffer_length(n)
                    .expect("Chunk too large to fit into memory"),
                0,
            );
            let (status, _nread, nwritten, _replaced) = self
                .decoder
                .decode_to_utf8(&chunk[..n], &mut self.buffered.out_buf, last);
            debug_assert_eq!(encoding_rs::CoderResult::InputEmpty, status);
            self.buffered.out_buf.truncate(nwritten);
            self.buffered.out_pos = 0;

            if last {
                self.finished = true;
            }
        }
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn drain(mut r: impl Read) -> Vec<u8> {
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn base64_ignores_line_structure() {
        let encoded = b"SGVs\r\nbG8s\nIHdv\r\ncmxkIQ==\r\n";
        let decoded = drain(Base64Reader::new(Cursor::new(encoded.to_vec())));
        assert_eq!(b"Hello, world!" as &[u8], &decoded[..]);
    }

    #[test]
    fn base64_small_output_reads() {
        let mut r = Base64Reader::new(Cursor::new(b"aGk=".to_vec()));
        let mut one = [0u8; 1];
        assert_eq!(1, r.read(&mut one).unwrap());
        assert_eq!(b'h', one[0]);
        assert_eq!(1, r.read(&mut one).unwrap());
        assert_eq!(b'i', one[0]);
        assert_eq!(0, r.read(&mut one).unwrap());
    }

    #[test]
    fn base64_truncated_quantum_is_invalid_data() {
        let mut r = Base64Reader::new(Cursor::new(b"aGk=X".to_vec()));
        let mut out = Vec::new();
        let err = r.read_to_end(&mut out).unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
    }

    #[test]
    fn qp_decodes_across_chunks() {
        let decoded = drain(QpReader::new(Cursor::new(
            b"That is not dead =\r\nwhich can eternal lie.=0A".to_vec(),
        )));
        assert_eq!(
            b"That is not dead which can eternal lie.\n" as &[u8],
            &decoded[..]
        );
    }

    #[test]
    fn qp_dangling_escape_at_eof_is_literal() {
        let decoded = drain(QpReader::new(Cursor::new(b"tail=A".to_vec())));
        assert_eq!(b"tail=A" as &[u8], &decoded[..]);
    }

    #[test]
    fn uu_decodes_stanza_body() {
        let decoded = drain(UuReader::new(Cursor::new(
            b"+:&5L;&\\@=V]R;&0`\r\n`\r\n".to_vec(),
        )));
        assert_eq!(b"hello world" as &[u8], &decoded[..]);
    }

    #[test]
    fn charset_converts_latin1() {
        let decoded = drain(
            CharsetReader::for_label(
                Cursor::new(b"strange \xE6ons".to_vec()),
                b"ISO-8859-1",
            )
            .unwrap(),
        );
        assert_eq!("strange æons".as_bytes(), &decoded[..]);
    }

    #[test]
    fn charset_unknown_label_is_refused() {
        assert!(CharsetReader::for_label(
            Cursor::new(Vec::new()),
            b"x-martian"
        )
        .is_none());
    }

    #[test]
    fn layers_compose() {
        // base64 of "strange \xE6ons" (ISO-8859-1 bytes)
        let encoded = b"c3RyYW5nZSDmb25z";
        let transfer = Base64Reader::new(Cursor::new(encoded.to_vec()));
        let decoded = drain(
            CharsetReader::for_label(transfer, b"ISO-8859-1").unwrap(),
        );
        assert_eq!("strange æons".as_bytes(), &decoded[..]);
    }
}
