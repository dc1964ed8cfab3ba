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

//! Reading one header block off the byte source.
//!
//! The block runs up to (and including) the first blank line, or to EOF for
//! a truncated message. Folded continuation lines (leading SP or HTAB) are
//! appended to the previous header's raw value with the folding whitespace
//! preserved. Lines without a colon are not errors; their text accumulates
//! under [`SENTINEL_HEADER_NAME`](super::headers::SENTINEL_HEADER_NAME).

use std::io::{self, Read, Seek};

use super::headers::{HeaderMap, SENTINEL_HEADER_NAME};
use super::source::{trim_line_ending, ByteSource};

/// The parsed header block plus the offset one past the blank separator
/// line, i.e. where the content begins.
pub struct HeaderBlock {
    pub headers: HeaderMap,
    pub end_offset: u64,
}

pub fn read_header_block<R: Read + Seek>(
    src: &mut ByteSource<R>,
) -> io::Result<HeaderBlock> {
    read_header_block_until(src, |_| false)
}

/// As `read_header_block`, but a line for which `is_stop` returns true
/// also ends the block, without being consumed. The parser passes a
/// boundary matcher here so that a part whose header area runs straight
/// into a multipart boundary (no blank line) ends cleanly at the boundary
/// instead of swallowing it.
pub fn read_header_block_until<R: Read + Seek, F: FnMut(&[u8]) -> bool>(
    src: &mut ByteSource<R>,
    mut is_stop: F,
) -> io::Result<HeaderBlock> {
    let mut headers = HeaderMap::new();
    // The header currently being accumulated, so that folded continuations
    // have something to append to.
    let mut pending: Option<(String, Vec<u8>)> = None;

    loop {
        let line = match src.peek_line()? {
            Some(line) => line.to_vec(),
            // Truncated: the block ends at EOF without a blank line
            None => break,
        };
        if is_stop(&line) {
            break;
        }
        src.read_line()?;
        let trimmed = trim_line_ending(&line);

        if trimmed.is_empty() {
            break;
        }

        if line.starts_with(b" ") || line.starts_with(b"\t") {
            match pending.as_mut() {
                // Folding whitespace is preserved in the unfolded value
                Some((_, value)) => value.extend_from_slice(trimmed),
                // A continuation of nothing; treat like a colonless line
                None => {
                    pending = Some((
                        SENTINEL_HEADER_NAME.to_owned(),
                        trimmed.to_vec(),
                    ))
                },
            }
            continue;
        }

        match split_header(trimmed) {
            Some((name, value)) => {
                flush(&mut headers, pending.take());
                pending = Some((name, value));
            },
            None => match pending.as_mut() {
                // Consecutive colonless lines concatenate into one
                // sentinel entry
                Some((name, value)) if name.is_empty() => {
                    value.extend_from_slice(trimmed)
                },
                _ => {
                    flush(&mut headers, pending.take());
                    pending = Some((
                        SENTINEL_HEADER_NAME.to_owned(),
                        trimmed.to_vec(),
                    ));
                },
            },
        }
    }

    flush(&mut headers, pending.take());
    Ok(HeaderBlock {
        headers,
        end_offset: src.tell(),
    })
}

fn flush(headers: &mut HeaderMap, pending: Option<(String, Vec<u8>)>) {
    if let Some((name, value)) = pending {
        headers.add(&name, value);
    }
}

/// Split `name: value`, tolerating whitespace around the name and exactly
/// one optional space after the colon. `None` if there is no usable colon.
fn split_header(line: &[u8]) -> Option<(String, Vec<u8>)> {
    let colon = line.iter().position(|&b| b':' == b)?;
    if 0 == colon {
        return None;
    }

    let name = String::from_utf8_lossy(&line[..colon])
        .trim()
        .to_owned();
    if name.is_empty() {
        return None;
    }

    let value = line.get(colon + 1..).unwrap_or(&[]);
    let value = value.strip_prefix(b" " as &[u8]).unwrap_or(value);
    Some((name, value.to_vec()))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn read(data: &[u8]) -> HeaderBlock {
        let mut src = ByteSource::new(Cursor::new(data.to_vec()));
        read_header_block(&mut src).unwrap()
    }

    #[test]
    fn simple_block() {
        let block = read(b"From: a@x\r\nTo: b@y\r\n\r\nbody");
        assert_eq!(b"a@x" as &[u8], block.headers.get("from").unwrap());
        assert_eq!(b"b@y" as &[u8], block.headers.get("to").unwrap());
        assert_eq!(2, block.headers.len());
        // end_offset points at the first content byte
        assert_eq!(22, block.end_offset);
    }

    #[test]
    fn end_offset_is_content_start() {
        let data = b"A: 1\r\n\r\nxyz";
        let block = read(data);
        assert_eq!(8, block.end_offset);
        assert_eq!(b'x', data[block.end_offset as usize]);
    }

    #[test]
    fn folded_value_keeps_whitespace() {
        let block = read(b"Subject: part one\r\n\tpart two\r\n  three\r\n\r\n");
        assert_eq!(
            b"part one\tpart two  three" as &[u8],
            block.headers.get("subject").unwrap()
        );
    }

    #[test]
    fn colonless_lines_go_to_sentinel() {
        let block = read(b"garbage line\r\nmore garbage\r\nReal: v\r\n\r\n");
        assert_eq!(
            b"garbage linemore garbage" as &[u8],
            block.headers.get(SENTINEL_HEADER_NAME).unwrap()
        );
        assert_eq!(b"v" as &[u8], block.headers.get("real").unwrap());
    }

    #[test]
    fn truncated_block_without_blank_line() {
        let block = read(b"From: a@x\r\nTo: b@y");
        assert_eq!(b"a@x" as &[u8], block.headers.get("from").unwrap());
        assert_eq!(b"b@y" as &[u8], block.headers.get("to").unwrap());
    }

    #[test]
    fn empty_block() {
        let block = read(b"\r\nbody");
        assert!(block.headers.is_empty());
        assert_eq!(2, block.end_offset);
    }

    #[test]
    fn value_space_after_colon_is_stripped_once() {
        let block = read(b"X:  two spaces\r\nY:none\r\n\r\n");
        assert_eq!(b" two spaces" as &[u8], block.headers.get("x").unwrap());
        assert_eq!(b"none" as &[u8], block.headers.get("y").unwrap());
    }

    #[test]
    fn stop_line_ends_block_unconsumed() {
        let data = b"Subject: s\r\n--b--\r\nnot headers";
        let mut src = ByteSource::new(Cursor::new(data.to_vec()));
        let block = read_header_block_until(&mut src, |line: &[u8]| {
            line.starts_with(b"--")
        })
        .unwrap();
        assert_eq!(b"s" as &[u8], block.headers.get("subject").unwrap());
        assert_eq!(12, block.end_offset);
        // The stop line is still there for the caller
        assert_eq!(
            b"--b--\r\n" as &[u8],
            src.read_line().unwrap().unwrap()
        );
    }
}
