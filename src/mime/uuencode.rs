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

//! Recognition and decoding of classic uuencode, the pre-MIME way of
//! embedding files in message text.
//!
//! A stanza looks like
//!
//! ```text
//! begin 644 file.bin
//! M...encoded lines...
//! `
//! end
//! ```
//!
//! Decoding never fails; garbage lines decode to a best effort, matching
//! how historic uudecode implementations shrugged at damage.

use lazy_static::lazy_static;
use regex::Regex;

use super::source::trim_line_ending;

lazy_static! {
    static ref UU_BEGIN: Regex =
        Regex::new(r"^begin ([0-7]{3,4}) (.+)$").unwrap();
}

/// If `line` (terminator already stripped or not) opens a uuencode stanza,
/// return the file mode and name.
pub fn parse_begin_line(line: &[u8]) -> Option<(u32, String)> {
    let line = std::str::from_utf8(trim_line_ending(line)).ok()?;
    let captures = UU_BEGIN.captures(line)?;

    let mode = u32::from_str_radix(captures.get(1).unwrap().as_str(), 8)
        .ok()?;
    Some((mode, captures.get(2).unwrap().as_str().to_owned()))
}

/// Whether `line` closes a uuencode stanza.
pub fn is_end_line(line: &[u8]) -> bool {
    b"end" == trim_line_ending(line)
}

/// Decode one uuencoded data line.
///
/// The first character encodes the payload length; the backtick line that
/// precedes `end` decodes to nothing. Short or damaged lines yield
/// whatever bytes their complete groups cover.
pub fn decode_line(line: &[u8]) -> Vec<u8> {
    let line = trim_line_ending(line);
    if line.is_empty() {
        return Vec::new();
    }

    let count = (line[0].wrapping_sub(0x20) & 0x3f) as usize;
    let mut out = Vec::with_capacity(count);

    for group in line[1..].chunks(4) {
        if out.len() >= count || group.len() < 4 {
            break;
        }
        let d = [
            group[0].wrapping_sub(0x20) & 0x3f,
            group[1].wrapping_sub(0x20) & 0x3f,
            group[2].wrapping_sub(0x20) & 0x3f,
            group[3].wrapping_sub(0x20) & 0x3f,
        ];
        out.push((d[0] << 2) | (d[1] >> 4));
        if out.len() < count {
            out.push((d[1] << 4) | (d[2] >> 2));
        }
        if out.len() < count {
            out.push((d[2] << 6) | d[3]);
        }
    }

    out
}
