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

use std::borrow::Cow;

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings (both DOS and UNIX) are handled,
/// the latter by discarding.
///
/// This never fails. Invalid sequences are passed through untransformed,
/// and 8-bit input bytes (including invalid UTF-8) pass through unchanged.
///
/// Returns the decoded bytes plus a "dangling" suffix of the input: an
/// escape sequence cut off by the end of `s` which should be retried once
/// more input is available.
pub fn qp_decode(s: &[u8]) -> (Cow<[u8]>, &[u8]) {
    let first = match memchr::memchr(b'=', s) {
        Some(ix) => ix,
        None => return (Cow::Borrowed(s), &[]),
    };

    let mut out = Vec::with_capacity(s.len());
    out.extend_from_slice(&s[..first]);

    let mut ix = first;
    while ix < s.len() {
        let b = s[ix];
        if b'=' != b {
            out.push(b);
            ix += 1;
            continue;
        }

        let tail = &s[ix + 1..];
        match tail.first() {
            // Escape cut off by end of input
            None => return (Cow::Owned(out), &s[ix..]),
            // Soft line break, UNIX ending: discard
            Some(b'\n') => ix += 2,
            Some(b'\r') => {
                if tail.len() < 2 {
                    return (Cow::Owned(out), &s[ix..]);
                }
                if b'\n' == tail[1] {
                    // Soft line break, DOS ending: discard
                    ix += 3;
                } else {
                    // "=\r" followed by something else; not an escape
                    out.push(b'=');
                    ix += 1;
                }
            },
            Some(&h) => {
                if tail.len() < 2 {
                    if h.is_ascii_hexdigit() {
                        // Could be the first half of an escape
                        return (Cow::Owned(out), &s[ix..]);
                    }
                    out.push(b'=');
                    ix += 1;
                    continue;
                }
                match hex_pair(h, tail[1]) {
                    Some(v) => {
                        out.push(v);
                        ix += 3;
                    },
                    None => {
                        // Invalid escape passes through verbatim
                        out.push(b'=');
                        ix += 1;
                    },
                }
            },
        }
    }

    (Cow::Owned(out), &[])
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
