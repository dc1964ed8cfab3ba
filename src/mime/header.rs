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

//! Parsers for the handful of RFC 2045 structured header values the core
//! itself needs: Content-Type (for multipart boundaries, charsets, and
//! classification), Content-Transfer-Encoding, and Content-Disposition
//! (for the attachment/inline distinction and filenames).
//!
//! Anything beyond these (addresses, dates, message ids) belongs to
//! external header-value consumers and is deliberately not parsed here.

use std::str;

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::map,
    multi::many0,
    sequence::preceded,
    IResult,
};

/// A parsed `type/subtype` with its parameters.
///
/// Type, subtype, and parameter names are lowercased at parse time;
/// parameter values keep their raw bytes (quoting removed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, Vec<u8>)>,
}

impl ContentType {
    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is_subtype(&self, subtype: &str) -> bool {
        self.subtype.eq_ignore_ascii_case(subtype)
    }

    /// The first parameter named `name` (ASCII-case-insensitive).
    pub fn parm(&self, name: &str) -> Option<&[u8]> {
        self.parms
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    pub fn full_type(&self) -> String {
        format!("{}/{}", self.typ, self.subtype)
    }
}

/// A parsed Content-Disposition: the disposition token plus parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub parms: Vec<(String, Vec<u8>)>,
}

impl ContentDisposition {
    pub fn is_attachment(&self) -> bool {
        self.disposition.eq_ignore_ascii_case("attachment")
    }

    pub fn is_inline(&self) -> bool {
        self.disposition.eq_ignore_ascii_case("inline")
    }

    pub fn parm(&self, name: &str) -> Option<&[u8]> {
        self.parms
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
}

impl Default for ContentTransferEncoding {
    fn default() -> Self {
        ContentTransferEncoding::SevenBit
    }
}

/// Parse a raw Content-Type value. `None` if there is no recognisable
/// `type/subtype` prefix; unparsable parameter tails are simply dropped.
pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    let (rest, typ) = preceded(ows, token::<NomError>)(value).ok()?;
    let (rest, _) = char::<_, NomError>('/')(rest).ok()?;
    let (rest, subtype) = token::<NomError>(rest).ok()?;
    let parms = parse_parms(rest);

    Some(ContentType {
        typ: lower(typ),
        subtype: lower(subtype),
        parms,
    })
}

/// Parse a raw Content-Disposition value. `None` if there is no leading
/// token.
pub fn parse_content_disposition(value: &[u8]) -> Option<ContentDisposition> {
    let (rest, disposition) = preceded(ows, token::<NomError>)(value).ok()?;
    Some(ContentDisposition {
        disposition: lower(disposition),
        parms: parse_parms(rest),
    })
}

/// Parse a raw Content-Transfer-Encoding value. Unknown or malformed
/// encodings yield `None`; callers fall back to the 7bit default.
pub fn parse_content_transfer_encoding(
    value: &[u8],
) -> Option<ContentTransferEncoding> {
    let token = str::from_utf8(value).ok()?.trim();
    if token.eq_ignore_ascii_case("7bit") {
        Some(ContentTransferEncoding::SevenBit)
    } else if token.eq_ignore_ascii_case("8bit") {
        Some(ContentTransferEncoding::EightBit)
    } else if token.eq_ignore_ascii_case("binary") {
        Some(ContentTransferEncoding::Binary)
    } else if token.eq_ignore_ascii_case("base64") {
        Some(ContentTransferEncoding::Base64)
    } else if token.eq_ignore_ascii_case("quoted-printable") {
        Some(ContentTransferEncoding::QuotedPrintable)
    } else {
        None
    }
}

type NomError<'a> = nom::error::Error<&'a [u8]>;

fn parse_parms(input: &[u8]) -> Vec<(String, Vec<u8>)> {
    many0(parameter)(input)
        .map(|(_, parms)| parms)
        .unwrap_or_default()
}

// RFC 2045 token, i.e. printable ASCII excluding tspecials.
fn is_token_char(b: u8) -> bool {
    b > 0x20
        && b < 0x7f
        && !b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn token<'a, E: nom::error::ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], &'a [u8], E> {
    take_while1(is_token_char)(input)
}

// Optional whitespace, folding remnants included.
fn ows<'a, E: nom::error::ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], &'a [u8], E> {
    take_while(|b| b == b' ' || b == b'\t' || b == b'\r' || b == b'\n')(input)
}

// `; name=value` with the value either a token or a quoted string.
fn parameter(input: &[u8]) -> IResult<&[u8], (String, Vec<u8>)> {
    let (input, _) = preceded(ows, char(';'))(input)?;
    let (input, name) = preceded(ows, token)(input)?;
    let (input, _) = preceded(ows, char('='))(input)?;
    let (input, value) = preceded(
        ows,
        alt((quoted_string, map(token, |t: &[u8]| t.to_vec()))),
    )(input)?;
    Ok((input, (lower(name), value)))
}

// RFC 2822 quoted-string with backslash escapes, 8-bit clean.
fn quoted_string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (mut rest, _) = char::<_, NomError>('"')(input)?;
    let mut out = Vec::new();
    loop {
        match rest.first() {
            Some(b'"') => return Ok((&rest[1..], out)),
            Some(b'\\') if rest.len() >= 2 => {
                out.push(rest[1]);
                rest = &rest[2..];
            },
            Some(&b) => {
                out.push(b);
                rest = &rest[1..];
            },
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    rest,
                    nom::error::ErrorKind::Char,
                )))
            },
        }
    }
}

fn lower(s: &[u8]) -> String {
    String::from_utf8_lossy(s).to_ascii_lowercase()
}
