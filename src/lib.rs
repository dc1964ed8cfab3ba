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

//! Mimetree is a lazy streaming parser and manipulator for RFC 5322 /
//! RFC 2045–2049 messages, with support for the pre-MIME convention of
//! uuencoded files embedded in flat message bodies.
//!
//! The input is read once, front to back. Parsing the root costs one
//! header block; everything below is discovered as traversal asks for it,
//! and bodies are tracked as byte ranges into the source rather than
//! buffered. Traversal over a partially parsed tree is observationally
//! identical to traversal over a fully parsed one.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use mimetree::{Message, PartFilter};
//!
//! # fn run() -> Result<(), mimetree::Error> {
//! let file = BufReader::new(File::open("mail.eml")?);
//! let mut message = Message::parse(file)?;
//!
//! // Lazily find the first text/plain leaf
//! let filter = PartFilter::new().content_type("text/plain").leaves_only();
//! if let Some(part) = message.get_part(0, Some(&filter))? {
//!     let body = message.decoded_content(part, true)?;
//!     println!("{}", String::from_utf8_lossy(&body));
//! }
//!
//! // Re-emit, byte-identical while nothing was mutated
//! let mut out = Vec::new();
//! message.write_message(&mut out)?;
//! # Ok(())
//! # }
//! ```

mod mime;
mod support;

pub use crate::mime::filter::{Disposition, PartFilter};
pub use crate::mime::header::{
    ContentDisposition, ContentTransferEncoding, ContentType,
};
pub use crate::mime::headers::{HeaderMap, SENTINEL_HEADER_NAME};
pub use crate::mime::source::ByteSource;
pub use crate::mime::tree::{Message, NewPart, PartId, PartKind, UuInfo};
pub use crate::support::error::Error;

use std::io::{Read, Seek};

/// Parse a message from any seekable byte source.
///
/// Equivalent to [`Message::parse`].
pub fn parse<R: Read + Seek>(reader: R) -> Result<Message<R>, Error> {
    Message::parse(reader)
}
