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

//! Re-serialization of a (possibly mutated) tree.
//!
//! A subtree nobody touched is copied from the source byte-for-byte, so an
//! unmutated parse/write round trip is the identity. A subtree containing
//! any mutation is re-emitted: headers in insertion order, re-folded, CRLF
//! line endings throughout the structure, and the multipart frame
//! reassembled around recursively written children. Content bytes are
//! copied verbatim in either mode; normalization applies to structure, not
//! payloads.

use std::io::{self, Read, Seek, Write};

use super::tree::{Message, PartId, PartKind};
use crate::support::error::Error;

impl<R: Read + Seek> Message<R> {
    /// Serialize the subtree rooted at `part` into `out`.
    pub fn write_to<W: Write>(
        &mut self,
        part: PartId,
        out: &mut W,
    ) -> Result<(), Error> {
        self.drain(part)?;
        self.emit_part(part, out)
    }

    /// Serialize the whole message into `out`.
    pub fn write_message<W: Write>(
        &mut self,
        out: &mut W,
    ) -> Result<(), Error> {
        let root = self.root();
        self.write_to(root, out)
    }

    /// `write_to` into a fresh buffer.
    pub fn to_bytes(&mut self, part: PartId) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.write_to(part, &mut out)?;
        Ok(out)
    }

    fn emit_part<W: Write>(
        &mut self,
        part: PartId,
        out: &mut W,
    ) -> Result<(), Error> {
        if !self.subtree_dirty(part) {
            let (from, to) = self.full_range(part);
            return self.copy_range(from, to, out);
        }

        match self.node(part).kind {
            PartKind::UuEncoded => return self.emit_uu(part, out),
            // A text run inside a non-MIME body has no header block
            PartKind::NonMime if self.node(part).parent.is_some() => {
                return self.emit_body(part, out);
            },
            _ => (),
        }

        let mut head = Vec::new();
        self.node(part).headers.emit(&mut head);
        head.extend_from_slice(b"\r\n");
        out.write_all(&head).map_err(Error::Io)?;

        if self.node(part).override_content.is_some() {
            return self.emit_body(part, out);
        }

        if let Some(boundary) = self.node(part).boundary.clone() {
            return self.emit_multipart(part, &boundary, out);
        }

        self.emit_body(part, out)
    }

    fn emit_multipart<W: Write>(
        &mut self,
        part: PartId,
        boundary: &[u8],
        out: &mut W,
    ) -> Result<(), Error> {
        let (p0, p1) = self.node(part).preamble;
        if p1 > p0 {
            self.copy_range(p0, p1, out)?;
            out.write_all(b"\r\n").map_err(Error::Io)?;
        }

        let children = self.node(part).children.clone();
        for child in children {
            out.write_all(b"--").map_err(Error::Io)?;
            out.write_all(boundary).map_err(Error::Io)?;
            out.write_all(b"\r\n").map_err(Error::Io)?;
            self.emit_part(child, out)?;
            // The line ending before a boundary belongs to the boundary
            out.write_all(b"\r\n").map_err(Error::Io)?;
        }

        out.write_all(b"--").map_err(Error::Io)?;
        out.write_all(boundary).map_err(Error::Io)?;
        out.write_all(b"--\r\n").map_err(Error::Io)?;

        let (e0, e1) = self.node(part).epilogue;
        if e1 > e0 {
            self.copy_range(e0, e1, out)?;
        }
        Ok(())
    }

    /// Content region alone: the override if one was installed, the
    /// original bytes otherwise. For a non-MIME parent whose body was
    /// split into children, the children's re-emissions tile the body.
    fn emit_body<W: Write>(
        &mut self,
        part: PartId,
        out: &mut W,
    ) -> Result<(), Error> {
        if let Some(content) = &self.node(part).override_content {
            return out.write_all(content).map_err(Error::Io);
        }

        if PartKind::NonMime == self.node(part).kind
            && !self.node(part).children.is_empty()
        {
            let children = self.node(part).children.clone();
            for child in children {
                self.emit_part(child, out)?;
            }
            return Ok(());
        }

        let (c0, c1) = self.node(part).content_range;
        self.copy_range(c0, c1, out)
    }

    fn emit_uu<W: Write>(
        &mut self,
        part: PartId,
        out: &mut W,
    ) -> Result<(), Error> {
        let (mode, filename) = {
            let uu = self
                .node(part)
                .uu
                .as_ref()
                .expect("uuencoded part without uu info");
            (uu.mode, uu.filename.clone())
        };
        write!(out, "begin {:03o} {}\r\n", mode, filename)
            .map_err(Error::Io)?;

        if let Some(content) = &self.node(part).override_content {
            out.write_all(content).map_err(Error::Io)?;
        } else {
            let (c0, c1) = self.node(part).content_range;
            self.copy_range(c0, c1, out)?;
        }
        out.write_all(b"end\r\n").map_err(Error::Io)
    }

    fn copy_range<W: Write>(
        &mut self,
        from: u64,
        to: u64,
        out: &mut W,
    ) -> Result<(), Error> {
        if to <= from {
            return Ok(());
        }
        let mut reader = self.src.range_reader(from, to);
        io::copy(&mut reader, out).map_err(Error::Io)?;
        Ok(())
    }
}
