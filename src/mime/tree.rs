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

//! The message part tree.
//!
//! Parts live in an arena owned by the `Message`; a `PartId` is an index
//! into it. Children are lists of ids and `parent` is a non-owning
//! back-reference, which is what breaks the parent/child ownership cycle.
//! A part removed from its parent stays in the arena (ids never dangle)
//! but is no longer reachable by traversal or emission.
//!
//! Traversal is depth-first pre-order, the owning part itself at position
//! 0, and drives the lazy parser exactly as far as each request needs.
//! Once a part is fully parsed the same operations run eagerly over the
//! arena. The two modes are observationally identical except that lazy
//! expansion appends children as a side effect.

use std::io::{self, Cursor, Read, Seek};

use super::content_encoding::{
    Base64Reader, CharsetReader, QpReader, UuReader,
};
use super::header::{
    parse_content_disposition, parse_content_transfer_encoding, ContentType,
    ContentTransferEncoding,
};
use super::headers::HeaderMap;
use super::filter::PartFilter;
use super::source::ByteSource;
use crate::support::error::Error;

/// Handle to one part in a `Message`'s arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartId(pub(crate) usize);

/// What sort of part a node is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartKind {
    /// A MIME entity: leaf content or a multipart container.
    Mime,
    /// A full message: the root, or an embedded `message/rfc822` part.
    Message,
    /// A flat non-MIME message or a plain text run inside one.
    NonMime,
    /// One uuencoded file embedded in a non-MIME body.
    UuEncoded,
}

/// Per-part progress of the lazy parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Headers are read; content has not been located yet.
    Content,
    /// Content located; children stream on demand.
    Children,
    /// Everything about this part is known.
    Finished,
}

/// Filename and mode recovered from a uuencode `begin` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UuInfo {
    pub filename: String,
    pub mode: u32,
}

pub(crate) struct PartNode {
    pub headers: HeaderMap,
    pub parent: Option<PartId>,
    pub children: Vec<PartId>,
    pub kind: PartKind,
    pub content_type: Option<ContentType>,
    /// Bare boundary token for multipart parts.
    pub boundary: Option<Vec<u8>>,
    pub uu: Option<UuInfo>,
    /// Source range of the header block including the blank line.
    pub header_range: (u64, u64),
    /// Source range of the content. The end is meaningful only once the
    /// part is `Finished`.
    pub content_range: (u64, u64),
    /// Multipart: bytes before the first boundary.
    pub preamble: (u64, u64),
    /// Multipart: bytes after the terminator line. UuEncoded: the closing
    /// `end` line (which keeps the full stanza extent recoverable).
    pub epilogue: (u64, u64),
    /// In-memory replacement for the content region, set by mutation.
    pub override_content: Option<Vec<u8>>,
    pub phase: Phase,
    pub truncated: bool,
    pub missing_boundary: bool,
    /// Whether this node needs re-emission rather than a verbatim copy.
    pub dirty: bool,
}

impl PartNode {
    pub(crate) fn new(kind: PartKind, parent: Option<PartId>) -> Self {
        PartNode {
            headers: HeaderMap::new(),
            parent,
            children: Vec::new(),
            kind,
            content_type: None,
            boundary: None,
            uu: None,
            header_range: (0, 0),
            content_range: (0, 0),
            preamble: (0, 0),
            epilogue: (0, 0),
            override_content: None,
            phase: Phase::Finished,
            truncated: false,
            missing_boundary: false,
            dirty: false,
        }
    }
}

/// A detached part under construction, for `add_child`.
///
/// The content bytes are taken as-is; if they are meant to be transfer
/// encoded, the caller encodes them and sets the matching header.
pub struct NewPart {
    pub headers: HeaderMap,
    pub content: Vec<u8>,
}

impl NewPart {
    pub fn new(headers: HeaderMap, content: impl Into<Vec<u8>>) -> Self {
        NewPart {
            headers,
            content: content.into(),
        }
    }

    /// A text part with the given Content-Type.
    pub fn text(content_type: &str, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", content_type.as_bytes().to_vec());
        NewPart {
            headers,
            content: body.as_bytes().to_vec(),
        }
    }
}

/// A parsed message: the byte source plus the (lazily growing) part arena.
pub struct Message<R> {
    pub(crate) src: ByteSource<R>,
    pub(crate) nodes: Vec<PartNode>,
    /// The parser's single logical read position.
    pub(crate) cursor: u64,
    /// Set when an I/O failure poisons the parse; lazy expansion is then
    /// impossible, but the parsed tree stays readable.
    pub(crate) aborted: bool,
    pub(crate) root: PartId,
}

const DEFAULT_TEXT_PLAIN: &str = "text/plain";

impl<R> Message<R> {
    pub fn root(&self) -> PartId {
        self.root
    }

    pub(crate) fn node(&self, part: PartId) -> &PartNode {
        &self.nodes[part.0]
    }

    pub(crate) fn node_mut(&mut self, part: PartId) -> &mut PartNode {
        &mut self.nodes[part.0]
    }

    pub(crate) fn alloc(&mut self, node: PartNode) -> PartId {
        self.nodes.push(node);
        PartId(self.nodes.len() - 1)
    }

    pub fn headers(&self, part: PartId) -> &HeaderMap {
        &self.node(part).headers
    }

    /// Mutable header access. The part is marked for re-emission since
    /// there is no way to know the caller left the headers untouched.
    pub fn headers_mut(&mut self, part: PartId) -> &mut HeaderMap {
        let node = self.node_mut(part);
        node.dirty = true;
        &mut node.headers
    }

    /// The first raw value of the named header, if present.
    pub fn header_value(&self, part: PartId, name: &str) -> Option<&[u8]> {
        self.node(part).headers.get(name)
    }

    /// Like `header_value`, lossily decoded for display.
    pub fn header_value_str(
        &self,
        part: PartId,
        name: &str,
    ) -> Option<String> {
        self.header_value(part, name)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn parent(&self, part: PartId) -> Option<PartId> {
        self.node(part).parent
    }

    pub fn kind(&self, part: PartId) -> PartKind {
        self.node(part).kind
    }

    pub fn is_multipart(&self, part: PartId) -> bool {
        self.node(part).boundary.is_some()
    }

    /// Whether the part streams children at all (multipart, embedded
    /// message, or a non-MIME body that may grow uuencoded children).
    pub fn is_container(&self, part: PartId) -> bool {
        let node = self.node(part);
        node.boundary.is_some()
            || self.is_embedded_message(part)
            || (PartKind::NonMime == node.kind && node.parent.is_none())
    }

    pub(crate) fn is_embedded_message(&self, part: PartId) -> bool {
        self.node(part)
            .content_type
            .as_ref()
            .is_some_and(|ct| ct.is_type("message") && ct.is_subtype("rfc822"))
    }

    pub fn content_type(&self, part: PartId) -> Option<&ContentType> {
        self.node(part).content_type.as_ref()
    }

    /// The effective content type used for matching: explicit when
    /// declared, `text/plain` for undeclared MIME and non-MIME parts,
    /// `application/octet-stream` for uuencoded files.
    pub fn effective_content_type(&self, part: PartId) -> String {
        let node = self.node(part);
        match node.kind {
            PartKind::UuEncoded => "application/octet-stream".to_owned(),
            _ => node
                .content_type
                .as_ref()
                .map(ContentType::full_type)
                .unwrap_or_else(|| DEFAULT_TEXT_PLAIN.to_owned()),
        }
    }

    /// Whether the parse ran off the end of the input inside this part.
    pub fn truncated(&self, part: PartId) -> bool {
        self.node(part).truncated
    }

    /// Whether this part declared a multipart boundary that never
    /// appeared in its body.
    pub fn missing_boundary(&self, part: PartId) -> bool {
        self.node(part).missing_boundary
    }

    pub fn uu_filename(&self, part: PartId) -> Option<&str> {
        self.node(part).uu.as_ref().map(|u| u.filename.as_str())
    }

    pub fn uu_mode(&self, part: PartId) -> Option<u32> {
        self.node(part).uu.as_ref().map(|u| u.mode)
    }

    /// The full original extent of a part: header block through the last
    /// byte that belongs to it.
    pub(crate) fn full_range(&self, part: PartId) -> (u64, u64) {
        let node = self.node(part);
        (
            node.header_range.0,
            node.content_range.1.max(node.epilogue.1).max(node.preamble.1),
        )
    }

    pub(crate) fn subtree_dirty(&self, part: PartId) -> bool {
        let node = self.node(part);
        node.dirty
            || node
                .children
                .iter()
                .any(|&child| self.subtree_dirty(child))
    }

    fn collect(
        &self,
        part: PartId,
        filter: Option<&PartFilter>,
        out: &mut Vec<PartId>,
    ) {
        if filter.map_or(true, |f| f.matches(self, part)) {
            out.push(part);
        }
        for &child in &self.node(part).children {
            self.collect(child, filter, out);
        }
    }

    fn count_subtree(&self, part: PartId) -> usize {
        1 + self
            .node(part)
            .children
            .iter()
            .map(|&child| self.count_subtree(child))
            .sum::<usize>()
    }

    pub(crate) fn is_text(&self, part: PartId) -> bool {
        let node = self.node(part);
        match node.kind {
            PartKind::UuEncoded => false,
            _ => node
                .content_type
                .as_ref()
                .map_or(true, |ct| ct.is_type("text")),
        }
    }

    /// Whether the part's disposition makes it an attachment rather than
    /// inline content. Explicit Content-Disposition wins; otherwise
    /// text and container parts count as inline, everything else as an
    /// attachment.
    pub fn is_attachment(&self, part: PartId) -> bool {
        let node = self.node(part);
        if let Some(cd) = node
            .headers
            .get("Content-Disposition")
            .and_then(parse_content_disposition)
        {
            return cd.is_attachment();
        }
        if PartKind::UuEncoded == node.kind {
            return true;
        }
        if self.is_container(part) {
            return false;
        }
        !self.is_text(part)
    }
}

impl<R: Read + Seek> Message<R> {
    /// The `index`-th part, pre-order, of the filtered traversal rooted at
    /// the whole message; the root itself is position 0. Expands the tree
    /// only as far as needed. `None` when the input exhausts first.
    pub fn get_part(
        &mut self,
        index: usize,
        filter: Option<&PartFilter>,
    ) -> Result<Option<PartId>, Error> {
        let root = self.root;
        self.get_part_of(root, index, filter)
    }

    /// As `get_part`, rooted at an arbitrary part.
    pub fn get_part_of(
        &mut self,
        part: PartId,
        index: usize,
        filter: Option<&PartFilter>,
    ) -> Result<Option<PartId>, Error> {
        let mut remaining = index;
        self.walk(part, filter, &mut remaining)
    }

    fn walk(
        &mut self,
        part: PartId,
        filter: Option<&PartFilter>,
        remaining: &mut usize,
    ) -> Result<Option<PartId>, Error> {
        if filter.map_or(true, |f| f.matches(self, part)) {
            if 0 == *remaining {
                return Ok(Some(part));
            }
            *remaining -= 1;
        }

        let mut ix = 0;
        loop {
            let child = match self.node(part).children.get(ix).copied() {
                Some(child) => child,
                None => match self.parse_next_child(part)? {
                    Some(child) => child,
                    None => return Ok(None),
                },
            };
            if let Some(found) = self.walk(child, filter, remaining)? {
                return Ok(Some(found));
            }
            ix += 1;
        }
    }

    /// Every part of the tree, pre-order, filtered. Drains the parser.
    pub fn get_all_parts(
        &mut self,
        filter: Option<&PartFilter>,
    ) -> Result<Vec<PartId>, Error> {
        let root = self.root;
        self.get_all_parts_of(root, filter)
    }

    /// As `get_all_parts`, rooted at an arbitrary part.
    pub fn get_all_parts_of(
        &mut self,
        part: PartId,
        filter: Option<&PartFilter>,
    ) -> Result<Vec<PartId>, Error> {
        self.drain(part)?;
        let mut out = Vec::new();
        self.collect(part, filter, &mut out);
        Ok(out)
    }

    /// The direct children of `part`, filtered. Drains that part's own
    /// children but not their subtrees' laziness state beyond what the
    /// sibling protocol already forces.
    pub fn get_child_parts(
        &mut self,
        part: PartId,
        filter: Option<&PartFilter>,
    ) -> Result<Vec<PartId>, Error> {
        self.drain(part)?;
        let children = self.node(part).children.clone();
        Ok(children
            .into_iter()
            .filter(|&child| {
                filter.map_or(true, |f| f.matches(self, child))
            })
            .collect())
    }

    /// The `index`-th direct child matching the filter, pulling children
    /// lazily, without recursing into grandchildren.
    pub fn get_child(
        &mut self,
        part: PartId,
        index: usize,
        filter: Option<&PartFilter>,
    ) -> Result<Option<PartId>, Error> {
        let mut seen = 0;
        let mut ix = 0;
        loop {
            let child = match self.node(part).children.get(ix).copied() {
                Some(child) => child,
                None => match self.parse_next_child(part)? {
                    Some(child) => child,
                    None => return Ok(None),
                },
            };
            if filter.map_or(true, |f| f.matches(self, child)) {
                if seen == index {
                    return Ok(Some(child));
                }
                seen += 1;
            }
            ix += 1;
        }
    }

    /// Number of parts in the subtree rooted at `part`, itself included.
    pub fn part_count(&mut self, part: PartId) -> Result<usize, Error> {
        self.drain(part)?;
        Ok(self.count_subtree(part))
    }

    /// Iterate the whole filtered tree. Drains first, so the sequence is
    /// the same one an eager parse would have produced.
    pub fn iter_parts(
        &mut self,
        filter: Option<&PartFilter>,
    ) -> Result<impl Iterator<Item = PartId>, Error> {
        Ok(self.get_all_parts(filter)?.into_iter())
    }

    /// Insert a new child under `parent` at `position` (appended when
    /// `None`). The parent must be fully drainable and must carry a
    /// multipart boundary for the writer to be able to frame the child.
    pub fn add_child(
        &mut self,
        parent: PartId,
        part: NewPart,
        position: Option<usize>,
    ) -> Result<PartId, Error> {
        self.drain(parent).map_err(|_| Error::InvalidMutation)?;
        if self.node(parent).boundary.is_none() {
            return Err(Error::InvalidMutation);
        }

        let classified =
            super::builder::classify(&part.headers, false);
        let mut node = PartNode::new(classified.kind, Some(parent));
        node.headers = part.headers;
        node.content_type = classified.content_type;
        node.boundary = classified.boundary;
        node.override_content = Some(part.content);
        node.dirty = true;
        let id = self.alloc(node);

        let children = &mut self.node_mut(parent).children;
        let position = position.unwrap_or(children.len()).min(children.len());
        children.insert(position, id);
        self.node_mut(parent).dirty = true;
        Ok(id)
    }

    /// Detach `part` from its parent. `Ok(false)` when it is the root or
    /// already detached.
    pub fn remove_part(&mut self, part: PartId) -> Result<bool, Error> {
        let parent = match self.node(part).parent {
            Some(parent) => parent,
            None => return Ok(false),
        };
        self.drain(parent).map_err(|_| Error::InvalidMutation)?;

        let pos = self
            .node(parent)
            .children
            .iter()
            .position(|&child| child == part);
        match pos {
            Some(pos) => {
                self.node_mut(parent).children.remove(pos);
                self.node_mut(part).parent = None;
                self.node_mut(parent).dirty = true;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Detach every descendant of `part` matching the filter. Returns how
    /// many parts were removed.
    pub fn remove_all_parts(
        &mut self,
        part: PartId,
        filter: Option<&PartFilter>,
    ) -> Result<usize, Error> {
        self.drain(part).map_err(|_| Error::InvalidMutation)?;
        let mut descendants = Vec::new();
        self.collect(part, filter, &mut descendants);
        descendants.retain(|&d| d != part);

        let mut removed = 0;
        for d in descendants {
            // An earlier removal may have detached an enclosing subtree
            if self.is_attached(d, part) && self.remove_part(d)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Whether `part` is still reachable from `root` via parent links.
    fn is_attached(&self, part: PartId, root: PartId) -> bool {
        let mut cur = Some(part);
        while let Some(p) = cur {
            if p == root {
                return true;
            }
            cur = self.node(p).parent;
        }
        false
    }

    /// Replace the part's content with in-memory bytes. A multipart part
    /// loses its children and becomes a leaf: a content region is either
    /// source-backed or overridden, never both.
    pub fn set_content(
        &mut self,
        part: PartId,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.drain(part).map_err(|_| Error::InvalidMutation)?;

        let children = std::mem::take(&mut self.node_mut(part).children);
        for child in children {
            self.node_mut(child).parent = None;
        }

        let node = self.node_mut(part);
        node.boundary = None;
        node.override_content = Some(content.into());
        node.dirty = true;
        Ok(())
    }

    /// A decoded stream over the part's content: transfer decoding per
    /// Content-Transfer-Encoding (uudecode for uuencoded parts), then,
    /// when `decode_charset` is set and the part is text, conversion to
    /// UTF-8 per the declared charset. Override content set by mutation
    /// is yielded exactly as stored.
    pub fn content_reader(
        &mut self,
        part: PartId,
        decode_charset: bool,
    ) -> Result<Box<dyn Read + '_>, Error> {
        self.drain(part)?;

        if self.node(part).override_content.is_some() {
            let content =
                self.node(part).override_content.as_deref().unwrap();
            return Ok(Box::new(Cursor::new(content)));
        }

        let node = self.node(part);
        let (from, to) = node.content_range;
        let is_uu = PartKind::UuEncoded == node.kind;
        let cte = if is_uu {
            None
        } else {
            node.headers
                .get("Content-Transfer-Encoding")
                .and_then(parse_content_transfer_encoding)
        };
        // Resolve the target encoding up front; an unknown charset label
        // downgrades to serving the transfer-decoded bytes as-is.
        let encoding = if decode_charset && self.is_text(part) {
            let label = self
                .node(part)
                .content_type
                .as_ref()
                .and_then(|ct| ct.parm("charset"))
                .unwrap_or(b"us-ascii");
            encoding_rs::Encoding::for_label_no_replacement(label)
        } else {
            None
        };

        let raw = self.src.range_reader(from, to);
        let transfer: Box<dyn Read + '_> = if is_uu {
            Box::new(UuReader::new(raw))
        } else {
            match cte.unwrap_or_default() {
                ContentTransferEncoding::Base64 => {
                    Box::new(Base64Reader::new(raw))
                },
                ContentTransferEncoding::QuotedPrintable => {
                    Box::new(QpReader::new(raw))
                },
                ContentTransferEncoding::SevenBit
                | ContentTransferEncoding::EightBit
                | ContentTransferEncoding::Binary => Box::new(raw),
            }
        };

        match encoding {
            Some(encoding) => {
                Ok(Box::new(CharsetReader::new(transfer, encoding)))
            },
            None => Ok(transfer),
        }
    }

    /// The part's content, fully read and decoded.
    pub fn decoded_content(
        &mut self,
        part: PartId,
        decode_charset: bool,
    ) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.content_reader(part, decode_charset)?
            .read_to_end(&mut out)
            .map_err(Error::Io)?;
        Ok(out)
    }

    /// The exact original bytes of the part: header block, blank line, and
    /// content. For a mutated subtree this is its re-emission instead.
    pub fn original_bytes(&mut self, part: PartId) -> Result<Vec<u8>, Error> {
        self.drain(part)?;
        let mut out = Vec::new();
        if self.subtree_dirty(part) {
            self.write_to(part, &mut out)?;
        } else {
            let (from, to) = self.full_range(part);
            self.src.read_range(from, to, &mut out).map_err(io_error)?;
        }
        Ok(out)
    }

    /// The raw (still transfer-encoded) content bytes of the part.
    pub fn raw_content(&mut self, part: PartId) -> Result<Vec<u8>, Error> {
        self.drain(part)?;
        if let Some(content) = &self.node(part).override_content {
            return Ok(content.clone());
        }
        let (from, to) = self.node(part).content_range;
        let mut out = Vec::new();
        self.src.read_range(from, to, &mut out).map_err(io_error)?;
        Ok(out)
    }
}

fn io_error(e: io::Error) -> Error {
    Error::Io(e)
}

// Traversal and mutation are exercised end-to-end by the tests in
// `parser.rs`, `writer.rs`, `filter.rs`, and `body.rs`.
