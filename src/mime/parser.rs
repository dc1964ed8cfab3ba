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

//! The lazy, stream-position-driven parser.
//!
//! The whole tree shares one logical read cursor. The invariant that makes
//! this workable: before the parser reads a new sibling, the most recent
//! sibling's subtree is drained completely, so the cursor always sits at a
//! well-known place when a part pulls its next child:
//!
//! - a part in the `Content` phase has the cursor (logically) at its
//!   content start, which is pinned at build time;
//! - a multipart part in the `Children` phase has the cursor at a boundary
//!   line: its own separator or terminator on the happy path, an
//!   enclosing part's boundary or EOF when the input is damaged;
//! - an embedded message in `Children` has it at the sub-message's header
//!   block, and a non-MIME root somewhere in its flat body.
//!
//! It is designed to be robust moreso than strictly correct: wildly
//! malformed input degrades to flagged, flattened parts rather than
//! errors. The only fatal parse error is an I/O failure from the source,
//! which poisons further expansion but leaves the finished parts usable.

use std::io::{self, Read, Seek};

use log::warn;

use super::builder;
use super::header_block::{read_header_block, read_header_block_until};
use super::source::{line_ending_len, trim_line_ending, ByteSource};
use super::tree::{Message, PartId, PartKind, PartNode, Phase, UuInfo};
use super::uuencode;
use crate::support::error::Error;

/// Hard cap on nesting depth, after which deeper structure is treated as
/// opaque leaf content.
const MAX_RECURSION: usize = 20;
/// Hard cap on the number of parts discovered in one message.
const MAX_PARTS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundaryMatch {
    Separator,
    Terminator,
}

struct ScanResult {
    /// Where the scanned region ends. The line ending immediately before a
    /// matched boundary line belongs to the boundary, not the region.
    end: u64,
    /// Which stop (index into the nearest-first boundary list) matched and
    /// how; `None` means the scan hit EOF.
    hit: Option<(usize, BoundaryMatch)>,
}

impl<R: Read + Seek> Message<R> {
    /// Parse the root of a message. Reads exactly the root header block;
    /// all structure below is discovered as it is traversed.
    pub fn parse(reader: R) -> Result<Self, Error> {
        let mut src = ByteSource::new(reader);
        let block = read_header_block(&mut src)?;
        let node =
            builder::build_part(block.headers, None, true, (0, block.end_offset));

        let mut msg = Message {
            src,
            nodes: Vec::new(),
            cursor: block.end_offset,
            aborted: false,
            root: PartId(0),
        };
        msg.nodes.push(node);
        Ok(msg)
    }

    /// Force the entire subtree under `part` to be parsed.
    pub(crate) fn drain(&mut self, part: PartId) -> Result<(), Error> {
        self.ensure_content_located(part)?;
        while Phase::Finished != self.node(part).phase {
            if self.parse_next_child(part)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Pull one more child of `part` out of the stream, or learn that
    /// there are none left. The single step all lazy traversal builds on.
    pub(crate) fn parse_next_child(
        &mut self,
        parent: PartId,
    ) -> Result<Option<PartId>, Error> {
        if Phase::Finished == self.node(parent).phase {
            return Ok(None);
        }
        if self.aborted {
            return Err(Error::ParseAborted);
        }

        self.ensure_content_located(parent)?;
        if Phase::Finished == self.node(parent).phase {
            return Ok(None);
        }

        // Single-cursor invariant: the previous sibling subtree must be
        // fully parsed before the stream advances to the next sibling.
        if let Some(&last) = self.node(parent).children.last() {
            self.drain(last)?;
        }

        if self.nodes.len() >= MAX_PARTS {
            self.finish_at_cursor(parent);
            return Ok(None);
        }

        if self.node(parent).boundary.is_some() {
            self.next_multipart_child(parent)
        } else if self.is_embedded_message(parent) {
            self.next_embedded_message_child(parent)
        } else {
            self.next_uuencode_child(parent)
        }
    }

    /// Advance `part` out of the `Content` phase: find where its content
    /// starts and, for leaves, where it ends.
    fn ensure_content_located(&mut self, part: PartId) -> Result<(), Error> {
        if Phase::Content != self.node(part).phase {
            return Ok(());
        }
        if self.aborted {
            return Err(Error::ParseAborted);
        }

        let content_start = self.node(part).header_range.1;
        self.cursor = content_start;

        if self.depth(part) >= MAX_RECURSION {
            // Too deep; whatever structure is below becomes leaf content
            return self.locate_leaf_content(part, content_start);
        }

        if self.node(part).boundary.is_some() {
            self.locate_multipart_content(part, content_start)
        } else if self.is_embedded_message(part)
            || (PartKind::NonMime == self.node(part).kind
                && self.node(part).parent.is_none())
        {
            self.node_mut(part).phase = Phase::Children;
            Ok(())
        } else {
            self.locate_leaf_content(part, content_start)
        }
    }

    fn locate_leaf_content(
        &mut self,
        part: PartId,
        content_start: u64,
    ) -> Result<(), Error> {
        let stops = self.enclosing_boundaries(part);
        let scan = self.scan_until_boundary(&stops)?;

        let nested = !stops.is_empty();
        let node = self.node_mut(part);
        node.content_range = (content_start, scan.end);
        node.phase = Phase::Finished;
        if scan.hit.is_none() && nested {
            node.truncated = true;
        }
        Ok(())
    }

    fn locate_multipart_content(
        &mut self,
        part: PartId,
        content_start: u64,
    ) -> Result<(), Error> {
        let own = self
            .node(part)
            .boundary
            .clone()
            .expect("locate_multipart_content on boundary-less part");
        let mut stops = vec![own];
        stops.extend(self.enclosing_boundaries(part));

        let scan = self.scan_until_boundary(&stops)?;
        match scan.hit {
            Some((0, _)) => {
                // Everything before the first delimiter is preamble. The
                // cursor rests on the boundary line itself; the child
                // pull examines it.
                self.node_mut(part).preamble = (content_start, scan.end);
                self.node_mut(part).phase = Phase::Children;
                Ok(())
            },
            _ => {
                // The declared boundary never appears. Everything up to
                // the enclosing boundary (or EOF) is preamble and the
                // part has no children.
                warn!(
                    "multipart boundary never seen in body at offset {}",
                    content_start
                );
                let truncated =
                    scan.hit.is_none() && self.node(part).parent.is_some();
                let node = self.node_mut(part);
                node.preamble = (content_start, scan.end);
                node.content_range = (content_start, scan.end);
                node.missing_boundary = true;
                node.truncated = truncated;
                node.phase = Phase::Finished;
                Ok(())
            },
        }
    }

    /// In `Children` phase the cursor is at a boundary line; decide
    /// whether it opens another child, terminates this part, or belongs
    /// to someone above us.
    fn next_multipart_child(
        &mut self,
        parent: PartId,
    ) -> Result<Option<PartId>, Error> {
        check(&mut self.aborted, self.src.seek(self.cursor))?;
        let line = check(&mut self.aborted, self.src.peek_line())?
            .map(|l| l.to_vec());
        let line = match line {
            Some(line) => line,
            None => {
                // EOF with the terminator still owed
                let end = self.cursor;
                let node = self.node_mut(parent);
                node.truncated = true;
                node.content_range.1 = end;
                node.phase = Phase::Finished;
                return Ok(None);
            },
        };

        let own = self
            .node(parent)
            .boundary
            .clone()
            .expect("next_multipart_child on boundary-less part");
        match match_boundary(&line, &own) {
            Some(BoundaryMatch::Separator) => {
                self.consume_line()?;
                let header_start = self.cursor;
                let child = self.read_child_headers(parent, header_start)?;
                Ok(Some(child))
            },
            Some(BoundaryMatch::Terminator) => {
                self.consume_line()?;
                self.finish_multipart(parent)?;
                Ok(None)
            },
            None => {
                // An enclosing part's boundary (or stray bytes after an
                // inner part hijacked our boundary): this part never saw
                // its terminator.
                let end = self
                    .node(parent)
                    .children
                    .last()
                    .map(|&c| self.node(c).content_range.1)
                    .unwrap_or(self.node(parent).preamble.1);
                let node = self.node_mut(parent);
                node.truncated = true;
                node.content_range.1 = end;
                node.phase = Phase::Finished;
                Ok(None)
            },
        }
    }

    /// Past the terminator: the remaining bytes up to the enclosing
    /// boundary are this part's epilogue.
    fn finish_multipart(&mut self, parent: PartId) -> Result<(), Error> {
        let epilogue_start = self.cursor;
        let stops = self.enclosing_boundaries(parent);
        let scan = self.scan_until_boundary(&stops)?;

        let node = self.node_mut(parent);
        node.epilogue = (epilogue_start, scan.end);
        node.content_range.1 = scan.end;
        node.phase = Phase::Finished;
        Ok(())
    }

    /// A `message/rfc822` part embeds exactly one recursively parsed
    /// message.
    fn next_embedded_message_child(
        &mut self,
        parent: PartId,
    ) -> Result<Option<PartId>, Error> {
        if !self.node(parent).children.is_empty() {
            // The single sub-message is read; its extent bounds ours.
            let end = self
                .node(parent)
                .children
                .last()
                .map(|&c| self.node(c).content_range.1)
                .expect("children non-empty");
            let node = self.node_mut(parent);
            node.content_range.1 = end;
            node.phase = Phase::Finished;
            return Ok(None);
        }

        check(&mut self.aborted, self.src.seek(self.cursor))?;
        let peek = check(&mut self.aborted, self.src.peek_line())?
            .map(|l| l.to_vec());
        match peek {
            None => {
                // Nothing embedded at all
                let end = self.cursor;
                let node = self.node_mut(parent);
                node.content_range.1 = end;
                node.truncated = true;
                node.phase = Phase::Finished;
                Ok(None)
            },
            Some(line) => {
                let stops = self.enclosing_boundaries(parent);
                if stops
                    .iter()
                    .any(|b| match_boundary(&line, b).is_some())
                {
                    // Empty sub-message region
                    let end = self.cursor;
                    let node = self.node_mut(parent);
                    node.content_range.1 = end;
                    node.phase = Phase::Finished;
                    return Ok(None);
                }
                let header_start = self.cursor;
                let child = self.read_child_headers(parent, header_start)?;
                Ok(Some(child))
            },
        }
    }

    /// Scan a non-MIME body for the next uuencode stanza. Text runs
    /// between stanzas become plain children; a body with no stanzas at
    /// all keeps its text inline and has no children.
    fn next_uuencode_child(
        &mut self,
        parent: PartId,
    ) -> Result<Option<PartId>, Error> {
        check(&mut self.aborted, self.src.seek(self.cursor))?;
        let region_start = self.cursor;
        let mut gap_has_text = false;

        loop {
            let line_start = self.src.tell();
            let line = check(&mut self.aborted, self.src.read_line())?
                .map(|l| l.to_vec());
            let line = match line {
                Some(line) => line,
                None => {
                    self.cursor = line_start;
                    let has_children =
                        !self.node(parent).children.is_empty();
                    if has_children && gap_has_text {
                        // Trailing text after the last stanza
                        let child = self
                            .make_text_run(parent, region_start, line_start);
                        return Ok(Some(child));
                    }
                    let node = self.node_mut(parent);
                    node.content_range.1 = line_start;
                    node.phase = Phase::Finished;
                    return Ok(None);
                },
            };

            if let Some((mode, filename)) = uuencode::parse_begin_line(&line)
            {
                if gap_has_text {
                    // Emit the text run first; the next pull re-reads the
                    // begin line with an empty gap before it.
                    self.cursor = line_start;
                    let child =
                        self.make_text_run(parent, region_start, line_start);
                    return Ok(Some(child));
                }
                let data_start = self.src.tell();
                return self
                    .read_uuencode_stanza(
                        parent, line_start, data_start, mode, filename,
                    )
                    .map(Some);
            }

            if !gap_has_text
                && trim_line_ending(&line)
                    .iter()
                    .any(|&b| b != b' ' && b != b'\t')
            {
                gap_has_text = true;
            }
        }
    }

    fn read_uuencode_stanza(
        &mut self,
        parent: PartId,
        begin_start: u64,
        data_start: u64,
        mode: u32,
        filename: String,
    ) -> Result<PartId, Error> {
        loop {
            let line_start = self.src.tell();
            let line = check(&mut self.aborted, self.src.read_line())?
                .map(|l| l.to_vec());
            match line {
                None => {
                    // EOF before the closing `end`
                    self.cursor = line_start;
                    return Ok(self.make_uu_child(
                        parent,
                        begin_start,
                        data_start,
                        line_start,
                        (line_start, line_start),
                        mode,
                        filename,
                        true,
                    ));
                },
                Some(line) => {
                    if uuencode::is_end_line(&line) {
                        let after_end = self.src.tell();
                        self.cursor = after_end;
                        return Ok(self.make_uu_child(
                            parent,
                            begin_start,
                            data_start,
                            line_start,
                            (line_start, after_end),
                            mode,
                            filename,
                            false,
                        ));
                    }
                },
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn make_uu_child(
        &mut self,
        parent: PartId,
        begin_start: u64,
        data_start: u64,
        data_end: u64,
        end_line: (u64, u64),
        mode: u32,
        filename: String,
        truncated: bool,
    ) -> PartId {
        let mut node = PartNode::new(PartKind::UuEncoded, Some(parent));
        node.uu = Some(UuInfo { filename, mode });
        node.header_range = (begin_start, data_start);
        node.content_range = (data_start, data_end);
        node.epilogue = end_line;
        node.truncated = truncated;
        let id = self.alloc(node);
        self.node_mut(parent).children.push(id);
        id
    }

    fn make_text_run(
        &mut self,
        parent: PartId,
        start: u64,
        end: u64,
    ) -> PartId {
        let mut node = PartNode::new(PartKind::NonMime, Some(parent));
        node.header_range = (start, start);
        node.content_range = (start, end);
        let id = self.alloc(node);
        self.node_mut(parent).children.push(id);
        id
    }

    fn read_child_headers(
        &mut self,
        parent: PartId,
        header_start: u64,
    ) -> Result<PartId, Error> {
        check(&mut self.aborted, self.src.seek(header_start))?;

        // A header area that runs straight into an active boundary (a
        // blank-line-less part) ends at the boundary instead of eating it.
        let mut stops = self
            .node(parent)
            .boundary
            .clone()
            .into_iter()
            .collect::<Vec<_>>();
        stops.extend(self.enclosing_boundaries(parent));

        let result = read_header_block_until(&mut self.src, |line| {
            stops.iter().any(|b| match_boundary(line, b).is_some())
        });
        let block = match result {
            Ok(block) => block,
            Err(e) => {
                self.aborted = true;
                return Err(Error::Io(e));
            },
        };
        self.cursor = block.end_offset;

        let node = builder::build_part(
            block.headers,
            Some(parent),
            false,
            (header_start, block.end_offset),
        );
        let id = self.alloc(node);
        self.node_mut(parent).children.push(id);
        Ok(id)
    }

    /// Read lines until EOF or a line matching one of `stops`
    /// (nearest-first boundary tokens). The cursor is left at the start of
    /// the matched boundary line, or at EOF.
    fn scan_until_boundary(
        &mut self,
        stops: &[Vec<u8>],
    ) -> Result<ScanResult, Error> {
        check(&mut self.aborted, self.src.seek(self.cursor))?;
        let mut prev_term = 0usize;

        loop {
            let line_start = self.src.tell();
            let line = check(&mut self.aborted, self.src.read_line())?
                .map(|l| l.to_vec());
            let line = match line {
                Some(line) => line,
                None => {
                    self.cursor = line_start;
                    return Ok(ScanResult {
                        end: line_start,
                        hit: None,
                    });
                },
            };

            for (ix, boundary) in stops.iter().enumerate() {
                if let Some(m) = match_boundary(&line, boundary) {
                    self.cursor = line_start;
                    return Ok(ScanResult {
                        end: line_start - prev_term as u64,
                        hit: Some((ix, m)),
                    });
                }
            }
            prev_term = line_ending_len(&line);
        }
    }

    fn consume_line(&mut self) -> Result<(), Error> {
        check(&mut self.aborted, self.src.seek(self.cursor))?;
        check(&mut self.aborted, self.src.read_line())?;
        self.cursor = self.src.tell();
        Ok(())
    }

    fn finish_at_cursor(&mut self, parent: PartId) {
        let end = self.cursor;
        let node = self.node_mut(parent);
        node.truncated = true;
        node.content_range.1 = node.content_range.1.max(end);
        node.phase = Phase::Finished;
    }

    /// Boundary tokens of every multipart ancestor, nearest first.
    fn enclosing_boundaries(&self, part: PartId) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut cur = self.node(part).parent;
        while let Some(p) = cur {
            if let Some(b) = &self.node(p).boundary {
                out.push(b.clone());
            }
            cur = self.node(p).parent;
        }
        out
    }

    fn depth(&self, part: PartId) -> usize {
        let mut depth = 0;
        let mut cur = self.node(part).parent;
        while let Some(p) = cur {
            depth += 1;
            cur = self.node(p).parent;
        }
        depth
    }
}

/// Classify one line against one boundary token. Leading and trailing
/// whitespace on the line are tolerated.
fn match_boundary(line: &[u8], boundary: &[u8]) -> Option<BoundaryMatch> {
    let t = trim_ws(trim_line_ending(line));
    let t = t.strip_prefix(b"--" as &[u8])?;
    let t = t.strip_prefix(boundary)?;
    if t.is_empty() {
        Some(BoundaryMatch::Separator)
    } else if b"--" == t {
        Some(BoundaryMatch::Terminator)
    } else {
        None
    }
}

fn trim_ws(mut s: &[u8]) -> &[u8] {
    while let Some((&b' ' | &b'\t', rest)) = s.split_first() {
        s = rest;
    }
    while let Some((&b' ' | &b'\t', rest)) = s.split_last() {
        s = rest;
    }
    s
}

fn check<T>(aborted: &mut bool, r: io::Result<T>) -> Result<T, Error> {
    match r {
        Ok(v) => Ok(v),
        Err(e) => {
            *aborted = true;
            Err(Error::Io(e))
        },
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::super::filter::PartFilter;
    use super::*;

    fn msg(data: &[u8]) -> Message<Cursor<Vec<u8>>> {
        Message::parse(Cursor::new(data.to_vec())).unwrap()
    }

    fn text(m: &mut Message<Cursor<Vec<u8>>>, part: PartId) -> String {
        String::from_utf8(m.decoded_content(part, false).unwrap()).unwrap()
    }

    const TWO_PART_ALTERNATIVE: &[u8] =
        b"From: a@x\r\n\
          Content-Type: multipart/alternative; boundary=\"X\"\r\n\
          \r\n\
          --X\r\n\
          Content-Type: text/plain\r\n\
          \r\n\
          plain\r\n\
          --X\r\n\
          Content-Type: text/html\r\n\
          \r\n\
          <p>h</p>\r\n\
          --X--\r\n";

    #[test]
    fn simple_text_message_is_non_mime() {
        let mut m =
            msg(b"From: a@x\r\nTo: b@y\r\nSubject: hi\r\n\r\nHello\r\n");
        let root = m.root();
        assert_eq!(PartKind::NonMime, m.kind(root));
        assert_eq!(0, m.get_child_parts(root, None).unwrap().len());
        assert_eq!("Hello\r\n", text(&mut m, root));
        assert_eq!(1, m.part_count(root).unwrap());
        assert_eq!(
            b"hi" as &[u8],
            m.header_value(root, "subject").unwrap()
        );
    }

    #[test]
    fn two_part_alternative_structure() {
        let mut m = msg(TWO_PART_ALTERNATIVE);
        let root = m.root();

        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(2, children.len());
        assert_eq!("plain", text(&mut m, children[0]));
        assert_eq!("<p>h</p>", text(&mut m, children[1]));

        let all = m.get_all_parts(None).unwrap();
        assert_eq!(3, all.len());
        assert_eq!(root, all[0]);

        let plain_filter = PartFilter::new().content_type("text/plain");
        let found = m.get_part(1, Some(&plain_filter)).unwrap().unwrap();
        assert_eq!(children[0], found);
        assert_eq!("plain", text(&mut m, found));
    }

    #[test]
    fn lazy_and_eager_traversal_agree() {
        // Lazily pick one part first, then list everything
        let mut lazy = msg(TWO_PART_ALTERNATIVE);
        let picked = lazy.get_part(1, None).unwrap().unwrap();
        assert_eq!(PartId(1), picked);
        let after_lazy = lazy.get_all_parts(None).unwrap();

        let mut eager = msg(TWO_PART_ALTERNATIVE);
        let all_eager = eager.get_all_parts(None).unwrap();

        assert_eq!(all_eager, after_lazy);
    }

    #[test]
    fn get_part_is_incremental() {
        let mut m = msg(TWO_PART_ALTERNATIVE);
        // Pulling the second part must not have parsed past it
        let c1 = m.get_part(1, None).unwrap().unwrap();
        assert_eq!(2, m.nodes.len());
        let c2 = m.get_part(2, None).unwrap().unwrap();
        assert_eq!(3, m.nodes.len());
        assert_ne!(c1, c2);
        assert!(m.get_part(3, None).unwrap().is_none());
    }

    #[test]
    fn get_child_scans_direct_children_only() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=outer\r\n\
              \r\n\
              --outer\r\n\
              Content-Type: multipart/alternative; boundary=inner\r\n\
              \r\n\
              --inner\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              nested\r\n\
              --inner--\r\n\
              --outer\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              direct\r\n\
              --outer--\r\n",
        );
        let root = m.root();
        // Index 1 must be the second direct child, not the nested leaf
        let second = m.get_child(root, 1, None).unwrap().unwrap();
        assert_eq!("direct", text(&mut m, second));
        assert!(m.get_child(root, 2, None).unwrap().is_none());

        // With a filter, only matching direct children are counted
        let plain = PartFilter::new().content_type("text/plain").leaves_only();
        let first_plain = m.get_child(root, 0, Some(&plain)).unwrap();
        assert_eq!(Some(second), first_plain);
    }

    #[test]
    fn part_count_recurrence() {
        let mut m = msg(TWO_PART_ALTERNATIVE);
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        let sum: usize = children
            .iter()
            .map(|&c| m.part_count(c).unwrap())
            .sum();
        assert_eq!(sum + 1, m.part_count(root).unwrap());
    }

    #[test]
    fn nested_multipart_depth_first_order() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=outer\r\n\
              \r\n\
              --outer\r\n\
              Content-Type: multipart/alternative; boundary=inner\r\n\
              \r\n\
              --inner\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              plain\r\n\
              --inner\r\n\
              Content-Type: text/html\r\n\
              \r\n\
              <p>h</p>\r\n\
              --inner--\r\n\
              --outer\r\n\
              Content-Type: application/octet-stream\r\n\
              Content-Transfer-Encoding: base64\r\n\
              \r\n\
              AAEC\r\n\
              --outer--\r\n",
        );

        let all = m.get_all_parts(None).unwrap();
        assert_eq!(5, all.len());
        let types = all
            .iter()
            .map(|&p| m.effective_content_type(p))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                "multipart/mixed",
                "multipart/alternative",
                "text/plain",
                "text/html",
                "application/octet-stream",
            ],
            types
        );
        assert_eq!(
            vec![0, 1, 2, 2, 1],
            all.iter().map(|&p| m.depth(p)).collect::<Vec<_>>()
        );

        // The base64 attachment decodes through the normal channel
        assert_eq!(
            vec![0u8, 1, 2],
            m.decoded_content(all[4], false).unwrap()
        );
    }

    #[test]
    fn preamble_and_epilogue_are_preserved() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              This is the preamble.\r\n\
              --b\r\n\
              \r\n\
              content\r\n\
              --b--\r\n\
              This is the epilogue.\r\n",
        );
        let root = m.root();
        m.drain(root).unwrap();

        let (p0, p1) = m.node(root).preamble;
        let mut preamble = Vec::new();
        m.src.read_range(p0, p1, &mut preamble).unwrap();
        assert_eq!(b"This is the preamble." as &[u8], &preamble[..]);

        let (e0, e1) = m.node(root).epilogue;
        let mut epilogue = Vec::new();
        m.src.read_range(e0, e1, &mut epilogue).unwrap();
        assert_eq!(b"This is the epilogue.\r\n" as &[u8], &epilogue[..]);
    }

    #[test]
    fn boundary_lines_tolerate_whitespace() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b  \r\n\
              \r\n\
              one\r\n\
              \t--b--\t\r\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        assert_eq!("one", text(&mut m, children[0]));
        assert!(!m.truncated(root));
    }

    #[test]
    fn missing_boundary_recovers_as_preamble() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=never\r\n\
              \r\n\
              no delimiters here\r\n\
              at all\r\n",
        );
        let root = m.root();
        assert_eq!(0, m.get_child_parts(root, None).unwrap().len());
        assert!(m.missing_boundary(root));
        assert!(!m.truncated(root));
    }

    #[test]
    fn truncated_multipart_is_flagged() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              cut off here",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        assert!(m.truncated(root));
        assert!(m.truncated(children[0]));
        assert_eq!("cut off here", text(&mut m, children[0]));
    }

    #[test]
    fn mixed_line_endings_parse() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\n\
              \n\
              --b\n\
              Content-Type: text/plain\n\
              \n\
              unix body\n\
              --b--\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        assert_eq!("unix body", text(&mut m, children[0]));
    }

    #[test]
    fn embedded_message_parses_recursively() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: message/rfc822\r\n\
              \r\n\
              Subject: inner\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              inner body\r\n\
              --b--\r\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        let rfc822 = children[0];
        assert_eq!(PartKind::Message, m.kind(rfc822));

        let inner = m.get_child_parts(rfc822, None).unwrap();
        assert_eq!(1, inner.len());
        assert_eq!(
            b"inner" as &[u8],
            m.header_value(inner[0], "subject").unwrap()
        );
        assert_eq!("inner body", text(&mut m, inner[0]));
    }

    #[test]
    fn inner_boundary_wins_over_identical_parent_boundary() {
        // A nested multipart maliciously declares its parent's boundary.
        // The inner part claims it until its own terminator; the parent
        // then cannot find its terminator and closes truncated.
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: multipart/alternative; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              stolen\r\n\
              --b--\r\n",
        );
        let root = m.root();
        let outer_children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, outer_children.len());
        let inner = outer_children[0];
        let inner_children = m.get_child_parts(inner, None).unwrap();
        assert_eq!(1, inner_children.len());
        assert_eq!("stolen", text(&mut m, inner_children[0]));
        assert!(!m.truncated(inner));
        assert!(m.truncated(root));
    }

    #[test]
    fn uuencoded_stanza_becomes_child() {
        let mut m = msg(
            b"From: a@x\r\n\
              Subject: files\r\n\
              \r\n\
              begin 644 file.bin\r\n\
              #0V%T\r\n\
              `\r\n\
              end\r\n",
        );
        let root = m.root();
        assert_eq!(PartKind::NonMime, m.kind(root));

        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        let uu = children[0];
        assert_eq!(PartKind::UuEncoded, m.kind(uu));
        assert_eq!(Some("file.bin"), m.uu_filename(uu));
        assert_eq!(Some(0o644), m.uu_mode(uu));
        assert_eq!(b"Cat".to_vec(), m.decoded_content(uu, false).unwrap());
    }

    #[test]
    fn text_between_stanzas_becomes_plain_children() {
        let mut m = msg(
            b"From: a@x\r\n\
              \r\n\
              Here is the first file.\r\n\
              begin 644 a.bin\r\n\
              #0V%T\r\n\
              end\r\n\
              And a second one.\r\n\
              begin 755 b.bin\r\n\
              #0V%T\r\n\
              end\r\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(4, children.len());

        assert_eq!(PartKind::NonMime, m.kind(children[0]));
        assert_eq!(
            "Here is the first file.\r\n",
            text(&mut m, children[0])
        );
        assert_eq!(PartKind::UuEncoded, m.kind(children[1]));
        assert_eq!(Some("a.bin"), m.uu_filename(children[1]));
        assert_eq!(PartKind::NonMime, m.kind(children[2]));
        assert_eq!("And a second one.\r\n", text(&mut m, children[2]));
        assert_eq!(Some("b.bin"), m.uu_filename(children[3]));
        assert_eq!(Some(0o755), m.uu_mode(children[3]));
    }

    #[test]
    fn blank_gaps_between_stanzas_are_skipped() {
        let mut m = msg(
            b"From: a@x\r\n\
              \r\n\
              \r\n\
              begin 644 a.bin\r\n\
              #0V%T\r\n\
              end\r\n\
              \r\n   \r\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        assert_eq!(PartKind::UuEncoded, m.kind(children[0]));
    }

    #[test]
    fn empty_multipart_has_no_children() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b--\r\n",
        );
        let root = m.root();
        assert_eq!(0, m.get_child_parts(root, None).unwrap().len());
        assert!(!m.truncated(root));
        assert!(!m.missing_boundary(root));
    }

    #[test]
    fn empty_part_body_has_empty_content() {
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              --b--\r\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        assert_eq!("", text(&mut m, children[0]));
    }

    #[test]
    fn part_without_blank_line_ends_at_boundary() {
        // The child's header area runs straight into the terminator
        let mut m = msg(
            b"Content-Type: multipart/mixed; boundary=b\r\n\
              \r\n\
              --b\r\n\
              Content-Type: text/plain\r\n\
              --b--\r\n",
        );
        let root = m.root();
        let children = m.get_child_parts(root, None).unwrap();
        assert_eq!(1, children.len());
        assert_eq!("text/plain", m.effective_content_type(children[0]));
        assert_eq!("", text(&mut m, children[0]));
        assert!(!m.truncated(root));
    }

    /// Serves the underlying bytes up to `limit`, then fails every read.
    struct FlakyReader {
        inner: Cursor<Vec<u8>>,
        limit: u64,
    }

    impl io::Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inner.position() >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "flaky"));
            }
            let max = (self.limit - self.inner.position())
                .min(buf.len() as u64) as usize;
            self.inner.read(&mut buf[..max])
        }
    }

    impl io::Seek for FlakyReader {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn io_failure_poisons_expansion_but_not_parsed_parts() {
        use crate::NewPart;

        let mut m = Message::parse(FlakyReader {
            inner: Cursor::new(TWO_PART_ALTERNATIVE.to_vec()),
            limit: 100,
        })
        .unwrap();
        let root = m.root();

        // The first child parses within the served prefix
        let c1 = m.get_part(1, None).unwrap().unwrap();
        assert_eq!(
            b"text/plain" as &[u8],
            m.header_value(c1, "content-type").unwrap()
        );

        // Expanding further hits the failure...
        assert!(matches!(m.get_part(2, None), Err(Error::Io(_))));
        // ...and afterward the parse stays poisoned
        assert!(matches!(
            m.get_part(2, None),
            Err(Error::ParseAborted)
        ));
        assert!(matches!(
            m.add_child(root, NewPart::text("text/plain", "x"), None),
            Err(Error::InvalidMutation)
        ));

        // The successfully parsed parts remain readable
        assert_eq!(
            b"text/plain" as &[u8],
            m.header_value(c1, "content-type").unwrap()
        );
        assert_eq!(b"a@x" as &[u8], m.header_value(root, "from").unwrap());
    }

    #[test]
    fn mime_leaf_root_runs_to_eof() {
        let mut m = msg(
            b"Mime-Version: 1.0\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              whole body\r\nsecond line\r\n",
        );
        let root = m.root();
        assert_eq!(PartKind::Message, m.kind(root));
        assert_eq!(0, m.part_count(root).unwrap() - 1);
        assert_eq!("whole body\r\nsecond line\r\n", text(&mut m, root));
    }
}
