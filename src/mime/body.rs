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

//! Convenience accessors: thin filters over the traversal core that answer
//! the questions mail clients actually ask. Where is the text body, where
//! is the HTML body, what are the attachments.

use std::io::{Read, Seek};

use super::filter::{Disposition, PartFilter};
use super::tree::{Message, PartId, PartKind};
use crate::support::error::Error;

impl<R: Read + Seek> Message<R> {
    /// The primary plain-text part: for a non-MIME message the flat body
    /// (or its first text run, when uuencoded files split it); for MIME,
    /// the first inline `text/plain` leaf in pre-order.
    pub fn text_part(&mut self) -> Result<Option<PartId>, Error> {
        let root = self.root();
        if PartKind::NonMime == self.kind(root) {
            let children = self.get_child_parts(root, None)?;
            let run = children
                .iter()
                .copied()
                .find(|&c| PartKind::NonMime == self.kind(c));
            return Ok(Some(run.unwrap_or(root)));
        }

        let filter = PartFilter::new()
            .content_type("text/plain")
            .disposition(Disposition::Inline)
            .leaves_only();
        self.get_part(0, Some(&filter))
    }

    /// The first inline `text/html` leaf in pre-order, if any.
    pub fn html_part(&mut self) -> Result<Option<PartId>, Error> {
        let filter = PartFilter::new()
            .content_type("text/html")
            .disposition(Disposition::Inline)
            .leaves_only();
        self.get_part(0, Some(&filter))
    }

    /// Every leaf classified as an attachment, in pre-order.
    pub fn attachment_parts(&mut self) -> Result<Vec<PartId>, Error> {
        let filter = PartFilter::new()
            .disposition(Disposition::Attachment)
            .leaves_only();
        self.get_all_parts(Some(&filter))
    }

    /// The decoded, charset-converted text body, if the message has one.
    pub fn text_content(&mut self) -> Result<Option<String>, Error> {
        match self.text_part()? {
            Some(part) => {
                let bytes = self.decoded_content(part, true)?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            },
            None => Ok(None),
        }
    }

    /// Replace the text body's content in place. Fails with
    /// `InvalidMutation` when the message has no text part.
    pub fn set_text_content(&mut self, body: &str) -> Result<(), Error> {
        match self.text_part()? {
            Some(part) => {
                self.set_content(part, body.as_bytes().to_vec())?;
                // The override is stored raw; a stale transfer encoding
                // declaration would misdescribe it.
                self.headers_mut(part)
                    .remove_all("Content-Transfer-Encoding");
                Ok(())
            },
            None => Err(Error::InvalidMutation),
        }
    }
}
