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

//! Classification of a header block into the right part variant.
//!
//! The rules, in order:
//!
//! - At the root, a message carrying neither Content-Type nor Mime-Version
//!   is not MIME at all; its body may still hold uuencoded files.
//! - `multipart/*` with a `boundary` parameter streams children delimited
//!   by that boundary. A multipart without a usable boundary parameter is
//!   handled as a leaf and flagged, since its children are unrecoverable.
//! - `message/rfc822` embeds exactly one recursively parsed message.
//! - Everything else is a leaf.

use log::warn;

use super::header::{parse_content_type, ContentType};
use super::headers::HeaderMap;
use super::tree::{PartId, PartKind, PartNode, Phase};

pub(crate) struct Classified {
    pub kind: PartKind,
    pub content_type: Option<ContentType>,
    pub boundary: Option<Vec<u8>>,
}

pub(crate) fn classify(headers: &HeaderMap, at_root: bool) -> Classified {
    if at_root
        && headers.get("Content-Type").is_none()
        && headers.get("Mime-Version").is_none()
    {
        return Classified {
            kind: PartKind::NonMime,
            content_type: None,
            boundary: None,
        };
    }

    let content_type =
        headers.get("Content-Type").and_then(parse_content_type);

    let boundary = content_type
        .as_ref()
        .filter(|ct| ct.is_type("multipart"))
        .and_then(|ct| ct.parm("boundary"))
        .filter(|b| !b.is_empty())
        .map(|b| b.to_vec());

    let kind = if at_root {
        PartKind::Message
    } else if content_type
        .as_ref()
        .is_some_and(|ct| ct.is_type("message") && ct.is_subtype("rfc822"))
    {
        PartKind::Message
    } else {
        PartKind::Mime
    };

    Classified {
        kind,
        content_type,
        boundary,
    }
}

/// Build a freshly parsed part from its header block. The node starts in
/// the `Content` phase with its content start pinned at the end of the
/// header block; everything else is discovered lazily.
pub(crate) fn build_part(
    headers: HeaderMap,
    parent: Option<PartId>,
    at_root: bool,
    header_range: (u64, u64),
) -> PartNode {
    let classified = classify(&headers, at_root);

    let declared_multipart = classified
        .content_type
        .as_ref()
        .is_some_and(|ct| ct.is_type("multipart"));
    let missing_boundary =
        declared_multipart && classified.boundary.is_none();
    if missing_boundary {
        warn!(
            "multipart part at offset {} has no usable boundary parameter",
            header_range.0
        );
    }

    let mut node = PartNode::new(classified.kind, parent);
    node.headers = headers;
    node.content_type = classified.content_type;
    node.boundary = classified.boundary;
    node.header_range = header_range;
    node.content_range = (header_range.1, header_range.1);
    node.missing_boundary = missing_boundary;
    node.phase = Phase::Content;
    node
}
