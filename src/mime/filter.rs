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

//! Traversal filters.
//!
//! A `PartFilter` is a plain value resolving three conjunctive criteria:
//! content-type includes/excludes, inline-vs-attachment disposition, and
//! whether container parts (multiparts, embedded messages, a non-MIME
//! root) count at all. Containers are structural, so when they count they
//! count unconditionally; the type and disposition criteria apply to
//! leaves.
//!
//! Filters must be pure over the candidate part: they look at that part's
//! already-parsed headers, never at siblings, so they are safe to apply
//! mid-expansion.

use super::tree::{Message, PartId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

/// A conjunctive part predicate. The default matches every part.
#[derive(Clone, Debug)]
pub struct PartFilter {
    /// Accepted types, `type` or `type/subtype`, lowercase. Empty = any.
    include_types: Vec<String>,
    /// Rejected types, same forms.
    exclude_types: Vec<String>,
    disposition: Option<Disposition>,
    include_containers: bool,
}

impl Default for PartFilter {
    fn default() -> Self {
        PartFilter {
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            disposition: None,
            include_containers: true,
        }
    }
}

impl PartFilter {
    pub fn new() -> Self {
        PartFilter::default()
    }

    /// Accept only this type. `"text"` matches any text subtype;
    /// `"text/plain"` matches exactly. May be called repeatedly to accept
    /// several types.
    pub fn content_type(mut self, pattern: &str) -> Self {
        self.include_types.push(pattern.to_ascii_lowercase());
        self
    }

    /// Reject this type, in the same pattern forms.
    pub fn exclude_content_type(mut self, pattern: &str) -> Self {
        self.exclude_types.push(pattern.to_ascii_lowercase());
        self
    }

    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = Some(disposition);
        self
    }

    /// Exclude container parts, leaving only leaves.
    pub fn leaves_only(mut self) -> Self {
        self.include_containers = false;
        self
    }

    pub fn matches<R>(&self, msg: &Message<R>, part: PartId) -> bool {
        if msg.is_container(part) {
            return self.include_containers;
        }

        let full_type = msg.effective_content_type(part);
        if !self.include_types.is_empty()
            && !self
                .include_types
                .iter()
                .any(|p| type_matches(p, &full_type))
        {
            return false;
        }
        if self
            .exclude_types
            .iter()
            .any(|p| type_matches(p, &full_type))
        {
            return false;
        }

        match self.disposition {
            Some(Disposition::Attachment) => msg.is_attachment(part),
            Some(Disposition::Inline) => !msg.is_attachment(part),
            None => true,
        }
    }
}

fn type_matches(pattern: &str, full_type: &str) -> bool {
    if pattern.contains('/') {
        pattern == full_type
    } else {
        full_type.split('/').next() == Some(pattern)
    }
}
