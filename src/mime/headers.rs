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

//! The ordered, case-insensitive header multimap.
//!
//! Names match ASCII-case-insensitively but every entry remembers the casing
//! it was created with, which is what re-emission uses. Values are raw bytes
//! exactly as they appeared on the wire (unfolded, with the folding
//! whitespace preserved), since headers are not guaranteed to be UTF-8.

/// Maximum output line width when re-folding headers for emission.
const FOLD_LIMIT: usize = 78;

/// The synthetic header name which receives header lines that lack a colon.
///
/// Such lines are recovered, not surfaced as errors; their raw text is
/// concatenated under this name and re-emitted bare (no `name:` prefix).
pub const SENTINEL_HEADER_NAME: &str = "";

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    name: String,
    value: Vec<u8>,
}

/// Case-insensitive multimap from header name to ordered raw values,
/// preserving insertion order for re-emission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Entry>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, keeping any existing entries of the same name.
    pub fn add(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.entries.push(Entry {
            name: name.to_owned(),
            value: value.into(),
        });
    }

    /// Replace all entries named `name` with a single entry, keeping the
    /// position of the first; append at the end if there were none.
    pub fn set(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        let first = self
            .entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name));
        self.entries
            .retain(|e| !e.name.eq_ignore_ascii_case(name));

        let entry = Entry {
            name: name.to_owned(),
            value: value.into(),
        };
        match first {
            Some(ix) => self.entries.insert(ix, entry),
            None => self.entries.push(entry),
        }
    }

    /// The first value named `name`, if any.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.get_nth(name, 0)
    }

    /// The `index`-th value named `name`, if any.
    pub fn get_nth(&self, name: &str, index: usize) -> Option<&[u8]> {
        self.entries
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case(name))
            .nth(index)
            .map(|e| e.value.as_slice())
    }

    /// All values named `name`, in insertion order.
    pub fn get_all<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_slice())
    }

    /// Remove the `index`-th entry named `name`. Returns whether anything
    /// was removed.
    pub fn remove(&mut self, name: &str, index: usize) -> bool {
        let pos = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.name.eq_ignore_ascii_case(name))
            .map(|(ix, _)| ix)
            .nth(index);
        match pos {
            Some(ix) => {
                self.entries.remove(ix);
                true
            },
            None => false,
        }
    }

    /// Remove every entry named `name`, returning how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !e.name.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// All `(name, raw value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_slice()))
    }

    /// Emit every header with CRLF line endings, re-folding long values at
    /// whitespace boundaries. Does not emit the blank separator line.
    pub fn emit(&self, out: &mut Vec<u8>) {
        for e in &self.entries {
            emit_folded(&e.name, &e.value, out);
        }
    }
}

fn emit_folded(name: &str, value: &[u8], out: &mut Vec<u8>) {
    if name.is_empty() {
        // The sentinel entry holds raw header text that never had a name.
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
        return;
    }

    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");

    let mut col = name.len() + 2;
    let mut rest = value;
    while col + rest.len() > FOLD_LIMIT {
        let window = FOLD_LIMIT.saturating_sub(col).min(rest.len());
        // Break at the last whitespace inside the window; failing that, at
        // the first whitespace anywhere. Never break at offset 0, which
        // would make no progress.
        let brk = rest[..window]
            .iter()
            .rposition(is_fold_ws)
            .filter(|&p| p > 0)
            .or_else(|| {
                rest.iter()
                    .skip(1)
                    .position(is_fold_ws)
                    .map(|p| p + 1)
            });
        let p = match brk {
            Some(p) => p,
            // One unbreakable token; emit it over-long
            None => break,
        };

        out.extend_from_slice(&rest[..p]);
        out.extend_from_slice(b"\r\n");
        // The whitespace at the break becomes the continuation lead-in
        rest = &rest[p..];
        col = 0;
    }
    out.extend_from_slice(rest);
    out.extend_from_slice(b"\r\n");
}

fn is_fold_ws(b: &u8) -> bool {
    b' ' == *b || b'\t' == *b
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        let mut h = HeaderMap::new();
        h.add("Content-Type", b"text/plain".to_vec());
        assert_eq!(b"text/plain" as &[u8], h.get("content-type").unwrap());
        assert_eq!(b"text/plain" as &[u8], h.get("CONTENT-TYPE").unwrap());
        assert!(h.get("Content-Length").is_none());
    }

    #[test]
    fn add_preserves_order_within_name() {
        let mut h = HeaderMap::new();
        h.add("Received", b"first".to_vec());
        h.add("Subject", b"s".to_vec());
        h.add("Received", b"second".to_vec());

        assert_eq!(b"first" as &[u8], h.get_nth("received", 0).unwrap());
        assert_eq!(b"second" as &[u8], h.get_nth("received", 1).unwrap());
        assert_eq!(2, h.get_all("received").count());

        let order = h.iter().map(|(n, _)| n.to_owned()).collect::<Vec<_>>();
        assert_eq!(vec!["Received", "Subject", "Received"], order);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut h = HeaderMap::new();
        h.add("From", b"a@x".to_vec());
        h.add("To", b"b@y".to_vec());
        h.add("From", b"dup@x".to_vec());

        h.set("from", b"c@z".to_vec());
        assert_eq!(1, h.get_all("from").count());
        assert_eq!(b"c@z" as &[u8], h.get("From").unwrap());
        // The surviving entry sits where the first From was
        let order = h.iter().map(|(n, _)| n.to_owned()).collect::<Vec<_>>();
        assert_eq!(vec!["from", "To"], order);

        h.set("X-New", b"v".to_vec());
        assert_eq!(
            Some(("X-New", b"v" as &[u8])),
            h.iter().last()
        );
    }

    #[test]
    fn remove_by_index() {
        let mut h = HeaderMap::new();
        h.add("Received", b"first".to_vec());
        h.add("Received", b"second".to_vec());

        assert!(h.remove("received", 1));
        assert!(!h.remove("received", 1));
        assert_eq!(b"first" as &[u8], h.get("Received").unwrap());
        assert!(h.remove("received", 0));
        assert!(h.is_empty());
    }

    #[test]
    fn emit_preserves_casing_and_order() {
        let mut h = HeaderMap::new();
        h.add("FROM", b"a@x".to_vec());
        h.add("subJect", b"hi".to_vec());

        let mut out = Vec::new();
        h.emit(&mut out);
        assert_eq!(b"FROM: a@x\r\nsubJect: hi\r\n" as &[u8], &out[..]);
    }

    #[test]
    fn emit_folds_long_values_at_whitespace() {
        let mut h = HeaderMap::new();
        let value = "x".repeat(40) + " " + &"y".repeat(40) + " tail";
        h.add("Subject", value.into_bytes());

        let mut out = Vec::new();
        h.emit(&mut out);
        let text = String::from_utf8(out).unwrap();
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= 78, "line too long: {:?}", line);
        }
        // Folding must be reversible by deleting CRLFs before whitespace
        assert_eq!(
            format!("Subject: {} {} tail", "x".repeat(40), "y".repeat(40)),
            text.replace("\r\n ", " ").trim_end_matches("\r\n")
        );
    }

    #[test]
    fn emit_leaves_unbreakable_token_whole() {
        let mut h = HeaderMap::new();
        h.add("X-Blob", "z".repeat(200).into_bytes());
        let mut out = Vec::new();
        h.emit(&mut out);
        assert_eq!(
            format!("X-Blob: {}\r\n", "z".repeat(200)).into_bytes(),
            out
        );
    }

    proptest! {
        #[test]
        fn insertion_order_is_stable_across_unrelated_sets(
            names in prop::collection::vec("[A-Za-z-]{1,12}", 1..8)
        ) {
            let mut h = HeaderMap::new();
            for (ix, n) in names.iter().enumerate() {
                h.add(n, format!("v{}", ix).into_bytes());
            }
            let before = h
                .iter()
                .filter(|(n, _)| !n.eq_ignore_ascii_case("x-probe"))
                .map(|(n, v)| (n.to_owned(), v.to_vec()))
                .collect::<Vec<_>>();

            h.set("X-Probe", b"probe".to_vec());

            let after = h
                .iter()
                .filter(|(n, _)| !n.eq_ignore_ascii_case("x-probe"))
                .map(|(n, v)| (n.to_owned(), v.to_vec()))
                .collect::<Vec<_>>();
            prop_assert_eq!(before, after);
        }
    }
}
