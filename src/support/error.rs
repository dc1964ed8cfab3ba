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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The byte source failed mid-parse. The parts parsed so far remain
    /// usable read-only; further lazy expansion is impossible.
    #[error("Parse aborted by an earlier I/O failure")]
    ParseAborted,
    /// A mutation was attempted on a part that is mid-parse and cannot be
    /// drained, or that cannot structurally hold the requested change.
    #[error("Part cannot be modified in its current state")]
    InvalidMutation,
    #[error(transparent)]
    Io(#[from] io::Error),
}
