// This file defines the error type returned by Otuclust's clustering layers.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use std::io;
use thiserror::Error;


#[derive(Debug, Error)]
pub enum ClusterError {
    /// Bad input data: identity edges, truncated records or unsorted streams.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// UPGMA could not load enough edges to continue within its memory limit. Everything emitted
    /// up to `last_safe_cutoff` (a scaled distance) is still valid.
    #[error("insufficient data to continue past cutoff {last_safe_cutoff}: {detail}")]
    InsufficientData { last_safe_cutoff: i32, detail: String },

    /// An internal invariant was broken, which means there is a bug.
    #[error("consistency check failed: {0}")]
    Consistency(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
