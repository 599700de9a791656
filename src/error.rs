// sysfile - a reader for IBM SPSS Statistics system files.
// Copyright (C) 2025 Free Software Foundation, Inc.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Errors and warnings for system file decoding.

use std::io::Error as IoError;
use thiserror::Error as ThisError;

/// A fatal problem with a system file or the stream it is read from.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The file does not start with one of the system file magic numbers.
    #[error("Not an IBM SPSS Statistics system file")]
    NotValidFile,

    /// The stream ended in the middle of a record or a case.
    #[error("Unexpected end of file at offset {offset:#x}")]
    UnexpectedEof {
        /// Offset into the active byte source.
        offset: u64,
    },

    /// The underlying stream failed for a reason other than end of file.
    #[error("I/O error ({0})")]
    Io(#[from] IoError),

    /// A structural constraint of the file format was violated.
    #[error("At offset {offset:#x}, {detail}")]
    Malformed {
        /// Offset of the record the violation was detected in.
        offset: u64,
        /// What was violated.
        detail: String,
    },
}

impl Error {
    pub(crate) fn malformed(offset: u64, detail: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            detail: detail.into(),
        }
    }
}

/// A recoverable oddity in a system file.
///
/// Warnings are delivered through the callback given to
/// [Reader::with_warnings](crate::Reader::with_warnings).  Decoding continues
/// after each of them.
#[derive(ThisError, Debug)]
pub enum Warning {
    /// The dictionary contained bytes that match no known record tag.
    #[error("Skipped {count} unrecognized bytes at offset {offset:#x}")]
    UnrecognizedBytes { offset: u64, count: u64 },

    /// An extension record with an unknown subtype was kept undecoded.
    #[error("Unknown extension record subtype {subtype} at offset {offset:#x}")]
    UnknownExtension { offset: u64, subtype: i32 },

    /// The compression bias is not one of the usual values.
    #[error("Compression bias is {0} instead of the usual values of 0 or 100")]
    UnexpectedBias(f64),

    /// A long variable name tuple lacked its `=` separator.
    #[error("Missing `=` separator in long variable names record, in {0:?}")]
    LongNameMissingEquals(String),

    /// A very long string tuple lacked its `=` separator.
    #[error("Missing `=` separator in very long string record, in {0:?}")]
    VeryLongStringMissingEquals(String),

    /// A variable attributes entry could not be parsed as a role.
    #[error("Cannot parse variable role from {0:?}")]
    InvalidRole(String),

    /// The variable display record is not three elements per variable.
    #[error("Variable display record contains {0} items, not a multiple of 3")]
    InvalidVariableDisplayCount(u32),

    /// A variable display entry holds an undefined measurement level.
    #[error("Invalid variable measurement level value {0}")]
    InvalidMeasurement(i32),

    /// A folded variable had no preceding kept variable to fold into.
    #[error("Variable {name:?} at position {index} precedes every role-declared variable")]
    UnparentedVariable { index: usize, name: String },

    /// The ZLIB header does not point at itself.
    #[error("ZLIB header offset is {actual:#x} instead of expected {expected:#x}")]
    ZHeaderOffsetMismatch { actual: u64, expected: u64 },
}
