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

//! Reading IBM SPSS Statistics system files.
//!
//! System files are the binary data files SPSS writes, conventionally named
//! `.sav`, or `.zsav` when the case data is ZLIB compressed.  A file holds a
//! dictionary (variables, labels, display attributes, and a collection of
//! optional extension records) followed by case data, which may be stored
//! plain, compressed with a per-byte opcode scheme, or wrapped in DEFLATE
//! and then compressed with the same opcode scheme.
//!
//! [Reader] decodes all three layouts from any [std::io::Read]
//! implementation: it parses the dictionary eagerly, reconciles the
//! dictionary's many per-variable records into a single [Variable] list,
//! and then yields one [Row] per case on demand.  Cells are doubles (with
//! the system-missing value surfaced as NaN) or right-trimmed strings.
//!
//! This is a decoder only: it does not write system files, and it reports
//! the dictionary's character encoding without converting text.

pub mod dictionary;
pub mod endian;
mod error;
pub mod records;
mod cases;
mod reader;
mod stream;

pub use cases::{Datum, Row};
pub use dictionary::{Measure, MissingValue, ValueLabel, Variable};
pub use endian::Endian;
pub use error::{Error, Warning};
pub use reader::Reader;
