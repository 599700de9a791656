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

//! The public read surface.

use std::io::Read;

use flate2::bufread::ZlibDecoder;

use crate::cases::{CaseDecoder, Row};
use crate::dictionary::{reconcile, Variable};
use crate::endian::{native_endian, Endian};
use crate::error::{Error, Warning};
use crate::records::{Compression, RawHeader, ZHeader, ZTrailer};
use crate::stream::Stream;

/// A reader for one system file.
///
/// Construction parses the whole dictionary (inflating the data region of a
/// `.zsav` file along the way) and reconciles the variable list, leaving the
/// byte source positioned on the first case.  Rows are then decoded lazily,
/// one call at a time.
///
/// ```no_run
/// # fn main() -> Result<(), sysfile::Error> {
/// let file = std::fs::File::open("survey.sav").map_err(sysfile::Error::Io)?;
/// let mut reader = sysfile::Reader::new(std::io::BufReader::new(file))?;
/// for variable in reader.variables() {
///     println!("{} ({} bytes)", variable.name, variable.width);
/// }
/// while let Some(row) = reader.read_row()? {
///     println!("{row:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Reader<R: Read> {
    stream: Stream<R>,
    header: RawHeader,
    variables: Vec<Variable>,
    cases: CaseDecoder,
}

impl<R: Read> Reader<R> {
    /// Opens a system file, discarding warnings.
    ///
    /// The byte order is assumed to match the host's; see
    /// [set_endian](Self::set_endian).
    pub fn new(reader: R) -> Result<Self, Error> {
        Self::with_warnings(reader, |_| ())
    }

    /// Opens a system file, reporting recoverable oddities in the dictionary
    /// through `warn`.
    pub fn with_warnings(reader: R, mut warn: impl FnMut(Warning)) -> Result<Self, Error> {
        let mut stream = Stream::new(reader, native_endian());
        let mut header = RawHeader::read(&mut stream, &mut warn)?;
        if header.file_header.compression == Some(Compression::ZLib) {
            inflate_data_region(&mut stream, &mut header, &mut warn)?;
        }
        let variables = reconcile(&header, stream.endian(), &mut warn);
        let cases = CaseDecoder::new(&header);
        Ok(Reader {
            stream,
            header,
            variables,
            cases,
        })
    }

    /// Reads the next case, or `None` at the end of the data.
    pub fn read_row(&mut self) -> Result<Option<Row>, Error> {
        self.cases.read_row(&mut self.stream, &self.variables)
    }

    /// Reads every remaining case.
    pub fn read_all(&mut self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        while let Some(row) = self.read_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The dictionary, record by record.
    pub fn raw_header(&self) -> &RawHeader {
        &self.header
    }

    /// The reconciled variable list, in case order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Overrides the byte order for everything not yet read.  Big-endian
    /// system files exist but are rare; the dictionary will already have
    /// been parsed under the default order by the time this can be called,
    /// so it is chiefly useful ahead of case decoding.
    pub fn set_endian(&mut self, endian: Endian) {
        self.stream.set_endian(endian);
    }
}

/// Materializes the ZLIB-compressed data region and rebinds the byte source
/// to it.
///
/// The region between the ZLIB header and the trailer holds one zlib stream
/// per data block.  A `BufRead`-based inflater consumes exactly each
/// stream's compressed bytes, so after inflating stream by stream up to the
/// declared trailer offset, the trailer can be read straight from the
/// upstream.
fn inflate_data_region<R: Read>(
    stream: &mut Stream<R>,
    header: &mut RawHeader,
    warn: &mut dyn FnMut(Warning),
) -> Result<(), Error> {
    let start = stream.upstream_position();
    let zheader = ZHeader::read(stream)?;
    if zheader.zheader_offset != start as i64 {
        warn(Warning::ZHeaderOffsetMismatch {
            actual: zheader.zheader_offset as u64,
            expected: start,
        });
    }

    let mut data = Vec::new();
    loop {
        let before = stream.upstream_position();
        ZlibDecoder::new(stream.upstream_mut()).read_to_end(&mut data)?;
        let after = stream.upstream_position();
        if after == before {
            return Err(Error::malformed(
                before,
                "ZLIB data stream makes no progress".to_string(),
            ));
        }
        if after >= zheader.ztrailer_offset as u64 {
            break;
        }
    }

    let ztrailer = ZTrailer::read(stream)?;
    header.zheader = Some(zheader);
    header.ztrailer = Some(ztrailer);
    stream.bind_region(data);
    Ok(())
}
