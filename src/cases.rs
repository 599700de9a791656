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

//! Decoding case data into rows.
//!
//! Bytecode compression (compression types 1 and 2) interleaves 8-byte
//! opcode chunks with 8-byte literal payloads.  One opcode drives one
//! 8-byte data element, so a string variable of width W consumes
//! `ceil(W / 8)` opcodes per case.  Opcode chunks do not align with case
//! boundaries, so the chunk state lives across rows.

use std::collections::VecDeque;
use std::io::Read;

use crate::dictionary::Variable;
use crate::error::Error;
use crate::records::{Compression, RawHeader};
use crate::stream::Stream;

/// Padding at the end of the data; produces nothing.
const OPCODE_SKIP: u8 = 0;
/// End of the case data.
const OPCODE_EOF: u8 = 252;
/// An 8-byte literal follows in the data stream.
const OPCODE_LITERAL: u8 = 253;
/// An all-spaces string segment.
const OPCODE_SPACES: u8 = 254;
/// The system-missing value.
const OPCODE_SYSMIS: u8 = 255;

/// One cell of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    /// A numeric value.  System-missing is NaN.
    Number(f64),

    /// A string value, right-trimmed of spaces.
    String(String),
}

impl Datum {
    /// The cell's numeric value, if it is numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(number) => Some(*number),
            Datum::String(_) => None,
        }
    }

    /// The cell's string value, if it is a string.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Datum::Number(_) => None,
            Datum::String(string) => Some(string),
        }
    }
}

/// One case: a cell per logical variable, in variable order.
pub type Row = Vec<Datum>;

/// The case decoder's state between rows.
pub(crate) struct CaseDecoder {
    compression: Option<Compression>,
    bias: f64,
    sysmis: f64,
    codes: VecDeque<u8>,
    eof: bool,
}

impl CaseDecoder {
    pub fn new(header: &RawHeader) -> Self {
        CaseDecoder {
            compression: header.file_header.compression,
            bias: header.file_header.bias,
            // Without a float info record, assume the conventional sentinel,
            // the most negative finite double.
            sysmis: header
                .float_info
                .as_ref()
                .map_or(-f64::MAX, |info| info.sysmis),
            codes: VecDeque::with_capacity(8),
            eof: false,
        }
    }

    /// Reads the next case.  `Ok(None)` is the end of the data: an
    /// end-of-file opcode, or the stream ending cleanly at a row boundary.
    /// A stream that ends mid-row is an error.
    pub fn read_row<R: Read>(
        &mut self,
        stream: &mut Stream<R>,
        variables: &[Variable],
    ) -> Result<Option<Row>, Error> {
        if self.eof || variables.is_empty() {
            return Ok(None);
        }

        let mut row: Row = Vec::with_capacity(variables.len());
        let mut started = false;
        for variable in variables {
            let mut number = 0.0f64;
            let mut text = String::new();
            let mut chunks = variable.chunks();
            let mut chars = variable.width as i64;

            while chunks > 0 {
                match self.compression {
                    None => {
                        if variable.is_numeric {
                            let value = match stream.read_f64() {
                                Ok(value) => value,
                                Err(Error::UnexpectedEof { .. }) if !started => {
                                    self.eof = true;
                                    return Ok(None);
                                }
                                Err(error) => return Err(error),
                            };
                            number = if value == self.sysmis { f64::NAN } else { value };
                        } else {
                            let segment = match stream.read_string(8) {
                                Ok(segment) => segment,
                                Err(Error::UnexpectedEof { .. }) if !started => {
                                    self.eof = true;
                                    return Ok(None);
                                }
                                Err(error) => return Err(error),
                            };
                            text.push_str(&segment);
                            chars -= 8;
                        }
                        started = true;
                    }
                    Some(_) => {
                        if self.codes.is_empty() {
                            match stream.read_bytes::<8>() {
                                Ok(chunk) => self.codes.extend(chunk),
                                Err(Error::UnexpectedEof { .. }) if !started => {
                                    self.eof = true;
                                    return Ok(None);
                                }
                                Err(error) => return Err(error),
                            }
                        }
                        match self.codes.pop_front().unwrap() {
                            OPCODE_SKIP => continue,
                            OPCODE_EOF => {
                                self.eof = true;
                                return Ok(if row.is_empty() { None } else { Some(row) });
                            }
                            OPCODE_LITERAL => {
                                if variable.is_numeric {
                                    number = stream.read_f64()?;
                                } else {
                                    let n = chars.clamp(0, 8) as usize;
                                    text.push_str(&stream.read_string(n)?);
                                    if n < 8 {
                                        stream.discard(8 - n)?;
                                    }
                                    chars -= n as i64;
                                }
                            }
                            OPCODE_SPACES => (),
                            OPCODE_SYSMIS => number = f64::NAN,
                            code => number = code as f64 - self.bias,
                        }
                        // Only a chunk-consuming opcode counts as progress:
                        // trailing padding opcodes before end of stream do
                        // not leave a partial row behind.
                        started = true;
                    }
                }
                chunks -= 1;
            }

            row.push(if variable.is_numeric {
                Datum::Number(number)
            } else {
                Datum::String(text.trim_end_matches(' ').to_string())
            });
        }
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::{Endian, ToBytes};
    use std::io::Cursor;

    fn decoder(compression: Option<Compression>) -> CaseDecoder {
        CaseDecoder {
            compression,
            bias: 100.0,
            sysmis: -f64::MAX,
            codes: VecDeque::new(),
            eof: false,
        }
    }

    fn stream(bytes: Vec<u8>) -> Stream<Cursor<Vec<u8>>> {
        Stream::new(Cursor::new(bytes), Endian::Little)
    }

    fn numeric(name: &str) -> Variable {
        Variable {
            index: 0,
            short_name: name.to_string(),
            name: name.to_string(),
            label: None,
            decimals: 0,
            width: 8,
            is_numeric: true,
            format: 5,
            missing_values: Vec::new(),
            value_labels: Vec::new(),
            measure: None,
        }
    }

    fn string(name: &str, width: usize) -> Variable {
        Variable {
            is_numeric: false,
            width,
            format: 1,
            ..numeric(name)
        }
    }

    #[test]
    fn biased_opcodes_span_rows() {
        let variables = vec![numeric("X")];
        let mut s = stream(vec![101, 102, 103, OPCODE_EOF, 0, 0, 0, 0]);
        let mut d = decoder(Some(Compression::Bytecode));
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(1.0)])
        );
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(2.0)])
        );
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(3.0)])
        );
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
        // The decoder stays at end of file once it gets there.
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn sysmis_and_literal_opcodes() {
        let variables = vec![numeric("X")];
        let mut bytes = vec![
            OPCODE_SYSMIS,
            OPCODE_LITERAL,
            OPCODE_EOF,
            0,
            0,
            0,
            0,
            0,
        ];
        bytes.extend(Endian::Little.to_bytes(7.5f64));
        let mut s = stream(bytes);
        let mut d = decoder(Some(Compression::Bytecode));

        let row = d.read_row(&mut s, &variables).unwrap().unwrap();
        assert!(row[0].as_number().unwrap().is_nan());
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(7.5)])
        );
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn string_cell_spanning_two_chunks() {
        let variables = vec![string("S", 10)];
        let mut bytes = vec![
            OPCODE_LITERAL,
            OPCODE_LITERAL,
            OPCODE_EOF,
            0,
            0,
            0,
            0,
            0,
        ];
        bytes.extend_from_slice(b"ABCDEFGH");
        bytes.extend_from_slice(b"IJ      ");
        let mut s = stream(bytes);
        let mut d = decoder(Some(Compression::Bytecode));
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::String("ABCDEFGHIJ".to_string())])
        );
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn spaces_opcode_emits_trimmed_segment() {
        let variables = vec![string("S", 16)];
        let mut bytes = vec![
            OPCODE_LITERAL,
            OPCODE_SPACES,
            OPCODE_EOF,
            0,
            0,
            0,
            0,
            0,
        ];
        bytes.extend_from_slice(b"HELLO   ");
        let mut s = stream(bytes);
        let mut d = decoder(Some(Compression::Bytecode));
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::String("HELLO".to_string())])
        );
    }

    #[test]
    fn skip_opcode_does_not_consume_a_chunk() {
        let variables = vec![numeric("X")];
        // Padding opcodes before the value; the row still decodes.
        let mut s = stream(vec![0, 0, 0, 105, OPCODE_EOF, 0, 0, 0]);
        let mut d = decoder(Some(Compression::Bytecode));
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(5.0)])
        );
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn trailing_padding_opcodes_end_cleanly() {
        let variables = vec![numeric("X")];
        // A final chunk padded with skip opcodes and no end-of-file marker.
        let mut s = stream(vec![101, 0, 0, 0, 0, 0, 0, 0]);
        let mut d = decoder(Some(Compression::Bytecode));
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(1.0)])
        );
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn uncompressed_doubles_and_sysmis() {
        let variables = vec![numeric("X")];
        let sysmis = -1.7e300;
        let mut bytes = Vec::new();
        bytes.extend(Endian::Little.to_bytes(4.25f64));
        bytes.extend(Endian::Little.to_bytes(sysmis));
        let mut s = stream(bytes);
        let mut d = decoder(None);
        d.sysmis = sysmis;

        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::Number(4.25)])
        );
        let row = d.read_row(&mut s, &variables).unwrap().unwrap();
        assert!(row[0].as_number().unwrap().is_nan());
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn uncompressed_string_chunks() {
        let variables = vec![string("S", 12)];
        let mut s = stream(b"The quick br    ".to_vec());
        let mut d = decoder(None);
        assert_eq!(
            d.read_row(&mut s, &variables).unwrap(),
            Some(vec![Datum::String("The quick br".to_string())])
        );
        assert_eq!(d.read_row(&mut s, &variables).unwrap(), None);
    }

    #[test]
    fn eof_mid_row_is_an_error() {
        let variables = vec![numeric("X"), numeric("Y")];
        let mut bytes = Vec::new();
        bytes.extend(Endian::Little.to_bytes(1.0f64));
        let mut s = stream(bytes);
        let mut d = decoder(None);
        assert!(matches!(
            d.read_row(&mut s, &variables),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn no_variables_means_no_rows() {
        let mut s = stream(vec![1, 2, 3]);
        let mut d = decoder(None);
        assert_eq!(d.read_row(&mut s, &[]).unwrap(), None);
    }
}
