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

//! The records that make up a system file dictionary.
//!
//! A system file starts with a fixed-size file header, followed by variable
//! records, then a loosely ordered mix of value label and extension records,
//! and finally a dictionary termination record.  Each record begins with a
//! fixed tag, so the next parser is always selected by lookahead on the tag
//! (and, for extension records, the subtype and element size).

use std::io::Read;
use std::num::NonZeroU8;

use smallvec::SmallVec;

use crate::endian::{Endian, FromBytes};
use crate::error::{Error, Warning};
use crate::stream::{default_decode, Stream};

const VARIABLE: &[i32] = &[2];
const VALUE_LABELS: &[i32] = &[3];
const DOCUMENTS: &[i32] = &[6];
const INTEGER_INFO: &[i32] = &[7, 3, 4];
const FLOAT_INFO: &[i32] = &[7, 4, 8];
const MR_SETS_OLD: &[i32] = &[7, 7, 1];
const PRODUCT_INFO: &[i32] = &[7, 10, 1];
const VARIABLE_DISPLAY: &[i32] = &[7, 11, 4];
const LONG_NAMES: &[i32] = &[7, 13, 1];
const VERY_LONG_STRINGS: &[i32] = &[7, 14, 1];
const EXTENDED_CASE_COUNT: &[i32] = &[7, 16, 8];
const FILE_ATTRIBUTES: &[i32] = &[7, 17, 1];
const VARIABLE_ATTRIBUTES: &[i32] = &[7, 18, 1];
const MR_SETS_NEW: &[i32] = &[7, 19, 1];
const ENCODING: &[i32] = &[7, 20, 1];
const LONG_STRING_VALUE_LABELS: &[i32] = &[7, 21, 1];
const LONG_STRING_MISSING_VALUES: &[i32] = &[7, 22, 1];
const EXTENSION: &[i32] = &[7];
const END_OF_DICTIONARY: &[i32] = &[999, 0];

/// Magic number identifying a system file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Magic {
    /// `$FL2`, a file with uncompressed or bytecode-compressed data.
    Sav,

    /// `$FL3`, a file with ZLIB-compressed data.
    Zsav,
}

impl Magic {
    pub const SAV: [u8; 4] = *b"$FL2";
    pub const ZSAV: [u8; 4] = *b"$FL3";
}

impl TryFrom<[u8; 4]> for Magic {
    type Error = Error;

    fn try_from(value: [u8; 4]) -> Result<Self, Self::Error> {
        match value {
            Magic::SAV => Ok(Magic::Sav),
            Magic::ZSAV => Ok(Magic::Zsav),
            _ => Err(Error::NotValidFile),
        }
    }
}

/// How the case data is compressed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Opcode-stream compression (compression code 1).
    Bytecode,

    /// A DEFLATE-compressed region holding an opcode stream (code 2).
    ZLib,
}

/// The fixed 176-byte record at the start of every system file.
#[derive(Clone, Debug)]
pub struct FileHeader {
    /// `$FL2` or `$FL3`.
    pub magic: Magic,

    /// Product identification string, padded on the right with spaces.
    pub product: String,

    /// Layout code, normally 2.
    pub layout_code: i32,

    /// Data elements per case, counting long string continuations.
    pub nominal_case_size: i32,

    /// Compression, if any.  `$FL3` files are always [Compression::ZLib].
    pub compression: Option<Compression>,

    /// 1-based index of the weight variable, or 0 if unweighted.
    pub weight_index: i32,

    /// Declared number of cases, or -1 if unknown.
    pub n_cases: i32,

    /// Compression bias, ordinarily 100.
    pub bias: f64,

    /// `dd mmm yy`.
    pub creation_date: String,

    /// `hh:mm:ss`.
    pub creation_time: String,

    /// File label, padded on the right with spaces.
    pub file_label: String,
}

impl FileHeader {
    fn read<R: Read>(
        stream: &mut Stream<R>,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Self, Error> {
        let magic = Magic::try_from(stream.read_bytes::<4>()?)?;
        let product = stream.read_string(60)?;
        let layout_code = stream.read_i32()?;
        let nominal_case_size = stream.read_i32()?;

        let compression_code = stream.read_i32()?;
        let compression = match (magic, compression_code) {
            (Magic::Zsav, 2) => Some(Compression::ZLib),
            (Magic::Zsav, code) => {
                return Err(Error::malformed(
                    0,
                    format!("$FL3 file declares compression {code} instead of 2"),
                ))
            }
            (Magic::Sav, 0) => None,
            (Magic::Sav, 1) => Some(Compression::Bytecode),
            (Magic::Sav, code) => {
                return Err(Error::malformed(
                    0,
                    format!("$FL2 file declares compression {code} instead of 0 or 1"),
                ))
            }
        };

        let weight_index = stream.read_i32()?;
        let n_cases = stream.read_i32()?;
        let bias = stream.read_f64()?;
        if bias != 100.0 && bias != 0.0 {
            warn(Warning::UnexpectedBias(bias));
        }
        let creation_date = stream.read_string(9)?;
        let creation_time = stream.read_string(8)?;
        let file_label = stream.read_string(64)?;
        stream.discard(3)?;

        Ok(FileHeader {
            magic,
            product,
            layout_code,
            nominal_case_size,
            compression,
            weight_index,
            n_cases,
            bias,
            creation_date,
            creation_time,
            file_label,
        })
    }
}

/// A print or write format, unpacked from its 4-byte encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Format {
    /// Number of decimal places.
    pub decimals: u8,

    /// Field width.
    pub width: u8,

    /// Format type code (F, A, DATE, ...).
    pub kind: i32,
}

impl Format {
    fn from_bytes(bytes: [u8; 4]) -> Self {
        let kind = if bytes[3] == 0 {
            bytes[2] as i32
        } else {
            bytes[2] as i32 * 10 + bytes[3] as i32
        };
        Format {
            decimals: bytes[0],
            width: bytes[1],
            kind,
        }
    }
}

/// A variable record's type code, excluding continuations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RawType {
    /// Type code 0.
    Numeric,

    /// Type codes 1 through 255: a string of that width in bytes.
    String(NonZeroU8),
}

/// One data element of the dictionary: either a variable in its own right or
/// the continuation of a preceding long string variable.
#[derive(Clone, Debug)]
pub enum RawVariable {
    /// A numeric variable or the first record of a string variable.
    Anchor(VariableRecord),

    /// Type code -1.  Every other field of the record is ignored.
    Continuation,
}

/// The meaningful fields of a type-2 record.
#[derive(Clone, Debug)]
pub struct VariableRecord {
    /// Numeric, or a string of some width.
    pub kind: RawType,

    /// Print format.
    pub print: Format,

    /// Write format.
    pub write: Format,

    /// Short variable name, trailing spaces trimmed.
    pub name: String,

    /// Variable label, if the record carries one.
    pub label: Option<String>,

    /// Missing value code: 0-3 discrete values, -2 a range, -3 a range plus
    /// one discrete value.
    pub missing_code: i32,

    /// `|missing_code|` doubles.  For the range codes the first two entries
    /// are the range endpoints.
    pub missing_values: SmallVec<[f64; 3]>,
}

impl RawVariable {
    fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        let offset = stream.position();
        let _rec_type = stream.read_i32()?;
        let type_code = stream.read_i32()?;
        let has_label = stream.read_i32()?;
        let missing_code = stream.read_i32()?;
        let print = Format::from_bytes(stream.read_bytes()?);
        let write = Format::from_bytes(stream.read_bytes()?);
        let name = stream.read_string(8)?.trim_end_matches(' ').to_string();

        let label = match has_label {
            0 => None,
            1 => {
                let len = stream.read_i32()?;
                if len < 0 {
                    return Err(Error::malformed(
                        offset,
                        format!("negative variable label length {len}"),
                    ));
                }
                let len = len as usize;
                let label = stream.read_string(len)?;
                stream.discard(len.next_multiple_of(4) - len)?;
                Some(label)
            }
            code => {
                return Err(Error::malformed(
                    offset,
                    format!("variable label code {code} is not 0 or 1"),
                ))
            }
        };

        let mut missing_values = SmallVec::new();
        match missing_code {
            -3 | -2 | 0..=3 => {
                for _ in 0..missing_code.unsigned_abs() {
                    missing_values.push(stream.read_f64()?);
                }
            }
            code => {
                return Err(Error::malformed(
                    offset,
                    format!("missing value code {code} is not -3, -2, 0, 1, 2, or 3"),
                ))
            }
        }

        let kind = match type_code {
            -1 => return Ok(RawVariable::Continuation),
            0 => RawType::Numeric,
            1..=255 => RawType::String(NonZeroU8::new(type_code as u8).unwrap()),
            _ => {
                return Err(Error::malformed(
                    offset,
                    format!("variable type code {type_code} is not in -1..=255"),
                ))
            }
        };

        Ok(RawVariable::Anchor(VariableRecord {
            kind,
            print,
            write,
            name,
            label,
            missing_code,
            missing_values,
        }))
    }
}

/// A value label key as stored: 8 raw bytes that are a double for numeric
/// variables and a space-padded string for short string variables.  Which
/// interpretation applies is decided by the variable the label ends up
/// attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UntypedValue(pub [u8; 8]);

impl UntypedValue {
    /// The key read as a double under `endian`.
    pub fn as_number(&self, endian: Endian) -> f64 {
        endian.parse(self.0)
    }

    /// The key read as a short string, trailing spaces trimmed.
    pub fn as_string(&self) -> String {
        default_decode(&self.0).trim_end_matches(' ').to_string()
    }
}

/// One type-3 record together with its mandatory type-4 companion naming the
/// variables the labels apply to.
#[derive(Clone, Debug)]
pub struct ValueLabelGroup {
    /// `(key, label)` pairs.
    pub labels: Vec<(UntypedValue, String)>,

    /// 1-based dictionary indexes of the variables labeled by this group.
    pub indexes: Vec<i32>,
}

impl ValueLabelGroup {
    fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        let offset = stream.position();
        let _rec_type = stream.read_i32()?;
        let n_labels = stream.read_i32()?;
        if n_labels < 0 {
            return Err(Error::malformed(
                offset,
                format!("negative value label count {n_labels}"),
            ));
        }

        let mut labels = Vec::new();
        for _ in 0..n_labels {
            let value = UntypedValue(stream.read_bytes()?);
            let [len] = stream.read_bytes::<1>()?;
            // The length byte plus the label are stored padded to a multiple
            // of 8 bytes, so `(len / 8 + 1) * 8 - 1` bytes follow the length.
            let stored = (len as usize / 8 + 1) * 8 - 1;
            let raw = stream.read_vec(stored)?;
            labels.push((value, default_decode(&raw[..len as usize]).into_owned()));
        }

        let index_offset = stream.position();
        let rec_type = stream.read_i32()?;
        if rec_type != 4 {
            return Err(Error::malformed(
                index_offset,
                format!("expected variable index record (type 4) after value labels, found type {rec_type}"),
            ));
        }
        let n_vars = stream.read_i32()?;
        if n_vars < 0 {
            return Err(Error::malformed(
                index_offset,
                format!("negative variable index count {n_vars}"),
            ));
        }
        let mut indexes = Vec::new();
        for _ in 0..n_vars {
            indexes.push(stream.read_i32()?);
        }

        Ok(ValueLabelGroup { labels, indexes })
    }
}

/// The document record: free-form lines attached to the dictionary.
#[derive(Clone, Debug)]
pub struct Documents {
    /// 80-byte lines, right-padded with spaces.
    pub lines: Vec<String>,
}

impl Documents {
    const LINE_LEN: usize = 80;

    fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        let offset = stream.position();
        let _rec_type = stream.read_i32()?;
        let n_lines = stream.read_i32()?;
        if n_lines < 0 {
            return Err(Error::malformed(
                offset,
                format!("negative document line count {n_lines}"),
            ));
        }
        let mut lines = Vec::new();
        for _ in 0..n_lines {
            lines.push(stream.read_string(Self::LINE_LEN)?);
        }
        Ok(Documents { lines })
    }
}

/// The generic frame shared by all type-7 records: a subtype, an element
/// size, an element count, and `size * count` bytes of payload.
#[derive(Clone, Debug)]
pub struct Extension {
    /// Offset of the record's tag in the file.
    pub offset: u64,

    /// Record subtype.
    pub subtype: i32,

    /// Size of each data element in bytes.
    pub size: i32,

    /// Number of data elements.
    pub count: i32,

    /// `size * count` bytes.
    pub data: Vec<u8>,
}

impl Extension {
    fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        let offset = stream.position();
        let _rec_type = stream.read_i32()?;
        let subtype = stream.read_i32()?;
        let size = stream.read_i32()?;
        let count = stream.read_i32()?;
        if size < 0 || count < 0 {
            return Err(Error::malformed(
                offset,
                format!("extension record subtype {subtype} declares size {size} and count {count}"),
            ));
        }
        let len = size as u64 * count as u64;
        if len > i32::MAX as u64 {
            return Err(Error::malformed(
                offset,
                format!("extension record subtype {subtype} is {len} bytes long"),
            ));
        }
        let data = stream.read_vec(len as usize)?;
        Ok(Extension {
            offset,
            subtype,
            size,
            count,
            data,
        })
    }
}

fn take<'a>(
    input: &mut &'a [u8],
    n: usize,
    offset: u64,
    what: &str,
) -> Result<&'a [u8], Error> {
    match input.split_at_checked(n) {
        Some((head, rest)) => {
            *input = rest;
            Ok(head)
        }
        None => Err(Error::malformed(offset, format!("{what} overruns the record"))),
    }
}

fn take_i32(input: &mut &[u8], endian: Endian, offset: u64, what: &str) -> Result<i32, Error> {
    let bytes = take(input, 4, offset, what)?;
    Ok(endian.parse(bytes.try_into().unwrap()))
}

fn take_i64(input: &mut &[u8], endian: Endian, offset: u64, what: &str) -> Result<i64, Error> {
    let bytes = take(input, 8, offset, what)?;
    Ok(endian.parse(bytes.try_into().unwrap()))
}

fn take_f64(input: &mut &[u8], endian: Endian, offset: u64, what: &str) -> Result<f64, Error> {
    let bytes = take(input, 8, offset, what)?;
    Ok(endian.parse(bytes.try_into().unwrap()))
}

/// Splits `data` on every occurrence of the byte sequence `sep`.
fn split_on<'a>(data: &'a [u8], sep: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = data;
    while let Some(at) = rest.windows(sep.len()).position(|window| window == sep) {
        segments.push(&rest[..at]);
        rest = &rest[at + sep.len()..];
    }
    segments.push(rest);
    segments
}

/// Machine integer info (subtype 3): the writing product's version and
/// platform characteristics.
#[derive(Clone, Debug)]
pub struct IntegerInfo {
    /// Major, minor, revision.
    pub version: (i32, i32, i32),
    pub machine_code: i32,
    /// 1 is IEEE 754, 2 is IBM 370, 3 is DEC VAX E.
    pub floating_point_rep: i32,
    /// Always 1, regardless of actual compression.
    pub compression_code: i32,
    /// 1 is big-endian, 2 is little-endian.
    pub endianness: i32,
    /// Character code of the file's encoding, e.g. 65001 for UTF-8.
    pub character_code: i32,
}

impl IntegerInfo {
    fn parse(ext: &Extension, endian: Endian) -> Result<Self, Error> {
        let mut input = &ext.data[..];
        let mut field = |what| take_i32(&mut input, endian, ext.offset, what);
        Ok(IntegerInfo {
            version: (
                field("major version")?,
                field("minor version")?,
                field("revision")?,
            ),
            machine_code: field("machine code")?,
            floating_point_rep: field("floating point representation")?,
            compression_code: field("compression code")?,
            endianness: field("endianness")?,
            character_code: field("character code")?,
        })
    }
}

/// Machine floating point info (subtype 4): the writer's special values.
#[derive(Clone, Debug)]
pub struct FloatInfo {
    /// The system-missing sentinel.
    pub sysmis: f64,
    /// The value used for HIGHEST in missing value ranges.
    pub highest: f64,
    /// The value used for LOWEST in missing value ranges.
    pub lowest: f64,
}

impl FloatInfo {
    fn parse(ext: &Extension, endian: Endian) -> Result<Self, Error> {
        let mut input = &ext.data[..];
        Ok(FloatInfo {
            sysmis: take_f64(&mut input, endian, ext.offset, "sysmis")?,
            highest: take_f64(&mut input, endian, ext.offset, "highest")?,
            lowest: take_f64(&mut input, endian, ext.offset, "lowest")?,
        })
    }
}

/// Multiple response sets (subtypes 7 and 19), kept as the raw text of the
/// record.  The set grammar is not interpreted.
#[derive(Clone, Debug)]
pub struct MultipleResponseSets(pub String);

/// Extra product info (subtype 10).
#[derive(Clone, Debug)]
pub struct ProductInfo(pub String);

/// One variable's entry in the variable display record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DisplayEntry {
    /// 1 nominal, 2 ordinal, 3 continuous.
    pub measure: i32,

    /// Display column width in characters.
    pub width: i32,

    /// 0 left, 1 right, 2 center.
    pub alignment: i32,
}

/// Variable display parameters (subtype 11), three elements per variable.
#[derive(Clone, Debug)]
pub struct VariableDisplay(pub Vec<DisplayEntry>);

impl VariableDisplay {
    fn parse(
        ext: &Extension,
        endian: Endian,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Self, Error> {
        // The record may also be written with two elements per variable,
        // omitting the width.  That form is not decoded here.
        if ext.count % 3 != 0 {
            warn(Warning::InvalidVariableDisplayCount(ext.count as u32));
        }
        let mut input = &ext.data[..];
        let mut entries = Vec::with_capacity((ext.count / 3) as usize);
        for _ in 0..ext.count / 3 {
            entries.push(DisplayEntry {
                measure: take_i32(&mut input, endian, ext.offset, "measurement level")?,
                width: take_i32(&mut input, endian, ext.offset, "display width")?,
                alignment: take_i32(&mut input, endian, ext.offset, "alignment")?,
            });
        }
        Ok(VariableDisplay(entries))
    }
}

/// Long variable names (subtype 13): `short=long` tuples separated by 0x09.
#[derive(Clone, Debug)]
pub struct LongNames(pub Vec<(String, String)>);

impl LongNames {
    fn parse(ext: &Extension, warn: &mut dyn FnMut(Warning)) -> Self {
        let mut pairs = Vec::new();
        for tuple in ext.data.split(|&b| b == 0x09) {
            if tuple.is_empty() {
                continue;
            }
            match tuple.iter().position(|&b| b == b'=') {
                Some(at) => pairs.push((
                    default_decode(&tuple[..at]).into_owned(),
                    default_decode(&tuple[at + 1..]).into_owned(),
                )),
                None => warn(Warning::LongNameMissingEquals(
                    default_decode(tuple).into_owned(),
                )),
            }
        }
        LongNames(pairs)
    }
}

/// Very long strings (subtype 14): `name=length` tuples delimited by the
/// two-byte sequence {0x00, 0x09}, possibly with a trailing terminator.
#[derive(Clone, Debug)]
pub struct VeryLongStrings(pub Vec<(String, String)>);

impl VeryLongStrings {
    fn parse(ext: &Extension, warn: &mut dyn FnMut(Warning)) -> Self {
        let mut pairs = Vec::new();
        for segment in split_on(&ext.data, &[0x00, 0x09]) {
            let mut segment = segment;
            while let [head @ .., 0x00] = segment {
                segment = head;
            }
            if segment.is_empty() {
                continue;
            }
            match segment.iter().position(|&b| b == b'=') {
                Some(at) => pairs.push((
                    default_decode(&segment[..at]).into_owned(),
                    default_decode(&segment[at + 1..]).into_owned(),
                )),
                None => warn(Warning::VeryLongStringMissingEquals(
                    default_decode(segment).into_owned(),
                )),
            }
        }
        VeryLongStrings(pairs)
    }
}

/// Extended case count (subtype 16), for files with more cases than a 32-bit
/// count can express.
#[derive(Copy, Clone, Debug)]
pub struct ExtendedCaseCount {
    /// Meaning unknown; always observed as 1.
    pub unknown: i64,

    /// Number of cases, or -1 if unknown.
    pub n_cases: i64,
}

impl ExtendedCaseCount {
    fn parse(ext: &Extension, endian: Endian) -> Result<Self, Error> {
        let mut input = &ext.data[..];
        Ok(ExtendedCaseCount {
            unknown: take_i64(&mut input, endian, ext.offset, "case count prefix")?,
            n_cases: take_i64(&mut input, endian, ext.offset, "case count")?,
        })
    }
}

/// Data file attributes (subtype 17), kept verbatim.
#[derive(Clone, Debug)]
pub struct FileAttributes(pub String);

/// A variable's role, as declared through the `$@Role` variable attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Input,
    Output,
    Both,
    None,
    Partition,
    Split,
}

impl Role {
    fn from_digit(digit: &str) -> Option<Self> {
        match digit {
            "0" => Some(Role::Input),
            "1" => Some(Role::Output),
            "2" => Some(Role::Both),
            "3" => Some(Role::None),
            "4" => Some(Role::Partition),
            "5" => Some(Role::Split),
            _ => Option::None,
        }
    }
}

/// One variable's role declaration.
#[derive(Clone, Debug)]
pub struct RoleEntry {
    /// Variable name as it appears in the attribute text.
    pub name: String,

    /// The declared role.
    pub role: Role,
}

/// Variable attributes (subtype 18): the raw attribute text plus the role
/// list parsed out of it.
#[derive(Clone, Debug)]
pub struct VariableAttributes {
    /// The attributes in their text form.
    pub text: String,

    /// The `$@Role` declarations, in order of appearance.
    pub roles: Vec<RoleEntry>,
}

impl VariableAttributes {
    fn parse(ext: &Extension, warn: &mut dyn FnMut(Warning)) -> Self {
        let text = default_decode(&ext.data).into_owned();
        let stripped: String = text.chars().filter(|&c| c != '\n').collect();
        let mut roles = Vec::new();
        for entry in stripped.split('/') {
            if entry.is_empty() {
                continue;
            }
            match Self::parse_role(entry) {
                Some(role) => roles.push(role),
                None => warn(Warning::InvalidRole(entry.to_string())),
            }
        }
        VariableAttributes { text, roles }
    }

    fn parse_role(entry: &str) -> Option<RoleEntry> {
        let (name, suffix) = entry.split_once(':')?;
        let digit = suffix.strip_prefix("$@Role('")?.strip_suffix("')")?;
        Some(RoleEntry {
            name: name.to_string(),
            role: Role::from_digit(digit)?,
        })
    }
}

/// Character encoding (subtype 20): the IANA name of the dictionary's
/// encoding.  Surfaced, never applied.
#[derive(Clone, Debug)]
pub struct CharacterEncoding(pub String);

/// Value labels for one string variable wider than 8 bytes.
#[derive(Clone, Debug)]
pub struct LongStringValueLabelSet {
    /// Name of the labeled variable.
    pub var_name: String,

    /// The variable's width in bytes, between 9 and 32767.
    pub width: i32,

    /// `(value, label)` pairs; each value is `width` bytes.
    pub labels: Vec<(String, String)>,
}

/// Long string value labels (subtype 21).
#[derive(Clone, Debug)]
pub struct LongStringValueLabels(pub Vec<LongStringValueLabelSet>);

impl LongStringValueLabels {
    fn parse(ext: &Extension, endian: Endian) -> Result<Self, Error> {
        let mut input = &ext.data[..];
        let mut sets = Vec::new();
        while !input.is_empty() {
            let name_len = take_i32(&mut input, endian, ext.offset, "variable name length")?;
            let var_name =
                default_decode(take(&mut input, name_len.max(0) as usize, ext.offset, "variable name")?)
                    .into_owned();
            let width = take_i32(&mut input, endian, ext.offset, "variable width")?;
            let n_labels = take_i32(&mut input, endian, ext.offset, "label count")?;
            if n_labels < 0 {
                return Err(Error::malformed(
                    ext.offset,
                    format!("negative long string value label count {n_labels}"),
                ));
            }
            let mut labels = Vec::new();
            for _ in 0..n_labels {
                let value_len = take_i32(&mut input, endian, ext.offset, "value length")?;
                let value =
                    default_decode(take(&mut input, value_len.max(0) as usize, ext.offset, "value")?)
                        .into_owned();
                let label_len = take_i32(&mut input, endian, ext.offset, "label length")?;
                let label =
                    default_decode(take(&mut input, label_len.max(0) as usize, ext.offset, "label")?)
                        .into_owned();
                labels.push((value, label));
            }
            sets.push(LongStringValueLabelSet {
                var_name,
                width,
                labels,
            });
        }
        Ok(LongStringValueLabels(sets))
    }
}

/// Missing values for one string variable wider than 8 bytes.
#[derive(Clone, Debug)]
pub struct LongStringMissingValueSet {
    /// Name of the variable.
    pub var_name: String,

    /// One to three missing value strings.
    pub values: Vec<String>,
}

/// Long string missing values (subtype 22).
#[derive(Clone, Debug)]
pub struct LongStringMissingValues(pub Vec<LongStringMissingValueSet>);

impl LongStringMissingValues {
    fn parse(ext: &Extension, endian: Endian) -> Result<Self, Error> {
        let mut input = &ext.data[..];
        let mut sets = Vec::new();
        while !input.is_empty() {
            let name_len = take_i32(&mut input, endian, ext.offset, "variable name length")?;
            let var_name =
                default_decode(take(&mut input, name_len.max(0) as usize, ext.offset, "variable name")?)
                    .into_owned();
            // The count is, unusually, a single byte.
            let n_missing = take(&mut input, 1, ext.offset, "missing value count")?[0];
            if !(1..=3).contains(&n_missing) {
                return Err(Error::malformed(
                    ext.offset,
                    format!("long string missing value count {n_missing} is not 1, 2, or 3"),
                ));
            }
            let mut values = Vec::with_capacity(n_missing as usize);
            for _ in 0..n_missing {
                let value_len = take_i32(&mut input, endian, ext.offset, "missing value length")?;
                let value =
                    default_decode(take(&mut input, value_len.max(0) as usize, ext.offset, "missing value")?)
                        .into_owned();
                values.push(value);
            }
            sets.push(LongStringMissingValueSet { var_name, values });
        }
        Ok(LongStringMissingValues(sets))
    }
}

/// The type-999 record that ends the dictionary.
#[derive(Copy, Clone, Debug)]
pub struct Termination {
    /// Ignored; always observed as 0.
    pub filler: i32,
}

impl Termination {
    fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        let _rec_type = stream.read_i32()?;
        let filler = stream.read_i32()?;
        Ok(Termination { filler })
    }
}

/// The 24-byte record bracketing the front of a ZLIB-compressed data region.
#[derive(Copy, Clone, Debug)]
pub struct ZHeader {
    /// File offset of this header.
    pub zheader_offset: i64,

    /// File offset of the trailer.
    pub ztrailer_offset: i64,

    /// Length of the trailer in bytes.
    pub ztrailer_len: i64,
}

impl ZHeader {
    pub(crate) fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        Ok(ZHeader {
            zheader_offset: stream.read_i64()?,
            ztrailer_offset: stream.read_i64()?,
            ztrailer_len: stream.read_i64()?,
        })
    }
}

/// The first 48 bytes of the ZLIB trailer: the fixed fields and the first
/// entry of the block index.  The rest of the block index is not read.
#[derive(Copy, Clone, Debug)]
pub struct ZTrailer {
    /// The compression bias as a negative integer, e.g. -100.
    pub bias: i64,

    /// Always observed as 0.
    pub zero: i64,

    /// Uncompressed size of each block except possibly the last.
    pub block_size: i32,

    /// Number of entries in the block index.
    pub n_blocks: i32,

    /// First block's offset if simple compression had been used.
    pub uncompressed_offset: i64,

    /// First block's actual file offset.
    pub compressed_offset: i64,

    /// First block's size after decompression.
    pub uncompressed_size: i32,

    /// First block's size as stored.
    pub compressed_size: i32,
}

impl ZTrailer {
    pub(crate) fn read<R: Read>(stream: &mut Stream<R>) -> Result<Self, Error> {
        Ok(ZTrailer {
            bias: stream.read_i64()?,
            zero: stream.read_i64()?,
            block_size: stream.read_i32()?,
            n_blocks: stream.read_i32()?,
            uncompressed_offset: stream.read_i64()?,
            compressed_offset: stream.read_i64()?,
            uncompressed_size: stream.read_i32()?,
            compressed_size: stream.read_i32()?,
        })
    }
}

/// Everything the dictionary of a system file holds, in close to its on-disk
/// shape.  Built once during reader construction and immutable afterwards.
#[derive(Clone, Debug)]
pub struct RawHeader {
    pub file_header: FileHeader,
    pub variables: Vec<RawVariable>,
    pub value_labels: Vec<ValueLabelGroup>,
    pub documents: Option<Documents>,
    pub integer_info: Option<IntegerInfo>,
    pub float_info: Option<FloatInfo>,
    pub mr_sets_old: Option<MultipleResponseSets>,
    pub product_info: Option<ProductInfo>,
    pub variable_display: Option<VariableDisplay>,
    pub long_names: Option<LongNames>,
    pub very_long_strings: Option<VeryLongStrings>,
    pub extended_case_count: Option<ExtendedCaseCount>,
    pub file_attributes: Option<FileAttributes>,
    pub variable_attributes: Option<VariableAttributes>,
    pub mr_sets_new: Option<MultipleResponseSets>,
    pub encoding: Option<CharacterEncoding>,
    pub long_string_value_labels: Option<LongStringValueLabels>,
    pub long_string_missing_values: Option<LongStringMissingValues>,
    pub termination: Option<Termination>,
    pub zheader: Option<ZHeader>,
    pub ztrailer: Option<ZTrailer>,

    /// Extension records with subtypes this reader does not decode.
    pub other_extensions: Vec<Extension>,
}

/// What the classifier recognizes at the cursor.
enum NextRecord {
    Variable,
    ValueLabels,
    Documents,
    IntegerInfo,
    FloatInfo,
    MrSetsOld,
    ProductInfo,
    VariableDisplay,
    LongNames,
    VeryLongStrings,
    ExtendedCaseCount,
    FileAttributes,
    VariableAttributes,
    MrSetsNew,
    Encoding,
    LongStringValueLabels,
    LongStringMissingValues,
    OtherExtension,
    Termination,
}

fn classify<R: Read>(stream: &mut Stream<R>) -> Option<NextRecord> {
    if stream.is_next(VARIABLE) {
        Some(NextRecord::Variable)
    } else if stream.is_next(VALUE_LABELS) {
        Some(NextRecord::ValueLabels)
    } else if stream.is_next(DOCUMENTS) {
        Some(NextRecord::Documents)
    } else if stream.is_next(INTEGER_INFO) {
        Some(NextRecord::IntegerInfo)
    } else if stream.is_next(FLOAT_INFO) {
        Some(NextRecord::FloatInfo)
    } else if stream.is_next(MR_SETS_OLD) {
        Some(NextRecord::MrSetsOld)
    } else if stream.is_next(PRODUCT_INFO) {
        Some(NextRecord::ProductInfo)
    } else if stream.is_next(VARIABLE_DISPLAY) {
        Some(NextRecord::VariableDisplay)
    } else if stream.is_next(LONG_NAMES) {
        Some(NextRecord::LongNames)
    } else if stream.is_next(VERY_LONG_STRINGS) {
        Some(NextRecord::VeryLongStrings)
    } else if stream.is_next(EXTENDED_CASE_COUNT) {
        Some(NextRecord::ExtendedCaseCount)
    } else if stream.is_next(FILE_ATTRIBUTES) {
        Some(NextRecord::FileAttributes)
    } else if stream.is_next(VARIABLE_ATTRIBUTES) {
        Some(NextRecord::VariableAttributes)
    } else if stream.is_next(MR_SETS_NEW) {
        Some(NextRecord::MrSetsNew)
    } else if stream.is_next(ENCODING) {
        Some(NextRecord::Encoding)
    } else if stream.is_next(LONG_STRING_VALUE_LABELS) {
        Some(NextRecord::LongStringValueLabels)
    } else if stream.is_next(LONG_STRING_MISSING_VALUES) {
        Some(NextRecord::LongStringMissingValues)
    } else if stream.is_next(EXTENSION) {
        Some(NextRecord::OtherExtension)
    } else if stream.is_next(END_OF_DICTIONARY) {
        Some(NextRecord::Termination)
    } else {
        None
    }
}

impl RawHeader {
    fn new(file_header: FileHeader) -> Self {
        RawHeader {
            file_header,
            variables: Vec::new(),
            value_labels: Vec::new(),
            documents: None,
            integer_info: None,
            float_info: None,
            mr_sets_old: None,
            product_info: None,
            variable_display: None,
            long_names: None,
            very_long_strings: None,
            extended_case_count: None,
            file_attributes: None,
            variable_attributes: None,
            mr_sets_new: None,
            encoding: None,
            long_string_value_labels: None,
            long_string_missing_values: None,
            termination: None,
            zheader: None,
            ztrailer: None,
            other_extensions: Vec::new(),
        }
    }

    /// Reads the whole metadata region: the file header, then records
    /// dispatched by lookahead until the dictionary termination record or
    /// end of stream.  Unrecognized content is skipped a byte at a time
    /// (and reported through `warn`); well-formed files never need that.
    pub(crate) fn read<R: Read>(
        stream: &mut Stream<R>,
        warn: &mut dyn FnMut(Warning),
    ) -> Result<Self, Error> {
        let mut header = RawHeader::new(FileHeader::read(stream, warn)?);

        let mut skip_start = 0;
        let mut skipped = 0u64;
        loop {
            let next = classify(stream);
            if next.is_some() && skipped > 0 {
                warn(Warning::UnrecognizedBytes {
                    offset: skip_start,
                    count: skipped,
                });
                skipped = 0;
            }
            let endian = stream.endian();
            match next {
                Some(NextRecord::Variable) => {
                    header.variables.push(RawVariable::read(stream)?);
                }
                Some(NextRecord::ValueLabels) => {
                    header.value_labels.push(ValueLabelGroup::read(stream)?);
                }
                Some(NextRecord::Documents) => {
                    header.documents = Some(Documents::read(stream)?);
                }
                Some(NextRecord::IntegerInfo) => {
                    let ext = Extension::read(stream)?;
                    header.integer_info = Some(IntegerInfo::parse(&ext, endian)?);
                }
                Some(NextRecord::FloatInfo) => {
                    let ext = Extension::read(stream)?;
                    header.float_info = Some(FloatInfo::parse(&ext, endian)?);
                }
                Some(NextRecord::MrSetsOld) => {
                    let ext = Extension::read(stream)?;
                    header.mr_sets_old =
                        Some(MultipleResponseSets(default_decode(&ext.data).into_owned()));
                }
                Some(NextRecord::ProductInfo) => {
                    let ext = Extension::read(stream)?;
                    header.product_info =
                        Some(ProductInfo(default_decode(&ext.data).into_owned()));
                }
                Some(NextRecord::VariableDisplay) => {
                    let ext = Extension::read(stream)?;
                    header.variable_display =
                        Some(VariableDisplay::parse(&ext, endian, warn)?);
                }
                Some(NextRecord::LongNames) => {
                    let ext = Extension::read(stream)?;
                    header.long_names = Some(LongNames::parse(&ext, warn));
                }
                Some(NextRecord::VeryLongStrings) => {
                    let ext = Extension::read(stream)?;
                    header.very_long_strings = Some(VeryLongStrings::parse(&ext, warn));
                }
                Some(NextRecord::ExtendedCaseCount) => {
                    let ext = Extension::read(stream)?;
                    header.extended_case_count =
                        Some(ExtendedCaseCount::parse(&ext, endian)?);
                }
                Some(NextRecord::FileAttributes) => {
                    let ext = Extension::read(stream)?;
                    header.file_attributes =
                        Some(FileAttributes(default_decode(&ext.data).into_owned()));
                }
                Some(NextRecord::VariableAttributes) => {
                    let ext = Extension::read(stream)?;
                    header.variable_attributes =
                        Some(VariableAttributes::parse(&ext, warn));
                }
                Some(NextRecord::MrSetsNew) => {
                    let ext = Extension::read(stream)?;
                    header.mr_sets_new =
                        Some(MultipleResponseSets(default_decode(&ext.data).into_owned()));
                }
                Some(NextRecord::Encoding) => {
                    let ext = Extension::read(stream)?;
                    header.encoding =
                        Some(CharacterEncoding(default_decode(&ext.data).into_owned()));
                }
                Some(NextRecord::LongStringValueLabels) => {
                    let ext = Extension::read(stream)?;
                    header.long_string_value_labels =
                        Some(LongStringValueLabels::parse(&ext, endian)?);
                }
                Some(NextRecord::LongStringMissingValues) => {
                    let ext = Extension::read(stream)?;
                    header.long_string_missing_values =
                        Some(LongStringMissingValues::parse(&ext, endian)?);
                }
                Some(NextRecord::OtherExtension) => {
                    let ext = Extension::read(stream)?;
                    warn(Warning::UnknownExtension {
                        offset: ext.offset,
                        subtype: ext.subtype,
                    });
                    header.other_extensions.push(ext);
                }
                Some(NextRecord::Termination) => {
                    header.termination = Some(Termination::read(stream)?);
                    break;
                }
                None => match stream.discard(1) {
                    Ok(()) => {
                        if skipped == 0 {
                            skip_start = stream.position() - 1;
                        }
                        skipped += 1;
                    }
                    Err(Error::UnexpectedEof { .. }) => break,
                    Err(error) => return Err(error),
                },
            }
        }
        if skipped > 0 {
            warn(Warning::UnrecognizedBytes {
                offset: skip_start,
                count: skipped,
            });
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_unpacking() {
        let format = Format::from_bytes([2, 8, 5, 0]);
        assert_eq!(
            format,
            Format {
                decimals: 2,
                width: 8,
                kind: 5
            }
        );
        // A nonzero fourth byte extends the type code by a decimal digit.
        assert_eq!(Format::from_bytes([0, 10, 2, 3]).kind, 23);
    }

    #[test]
    fn value_label_storage_length() {
        // Length byte plus content round up to a multiple of 8.
        for (len, stored) in [(0, 7), (3, 7), (7, 7), (8, 15), (12, 15), (120, 127)] {
            assert_eq!((len / 8 + 1) * 8 - 1, stored);
        }
    }

    #[test]
    fn long_name_tuples() {
        let ext = Extension {
            offset: 0,
            subtype: 13,
            size: 1,
            count: 22,
            data: b"V1=Respondent_Age\x09V2=Q7".to_vec(),
        };
        let mut warnings = Vec::new();
        let names = LongNames::parse(&ext, &mut |w| warnings.push(w));
        assert_eq!(
            names.0,
            vec![
                ("V1".to_string(), "Respondent_Age".to_string()),
                ("V2".to_string(), "Q7".to_string()),
            ]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn very_long_string_tuples_tolerate_terminators() {
        for tail in [&b""[..], &b"\x00"[..], &b"\x00\x09"[..]] {
            let mut data = b"ADDRESS=01024\x00\x09COMMENT=00512".to_vec();
            data.extend_from_slice(tail);
            let ext = Extension {
                offset: 0,
                subtype: 14,
                size: 1,
                count: data.len() as i32,
                data,
            };
            let strings = VeryLongStrings::parse(&ext, &mut |_| ());
            assert_eq!(
                strings.0,
                vec![
                    ("ADDRESS".to_string(), "01024".to_string()),
                    ("COMMENT".to_string(), "00512".to_string()),
                ]
            );
        }
    }

    #[test]
    fn role_list_parsing() {
        let ext = Extension {
            offset: 0,
            subtype: 18,
            size: 1,
            count: 0,
            data: b"X:$@Role('0')\n/Y:$@Role('1')\n/Z:$@Role('5')".to_vec(),
        };
        let mut warnings = Vec::new();
        let attributes = VariableAttributes::parse(&ext, &mut |w| warnings.push(w));
        let roles: Vec<(&str, Role)> = attributes
            .roles
            .iter()
            .map(|entry| (entry.name.as_str(), entry.role))
            .collect();
        assert_eq!(
            roles,
            vec![("X", Role::Input), ("Y", Role::Output), ("Z", Role::Split)]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn undecodable_role_warns() {
        let ext = Extension {
            offset: 0,
            subtype: 18,
            size: 1,
            count: 0,
            data: b"X:$@Role('0')/Y:Other('a')".to_vec(),
        };
        let mut warnings = Vec::new();
        let attributes = VariableAttributes::parse(&ext, &mut |w| warnings.push(w));
        assert_eq!(attributes.roles.len(), 1);
        assert!(matches!(warnings.as_slice(), [Warning::InvalidRole(_)]));
    }

    #[test]
    fn magic_rejects_other_tags() {
        assert!(Magic::try_from(*b"$FL2").is_ok());
        assert!(Magic::try_from(*b"$FL3").is_ok());
        assert!(matches!(
            Magic::try_from(*b"$FL4"),
            Err(Error::NotValidFile)
        ));
    }

    #[test]
    fn split_on_two_byte_separator() {
        let segments = split_on(b"a\x00\x09b\x00\x09", &[0x00, 0x09]);
        assert_eq!(segments, vec![&b"a"[..], &b"b"[..], &b""[..]]);
    }
}
