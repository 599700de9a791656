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

//! Reconciling the dictionary's records into one variable list.
//!
//! The raw dictionary spreads a single logical variable across several
//! records: the variable record carries the short name, formats, and numeric
//! missing values; long names, very long strings, value labels, long string
//! value labels, long string missing values, display parameters, and roles
//! each live in records of their own.  This module fuses them into the
//! ordered [Variable] list that drives the case decoder.

use crate::endian::Endian;
use crate::error::Warning;
use crate::records::{RawHeader, RawType, RawVariable, RoleEntry};

/// A variable's level of measurement, from the variable display record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Measure {
    /// Values can only be compared for equality.
    Nominal,

    /// Values can be meaningfully ordered.
    Ordinal,

    /// Values can be compared for degree of difference.
    Continuous,
}

impl Measure {
    fn try_decode(source: i32) -> Result<Option<Measure>, Warning> {
        match source {
            0 => Ok(None),
            1 => Ok(Some(Measure::Nominal)),
            2 => Ok(Some(Measure::Ordinal)),
            3 => Ok(Some(Measure::Continuous)),
            _ => Err(Warning::InvalidMeasurement(source)),
        }
    }
}

/// A missing value attached to a variable.
#[derive(Clone, Debug, PartialEq)]
pub enum MissingValue {
    /// A numeric missing value (or range endpoint) from the variable record.
    Number(f64),

    /// A long string missing value.
    String(String),
}

/// One value label attached to a variable.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueLabel {
    /// The labeled value: a decimal-formatted number for numeric variables,
    /// raw bytes for string variables.
    pub value: String,

    /// The label.
    pub label: String,
}

/// A logical variable: one column of the data, with every dictionary record
/// that bears on it already folded in.  The ordered variable list drives the
/// case decoder.
#[derive(Clone, Debug)]
pub struct Variable {
    /// Position in the raw variable record list.
    pub index: usize,

    /// The 8-byte short name from the variable record, space-trimmed.
    pub short_name: String,

    /// Display name: the long name when the long variable names record has
    /// one for this variable, otherwise the short name.
    pub name: String,

    /// Variable label, if any.
    pub label: Option<String>,

    /// Decimal places, from the print format.
    pub decimals: u8,

    /// Width in bytes, from the print format, corrected for very long
    /// string segmentation when roles identify the real variables.
    pub width: usize,

    /// True for numeric variables (type code 0).
    pub is_numeric: bool,

    /// The print format's type code.
    pub format: i32,

    /// Missing values, numeric first, then long string entries.
    pub missing_values: Vec<MissingValue>,

    /// Value labels, classic groups first, then long string entries.
    pub value_labels: Vec<ValueLabel>,

    /// Measurement level, when the display record declares one.
    pub measure: Option<Measure>,
}

impl Variable {
    /// How many 8-byte elements one case devotes to this variable.
    pub fn chunks(&self) -> usize {
        if self.is_numeric {
            1
        } else {
            self.width.div_ceil(8)
        }
    }
}

/// Builds the logical variable list from the raw dictionary.
pub(crate) fn reconcile(
    header: &RawHeader,
    endian: Endian,
    warn: &mut dyn FnMut(Warning),
) -> Vec<Variable> {
    let mut variables = Vec::new();

    for (index, raw) in header.variables.iter().enumerate() {
        let record = match raw {
            RawVariable::Anchor(record) => record,
            // Continuations are absorbed by their anchor: either implicitly
            // through the print width, or through role-driven folding below.
            RawVariable::Continuation => continue,
        };

        let mut name = record.name.clone();
        if let Some(long_names) = &header.long_names {
            for (short, long) in &long_names.0 {
                if record.name.eq_ignore_ascii_case(short) {
                    name = long.clone();
                }
            }
        }

        let mut missing_values: Vec<MissingValue> = record
            .missing_values
            .iter()
            .map(|&value| MissingValue::Number(value))
            .collect();
        if let Some(long_missing) = &header.long_string_missing_values {
            for set in &long_missing.0 {
                if record.name.eq_ignore_ascii_case(&set.var_name) {
                    missing_values.extend(
                        set.values
                            .iter()
                            .map(|value| MissingValue::String(value.clone())),
                    );
                }
            }
        }

        let is_numeric = record.kind == RawType::Numeric;
        let decimals = record.print.decimals;

        let mut value_labels = Vec::new();
        for group in &header.value_labels {
            // The index record holds 1-based dictionary indexes.
            if group.indexes.contains(&(index as i32 + 1)) {
                for (value, label) in &group.labels {
                    let value = if is_numeric {
                        format!("{:.*}", decimals as usize, value.as_number(endian))
                    } else {
                        value.as_string()
                    };
                    value_labels.push(ValueLabel {
                        value,
                        label: label.clone(),
                    });
                }
            }
        }
        if let Some(long_labels) = &header.long_string_value_labels {
            for set in &long_labels.0 {
                if record.name.eq_ignore_ascii_case(&set.var_name) {
                    for (value, label) in &set.labels {
                        value_labels.push(ValueLabel {
                            value: value.clone(),
                            label: label.clone(),
                        });
                    }
                }
            }
        }

        let measure = header
            .variable_display
            .as_ref()
            .and_then(|display| display.0.get(index))
            .and_then(|entry| {
                Measure::try_decode(entry.measure).unwrap_or_else(|warning| {
                    warn(warning);
                    None
                })
            });

        variables.push(Variable {
            index,
            short_name: record.name.clone(),
            name,
            label: record.label.clone(),
            decimals,
            width: record.print.width as usize,
            is_numeric,
            format: record.print.kind,
            missing_values,
            value_labels,
            measure,
        });
    }

    match &header.variable_attributes {
        Some(attributes) => fold_segments(variables, &attributes.roles, warn),
        None => variables,
    }
}

/// Reduces the variable list to the variables named by the role list.
///
/// A very long string is stored as several dictionary variables: the real
/// one and follow-on segments that the role list does not mention.  Each
/// unmentioned variable's width is folded into the nearest preceding real
/// variable.  The folded width overcounts by 3 bytes per segment, which is
/// subtracted at the end.
fn fold_segments(
    variables: Vec<Variable>,
    roles: &[RoleEntry],
    warn: &mut dyn FnMut(Warning),
) -> Vec<Variable> {
    let mut kept: Vec<Variable> = Vec::with_capacity(variables.len());
    let mut children: Vec<usize> = Vec::with_capacity(variables.len());

    for variable in variables {
        let is_real = roles
            .iter()
            .any(|role| role.name.eq_ignore_ascii_case(&variable.short_name));
        if is_real {
            kept.push(variable);
            children.push(0);
        } else if let (Some(parent), Some(count)) = (kept.last_mut(), children.last_mut()) {
            parent.width += variable.width;
            *count += 1;
        } else {
            warn(Warning::UnparentedVariable {
                index: variable.index,
                name: variable.short_name,
            });
        }
    }

    for (variable, count) in kept.iter_mut().zip(&children) {
        variable.width = variable.width.saturating_sub(3 * count);
    }
    kept
}
