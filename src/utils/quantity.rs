// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Conversion between Kubernetes resource quantities and byte counts.
//!
//! Capacity accounting works on plain `u64` byte counts; the API surface keeps
//! the `Quantity` strings users write (`"100Gi"`, `"500G"`, `"1.5Ti"`).

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::Snafu;

#[derive(Snafu, Debug, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("invalid quantity '{}'", value))]
    Invalid { value: String },

    #[snafu(display("quantity '{}' does not fit in 64 bits", value))]
    Overflow { value: String },

    #[snafu(display("quantity '{}' is negative", value))]
    Negative { value: String },
}

const BINARY_SUFFIXES: [(&str, u128); 6] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
];

const DECIMAL_SUFFIXES: [(&str, u128); 6] = [
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parses a quantity into a whole number of bytes, rounding fractions up.
pub fn to_bytes(quantity: &Quantity) -> Result<u64, Error> {
    parse(quantity.0.trim())
}

/// Formats a byte count with the largest binary suffix that divides it exactly.
pub fn from_bytes(bytes: u64) -> Quantity {
    let bytes = bytes as u128;
    for (suffix, multiplier) in BINARY_SUFFIXES.iter().rev() {
        if bytes >= *multiplier && bytes % multiplier == 0 {
            return Quantity(format!("{}{}", bytes / multiplier, suffix));
        }
    }
    Quantity(bytes.to_string())
}

fn parse(value: &str) -> Result<u64, Error> {
    if value.starts_with('-') {
        return NegativeSnafu { value }.fail();
    }

    let digits_end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(digits_end);
    let number = number.trim_start_matches('+');
    if number.is_empty() {
        return InvalidSnafu { value }.fail();
    }

    let multiplier = match suffix {
        "" => 1,
        s => BINARY_SUFFIXES
            .iter()
            .chain(DECIMAL_SUFFIXES.iter())
            .find(|(name, _)| *name == s)
            .map(|(_, m)| *m)
            .ok_or_else(|| Error::Invalid {
                value: value.to_owned(),
            })?,
    };

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
        return InvalidSnafu { value }.fail();
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| Error::Invalid {
            value: value.to_owned(),
        })?
    };

    let mut total = whole
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Overflow {
            value: value.to_owned(),
        })?;

    if !fraction.is_empty() {
        let scale = 10u128
            .checked_pow(fraction.len() as u32)
            .ok_or_else(|| Error::Invalid {
                value: value.to_owned(),
            })?;
        let numerator: u128 = fraction.parse().map_err(|_| Error::Invalid {
            value: value.to_owned(),
        })?;
        let scaled = numerator
            .checked_mul(multiplier)
            .ok_or_else(|| Error::Overflow {
                value: value.to_owned(),
            })?;
        total += scaled.div_ceil(scale);
    }

    u64::try_from(total).map_err(|_| Error::Overflow {
        value: value.to_owned(),
    })
}
