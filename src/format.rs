//! Record framing formats and their on-disk options encoding.
//!
//! Three framings cover the record files this crate works with:
//!
//! - **Prefix** — each record preceded by a little-endian `u32` length.
//! - **Delimited** — records terminated by a single byte (commonly `\n`);
//!   the CSV variant treats ASCII double quotes as opening a region in which
//!   the delimiter is ignored and `""` encodes a literal quote.
//! - **Fixed** — every record is exactly `n` bytes.
//!
//! Formats round-trip through a single signed integer so they can be stored
//! in options files: 0 is prefix, a positive value is the fixed length, a
//! negative value is a delimiter (CSV delimiters are offset by 256 before
//! negation). [`Format::to_raw`] / [`Format::from_raw`] preserve that
//! encoding exactly.

/// Offset applied to a delimiter byte to mark CSV quote handling in the raw
/// integer encoding.
const CSV_OFFSET: i32 = 256;

/// How records are framed on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// `u32 LE length | bytes[length]`, repeated. Zero-length records are
    /// permitted.
    Prefix,
    /// `bytes | delim`, repeated. In `csv` mode a double-quoted region hides
    /// the delimiter and `""` is an embedded quote.
    Delimited { delim: u8, csv: bool },
    /// `bytes[n]`, repeated. The stream length must be a multiple of `n`.
    Fixed(u32),
}

impl Format {
    /// Length-prefixed records.
    pub fn prefix() -> Format {
        Format::Prefix
    }

    /// Records terminated by `delim` (commonly `b'\n'`).
    pub fn delimited(delim: u8) -> Format {
        Format::Delimited { delim, csv: false }
    }

    /// Records terminated by `delim` with CSV quote handling.
    pub fn csv_delimited(delim: u8) -> Format {
        Format::Delimited { delim, csv: true }
    }

    /// Fixed-size records of exactly `size` bytes.
    pub fn fixed(size: u32) -> Format {
        Format::Fixed(size)
    }

    /// The signed-integer encoding used in persisted options.
    pub fn to_raw(self) -> i32 {
        match self {
            Format::Prefix => 0,
            Format::Fixed(n) => n as i32,
            Format::Delimited { delim, csv: false } => -(delim as i32 + 1),
            Format::Delimited { delim, csv: true } => -(delim as i32 + CSV_OFFSET + 1),
        }
    }

    /// Decodes [`Format::to_raw`]. Returns `None` if a negative value does
    /// not map back to a byte-sized delimiter.
    pub fn from_raw(raw: i32) -> Option<Format> {
        if raw == 0 {
            return Some(Format::Prefix);
        }
        if raw > 0 {
            return Some(Format::Fixed(raw as u32));
        }
        let v = -(raw as i64) - 1;
        if (0..CSV_OFFSET as i64).contains(&v) {
            Some(Format::Delimited { delim: v as u8, csv: false })
        } else if (CSV_OFFSET as i64..2 * CSV_OFFSET as i64).contains(&v) {
            Some(Format::Delimited { delim: (v - CSV_OFFSET as i64) as u8, csv: true })
        } else {
            None
        }
    }
}

impl Default for Format {
    fn default() -> Format {
        Format::Prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoding_round_trips() {
        let cases = [
            Format::Prefix,
            Format::Fixed(1),
            Format::Fixed(4096),
            Format::delimited(b'\n'),
            Format::delimited(0),
            Format::delimited(255),
            Format::csv_delimited(b','),
            Format::csv_delimited(255),
        ];
        for f in cases {
            assert_eq!(Format::from_raw(f.to_raw()), Some(f), "{f:?}");
        }
    }

    #[test]
    fn raw_values_match_encoding_policy() {
        assert_eq!(Format::Prefix.to_raw(), 0);
        assert_eq!(Format::Fixed(16).to_raw(), 16);
        assert_eq!(Format::delimited(b'\n').to_raw(), -11);
        assert_eq!(Format::csv_delimited(b',').to_raw(), -(44 + 256 + 1));
    }

    #[test]
    fn from_raw_rejects_out_of_range_delimiters() {
        assert_eq!(Format::from_raw(-(2 * 256 + 1)), None);
        assert_eq!(Format::from_raw(i32::MIN + 1), None);
        assert_eq!(Format::from_raw(i32::MIN), None);
    }
}
