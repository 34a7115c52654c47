//! Parameter/column value tags and the declared-type classification rule.

use crate::error::{Error, ErrorKind, Result};

/// One-byte wire discriminator for a parameter or column value. Numeric
/// values are contractual — they appear on the wire and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTag {
    Integer = 1,
    Float = 2,
    Text = 3,
    Blob = 4,
    Null = 5,
    Unixtime = 9,
    Iso8601 = 10,
    Boolean = 11,
}

impl ParamTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(ParamTag::Integer),
            2 => Some(ParamTag::Float),
            3 => Some(ParamTag::Text),
            4 => Some(ParamTag::Blob),
            5 => Some(ParamTag::Null),
            9 => Some(ParamTag::Unixtime),
            10 => Some(ParamTag::Iso8601),
            11 => Some(ParamTag::Boolean),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The engine's own primitive storage classes, as reported per column or
/// per bound value. Distinct from [`ParamTag`]: three of the eight wire
/// tags (unixtime, iso8601, boolean) are logical extensions layered on
/// top of these five.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

/// Choose the outbound wire tag for a column, given its declared type
/// name (as reported by the engine; absent for expressions with no
/// declared type) and its native storage class for the current row. This
/// is the single authoritative declared-type-name -> tag mapping; every
/// row encoder goes through it.
pub fn classify_column(declared_type: Option<&str>, storage: StorageType) -> ParamTag {
    let declared = declared_type.unwrap_or("").to_ascii_uppercase();
    let is_datetime = matches!(declared.as_str(), "DATETIME" | "TIMESTAMP" | "DATE" | "TIME");
    let is_boolean = matches!(declared.as_str(), "BOOLEAN" | "BOOL");

    match (is_datetime, is_boolean, storage) {
        (true, _, StorageType::Integer) => ParamTag::Unixtime,
        (true, _, StorageType::Text) | (true, _, StorageType::Null) => ParamTag::Iso8601,
        (_, true, _) => ParamTag::Boolean,
        (_, _, StorageType::Integer) => ParamTag::Integer,
        (_, _, StorageType::Float) => ParamTag::Float,
        (_, _, StorageType::Text) => ParamTag::Text,
        (_, _, StorageType::Blob) => ParamTag::Blob,
        (_, _, StorageType::Null) => ParamTag::Null,
    }
}

/// Parse a tag byte, attaching the contractual "invalid param" message on
/// failure. `index` is the 1-based parameter position.
pub fn parse_param_tag(byte: u8, index: usize) -> Result<ParamTag> {
    ParamTag::from_byte(byte).ok_or_else(|| {
        Error::new(
            ErrorKind::Error,
            format!("invalid param {}: unknown type {}", index, byte),
        )
    })
}

/// Reject ISO8601 parameter text that the engine could never round-trip
/// back out as a datetime column. An empty string is always accepted —
/// it is the encoding for a NULL-storage datetime column (§4.5.2).
#[cfg(feature = "iso8601")]
pub fn validate_iso8601(text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|_| ())
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|_| ())
        })
        .map_err(|_| {
            Error::new(
                ErrorKind::Error,
                format!("invalid iso8601 timestamp: {}", text),
            )
        })
}

#[cfg(not(feature = "iso8601"))]
pub fn validate_iso8601(_text: &str) -> Result<()> {
    Ok(())
}
