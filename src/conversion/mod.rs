//! Text-format decoding of result values.
//!
//! Statements request every result column in text format, so decoding only
//! has to understand PostgreSQL's textual output.

mod row;

pub use row::FromRow;

use crate::error::{Error, Result};
use crate::protocol::types::Oid;

/// Trait for decoding a text-format column value into a Rust type.
pub trait FromValue<'a>: Sized {
    /// Decode from NULL value.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from text format bytes of a column with the given type OID.
    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self>;
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

impl<'a, T: FromValue<'a>> FromValue<'a> for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_text(oid, bytes).map(Some)
    }
}

impl FromValue<'_> for bool {
    fn from_text(_oid: Oid, bytes: &[u8]) -> Result<Self> {
        match bytes {
            b"t" | b"true" => Ok(true),
            b"f" | b"false" => Ok(false),
            _ => Err(Error::Decode(format!(
                "invalid boolean: {:?}",
                String::from_utf8_lossy(bytes)
            ))),
        }
    }
}

macro_rules! impl_from_value_parse {
    ($($T:ty),+) => {
        $(
            impl FromValue<'_> for $T {
                fn from_text(_oid: Oid, bytes: &[u8]) -> Result<Self> {
                    utf8(bytes)?.parse().map_err(|e| {
                        Error::Decode(format!("invalid {}: {}", stringify!($T), e))
                    })
                }
            }
        )+
    };
}

impl_from_value_parse!(i16, i32, i64);

impl FromValue<'_> for f64 {
    fn from_text(_oid: Oid, bytes: &[u8]) -> Result<Self> {
        match bytes {
            b"NaN" => Ok(f64::NAN),
            b"Infinity" => Ok(f64::INFINITY),
            b"-Infinity" => Ok(f64::NEG_INFINITY),
            _ => utf8(bytes)?
                .parse()
                .map_err(|e| Error::Decode(format!("invalid f64: {}", e))),
        }
    }
}

impl FromValue<'_> for f32 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        f64::from_text(oid, bytes).map(|v| v as f32)
    }
}

impl<'a> FromValue<'a> for &'a str {
    fn from_text(_oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        utf8(bytes)
    }
}

impl FromValue<'_> for String {
    fn from_text(_oid: Oid, bytes: &[u8]) -> Result<Self> {
        utf8(bytes).map(str::to_owned)
    }
}

/// `bytea` in hex output format (`\x0a0b`).
impl FromValue<'_> for Vec<u8> {
    fn from_text(_oid: Oid, bytes: &[u8]) -> Result<Self> {
        let hex = bytes
            .strip_prefix(b"\\x")
            .ok_or_else(|| Error::Decode("bytea is not in hex format".into()))?;
        if hex.len() % 2 != 0 {
            return Err(Error::Decode("bytea hex has odd length".into()));
        }
        hex.chunks_exact(2)
            .map(|pair| {
                let hi = hex_digit(pair[0])?;
                let lo = hex_digit(pair[1])?;
                Ok((hi << 4) | lo)
            })
            .collect()
    }
}

fn hex_digit(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::Decode(format!("invalid hex digit: {:?}", c as char))),
    }
}
