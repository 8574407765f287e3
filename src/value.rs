//! Parameter values.
//!
//! Values are sent to the server in text format with an unspecified type OID,
//! so the server resolves the type from context or from an explicit cast in
//! the rewritten command.

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    /// `bool`
    Bool(bool),
    /// `int2`
    Int2(i16),
    /// `int4`
    Int4(i32),
    /// `int8`
    Int8(i64),
    /// `float4`
    Float4(f32),
    /// `float8`
    Float8(f64),
    /// `text` and anything else with a textual input form
    Text(String),
    /// `bytea`
    Bytea(Vec<u8>),
}

impl Value {
    /// Append the PostgreSQL text representation of this value to `out`.
    ///
    /// Returns `false` without writing anything for NULL, which is sent as a
    /// length of -1 instead of a text payload.
    pub fn write_text(&self, out: &mut String) -> bool {
        match self {
            Value::Null => return false,
            Value::Bool(v) => out.push(if *v { 't' } else { 'f' }),
            Value::Int2(v) => out.push_str(&v.to_string()),
            Value::Int4(v) => out.push_str(&v.to_string()),
            Value::Int8(v) => out.push_str(&v.to_string()),
            Value::Float4(v) => write_float(out, f64::from(*v), v.to_string()),
            Value::Float8(v) => write_float(out, *v, v.to_string()),
            Value::Text(v) => out.push_str(v),
            Value::Bytea(v) => {
                out.reserve(2 + v.len() * 2);
                out.push_str("\\x");
                for byte in v {
                    out.push(char::from(HEX_DIGITS[usize::from(byte >> 4)]));
                    out.push(char::from(HEX_DIGITS[usize::from(byte & 0x0f)]));
                }
            }
        }
        true
    }
}

/// Floats use PostgreSQL's spelling for the non-finite values.
fn write_float(out: &mut String, value: f64, finite: String) {
    if value.is_nan() {
        out.push_str("NaN");
    } else if value == f64::INFINITY {
        out.push_str("Infinity");
    } else if value == f64::NEG_INFINITY {
        out.push_str("-Infinity");
    } else {
        out.push_str(&finite);
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut text = String::new();
        if self.write_text(&mut text) {
            f.write_str(&text)
        } else {
            f.write_str("NULL")
        }
    }
}

macro_rules! impl_from_for_value {
    ($($T:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$T> for Value {
                fn from(v: $T) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_from_for_value!(
    bool => Bool,
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
    f32 => Float4,
    f64 => Float8,
    String => Text,
    Vec<u8> => Bytea,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytea(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
