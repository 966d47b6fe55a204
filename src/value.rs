//! Decoding and encoding of status-buffer values.
//!
//! Everything in a status hash is text. Reading infers a number where the
//! text parses as one and otherwise keeps the text; writing is plain string
//! conversion.

use chrono::NaiveDateTime;
use std::fmt;

/// Format used when a [`Value::Time`] is written back as text.
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// A typed status value.
///
/// Decoding a raw field only ever produces `Float` or `Text`; the other
/// variants come from derived properties or from callers.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Time(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    /// Numeric view of the value (`Integer` and `Float` only).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integral view of the value; floats must have no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for `Integer` and `Float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// The wire text of this value. Same as `to_string()`.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            // Integral floats keep their ".0" so the consumer still sees a float.
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{:.1}", x)
            }
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Decode a raw status field.
///
/// A missing or empty raw value yields `fallback` as given, without numeric
/// inference. Anything else is returned as `Float` when it parses as one,
/// or as the original `Text` otherwise. Never fails.
pub fn decode(raw: Option<&str>, fallback: Option<Value>) -> Option<Value> {
    let raw = match raw {
        None | Some("") => return fallback,
        Some(raw) => raw,
    };
    match raw.trim().parse::<f64>() {
        Ok(number) => Some(Value::Float(number)),
        Err(_) => Some(Value::Text(raw.to_string())),
    }
}

/// Decode a raw field delivered as bytes, replacing invalid UTF-8.
pub fn decode_bytes(raw: Option<&[u8]>, fallback: Option<Value>) -> Option<Value> {
    match raw {
        Some(bytes) => decode(Some(&*String::from_utf8_lossy(bytes)), fallback),
        None => fallback,
    }
}

/// Encode a value as the text stored in, or published to, the status hash.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_decode_fallback() {
        let fallback = Some(Value::from("n/a"));
        assert_eq!(decode(None, fallback.clone()), fallback);
        assert_eq!(decode(Some(""), fallback.clone()), fallback);
        assert_eq!(decode(None, None), None);
        assert_eq!(decode(Some(""), None), None);
    }

    #[test]
    fn test_decode_fallback_is_not_parsed() {
        let fallback = Some(Value::from("1970/01/01 00:00:00"));
        assert_eq!(decode(None, fallback.clone()), fallback);

        let fallback = Some(Value::from("42"));
        assert_eq!(decode(Some(""), fallback), Some(Value::Text("42".to_string())));
    }

    #[test]
    fn test_decode_numeric() {
        assert_eq!(decode(Some("3.1414"), None), Some(Value::Float(3.1414)));
        assert_eq!(decode(Some("64"), None), Some(Value::Float(64.0)));
        assert_eq!(decode(Some(" 1.5e9 "), None), Some(Value::Float(1.5e9)));
        assert_eq!(decode(Some("-0.25"), None), Some(Value::Float(-0.25)));
    }

    #[test]
    fn test_decode_text_passthrough() {
        assert_eq!(decode(Some("abc"), None), Some(Value::from("abc")));
        assert_eq!(
            decode(Some("  padded  "), None),
            Some(Value::from("  padded  "))
        );
        assert_eq!(decode(Some("3C286"), None), Some(Value::from("3C286")));
    }

    #[test]
    fn test_decode_bytes() {
        assert_eq!(
            decode_bytes(Some(b"1024".as_slice()), None),
            Some(Value::Float(1024.0))
        );
        assert_eq!(decode_bytes(Some(b"".as_slice()), Some(Value::Integer(7))), Some(Value::Integer(7)));
        assert_eq!(decode_bytes(None, None), None);
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(&Value::Integer(64)), "64");
        assert_eq!(encode(&Value::Float(3.0)), "3.0");
        assert_eq!(encode(&Value::Float(3.1414)), "3.1414");
        assert_eq!(encode(&Value::from("J1939+2134")), "J1939+2134");
        assert_eq!(encode(&Value::Bool(true)), "true");

        // Extremes are written positionally, never in exponent form.
        assert_eq!(encode(&Value::Float(1e-7)), "0.0000001");
        assert_eq!(encode(&Value::Float(1e20)), "100000000000000000000");
        for x in [1e-7, 1e20, -2.5e-12] {
            let text = encode(&Value::Float(x));
            assert_eq!(decode(Some(text.as_str()), None), Some(Value::Float(x)));
        }

        assert_eq!(
            encode(&Value::from(vec!["ea01", "ea02", "ea03"])),
            "ea01,ea02,ea03"
        );

        let t = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(encode(&Value::Time(t)), "2024/03/09 07:05:00");
    }

    #[test]
    fn test_numeric_equality_across_variants() {
        assert_eq!(Value::Integer(64), Value::Float(64.0));
        assert_ne!(Value::Integer(64), Value::from("64"));
        assert_ne!(Value::Float(0.5), Value::Float(0.25));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Float(8.0).as_i64(), Some(8));
        assert_eq!(Value::Float(8.5).as_i64(), None);
        assert_eq!(Value::Integer(2).as_f64(), Some(2.0));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from("x").as_f64(), None);
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
    }
}
