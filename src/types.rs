use chrono::NaiveDateTime;
use serde::ser::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Strings longer than this many characters are sent as large text.
pub const LONG_TEXT_THRESHOLD: usize = 1000;

/// Values that can be stored in a database row or used as query parameters.
///
/// ```rust
/// use mssql_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Int(i) => serializer.serialize_i64(*i),
            RowValues::Float(f) => serializer.serialize_f64(*f),
            RowValues::Text(s) => serializer.serialize_str(s),
            RowValues::Bool(b) => serializer.serialize_bool(*b),
            RowValues::Timestamp(dt) => dt.serialize(serializer),
            RowValues::Null => serializer.serialize_none(),
            RowValues::JSON(value) => value.serialize(serializer),
            RowValues::Blob(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl From<JsonValue> for RowValues {
    fn from(value: JsonValue) -> Self {
        RowValues::JSON(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Wire type tag attached to every statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Int,
    Float,
    Bit,
    /// Bounded variable-length text.
    NVarChar,
    /// Large text, used above [`LONG_TEXT_THRESHOLD`] characters.
    Text,
    VarBinary,
}

impl WireType {
    /// Infer the wire type for a native value.
    ///
    /// Depends only on the value's kind and magnitude, never on the parameter's
    /// name or position.
    #[must_use]
    pub fn infer(value: &RowValues) -> WireType {
        match value {
            RowValues::Int(_) | RowValues::Bool(_) | RowValues::Blob(_) => coerce(value).0,
            RowValues::Float(f) => {
                if integral(*f).is_some() {
                    WireType::Int
                } else {
                    WireType::Float
                }
            }
            RowValues::Text(s) => text_type(s),
            RowValues::JSON(json) => infer_json(json),
            RowValues::Timestamp(_) | RowValues::Null => WireType::NVarChar,
        }
    }

    /// SQL type used when declaring a parameter of this wire type.
    #[must_use]
    pub fn declaration(self) -> &'static str {
        match self {
            WireType::Int => "bigint",
            WireType::Float => "float",
            WireType::Bit => "bit",
            WireType::NVarChar => "nvarchar(4000)",
            WireType::Text => "nvarchar(max)",
            WireType::VarBinary => "varbinary(max)",
        }
    }
}

/// Infer the wire type of `value` and convert it to the primitive that is sent.
///
/// Integral floats become `Int`, JSON scalars unwrap to their primitive, and
/// anything without a primitive form is sent as text.
#[must_use]
pub fn coerce(value: &RowValues) -> (WireType, RowValues) {
    match value {
        RowValues::Int(i) => (WireType::Int, RowValues::Int(*i)),
        RowValues::Float(f) => match integral(*f) {
            Some(i) => (WireType::Int, RowValues::Int(i)),
            None => (WireType::Float, RowValues::Float(*f)),
        },
        RowValues::Bool(b) => (WireType::Bit, RowValues::Bool(*b)),
        RowValues::Text(s) => (text_type(s), RowValues::Text(s.clone())),
        RowValues::Timestamp(dt) => (
            WireType::NVarChar,
            RowValues::Text(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        ),
        RowValues::Null => (WireType::NVarChar, RowValues::Null),
        RowValues::Blob(bytes) => (WireType::VarBinary, RowValues::Blob(bytes.clone())),
        RowValues::JSON(json) => coerce_json(json),
    }
}

fn coerce_json(json: &JsonValue) -> (WireType, RowValues) {
    match json {
        JsonValue::Null => (WireType::NVarChar, RowValues::Null),
        JsonValue::Bool(b) => coerce(&RowValues::Bool(*b)),
        JsonValue::String(s) => coerce(&RowValues::Text(s.clone())),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => (WireType::Int, RowValues::Int(i)),
            (None, Some(f)) => coerce(&RowValues::Float(f)),
            (None, None) => (WireType::NVarChar, RowValues::Text(n.to_string())),
        },
        other => {
            let text = other.to_string();
            (text_type(&text), RowValues::Text(text))
        }
    }
}

fn infer_json(json: &JsonValue) -> WireType {
    match json {
        JsonValue::String(s) => text_type(s),
        JsonValue::Array(_) | JsonValue::Object(_) => text_type(&json.to_string()),
        _ => coerce_json(json).0,
    }
}

fn text_type(s: &str) -> WireType {
    if s.chars().count() > LONG_TEXT_THRESHOLD {
        WireType::Text
    } else {
        WireType::NVarChar
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    if f.is_finite() && f.fract() == 0.0 && in_range {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_split_on_fractional_part() {
        assert_eq!(WireType::infer(&RowValues::Int(42)), WireType::Int);
        assert_eq!(WireType::infer(&RowValues::Float(42.0)), WireType::Int);
        assert_eq!(WireType::infer(&RowValues::Float(-3.0)), WireType::Int);
        assert_eq!(WireType::infer(&RowValues::Float(0.5)), WireType::Float);
        assert_eq!(WireType::infer(&RowValues::Float(f64::NAN)), WireType::Float);
        assert_eq!(
            coerce(&RowValues::Float(42.0)),
            (WireType::Int, RowValues::Int(42))
        );
    }

    #[test]
    fn strings_switch_to_large_text_above_threshold() {
        let short = "a".repeat(LONG_TEXT_THRESHOLD);
        let long = "a".repeat(LONG_TEXT_THRESHOLD + 1);
        assert_eq!(WireType::infer(&RowValues::Text(short)), WireType::NVarChar);
        assert_eq!(WireType::infer(&RowValues::Text(long)), WireType::Text);
        assert_eq!(WireType::infer(&RowValues::Text(String::new())), WireType::NVarChar);
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        let wide = "é".repeat(LONG_TEXT_THRESHOLD);
        assert!(wide.len() > LONG_TEXT_THRESHOLD);
        assert_eq!(WireType::infer(&RowValues::Text(wide)), WireType::NVarChar);
    }

    #[test]
    fn booleans_map_to_bit() {
        assert_eq!(WireType::infer(&RowValues::Bool(true)), WireType::Bit);
    }

    #[test]
    fn json_scalars_unwrap() {
        assert_eq!(
            coerce(&RowValues::JSON(json!(7))),
            (WireType::Int, RowValues::Int(7))
        );
        assert_eq!(
            coerce(&RowValues::JSON(json!(1.25))),
            (WireType::Float, RowValues::Float(1.25))
        );
        assert_eq!(
            coerce(&RowValues::JSON(json!("hi"))),
            (WireType::NVarChar, RowValues::Text("hi".into()))
        );
        assert_eq!(
            coerce(&RowValues::JSON(json!({"a": 1}))),
            (WireType::NVarChar, RowValues::Text("{\"a\":1}".into()))
        );
    }

    #[test]
    fn infer_agrees_with_coerce() {
        let samples = vec![
            RowValues::Int(1),
            RowValues::Float(2.5),
            RowValues::Float(3.0),
            RowValues::Bool(false),
            RowValues::Text("x".repeat(1500)),
            RowValues::Null,
            RowValues::Blob(vec![1, 2]),
            RowValues::JSON(json!([1, 2, 3])),
            RowValues::JSON(json!(true)),
        ];
        for value in &samples {
            assert_eq!(WireType::infer(value), coerce(value).0, "{value:?}");
        }
    }

    #[test]
    fn rows_serialize_as_plain_json() {
        let value = serde_json::to_value(vec![
            RowValues::Int(1),
            RowValues::Null,
            RowValues::Text("a".into()),
        ])
        .unwrap();
        assert_eq!(value, json!([1, null, "a"]));
    }
}
