//! # Field Values
//!
//! Typed field values and their wire encoding.

use std::fmt;

/// A typed field value.
///
/// The variant decides the wire encoding; it is dispatched once, when the
/// field is appended to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Floating point, written with six decimals
    Double(f64),
    /// Signed integer, written with an `i` suffix
    Integer(i64),
    /// String, quoted with `"` and `\` escaped
    String(String),
    /// Boolean, written as `true` / `false`
    Boolean(bool),
}

impl FieldValue {
    /// Returns true if the value can be written to the wire.
    ///
    /// Doubles must be finite. Strings must not contain line breaks, which
    /// would split the record when it is spooled.
    pub fn is_writable(&self) -> bool {
        match self {
            FieldValue::Double(v) => v.is_finite(),
            FieldValue::String(v) => !v.contains(is_line_break),
            _ => true,
        }
    }
}

/// `\n` or `\r`
pub(crate) fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Double(v) => write!(f, "{:.6}", v),
            FieldValue::Integer(v) => write!(f, "{}i", v),
            FieldValue::String(v) => write!(f, "\"{}\"", escape_string(v)),
            FieldValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

/// Escape `"` and `\` with a backslash.
///
/// # Examples
///
/// ```
/// use sensor_uplink::line_protocol::field::escape_string;
///
/// assert_eq!(escape_string(r#"say "hi""#), r#"say \"hi\""#);
/// assert_eq!(escape_string(r"C:\tmp"), r"C:\\tmp");
/// ```
pub fn escape_string(input: &str) -> String {
    let extra = input.chars().filter(|c| matches!(c, '"' | '\\')).count();
    let mut escaped = String::with_capacity(input.len() + extra);

    for c in input.chars() {
        if matches!(c, '"' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// Reverse [`escape_string`]: drop the backslash in front of `"` and `\`.
///
/// A backslash before any other character is kept as is.
pub fn unescape_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '"' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}
