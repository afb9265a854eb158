//! # Line Protocol Decoder
//!
//! Splits a record back into measurement, tags, typed fields and timestamp.

use super::field::{unescape_string, FieldValue};
use super::{is_valid_field_key, is_valid_measurement_name, is_valid_tag_key, LineProtocolError};

type Result<T> = std::result::Result<T, LineProtocolError>;

/// A record split into its parts
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Measurement name
    pub measurement: String,

    /// Tags in record order
    pub tags: Vec<(String, String)>,

    /// Fields in record order
    pub fields: Vec<(String, FieldValue)>,

    /// Timestamp in seconds, if present
    pub timestamp: Option<i64>,
}

/// Parse one record
///
/// # Arguments
///
/// * `line` - Record text without trailing newline
///
/// # Returns
///
/// * `Result<ParsedLine>` - Parsed record, or error if malformed
///
/// # Errors
///
/// Returns error if:
/// - The measurement name is invalid (`InvalidMeasurement`)
/// - A tag or field key is invalid (`InvalidTagKey` / `InvalidFieldKey`)
/// - There are no fields (`InvalidState`)
/// - A value or the timestamp cannot be parsed (`InvalidParam`)
///
/// # Examples
///
/// ```
/// use sensor_uplink::line_protocol::decoder::parse_line;
/// use sensor_uplink::line_protocol::FieldValue;
///
/// let parsed = parse_line("power,board=1 volts=12.500000,n=3i 1700000000")?;
/// assert_eq!(parsed.measurement, "power");
/// assert_eq!(parsed.fields[1], ("n".to_string(), FieldValue::Integer(3)));
/// assert_eq!(parsed.timestamp, Some(1_700_000_000));
/// # Ok::<(), sensor_uplink::line_protocol::LineProtocolError>(())
/// ```
pub fn parse_line(line: &str) -> Result<ParsedLine> {
    let (head, rest) = line
        .split_once(' ')
        .ok_or(LineProtocolError::InvalidState)?;

    let mut head_parts = head.split(',');
    let measurement = head_parts.next().unwrap_or_default();
    if !is_valid_measurement_name(measurement) {
        return Err(LineProtocolError::InvalidMeasurement);
    }

    let mut tags = Vec::new();
    for tag in head_parts {
        let (key, value) = tag.split_once('=').ok_or(LineProtocolError::InvalidParam)?;
        if !is_valid_tag_key(key) {
            return Err(LineProtocolError::InvalidTagKey);
        }
        tags.push((key.to_string(), value.to_string()));
    }

    let (fields, remainder) = parse_fields(rest)?;
    if fields.is_empty() {
        return Err(LineProtocolError::InvalidState);
    }

    let timestamp = match remainder {
        Some(ts) => Some(
            ts.trim()
                .parse::<i64>()
                .map_err(|_| LineProtocolError::InvalidParam)?,
        ),
        None => None,
    };

    Ok(ParsedLine {
        measurement: measurement.to_string(),
        tags,
        fields,
        timestamp,
    })
}

/// Parse the field set, returning the fields and whatever follows it.
fn parse_fields(input: &str) -> Result<(Vec<(String, FieldValue)>, Option<&str>)> {
    let bytes = input.as_bytes();
    let mut fields = Vec::new();
    let mut pos = 0;

    loop {
        let key_end = input[pos..]
            .find('=')
            .map(|i| pos + i)
            .ok_or(LineProtocolError::InvalidParam)?;
        let key = &input[pos..key_end];
        if !is_valid_field_key(key) {
            return Err(LineProtocolError::InvalidFieldKey);
        }

        let value_start = key_end + 1;
        let value_end = if bytes.get(value_start) == Some(&b'"') {
            closing_quote(bytes, value_start + 1)? + 1
        } else {
            input[value_start..]
                .find(|c: char| c == ',' || c == ' ')
                .map(|i| value_start + i)
                .unwrap_or(input.len())
        };

        let value = decode_value(&input[value_start..value_end])?;
        fields.push((key.to_string(), value));

        match bytes.get(value_end) {
            Some(b',') => pos = value_end + 1,
            Some(b' ') => return Ok((fields, Some(&input[value_end + 1..]))),
            None => return Ok((fields, None)),
            Some(_) => return Err(LineProtocolError::InvalidParam),
        }
    }
}

/// Index of the closing quote, skipping backslash escapes.
fn closing_quote(bytes: &[u8], mut pos: usize) -> Result<usize> {
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'"' => return Ok(pos),
            _ => pos += 1,
        }
    }
    Err(LineProtocolError::InvalidParam)
}

fn decode_value(raw: &str) -> Result<FieldValue> {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Ok(FieldValue::String(unescape_string(&raw[1..raw.len() - 1])));
    }

    match raw {
        "true" => return Ok(FieldValue::Boolean(true)),
        "false" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }

    if let Some(int) = raw.strip_suffix('i') {
        return int
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| LineProtocolError::InvalidParam);
    }

    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(FieldValue::Double(v)),
        _ => Err(LineProtocolError::InvalidParam),
    }
}
