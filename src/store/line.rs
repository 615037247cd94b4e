//! InfluxDB line-protocol encoding.
//!
//! Pure string building, decoupled from the HTTP transport so it can be
//! tested without a running store.

use crate::plc::Reading;

/// Escape a measurement name (commas and spaces).
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape a tag key, tag value, or field key (commas, equals, spaces).
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

/// Render a float field value. Line protocol treats bare numbers as
/// floats, which matches the all-float schema.
fn format_field(value: f64) -> String {
    format!("{value}")
}

/// Encode one reading as a single line-protocol point with an epoch-ms
/// timestamp.
pub fn encode_point(measurement: &str, source_tag: &str, reading: &Reading) -> String {
    let mut line = String::with_capacity(64 + reading.len() * 12);
    line.push_str(&escape_measurement(measurement));
    line.push_str(",source=");
    line.push_str(&escape_key(source_tag));
    line.push(' ');

    for (i, (name, value)) in reading.channels.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(name));
        line.push('=');
        line.push_str(&format_field(*value));
    }

    line.push(' ');
    line.push_str(&reading.timestamp.timestamp_millis().to_string());
    line
}
