//! Lenient field extraction shared by the provider normalizers.
//!
//! Upstream payloads are loosely typed: numbers arrive as strings, ids as
//! either numbers or strings, and empty strings stand in for missing values.
//! These helpers read a `serde_json::Value` the forgiving way and leave the
//! strict part (finite, in-domain coordinates) to [`coordinates`].

use crate::core::geo::LatLng;
use serde_json::Value;

/// Reads a number that may be encoded as a JSON number or numeric string
pub fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Reads a non-negative integer count, accepting numeric strings
pub fn count(value: Option<&Value>) -> Option<u32> {
    number(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round().min(u32::MAX as f64) as u32)
}

/// Reads a trimmed, non-empty string
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an identifier that may be a number or a string
pub fn identifier(value: Option<&Value>) -> Option<String> {
    text(value)
}

/// Builds a coordinate pair, rejecting anything non-finite or out of domain
pub fn coordinates(lat: Option<&Value>, lng: Option<&Value>) -> Option<LatLng> {
    let point = LatLng::new(number(lat)?, number(lng)?);
    point.is_valid().then_some(point)
}

/// Joins the non-empty parts of an address
pub fn join_address<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}
