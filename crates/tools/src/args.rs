//! Argument decoding for built-in tool calls.
//!
//! Models emit numbers as either integers or floats, and sometimes omit or
//! mistype optional flags. Required fields fail with
//! [`ToolError::InvalidArgument`]; optional ones fall back to a default.

use proto::{Payload, ToolError};
use serde_json::Value;

use crate::session::ScrollDirection;

/// Reads a required string field.
pub fn require_str<'a>(tool: &str, args: &'a Payload, field: &str) -> Result<&'a str, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_argument(tool, field))
}

/// Reads a required numeric field, truncating floats to whole pixels.
pub fn require_coordinate(tool: &str, args: &Payload, field: &str) -> Result<i64, ToolError> {
    args.get(field)
        .and_then(number_as_i64)
        .ok_or_else(|| ToolError::invalid_argument(tool, field))
}

/// Reads the `x`/`y` pair shared by the spatial tools.
pub fn require_point(tool: &str, args: &Payload) -> Result<(i64, i64), ToolError> {
    Ok((
        require_coordinate(tool, args, "x")?,
        require_coordinate(tool, args, "y")?,
    ))
}

/// Reads a required scroll direction.
pub fn require_direction(tool: &str, args: &Payload) -> Result<ScrollDirection, ToolError> {
    require_str(tool, args, "direction")?
        .parse()
        .map_err(|()| ToolError::invalid_argument(tool, "direction"))
}

/// Reads an optional boolean, using `default` when absent or not a bool.
pub fn optional_bool(args: &Payload, field: &str, default: bool) -> bool {
    args.get(field).and_then(Value::as_bool).unwrap_or(default)
}

/// Reads an optional number, using `default` when absent or not a number.
pub fn optional_int(args: &Payload, field: &str, default: i64) -> i64 {
    args.get(field).and_then(number_as_i64).unwrap_or(default)
}

fn number_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}
