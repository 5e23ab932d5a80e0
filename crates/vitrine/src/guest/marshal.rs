//! Value marshalling across the host/guest boundary
//!
//! The bridged value space is deliberately narrow: inputs are reduced to
//! numbers before they reach the guest, and results are dumped to plain
//! data on the way out. The boundary is copy-based in both directions;
//! no guest value ever holds a reference into host memory.

use indexmap::IndexMap;
use rquickjs::{Ctx, Object, Type, Value};
use serde_json::{Map, Number};

use crate::guest::GuestError;
use crate::types::{HostValue, OutputValue};

/// Convert a host value into the guest-visible numeric space.
///
/// Numbers pass through unchanged. Strings are reduced to their character
/// length, so the guest receives a magnitude proxy rather than the
/// content. Every other value maps to zero.
pub fn to_guest(value: &HostValue) -> f64 {
    match value {
        HostValue::Number(number) => *number,
        HostValue::Text(text) => text.chars().count() as f64,
        HostValue::Bool(_) | HostValue::Other(_) => 0.0,
    }
}

/// Materialise the marshalled inputs as a guest object, in input order.
pub(crate) fn build_inputs<'js>(
    ctx: &Ctx<'js>,
    inputs: &IndexMap<String, HostValue>,
) -> Result<Object<'js>, rquickjs::Error> {
    let object = Object::new(ctx.clone())?;
    for (name, value) in inputs {
        object.set(name.as_str(), to_guest(value))?;
    }
    Ok(object)
}

/// Dump a guest value into a host value.
///
/// Functions, symbols and over-deep structures have no host representation
/// and are reported as [`GuestError::Undumpable`]. Non-finite numbers dump
/// as `null`, matching their JSON rendering.
pub(crate) fn from_guest(value: &Value<'_>, max_depth: usize) -> Result<OutputValue, GuestError> {
    dump(value, 0, max_depth)
}

fn dump(value: &Value<'_>, depth: usize, max_depth: usize) -> Result<OutputValue, GuestError> {
    if depth > max_depth {
        return Err(GuestError::Undumpable(format!(
            "nesting exceeds the maximum depth of {max_depth}"
        )));
    }

    match value.type_of() {
        Type::Uninitialized | Type::Undefined | Type::Null => Ok(OutputValue::Null),
        Type::Bool => Ok(OutputValue::Bool(value.as_bool().unwrap_or_default())),
        Type::Int => Ok(OutputValue::from(value.as_int().unwrap_or_default())),
        Type::Float => {
            let number = value.as_float().unwrap_or_default();
            Ok(Number::from_f64(number).map_or(OutputValue::Null, OutputValue::Number))
        }
        Type::String => match value.as_string() {
            Some(text) => text
                .to_string()
                .map(OutputValue::String)
                .map_err(|e| GuestError::Undumpable(e.to_string())),
            None => Ok(OutputValue::Null),
        },
        Type::Array => {
            let Some(array) = value.as_array() else {
                return Ok(OutputValue::Null);
            };
            let mut items = Vec::with_capacity(array.len());
            for item in array.iter::<Value>() {
                let item = item.map_err(|e| GuestError::Undumpable(e.to_string()))?;
                items.push(dump(&item, depth + 1, max_depth)?);
            }
            Ok(OutputValue::Array(items))
        }
        Type::Object => {
            let Some(object) = value.as_object() else {
                return Ok(OutputValue::Null);
            };
            let mut map = Map::new();
            for prop in object.props::<String, Value>() {
                let (key, item) = prop.map_err(|e| GuestError::Undumpable(e.to_string()))?;
                map.insert(key, dump(&item, depth + 1, max_depth)?);
            }
            Ok(OutputValue::Object(map))
        }
        other => Err(GuestError::Undumpable(format!(
            "guest value of type {other:?} has no host representation"
        ))),
    }
}
