//! JSON probing helpers
//!
//! Report payloads put the same logical value under different key paths
//! depending on report type and firmware. Paths are written as dotted
//! strings; a purely numeric segment indexes into an array.

use serde_json::Value;

/// Resolve a dotted path such as `print.device.extruder.info.0.temp`
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Lenient numeric read: JSON numbers and numeric strings
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Lenient integer read, accepting hex strings such as `"0x1F"`
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16).ok(),
                None => s
                    .parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
            }
        }
        _ => None,
    }
}

/// Non-empty trimmed string; numbers are rendered as text
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First candidate path that resolves to a value accepted by `accept`
///
/// Returns the accepted value together with the path it came from.
pub fn first_match<T>(
    root: &Value,
    candidates: &[&'static str],
    mut accept: impl FnMut(&Value) -> Option<T>,
) -> Option<(T, &'static str)> {
    candidates.iter().find_map(|path| {
        lookup(root, path)
            .and_then(&mut accept)
            .map(|value| (value, *path))
    })
}

/// True if any candidate path resolves, whatever its value
pub fn any_present(root: &Value, candidates: &[&str]) -> bool {
    candidates.iter().any(|path| lookup(root, path).is_some())
}
