//! Pinned byte encoding for call arguments.
//!
//! Keys are only as stable as the bytes they hash, so the encoding is written
//! here rather than borrowed from a formatter whose output may drift between
//! releases. Any change to the rules below must bump [`ENCODING_VERSION`]; doing
//! so invalidates every key previously recorded on a cassette.
//!
//! Version 1 rules:
//! - the stream starts with `cassette-args/v1\n`
//! - `null`, `true`, `false` as literals
//! - integers in plain decimal, floats in shortest round-trip decimal with a
//!   mandatory fractional part (`3.0`, never `3` or `3e0`)
//! - strings double-quoted; `\\ \" \n \r \t` escaped, other control characters
//!   as `\u00XX`, everything else raw UTF-8
//! - sequences as `[a,b]`, mappings as `{"k":v}` in insertion order
//!
//! Raw `Value` arguments are encoded as given. The typed path ([`to_args`],
//! [`to_arg`]) sorts mapping keys first, since hash maps iterate in a
//! per-instance order.
//! - no whitespace anywhere

use crate::errors::SerializationError;
use serde::Serialize;
use serde_json::{Number, Value};
use std::fmt::Write;

pub const ENCODING_VERSION: u32 = 1;

/// Encode an ordered argument list into its canonical bytes.
pub fn encode_args(args: &[Value]) -> Result<Vec<u8>, SerializationError> {
    let mut out = format!("cassette-args/v{ENCODING_VERSION}\n");
    out.push('[');
    for (idx, value) in args.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        encode_value(value, &mut out)?;
    }
    out.push(']');
    Ok(out.into_bytes())
}

/// Convert a typed argument bundle into an argument list.
///
/// Tuples and sequences become one argument per element and `()` becomes no
/// arguments. Anything that is not a sequence is rejected, as is anything
/// `serde_json` cannot represent (maps with non-string keys, for instance).
///
/// Mapping keys are sorted at every depth, so a `HashMap` keys the same way
/// whatever order it iterates in. Sequences keep their order: serde cannot
/// tell a `HashSet` from a `Vec`, so pass sets as `BTreeSet`.
pub fn to_args<T: Serialize + ?Sized>(bundle: &T) -> Result<Vec<Value>, SerializationError> {
    match to_arg(bundle)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(SerializationError(format!(
            "argument bundle must serialize to a sequence, got {}",
            kind_name(&other)
        ))),
    }
}

/// Convert a single typed value into an argument, sorting mapping keys.
pub fn to_arg<T: Serialize + ?Sized>(value: &T) -> Result<Value, SerializationError> {
    serde_json::to_value(value)
        .map(sort_mapping_keys)
        .map_err(|e| SerializationError(e.to_string()))
}

fn sort_mapping_keys(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sort_mapping_keys).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, sort_mapping_keys(item)))
                    .collect(),
            )
        }
        other => other,
    }
}

fn encode_value(value: &Value, out: &mut String) -> Result<(), SerializationError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => encode_number(number, out)?,
        Value::String(text) => encode_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                encode_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                encode_string(key, out);
                out.push(':');
                encode_value(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn encode_number(number: &Number, out: &mut String) -> Result<(), SerializationError> {
    if let Some(value) = number.as_i64() {
        out.push_str(&value.to_string());
        return Ok(());
    }
    if let Some(value) = number.as_u64() {
        out.push_str(&value.to_string());
        return Ok(());
    }
    match number.as_f64() {
        Some(value) if value.is_finite() => {
            // `Display` for f64 is shortest round-trip and never uses exponents.
            let rendered = value.to_string();
            out.push_str(&rendered);
            if !rendered.contains('.') {
                out.push_str(".0");
            }
            Ok(())
        }
        _ => Err(SerializationError(format!("unsupported number {number}"))),
    }
}

fn encode_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_args, to_arg, to_args};
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;

    fn encoded(args: &[Value]) -> String {
        String::from_utf8(encode_args(args).expect("encode")).expect("utf8")
    }

    #[test]
    fn encoding_contract_is_pinned() {
        let args = vec![
            json!(null),
            json!(true),
            json!(-7),
            json!(3.0),
            json!(0.25),
            json!("tab\there \"quoted\" \u{1}"),
            json!([1, [2, {}]]),
            json!({"b": 1, "a": [false]}),
        ];
        assert_eq!(
            encoded(&args),
            "cassette-args/v1\n[null,true,-7,3.0,0.25,\"tab\\there \\\"quoted\\\" \\u0001\",[1,[2,{}]],{\"b\":1,\"a\":[false]}]"
        );
    }

    #[test]
    fn empty_argument_list_still_carries_version_tag() {
        assert_eq!(encoded(&[]), "cassette-args/v1\n[]");
    }

    #[test]
    fn mapping_order_is_significant() {
        let mut first = Map::new();
        first.insert("x".to_string(), json!(1));
        first.insert("y".to_string(), json!(2));
        let mut second = Map::new();
        second.insert("y".to_string(), json!(2));
        second.insert("x".to_string(), json!(1));
        assert_ne!(
            encoded(&[Value::Object(first)]),
            encoded(&[Value::Object(second)])
        );
    }

    #[test]
    fn integers_and_floats_never_alias() {
        assert_ne!(encoded(&[json!(3)]), encoded(&[json!(3.0)]));
        assert_ne!(encoded(&[json!(1)]), encoded(&[json!("1")]));
    }

    #[test]
    fn non_ascii_text_is_kept_verbatim() {
        assert_eq!(encoded(&[json!("héllo")]), "cassette-args/v1\n[\"héllo\"]");
    }

    #[test]
    fn tuples_become_argument_lists() {
        assert_eq!(
            to_args(&(1, "two", [3])).expect("args"),
            vec![json!(1), json!("two"), json!([3])]
        );
        assert!(to_args(&()).expect("unit").is_empty());
        assert_eq!(to_args(&(5,)).expect("single"), vec![json!(5)]);
    }

    #[test]
    fn typed_maps_encode_the_same_whatever_their_iteration_order() {
        let pairs = [("alpha", 1), ("bravo", 2), ("charlie", 3), ("delta", 4), ("echo", 5)];
        let mut forward = HashMap::new();
        for (key, value) in pairs {
            forward.insert(key.to_string(), vec![value]);
        }
        let mut reverse = HashMap::with_capacity(64);
        for (key, value) in pairs.into_iter().rev() {
            reverse.insert(key.to_string(), vec![value]);
        }

        let first = to_args(&(&forward, "tail")).expect("forward");
        let second = to_args(&(&reverse, "tail")).expect("reverse");
        assert_eq!(encoded(&first), encoded(&second));
        assert_eq!(
            encoded(&first),
            "cassette-args/v1\n[{\"alpha\":[1],\"bravo\":[2],\"charlie\":[3],\"delta\":[4],\"echo\":[5]},\"tail\"]"
        );
    }

    #[test]
    fn nested_typed_maps_are_sorted_but_sequences_keep_order() {
        let mut inner = HashMap::new();
        inner.insert("z", 1);
        inner.insert("a", 2);
        let outer = vec![json!({"y": 0, "b": 0}), serde_json::to_value(&inner).expect("inner")];
        let value = to_arg(&outer).expect("nested");
        assert_eq!(value, json!([{"b": 0, "y": 0}, {"a": 2, "z": 1}]));
        let rendered = encoded(&[value]);
        assert!(rendered.ends_with("[[{\"b\":0,\"y\":0},{\"a\":2,\"z\":1}]]"));
    }

    #[test]
    fn non_sequence_bundles_are_rejected() {
        let err = to_args(&"just a string").expect_err("scalar bundle");
        assert!(err.0.contains("got string"));
    }

    #[test]
    fn maps_with_non_string_keys_are_rejected() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert!(to_arg(&map).is_err());
    }
}
