use std::borrow::Cow;

use serde_json::{Map, Value as Json};

/// A borrowed view of a scalar or structured value yielded by a [`Document`]
/// lookup. This is the canonical value model every decoder in `chainsaw`
/// ultimately exposes to the solver: eight variants, numeric kind preserved
/// exactly as decoded (`UInt` is never silently folded into `Int`).
#[derive(Clone, Debug)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(Cow<'a, str>),
    Array(Vec<Value<'a>>),
    Object(&'a Map<String, Json>),
}

impl<'a> Value<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(u) => Some(*u),
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value<'a>]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Stringify any scalar, used by field-mapping casts and aggregate
    /// bucket key hashing, which need a stable textual representation.
    pub fn to_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::UInt(u) => Some(u.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.to_string()),
            Self::Array(_) | Self::Object(_) => None,
        }
    }
}

/// Uniform lookup surface every decoded record implements. `find` resolves a
/// dot-separated path; encountering an `Array` at an intermediate segment
/// switches to "match if any element matches" semantics by recursing into
/// every element and wrapping the results back into an `Array`.
pub trait Document: Send + Sync {
    fn find(&self, key: &str) -> Option<Value<'_>>;
}

impl Document for Json {
    fn find(&self, key: &str) -> Option<Value<'_>> {
        find_json(self, key)
    }
}

/// Convert a whole `serde_json::Value` into the canonical `Value` it
/// represents (as opposed to [`find_json`], which resolves a dotted path
/// *within* one). Exposed for callers - such as a field mapper's
/// `container` resolution - that parse a scalar field's string content
/// into a fresh JSON tree and need to hand the whole thing back as a
/// `Value` rather than look up a sub-path of it.
pub fn json_to_value(json: &Json) -> Value<'_> {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(Cow::Borrowed(s.as_str())),
        Json::Array(a) => Value::Array(a.iter().map(json_to_value).collect()),
        Json::Object(map) => Value::Object(map),
    }
}

/// Resolve `key` (a dotted path) against `json`. `None` means the path is
/// absent anywhere along the walk, including a terminal `Null`.
pub fn find_json<'a>(json: &'a Json, key: &str) -> Option<Value<'a>> {
    find_json_path(json, key)
}

/// `path` is the *remaining* dotted path still to resolve from `json`. If
/// `json` is an `Array`, the whole remaining path (not just the next
/// segment) is re-applied to every element - this is what gives array
/// fields "match if any element matches" semantics at any depth.
fn find_json_path<'a>(json: &'a Json, path: &str) -> Option<Value<'a>> {
    if let Json::Array(items) = json {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Some(v) = find_json_path(item, path) {
                out.push(v);
            }
        }
        return if out.is_empty() { None } else { Some(Value::Array(out)) };
    }
    match path.split_once('.') {
        Some((head, tail)) => {
            let next = json.as_object()?.get(head)?;
            find_json_path(next, tail)
        }
        None => {
            let next = json.as_object().and_then(|m| m.get(path))?;
            let value = json_to_value(next);
            if value.is_null() {
                None
            } else {
                Some(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_path_descends_objects() {
        let doc = json!({"Event": {"System": {"EventID": 4688}}});
        let found = doc.find("Event.System.EventID").unwrap();
        assert_eq!(found.as_u64(), Some(4688));
    }

    #[test]
    fn missing_segment_is_absent() {
        let doc = json!({"Event": {"System": {}}});
        assert!(doc.find("Event.System.EventID").is_none());
        assert!(doc.find("Event.Nope.Field").is_none());
    }

    #[test]
    fn array_any_element_semantics() {
        let doc = json!({"Records": [{"Id": 1}, {"Id": 2}, {"Id": 3}]});
        let found = doc.find("Records.Id").unwrap();
        let arr = found.as_array().unwrap();
        let ids: Vec<u64> = arr.iter().filter_map(|v| v.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn null_terminal_is_absent() {
        let doc = json!({"Field": null});
        assert!(doc.find("Field").is_none());
    }

    #[test]
    fn numeric_kind_preserved() {
        let doc = json!({"u": 5, "i": -5, "f": 1.5});
        assert!(matches!(doc.find("u").unwrap(), Value::UInt(5)));
        assert!(matches!(doc.find("i").unwrap(), Value::Int(-5)));
        assert!(matches!(doc.find("f").unwrap(), Value::Float(_)));
    }
}
