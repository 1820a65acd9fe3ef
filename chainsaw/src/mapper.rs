//! The field-projection layer a `Hunt` applies to every document before
//! evaluating its filter: `None` passes a document
//! through untouched, `Fast` only renames keys (`from -> to`), and `Full`
//! additionally applies `cast` and `container` parsing.

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::{Map, Value as Json};
use tau_engine::{json_to_value, Document, Value};

use crate::rule::{Cast, Container, Field};

#[derive(Clone, Debug)]
pub enum Mapper {
    None,
    /// `(from, to)` pairs; renaming only, no cast/container.
    Fast(Vec<(String, String)>),
    Full(Vec<Field>),
}

impl Mapper {
    /// Pick the cheapest `Mapper` variant that can express `fields`: plain
    /// renames go through `Fast`, anything needing a `cast` or `container`
    /// upgrades the whole mapper to `Full`.
    pub fn from_fields(fields: &[Field]) -> Self {
        if fields.is_empty() {
            return Self::None;
        }
        if fields.iter().any(|f| f.cast.is_some() || f.container.is_some()) {
            Self::Full(fields.to_vec())
        } else {
            Self::Fast(fields.iter().map(|f| (f.from.clone(), f.to.clone())).collect())
        }
    }
}

/// A document with its `Mapper` applied. `container` fields are resolved
/// eagerly at construction (one parse per field per document) rather than
/// lazily memoised on first lookup - simpler, and pays the same asymptotic
/// cost since every mapped field is normally referenced by the rules that
/// motivated mapping it in the first place.
pub struct MappedDocument<'a> {
    inner: &'a dyn Document,
    mapper: &'a Mapper,
    containers: HashMap<String, Json>,
}

impl<'a> MappedDocument<'a> {
    pub fn new(inner: &'a dyn Document, mapper: &'a Mapper) -> Self {
        let mut containers = HashMap::new();
        if let Mapper::Full(fields) = mapper {
            for field in fields {
                let Some(container) = &field.container else { continue };
                let Some(raw) = inner.find(&field.from).and_then(|v| v.to_string()) else {
                    continue;
                };
                let parsed = match container {
                    Container::Json => serde_json::from_str::<Json>(&raw).ok(),
                    Container::Kv { delimiter, separator, trim } => Some(parse_kv(&raw, delimiter, separator, *trim)),
                };
                if let Some(value) = parsed {
                    containers.insert(field.to.clone(), value);
                }
            }
        }
        Self { inner, mapper, containers }
    }
}

fn parse_kv(raw: &str, delimiter: &str, separator: &str, trim: bool) -> Json {
    let mut map = Map::new();
    for token in raw.split(delimiter) {
        let Some((k, v)) = token.split_once(separator) else {
            continue;
        };
        let (k, v) = if trim { (k.trim(), v.trim()) } else { (k, v) };
        if k.is_empty() {
            continue;
        }
        map.insert(k.to_string(), Json::String(v.to_string()));
    }
    Json::Object(map)
}

fn apply_cast(cast: Cast, value: Value<'_>) -> Option<Value<'_>> {
    match cast {
        Cast::Int => value.as_i64().map(Value::Int),
        Cast::Flt => value.as_f64().map(Value::Float),
        Cast::Str => value.to_string().map(|s| Value::String(Cow::Owned(s))),
    }
}

impl<'a> Document for MappedDocument<'a> {
    fn find(&self, key: &str) -> Option<Value<'_>> {
        match self.mapper {
            Mapper::None => self.inner.find(key),
            Mapper::Fast(pairs) => {
                let from = pairs
                    .iter()
                    .find(|(_, to)| to == key)
                    .map(|(from, _)| from.as_str())
                    .unwrap_or(key);
                self.inner.find(from)
            }
            Mapper::Full(fields) => {
                for field in fields {
                    if field.container.is_none() {
                        continue;
                    }
                    let Some(parsed) = self.containers.get(&field.to) else {
                        continue;
                    };
                    if key == field.to {
                        return Some(json_to_value(parsed));
                    }
                    if let Some(rest) = key.strip_prefix(&field.to).and_then(|s| s.strip_prefix('.')) {
                        return parsed.find(rest);
                    }
                }
                for field in fields {
                    if field.to == key {
                        let value = self.inner.find(&field.from)?;
                        return match field.cast {
                            Some(cast) => apply_cast(cast, value),
                            None => Some(value),
                        };
                    }
                }
                self.inner.find(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn none_passes_through() {
        let doc = json!({"a": 1});
        let mapper = Mapper::None;
        let mapped = MappedDocument::new(&doc, &mapper);
        assert_eq!(mapped.find("a").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn fast_renames_key() {
        let doc = json!({"RawField": "hello"});
        let mapper = Mapper::Fast(vec![("RawField".into(), "Friendly".into())]);
        let mapped = MappedDocument::new(&doc, &mapper);
        assert_eq!(mapped.find("Friendly").unwrap().as_str(), Some("hello"));
        // Unmapped keys fall through to the underlying document.
        assert!(mapped.find("RawField").is_some());
    }

    #[test]
    fn full_applies_cast() {
        let doc = json!({"code": "4688"});
        let field = Field {
            name: "Code".into(),
            from: "code".into(),
            to: "Code".into(),
            cast: Some(Cast::Int),
            container: None,
            visible: true,
        };
        let mapper = Mapper::Full(vec![field]);
        let mapped = MappedDocument::new(&doc, &mapper);
        assert_eq!(mapped.find("Code").unwrap().as_i64(), Some(4688));
    }

    #[test]
    fn full_parses_json_container() {
        let doc = json!({"raw": "{\"user\": \"alice\"}"});
        let field = Field {
            name: "Parsed".into(),
            from: "raw".into(),
            to: "Parsed".into(),
            cast: None,
            container: Some(Container::Json),
            visible: true,
        };
        let mapper = Mapper::Full(vec![field]);
        let mapped = MappedDocument::new(&doc, &mapper);
        assert_eq!(mapped.find("Parsed.user").unwrap().as_str(), Some("alice"));
    }

    #[test]
    fn full_parses_kv_container_with_trim() {
        let doc = json!({"raw": "user = alice ; host = box1"});
        let field = Field {
            name: "Kv".into(),
            from: "raw".into(),
            to: "Kv".into(),
            cast: None,
            container: Some(Container::Kv {
                delimiter: ";".into(),
                separator: "=".into(),
                trim: true,
            }),
            visible: true,
        };
        let mapper = Mapper::Full(vec![field]);
        let mapped = MappedDocument::new(&doc, &mapper);
        assert_eq!(mapped.find("Kv.user").unwrap().as_str(), Some("alice"));
        assert_eq!(mapped.find("Kv.host").unwrap().as_str(), Some("box1"));
    }
}
