//! Chainsaw-native YAML rule loader: parses a rule file directly
//! into the common `Rule` schema and runs its filter through the Tau
//! optimiser. Unlike Sigma there is no modifier grammar to translate - a
//! Chainsaw rule's `filter` is already either a tagged detection block or a
//! raw Tau expression string.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_yaml::Value as Yaml;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::file::Kind;

use super::{Aggregate, Cast, Container, Field, Filter, Level, Logsource, Rule, RuleKind, Status};

#[derive(Debug, Deserialize, Default)]
pub(crate) struct RawField {
    name: Option<String>,
    from: Option<String>,
    to: Option<String>,
    cast: Option<String>,
    container: Option<Yaml>,
    visible: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawAggregate {
    count: String,
    fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    title: Option<String>,
    name: Option<String>,
    #[serde(default)]
    group: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    authors: Vec<String>,
    kind: String,
    level: String,
    status: String,
    timestamp: String,
    #[serde(default)]
    fields: Vec<RawField>,
    filter: Yaml,
    aggregate: Option<RawAggregate>,
}

/// Load one Chainsaw-native rule from `path`.
pub fn load(path: &Path) -> Result<Rule> {
    super::yaml_extension_ok(path)?;
    let text = fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let raw: RawRule = serde_yaml::from_str(&text).map_err(Error::Yaml)?;
    let _ = raw.description;

    let name = raw
        .title
        .or(raw.name)
        .ok_or_else(|| Error::Schema("rule must have a title or a name".into()))?;
    let kind = Kind::from_str(&raw.kind).map_err(|e| Error::Schema(e.to_string()))?;
    let level = parse_level(&raw.level)?;
    let status = parse_status(&raw.status)?;
    let fields = raw
        .fields
        .into_iter()
        .map(parse_field)
        .collect::<Result<Vec<_>>>()?;
    let filter = parse_filter(&raw.filter)?;
    let aggregate = raw
        .aggregate
        .map(|a| {
            let count =
                super::CountPattern::from_str(&a.count).map_err(|e| Error::Schema(e.to_string()))?;
            Ok::<_, Error>(Aggregate { count, fields: a.fields })
        })
        .transpose()?;

    Ok(Rule {
        id: Uuid::new_v4(),
        origin: RuleKind::Chainsaw,
        name,
        group: raw.group,
        authors: raw.authors,
        kind,
        level,
        status,
        timestamp: raw.timestamp,
        fields,
        filter,
        aggregate,
        logsource: Logsource::default(),
    })
}

fn parse_level(s: &str) -> Result<Level> {
    Ok(match s {
        "critical" => Level::Critical,
        "high" => Level::High,
        "medium" => Level::Medium,
        "low" => Level::Low,
        "info" => Level::Info,
        other => return Err(Error::Schema(format!("invalid level: {other}"))),
    })
}

fn parse_status(s: &str) -> Result<Status> {
    Ok(match s {
        "stable" => Status::Stable,
        "experimental" => Status::Experimental,
        other => return Err(Error::Schema(format!("invalid status: {other}"))),
    })
}

pub(crate) fn parse_filter(value: &Yaml) -> Result<Filter> {
    match value {
        Yaml::String(s) => {
            let expr = tau_engine::parse_expression(s).map_err(|e| Error::Schema(e.to_string()))?;
            Ok(Filter::Expression(expr))
        }
        Yaml::Mapping(_) | Yaml::Tagged(_) => {
            let expr = tau_engine::parse_detection(value).map_err(|e| Error::Schema(e.to_string()))?;
            Ok(Filter::Detection(expr))
        }
        other => Err(Error::Schema(format!("unsupported filter shape: {other:?}"))),
    }
}

/// `int(f)`/`str(f)`/`flt(f)` wrapper around a field's `to` name; strips
/// the wrapper and returns the cast it implies.
fn strip_cast_wrapper(s: &str) -> Option<(Cast, String)> {
    for (prefix, cast) in [("int(", Cast::Int), ("str(", Cast::Str), ("flt(", Cast::Flt)] {
        if let Some(rest) = s.strip_prefix(prefix) {
            if let Some(inner) = rest.strip_suffix(')') {
                return Some((cast, inner.to_string()));
            }
        }
    }
    None
}

fn parse_container(value: &Yaml) -> Result<Container> {
    match value {
        Yaml::String(s) if s == "json" => Ok(Container::Json),
        Yaml::Mapping(map) => {
            let kv = map
                .get(Yaml::String("kv".into()))
                .ok_or_else(|| Error::Schema("container mapping must have a 'kv' key".into()))?;
            let delimiter = kv
                .get("delimiter")
                .and_then(Yaml::as_str)
                .ok_or_else(|| Error::Schema("container.kv requires 'delimiter'".into()))?
                .to_string();
            let separator = kv
                .get("separator")
                .and_then(Yaml::as_str)
                .ok_or_else(|| Error::Schema("container.kv requires 'separator'".into()))?
                .to_string();
            let trim = kv.get("trim").and_then(Yaml::as_bool).unwrap_or(false);
            Ok(Container::Kv {
                delimiter,
                separator,
                trim,
            })
        }
        other => Err(Error::Schema(format!("unsupported container shape: {other:?}"))),
    }
}

/// Field deserialisation rules: `name`-only sets `from = to = name`;
/// `to`-only sets `from = to`, `name = to`; a cast wrapper on `to` strips
/// and sets `cast`; `cast` and `container` are mutually exclusive;
/// `visible` defaults `true`.
pub(crate) fn parse_field(raw: RawField) -> Result<Field> {
    let explicit_cast = raw.cast.as_deref().map(Cast::from_str).transpose().map_err(|e| {
        Error::Schema(e.to_string())
    })?;

    let (wrapper_cast, to) = match raw.to {
        Some(to) => match strip_cast_wrapper(&to) {
            Some((cast, inner)) => (Some(cast), Some(inner)),
            None => (None, Some(to)),
        },
        None => (None, None),
    };
    let cast = explicit_cast.or(wrapper_cast);

    let (name, from, to) = match (raw.name, raw.from, to) {
        (Some(name), from, to) => {
            let to = to.unwrap_or_else(|| name.clone());
            let from = from.unwrap_or_else(|| name.clone());
            (name, from, to)
        }
        (None, from, Some(to)) => {
            let from = from.unwrap_or_else(|| to.clone());
            (to.clone(), from, to)
        }
        (None, Some(_), None) => {
            return Err(Error::Schema("field has 'from' but no 'name' or 'to'".into()));
        }
        (None, None, None) => {
            return Err(Error::Schema("field requires at least a 'name' or a 'to'".into()));
        }
    };

    let container = raw.container.as_ref().map(parse_container).transpose()?;
    if cast.is_some() && container.is_some() {
        return Err(Error::Schema(
            "field 'cast' and 'container' are mutually exclusive".into(),
        ));
    }

    Ok(Field {
        name,
        from,
        to,
        cast,
        container,
        visible: raw.visible.unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn rejects_non_yaml_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rule.txt", "title: x");
        assert!(matches!(load(&path), Err(Error::Schema(_))));
    }

    #[test]
    fn loads_minimal_detection_rule() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rule.yml",
            r#"
title: Suspicious PowerShell
group: test
kind: evtx
level: high
status: stable
timestamp: Event.System.TimeCreated
fields:
  - name: User
filter:
  sel:
    EventID: 4688
  condition: sel
"#,
        );
        let rule = load(&path).unwrap();
        assert_eq!(rule.name, "Suspicious PowerShell");
        assert_eq!(rule.kind, Kind::Evtx);
        assert_eq!(rule.level, Level::High);
        assert!(matches!(rule.filter, Filter::Detection(_)));
        assert_eq!(rule.fields[0].from, "User");
        assert_eq!(rule.fields[0].to, "User");
    }

    #[test]
    fn loads_raw_expression_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rule.yml",
            r#"
title: Raw expression rule
group: test
kind: evtx
level: medium
status: experimental
timestamp: ts
filter: "int(EventID) == 4688"
"#,
        );
        let rule = load(&path).unwrap();
        assert!(matches!(rule.filter, Filter::Expression(_)));
    }

    #[test]
    fn field_to_cast_wrapper_strips_and_sets_cast() {
        let field = parse_field(RawField {
            name: None,
            from: Some("RawCode".into()),
            to: Some("int(Code)".into()),
            cast: None,
            container: None,
            visible: None,
        })
        .unwrap();
        assert_eq!(field.to, "Code");
        assert_eq!(field.cast, Some(Cast::Int));
    }

    #[test]
    fn cast_and_container_are_mutually_exclusive() {
        let err = parse_field(RawField {
            name: Some("X".into()),
            from: None,
            to: None,
            cast: Some("int".into()),
            container: Some(Yaml::String("json".into())),
            visible: None,
        });
        assert!(err.is_err());
    }

    #[test]
    fn invalid_level_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rule.yml",
            r#"
title: Bad
group: test
kind: evtx
level: extreme
status: stable
timestamp: ts
filter: "EventID == 1"
"#,
        );
        assert!(matches!(load(&path), Err(Error::Schema(_))));
    }
}
