//! Mapping YAML loader: the Sigma-integration schema that wraps a set of
//! Sigma rules behind a shared group filter, field projection, and
//! timestamp field, with optional per-rule-metadata preconditions.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_yaml::Value as Yaml;
use tau_engine::core::Expression;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::file::Kind;

use super::chainsaw::{parse_field, parse_filter, RawField};
use super::{Field, RuleKind};

#[derive(Debug, Deserialize)]
struct RawPrecondition {
    #[serde(rename = "for")]
    for_: HashMap<String, String>,
    filter: Yaml,
}

#[derive(Debug, Deserialize, Default)]
struct RawExtensions {
    #[serde(default)]
    preconditions: Vec<RawPrecondition>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    fields: Vec<RawField>,
    filter: Yaml,
    name: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    kind: String,
    rules: String,
    #[serde(default)]
    exclusions: Vec<String>,
    extensions: Option<RawExtensions>,
    #[serde(default)]
    groups: Vec<RawGroup>,
}

/// `{for: {key: value}, filter}` - gates a mapping `Group`'s candidate
/// rule set by the rule's own metadata.
#[derive(Clone, Debug)]
pub struct Precondition {
    pub for_: HashMap<String, String>,
    pub filter: Expression,
}

/// `{id, fields, filter, name, timestamp}` - one mapping group, evaluated
/// as a `Hunt::Group` against every candidate Sigma rule.
#[derive(Clone, Debug)]
pub struct Group {
    pub id: Uuid,
    pub fields: Vec<Field>,
    pub filter: Expression,
    pub name: String,
    pub timestamp: String,
}

/// The parsed mapping file: a file kind, the rule kind it targets
/// (always `Sigma` - a Chainsaw-kind mapping is a load error), its groups,
/// and the rule-name exclusion set.
#[derive(Clone, Debug)]
pub struct Mapping {
    pub kind: Kind,
    pub rules_kind: RuleKind,
    pub groups: Vec<Group>,
    pub exclusions: HashSet<String>,
    pub preconditions: Vec<Precondition>,
}

pub fn load(path: &Path) -> Result<Mapping> {
    super::yaml_extension_ok(path)?;
    let text = fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let raw: RawMapping = serde_yaml::from_str(&text).map_err(Error::Yaml)?;

    let rules_kind = match raw.rules.as_str() {
        "sigma" => RuleKind::Sigma,
        "chainsaw" => {
            return Err(Error::Schema("Chainsaw rules do not support mappings".into()));
        }
        other => return Err(Error::Schema(format!("unknown mapping rules kind: {other}"))),
    };
    let kind = Kind::from_str(&raw.kind).map_err(|e| Error::Schema(e.to_string()))?;

    let mut groups = raw
        .groups
        .into_iter()
        .map(build_group)
        .collect::<Result<Vec<_>>>()?;
    groups.sort_by(|a, b| a.name.cmp(&b.name));

    let preconditions = raw
        .extensions
        .unwrap_or_default()
        .preconditions
        .into_iter()
        .map(build_precondition)
        .collect::<Result<Vec<_>>>()?;

    Ok(Mapping {
        kind,
        rules_kind,
        groups,
        exclusions: raw.exclusions.into_iter().collect(),
        preconditions,
    })
}

fn build_group(raw: RawGroup) -> Result<Group> {
    let fields = raw.fields.into_iter().map(parse_field).collect::<Result<Vec<_>>>()?;
    let filter = parse_filter(&raw.filter)?.expression().clone();
    Ok(Group {
        id: Uuid::new_v4(),
        fields,
        filter,
        name: raw.name,
        timestamp: raw.timestamp,
    })
}

fn build_precondition(raw: RawPrecondition) -> Result<Precondition> {
    let filter = parse_filter(&raw.filter)?.expression().clone();
    Ok(Precondition { for_: raw.for_, filter })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn chainsaw_rules_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "mapping.yml",
            r#"
kind: evtx
rules: chainsaw
groups: []
"#,
        );
        assert!(matches!(load(&path), Err(Error::Schema(_))));
    }

    #[test]
    fn loads_groups_sorted_by_name_with_preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "mapping.yml",
            r#"
kind: evtx
rules: sigma
exclusions:
  - noisy_rule
extensions:
  preconditions:
    - for:
        logsource.category: process_creation
      filter: "EventID == 1"
groups:
  - name: ZGroup
    timestamp: Event.System.TimeCreated
    filter: "EventID == 1"
    fields:
      - name: User
  - name: AGroup
    timestamp: Event.System.TimeCreated
    filter: "EventID == 1"
"#,
        );
        let mapping = load(&path).unwrap();
        assert_eq!(mapping.rules_kind, RuleKind::Sigma);
        assert_eq!(mapping.groups.len(), 2);
        assert_eq!(mapping.groups[0].name, "AGroup");
        assert_eq!(mapping.groups[1].name, "ZGroup");
        assert!(mapping.exclusions.contains("noisy_rule"));
        assert_eq!(mapping.preconditions.len(), 1);
        assert_eq!(
            mapping.preconditions[0].for_.get("logsource.category").map(String::as_str),
            Some("process_creation")
        );
    }
}
