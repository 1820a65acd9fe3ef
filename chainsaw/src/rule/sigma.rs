//! Sigma YAML rule loader. The modifier grammar
//! (`contains`/`startswith`/`endswith`/`re`/`base64`/`base64offset`/`all`)
//! and the `all|1 of (them|prefix*)` condition forms are Tau's own
//! selection/condition grammar (`tau_engine::core::grammar`) - Sigma's
//! `detection` block is already shaped like a Tau `Detection` object, so
//! this loader only has to carry Sigma-specific *metadata* (id, level,
//! status, author, logsource) across to the common `Rule` schema and
//! resolve rule collections (`action: global` multi-document files).

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_yaml::Value as Yaml;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::file::Kind;

use super::{Level, Logsource, Rule, RuleKind, Status};

#[derive(Debug, Clone, Deserialize, Default)]
struct RawLogsource {
    category: Option<String>,
    definition: Option<String>,
    product: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawSigma {
    title: Option<String>,
    id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    description: String,
    author: Option<String>,
    level: Option<String>,
    logsource: Option<RawLogsource>,
    detection: Option<Yaml>,
    action: Option<String>,
}

impl RawSigma {
    /// Inherit any field `self` leaves unset from `base` - used when
    /// expanding a rule-collection extension document against its
    /// `action: global` base document. `detection` is deliberately *not*
    /// inherited: each extension provides its own detection/condition,
    /// i.e. it never reuses the base's.
    fn inherit_from(mut self, base: &RawSigma) -> Self {
        self.title = self.title.or_else(|| base.title.clone());
        self.id = self.id.or_else(|| base.id.clone());
        self.status = self.status.or_else(|| base.status.clone());
        if self.description.is_empty() {
            self.description = base.description.clone();
        }
        self.author = self.author.or_else(|| base.author.clone());
        self.level = self.level.or_else(|| base.level.clone());
        self.logsource = self.logsource.or_else(|| base.logsource.clone());
        self
    }
}

/// Load every rule in a Sigma YAML file. A plain single-document file
/// yields exactly one `Rule`; a rule collection (first document carrying
/// `action: global`) yields one `Rule` per subsequent document, each
/// inheriting the base document's metadata.
pub fn load(path: &Path) -> Result<Vec<Rule>> {
    super::yaml_extension_ok(path)?;
    let text = fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let docs: Vec<Yaml> = serde_yaml::Deserializer::from_str(&text)
        .map(Yaml::deserialize)
        .collect::<std::result::Result<_, _>>()
        .map_err(Error::Yaml)?;
    let Some((first, rest)) = docs.split_first() else {
        return Err(Error::Schema("sigma file has no yaml documents".into()));
    };
    let first: RawSigma = serde_yaml::from_value(first.clone()).map_err(Error::Yaml)?;

    if first.action.as_deref() == Some("global") {
        if rest.is_empty() {
            return Err(Error::Schema(
                "sigma rule collection's 'action: global' document has no extensions".into(),
            ));
        }
        rest.iter()
            .map(|doc| {
                let ext: RawSigma = serde_yaml::from_value(doc.clone()).map_err(Error::Yaml)?;
                build_rule(ext.inherit_from(&first))
            })
            .collect()
    } else {
        Ok(vec![build_rule(first)?])
    }
}

fn build_rule(raw: RawSigma) -> Result<Rule> {
    let name = raw
        .title
        .ok_or_else(|| Error::Schema("sigma rule requires a title".into()))?;
    let id = match raw.id {
        Some(s) => Uuid::parse_str(&s).map_err(|e| Error::Schema(format!("invalid sigma id '{s}': {e}")))?,
        None => Uuid::new_v4(),
    };
    // Both conversions are infallible (unrecognised input maps to a
    // default: unknown level -> Info, non-"stable" status -> Experimental),
    // so `.unwrap()` here can never panic.
    let level = raw.level.as_deref().map(|s| Level::from_str(s).unwrap()).unwrap_or(Level::Info);
    let status = raw
        .status
        .as_deref()
        .map(|s| Status::from_str(s).unwrap())
        .unwrap_or(Status::Experimental);
    let authors = match raw.author {
        Some(s) => {
            let names: Vec<String> = s.split(',').map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect();
            if names.is_empty() {
                vec!["unknown".to_string()]
            } else {
                names
            }
        }
        None => vec!["unknown".to_string()],
    };
    let logsource = raw
        .logsource
        .map(|l| Logsource {
            category: l.category,
            definition: l.definition,
            product: l.product,
            service: l.service,
        })
        .unwrap_or_default();

    let detection = raw
        .detection
        .ok_or_else(|| Error::Schema("sigma rule requires a 'detection' block".into()))?;
    let expression = tau_engine::parse_detection(&detection).map_err(|e| Error::Schema(e.to_string()))?;

    Ok(Rule {
        id,
        origin: RuleKind::Sigma,
        name,
        // A bare Sigma rule has no display-grouping concept of its own;
        // `group` only has meaning for Chainsaw-native rules.
        group: String::new(),
        authors,
        // A standalone Sigma rule doesn't name a file kind; `Unknown`
        // means "match documents of any kind". A mapping `Group` supplies
        // the concrete kind when one wraps it.
        kind: Kind::Unknown,
        level,
        status,
        // Superseded by the wrapping mapping `Group`'s own `timestamp`
        // field at hunt time; a standalone Sigma rule carries none.
        timestamp: String::new(),
        fields: Vec::new(),
        filter: super::Filter::Detection(expression),
        aggregate: None,
        logsource,
    })
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
    fn loads_single_document_rule() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rule.yml",
            r#"
title: Suspicious PowerShell Command Line
id: 12345678-1234-1234-1234-123456789abc
status: stable
level: high
author: "Alice, Bob"
logsource:
  category: process_creation
  product: windows
detection:
  sel:
    CommandLine|contains: powershell
  condition: sel
"#,
        );
        let rules = load(&path).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.name, "Suspicious PowerShell Command Line");
        assert_eq!(rule.level, Level::High);
        assert_eq!(rule.status, Status::Stable);
        assert_eq!(rule.authors, vec!["Alice".to_string(), "Bob".to_string()]);
        assert_eq!(rule.logsource.product.as_deref(), Some("windows"));
    }

    #[test]
    fn unknown_level_defaults_to_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rule.yml",
            r#"
title: No level given
detection:
  sel:
    EventID: 1
  condition: sel
"#,
        );
        let rules = load(&path).unwrap();
        assert_eq!(rules[0].level, Level::Info);
        assert_eq!(rules[0].status, Status::Experimental);
    }

    #[test]
    fn rule_collection_expands_each_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rules.yml",
            r#"
title: Base title
action: global
status: stable
level: medium
---
title: Variant A
detection:
  sel:
    EventID: 1
  condition: sel
---
title: Variant B
detection:
  sel:
    EventID: 2
  condition: sel
"#,
        );
        let rules = load(&path).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "Variant A");
        assert_eq!(rules[1].name, "Variant B");
        // Inherited from the global base document.
        assert_eq!(rules[0].level, Level::Medium);
        assert_eq!(rules[1].status, Status::Stable);
    }

    #[test]
    fn invalid_modifier_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rule.yml",
            r#"
title: Bad modifier
detection:
  sel:
    CommandLine|near: powershell
  condition: sel
"#,
        );
        assert!(load(&path).is_err());
    }
}
