//! The unified rule contract both loaders (Chainsaw-native YAML and Sigma)
//! produce, plus the field-projection and aggregate schema the hunt engine
//! consumes. Chainsaw rules and Sigma rules are parsed by distinct paths
//! (`chainsaw::load` / `sigma::load`) but collapse to this one `Rule` shape
//! so the hunt engine never needs to know which loader produced a given
//! rule.

pub mod chainsaw;
pub mod mapping;
pub mod sigma;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tau_engine::core::Expression;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::file::Kind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            // Sigma: an unrecognised/absent level maps to `Info` rather
            // than erroring, per the loader's lenient metadata handling.
            _ => Self::Info,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stable,
    Experimental,
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            // Sigma: anything other than the literal `stable` is treated
            // as experimental.
            _ => Self::Experimental,
        })
    }
}

/// Which loader produced a `Rule`. Used by the hunt engine when a mapping
/// `Group` needs to pick its candidate rules by `rules_kind` - mappings
/// only ever reference Sigma rules (a Chainsaw-kind mapping is a load
/// error), but the tag is kept on every rule so that invariant is
/// mechanical rather than assumed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Chainsaw,
    Sigma,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

/// The scalar cast a field-mapping `to: int(f)` wrapper (or a Tau `Cast`
/// expression node) coerces a value to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Int,
    Str,
    Flt,
}

impl FromStr for Cast {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "int" => Self::Int,
            "str" => Self::Str,
            "flt" => Self::Flt,
            other => anyhow::bail!("unknown cast: {other}"),
        })
    }
}

impl From<Cast> for tau_engine::core::ModSym {
    fn from(cast: Cast) -> Self {
        match cast {
            Cast::Int => tau_engine::core::ModSym::Int,
            Cast::Str => tau_engine::core::ModSym::Str,
            Cast::Flt => tau_engine::core::ModSym::Flt,
        }
    }
}

/// A field's `container` spec: parse its string value as a nested
/// structure before projection.
#[derive(Clone, Debug)]
pub enum Container {
    Json,
    Kv {
        delimiter: String,
        separator: String,
        trim: bool,
    },
}

/// Output-projection spec for one field.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub from: String,
    pub to: String,
    pub cast: Option<Cast>,
    pub container: Option<Container>,
    pub visible: bool,
}

impl Field {
    /// `{name}` shorthand: `from = to = name`.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            from: name.clone(),
            to: name.clone(),
            name,
            cast: None,
            container: None,
            visible: true,
        }
    }
}

/// A parsed `>=N`/`>N`/`==N`/`<N`/`<=N` aggregate-count predicate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CountPattern {
    Equal(u64),
    GreaterThan(u64),
    GreaterThanOrEqual(u64),
    LessThan(u64),
    LessThanOrEqual(u64),
}

impl CountPattern {
    pub fn matches(&self, n: u64) -> bool {
        match self {
            Self::Equal(x) => n == *x,
            Self::GreaterThan(x) => n > *x,
            Self::GreaterThanOrEqual(x) => n >= *x,
            Self::LessThan(x) => n < *x,
            Self::LessThanOrEqual(x) => n <= *x,
        }
    }
}

impl FromStr for CountPattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (op, rest) = if let Some(rest) = s.strip_prefix(">=") {
            (">=", rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            ("<=", rest)
        } else if let Some(rest) = s.strip_prefix("==") {
            ("==", rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (">", rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            ("<", rest)
        } else {
            anyhow::bail!("invalid count pattern: {s}");
        };
        let n: u64 = rest.trim().parse()?;
        Ok(match op {
            ">=" => Self::GreaterThanOrEqual(n),
            "<=" => Self::LessThanOrEqual(n),
            "==" => Self::Equal(n),
            ">" => Self::GreaterThan(n),
            "<" => Self::LessThan(n),
            _ => unreachable!(),
        })
    }
}

/// Deferred hit-decision spec: documents matching an aggregating rule are
/// bucketed by the tuple of their projected `fields` values, and a bucket
/// emits a single hit iff its size satisfies `count`.
#[derive(Clone, Debug)]
pub struct Aggregate {
    pub count: CountPattern,
    pub fields: Vec<String>,
}

/// A rule's compiled detection. Both variants are already fully optimised
/// (coalesced/shaken/rewritten/matrix-folded); `Detection` and `Expression`
/// are kept as distinct variants purely to preserve which of the two YAML
/// filter shapes a rule's author wrote, which rule lint tooling (out of
/// scope here) needs.
#[derive(Clone, Debug)]
pub enum Filter {
    Detection(Expression),
    Expression(Expression),
}

impl Filter {
    pub fn expression(&self) -> &Expression {
        match self {
            Self::Detection(e) | Self::Expression(e) => e,
        }
    }
}

/// Logsource metadata carried by Sigma rules, used by mapping
/// `extensions.preconditions` matching; left at its default for
/// Chainsaw-native rules, which have no such concept.
#[derive(Clone, Debug, Default)]
pub struct Logsource {
    pub category: Option<String>,
    pub definition: Option<String>,
    pub product: Option<String>,
    pub service: Option<String>,
}

/// The common rule contract the hunt engine evaluates, produced by either
/// loader.
#[derive(Clone, Debug)]
pub struct Rule {
    pub id: Uuid,
    pub origin: RuleKind,
    pub name: String,
    pub group: String,
    pub authors: Vec<String>,
    pub kind: Kind,
    pub level: Level,
    pub status: Status,
    pub timestamp: String,
    pub fields: Vec<Field>,
    pub filter: Filter,
    pub aggregate: Option<Aggregate>,
    pub logsource: Logsource,
}

impl Rule {
    /// The `{key: value}` metadata view a mapping `Precondition.for` clause
    /// is evaluated against: `title`, `level`, `status`,
    /// `id`, and the four `logsource.*` fields.
    pub fn matches_precondition(&self, for_: &std::collections::HashMap<String, String>) -> bool {
        for (key, value) in for_ {
            let actual = match key.as_str() {
                "title" => Some(self.name.clone()),
                "level" => Some(self.level.to_string()),
                "status" => Some(match self.status {
                    Status::Stable => "stable".to_string(),
                    Status::Experimental => "experimental".to_string(),
                }),
                "id" => Some(self.id.to_string()),
                "logsource.category" => self.logsource.category.clone(),
                "logsource.definition" => self.logsource.definition.clone(),
                "logsource.product" => self.logsource.product.clone(),
                "logsource.service" => self.logsource.service.clone(),
                _ => None,
            };
            if actual.as_deref() != Some(value.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Restrict a loaded rule set down to the optional `kinds`/`levels`/`statuses`
/// filters, then sort by name - the post-load ordering the hunt engine
/// relies on for stable `Hunt` construction order.
pub fn restrict_and_sort(
    mut rules: Vec<Rule>,
    kinds: Option<&[Kind]>,
    levels: Option<&[Level]>,
    statuses: Option<&[Status]>,
) -> Vec<Rule> {
    if let Some(kinds) = kinds {
        rules.retain(|r| kinds.contains(&r.kind));
    }
    if let Some(levels) = levels {
        rules.retain(|r| levels.contains(&r.level));
    }
    if let Some(statuses) = statuses {
        rules.retain(|r| statuses.contains(&r.status));
    }
    rules.sort_by(|a, b| a.name.cmp(&b.name));
    rules
}

pub(crate) fn yaml_extension_ok(path: &std::path::Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => Ok(()),
        _ => Err(Error::Schema("rule must have a yaml file extension".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    #[test]
    fn level_from_str_is_lenient() {
        assert_eq!(Level::from_str("HIGH").unwrap(), Level::High);
        assert_eq!(Level::from_str("critical").unwrap(), Level::Critical);
        assert_eq!(Level::from_str("not-a-level").unwrap(), Level::Info);
    }

    #[test]
    fn status_from_str_falls_back_to_experimental() {
        assert_eq!(Status::from_str("stable").unwrap(), Status::Stable);
        assert_eq!(Status::from_str("Stable").unwrap(), Status::Stable);
        assert_eq!(Status::from_str("beta").unwrap(), Status::Experimental);
        assert_eq!(Status::from_str("").unwrap(), Status::Experimental);
    }

    #[test]
    fn count_pattern_parses_all_operators() {
        assert_eq!(CountPattern::from_str(">=5").unwrap(), CountPattern::GreaterThanOrEqual(5));
        assert_eq!(CountPattern::from_str(">10").unwrap(), CountPattern::GreaterThan(10));
        assert_eq!(CountPattern::from_str("==3").unwrap(), CountPattern::Equal(3));
        assert_eq!(CountPattern::from_str("<=1").unwrap(), CountPattern::LessThanOrEqual(1));
        assert_eq!(CountPattern::from_str("<9").unwrap(), CountPattern::LessThan(9));
        assert!(CountPattern::from_str("banana").is_err());
    }

    #[test]
    fn count_pattern_matches_respects_bounds() {
        let p = CountPattern::GreaterThanOrEqual(3);
        assert!(!p.matches(2));
        assert!(p.matches(3));
        assert!(p.matches(4));
    }

    #[test]
    fn yaml_extension_rejects_non_yaml_paths() {
        assert!(yaml_extension_ok(Path::new("rule.yml")).is_ok());
        assert!(yaml_extension_ok(Path::new("rule.yaml")).is_ok());
        assert!(yaml_extension_ok(Path::new("rule.json")).is_err());
        assert!(yaml_extension_ok(Path::new("rule")).is_err());
    }

    fn sample_rule() -> Rule {
        Rule {
            id: Uuid::nil(),
            origin: RuleKind::Sigma,
            name: "Suspicious PowerShell".into(),
            group: "".into(),
            authors: vec!["unknown".into()],
            kind: Kind::Evtx,
            level: Level::High,
            status: Status::Stable,
            timestamp: "Event.System.TimeCreated".into(),
            fields: vec![],
            filter: Filter::Expression(Expression::Boolean(true)),
            aggregate: None,
            logsource: Logsource {
                category: Some("process_creation".into()),
                definition: None,
                product: Some("windows".into()),
                service: None,
            },
        }
    }

    #[test]
    fn matches_precondition_checks_every_clause() {
        let rule = sample_rule();
        let mut for_ = HashMap::new();
        for_.insert("level".to_string(), "high".to_string());
        for_.insert("logsource.product".to_string(), "windows".to_string());
        assert!(rule.matches_precondition(&for_));

        for_.insert("logsource.service".to_string(), "sysmon".to_string());
        assert!(!rule.matches_precondition(&for_));
    }

    #[test]
    fn restrict_and_sort_filters_and_orders_by_name() {
        let mut a = sample_rule();
        a.name = "Zebra".into();
        let mut b = sample_rule();
        b.name = "Alpha".into();
        b.level = Level::Low;

        let rules = restrict_and_sort(vec![a, b], None, Some(&[Level::High]), None);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Zebra");
    }
}
