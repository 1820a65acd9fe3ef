//! The Tau intermediate representation: a recursive tagged expression tree,
//! plus the pattern/search primitives it evaluates leaves against.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

/// The scalar cast a `Cast` node or a field-mapping "to" wrapper coerces a
/// value to. Named to match the modifier-symbol terminology the detection
/// schema itself uses (`int(f)` / `str(f)` / `flt(f)`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModSym {
    Int,
    Str,
    Flt,
}

/// A single-field predicate.
#[derive(Clone, Debug, Serialize)]
pub enum Pattern {
    Equal(i64),
    GreaterThan(i64),
    GreaterThanOrEqual(i64),
    LessThan(i64),
    LessThanOrEqual(i64),

    FEqual(f64),
    FGreaterThan(f64),
    FGreaterThanOrEqual(f64),
    FLessThan(f64),
    FLessThanOrEqual(f64),

    Any,
    #[serde(skip_serializing)]
    Regex(Regex),
    Contains(String),
    EndsWith(String),
    Exact(String),
    StartsWith(String),
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Equal(a), Self::Equal(b)) => a == b,
            (Self::GreaterThan(a), Self::GreaterThan(b)) => a == b,
            (Self::GreaterThanOrEqual(a), Self::GreaterThanOrEqual(b)) => a == b,
            (Self::LessThan(a), Self::LessThan(b)) => a == b,
            (Self::LessThanOrEqual(a), Self::LessThanOrEqual(b)) => a == b,
            (Self::FEqual(a), Self::FEqual(b)) => a == b,
            (Self::Any, Self::Any) => true,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::EndsWith(a), Self::EndsWith(b)) => a == b,
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::StartsWith(a), Self::StartsWith(b)) => a == b,
            _ => false,
        }
    }
}

/// A single Aho-Corasick needle, tagged with the string-class it must be
/// re-checked against after the automaton reports a hit at a position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NeedleKind {
    Contains,
    EndsWith,
    Exact,
    StartsWith,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Needle {
    pub kind: NeedleKind,
    pub value: String,
}

/// The multi-pattern string search primitive (`Search` node payload).
#[derive(Clone, Debug)]
pub enum Search {
    Any,
    Regex(Regex, bool),
    AhoCorasick(Box<aho_corasick::AhoCorasick>, Vec<Needle>, bool),
    Contains(String),
    EndsWith(String),
    Exact(String),
    StartsWith(String),
}

impl PartialEq for Search {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, Self::Any) => true,
            (Self::Regex(a, ai), Self::Regex(b, bi)) => a.as_str() == b.as_str() && ai == bi,
            (Self::AhoCorasick(_, an, ai), Self::AhoCorasick(_, bn, bi)) => an == bn && ai == bi,
            (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::EndsWith(a), Self::EndsWith(b)) => a == b,
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::StartsWith(a), Self::StartsWith(b)) => a == b,
            _ => false,
        }
    }
}

impl Search {
    /// Build the aho-corasick automaton once, up front, at rule-load time.
    pub fn aho_corasick(needles: Vec<Needle>, ignore_case: bool) -> anyhow::Result<Self> {
        let patterns: Vec<&str> = needles.iter().map(|n| n.value.as_str()).collect();
        let ac = aho_corasick::AhoCorasickBuilder::new()
            .ascii_case_insensitive(ignore_case)
            .build(&patterns)?;
        Ok(Self::AhoCorasick(Box::new(ac), needles, ignore_case))
    }
}

/// The recursive expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Field(String),
    Identifier(String),
    Cast(Box<Expression>, ModSym),

    BooleanGroup(BoolOp, Vec<Expression>),
    BooleanExpression(Box<Expression>, Op, Box<Expression>),
    Negate(Box<Expression>),
    Match(Pattern, Box<Expression>),
    Search(Search, String, bool),
    Nested(String, Box<Expression>),
    Matrix(Vec<String>, Vec<MatrixRow>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatrixRow {
    pub patterns: Vec<Pattern>,
    pub negate: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// `{expression, identifiers}` pair as loaded from YAML, before `coalesce`
/// inlines every `Identifier` reference and the caller clears `identifiers`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    pub expression: Expression,
    pub identifiers: HashMap<String, Expression>,
}

impl Default for Expression {
    fn default() -> Self {
        Expression::Boolean(false)
    }
}

// `Detection` round-trips through YAML as `{expression: ..., identifiers:
// {...}}` when a loader serialises it back out for linting, and is built by
// hand everywhere else, so we only need `Deserialize` for the lint path.
struct DetectionVisitor;

impl<'de> Visitor<'de> for DetectionVisitor {
    type Value = Detection;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a tagged detection object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut condition = None;
        let mut raw_identifiers = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            if key == "condition" {
                condition = Some(map.next_value::<String>()?);
            } else {
                raw_identifiers.push((key, map.next_value::<serde_yaml::Value>()?));
            }
        }
        let condition = condition.ok_or_else(|| de::Error::missing_field("condition"))?;

        // Both passes run after the whole map is read: `parse_condition` needs
        // the full identifier name list up front to resolve `all of them` /
        // `1 of prefix*` forms.
        let names: Vec<String> = raw_identifiers.iter().map(|(k, _)| k.clone()).collect();
        let mut identifiers = HashMap::with_capacity(raw_identifiers.len());
        for (name, raw) in raw_identifiers {
            let expr = super::grammar::parse_selection(&raw)
                .map_err(|e| de::Error::custom(format!("identifier '{name}': {e}")))?;
            identifiers.insert(name, expr);
        }
        let expression = super::grammar::parse_condition(&condition, &names)
            .map_err(|e| de::Error::custom(format!("condition: {e}")))?;

        Ok(Detection {
            expression,
            identifiers,
        })
    }
}

impl<'de> Deserialize<'de> for Detection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(DetectionVisitor)
    }
}

impl Serialize for Detection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Tau expressions do not have a stable textual representation; used
        // only by `chainsaw lint --tau`, which is out of scope here, so this
        // is a best-effort debug rendering rather than a real grammar.
        serializer.serialize_str(&format!("{:?}", self.expression))
    }
}
