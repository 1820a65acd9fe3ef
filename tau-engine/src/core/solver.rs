//! Evaluates an optimised `Expression` tree against a `Document`.

use crate::document::{Document, Value};

use super::parser::{BoolOp, Expression, ModSym, Op, Pattern, Search};

/// Evaluate `expression` against `document`. This is the single entry point
/// every rule kind (Chainsaw-native and Sigma) funnels through once its
/// `Detection` has been through the optimiser pipeline.
pub fn solve(expression: &Expression, document: &dyn Document) -> bool {
    match expression {
        Expression::Null => false,
        Expression::Boolean(b) => *b,
        Expression::Integer(i) => *i != 0,
        Expression::Float(f) => *f != 0.0,

        // A bare field reference or identifier outside of a `Match`/`Cast`
        // wrapper is a presence check: true if the field resolves to a
        // non-null value.
        Expression::Field(name) => document.find(name).is_some(),
        Expression::Identifier(_) => false,

        Expression::Cast(inner, sym) => eval_cast(inner, *sym, document).is_some(),

        Expression::BooleanGroup(op, children) => match op {
            BoolOp::And => children.iter().all(|c| solve(c, document)),
            BoolOp::Or => children.iter().any(|c| solve(c, document)),
        },
        Expression::BooleanExpression(lhs, op, rhs) => {
            let (Some(a), Some(b)) = (eval_numeric(lhs, document), eval_numeric(rhs, document)) else {
                return false;
            };
            match op {
                Op::Eq => a == b,
                Op::Gt => a > b,
                Op::Ge => a >= b,
                Op::Lt => a < b,
                Op::Le => a <= b,
            }
        }
        Expression::Negate(inner) => !solve(inner, document),

        Expression::Match(pattern, field) => match resolve(field, document) {
            Some(value) => match_value(pattern, &value),
            None => false,
        },

        Expression::Search(search, field, ignore_case) => match document.find(field) {
            Some(value) => search_value(search, &value, *ignore_case),
            None => false,
        },

        Expression::Nested(field, inner) => match document.find(field) {
            Some(Value::Object(_)) => solve(inner, &NestedView(field, document)),
            _ => false,
        },

        Expression::Matrix(fields, rows) => rows.iter().any(|row| {
            let hit = fields
                .iter()
                .zip(&row.patterns)
                .all(|(field, pattern)| match document.find(field) {
                    Some(value) => match_value(pattern, &value),
                    None => false,
                });
            hit != row.negate
        }),
    }
}

/// A view over a nested object field that re-roots path lookups at it,
/// matching `Nested`'s "the inner expression's field paths are relative to
/// this object" semantics.
struct NestedView<'a>(&'a str, &'a dyn Document);

impl<'a> Document for NestedView<'a> {
    fn find(&self, key: &str) -> Option<Value<'_>> {
        self.1.find(&format!("{}.{}", self.0, key))
    }
}

/// Resolve the expression wrapped by a `Match`/`Search` target: ordinarily a
/// bare `Field`, but may be a `Cast` coercing it first.
fn resolve<'a>(field: &Expression, document: &'a dyn Document) -> Option<Value<'a>> {
    match field {
        Expression::Field(name) => document.find(name),
        Expression::Cast(inner, sym) => eval_cast(inner, *sym, document),
        other => panic!("unexpected match/search target: {other:?}"),
    }
}

fn eval_cast<'a>(inner: &Expression, sym: ModSym, document: &'a dyn Document) -> Option<Value<'a>> {
    let value = resolve(inner, document)?;
    match sym {
        ModSym::Int => value.as_i64().map(Value::Int),
        ModSym::Flt => value.as_f64().map(Value::Float),
        ModSym::Str => value.to_string().map(|s| Value::String(s.into())),
    }
}

fn eval_numeric(expr: &Expression, document: &dyn Document) -> Option<f64> {
    match expr {
        Expression::Integer(i) => Some(*i as f64),
        Expression::Float(f) => Some(*f),
        Expression::Field(name) => document.find(name).and_then(|v| v.as_f64()),
        Expression::Cast(inner, sym) => eval_cast(inner, *sym, document).and_then(|v| v.as_f64()),
        _ => None,
    }
}

/// `Match` against a resolved value: arrays use "true if any element
/// matches" semantics, recursing one level (decoders never nest arrays of
/// arrays in practice, but this still terminates since `Value` is finite).
fn match_value(pattern: &Pattern, value: &Value<'_>) -> bool {
    if let Value::Array(items) = value {
        return items.iter().any(|item| match_value(pattern, item));
    }
    match pattern {
        Pattern::Any => !value.is_null(),
        Pattern::Equal(n) => value.as_i64() == Some(*n),
        Pattern::GreaterThan(n) => value.as_i64().is_some_and(|v| v > *n),
        Pattern::GreaterThanOrEqual(n) => value.as_i64().is_some_and(|v| v >= *n),
        Pattern::LessThan(n) => value.as_i64().is_some_and(|v| v < *n),
        Pattern::LessThanOrEqual(n) => value.as_i64().is_some_and(|v| v <= *n),
        Pattern::FEqual(n) => value.as_f64() == Some(*n),
        Pattern::FGreaterThan(n) => value.as_f64().is_some_and(|v| v > *n),
        Pattern::FGreaterThanOrEqual(n) => value.as_f64().is_some_and(|v| v >= *n),
        Pattern::FLessThan(n) => value.as_f64().is_some_and(|v| v < *n),
        Pattern::FLessThanOrEqual(n) => value.as_f64().is_some_and(|v| v <= *n),
        Pattern::Regex(rx) => value.as_str().is_some_and(|s| rx.is_match(s)),
        Pattern::Contains(needle) => value
            .as_str()
            .is_some_and(|s| s.to_ascii_lowercase().contains(needle.as_str())),
        Pattern::EndsWith(needle) => value
            .as_str()
            .is_some_and(|s| s.to_ascii_lowercase().ends_with(needle.as_str())),
        Pattern::StartsWith(needle) => value
            .as_str()
            .is_some_and(|s| s.to_ascii_lowercase().starts_with(needle.as_str())),
        Pattern::Exact(needle) => value.as_str().is_some_and(|s| s.to_ascii_lowercase() == *needle),
    }
}

/// `Search` against a resolved value: a multi-pattern "does this field
/// contain/start with/end with/equal any of these needles" check, with the
/// Aho-Corasick variant re-verifying the string-class of each automaton hit
/// since the automaton alone can't distinguish contains/startswith/endswith.
fn search_value(search: &Search, value: &Value<'_>, ignore_case: bool) -> bool {
    if let Value::Array(items) = value {
        return items.iter().any(|item| search_value(search, item, ignore_case));
    }
    let Some(raw) = value.as_str() else {
        return false;
    };
    let s = if ignore_case { raw.to_ascii_lowercase() } else { raw.to_string() };
    match search {
        Search::Any => !s.is_empty(),
        Search::Regex(rx, _) => rx.is_match(raw),
        Search::Contains(needle) => s.contains(needle.as_str()),
        Search::EndsWith(needle) => s.ends_with(needle.as_str()),
        Search::StartsWith(needle) => s.starts_with(needle.as_str()),
        Search::Exact(needle) => s == *needle,
        Search::AhoCorasick(ac, needles, _) => ac.find_iter(&s).any(|m| {
            let needle = &needles[m.pattern().as_usize()];
            let matched = &s[m.start()..m.end()];
            match needle.kind {
                super::parser::NeedleKind::Contains => true,
                super::parser::NeedleKind::Exact => matched.len() == s.len(),
                super::parser::NeedleKind::StartsWith => m.start() == 0,
                super::parser::NeedleKind::EndsWith => m.end() == s.len(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boolean_group_and_short_circuits() {
        let doc = json!({"a": 1});
        let expr = Expression::BooleanGroup(
            BoolOp::And,
            vec![
                Expression::Match(Pattern::Equal(1), Box::new(Expression::Field("a".into()))),
                Expression::Match(Pattern::Equal(2), Box::new(Expression::Field("a".into()))),
            ],
        );
        assert!(!solve(&expr, &doc));
    }

    #[test]
    fn negate_flips_result() {
        let doc = json!({"a": 1});
        let expr = Expression::Negate(Box::new(Expression::Match(
            Pattern::Equal(1),
            Box::new(Expression::Field("a".into())),
        )));
        assert!(!solve(&expr, &doc));
    }

    #[test]
    fn match_any_element_in_array() {
        let doc = json!({"ids": [1, 2, 3]});
        let expr = Expression::Match(Pattern::Equal(2), Box::new(Expression::Field("ids".into())));
        assert!(solve(&expr, &doc));
    }

    #[test]
    fn nested_reroots_field_paths() {
        let doc = json!({"EventData": {"User": "SYSTEM"}});
        let expr = Expression::Nested(
            "EventData".into(),
            Box::new(Expression::Match(
                Pattern::Exact("system".into()),
                Box::new(Expression::Field("User".into())),
            )),
        );
        assert!(solve(&expr, &doc));
    }

    #[test]
    fn matrix_row_matches_and_negated_row_excludes() {
        let doc = json!({"f1": "a", "f2": "b"});
        let expr = Expression::Matrix(
            vec!["f1".into(), "f2".into()],
            vec![super::super::parser::MatrixRow {
                patterns: vec![Pattern::Exact("a".into()), Pattern::Exact("b".into())],
                negate: false,
            }],
        );
        assert!(solve(&expr, &doc));
    }

    #[test]
    fn cast_str_compares_numeric_field_as_text() {
        let doc = json!({"code": 4688});
        let expr = Expression::Match(
            Pattern::Exact("4688".into()),
            Box::new(Expression::Cast(Box::new(Expression::Field("code".into())), ModSym::Str)),
        );
        assert!(solve(&expr, &doc));
    }

    #[test]
    fn boolean_expression_numeric_comparison() {
        let doc = json!({"count": 5});
        let expr = Expression::BooleanExpression(
            Box::new(Expression::Field("count".into())),
            Op::Ge,
            Box::new(Expression::Integer(3)),
        );
        assert!(solve(&expr, &doc));
    }
}
