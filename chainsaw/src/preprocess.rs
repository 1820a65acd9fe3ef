//! The last step of building a `Hunter`: when `preprocess` is enabled,
//! every field name a `Hunt` references anywhere (timestamp, filter,
//! aggregate fields, preconditions) is collected and given a short,
//! two-character alias; every expression is rewritten to reference the
//! alias instead.
//!
//! Aliasing is only sound for a name that is looked up as a *complete* key
//! string. A `Nested` node's own field name qualifies (`document.find(field)`
//! is a standalone lookup), but anything inside its `inner` subtree does
//! not - those names are always looked up concatenated onto the (possibly
//! aliased) outer name (`NestedView::find`), so renaming them independently
//! would desynchronise the two halves of that concatenation. This module
//! therefore leaves every `Nested` subtree's interior completely untouched,
//! and `AliasDocument` resolves a concatenated key by unaliasing only its
//! first dot-separated segment before delegating to the real document.

use std::collections::{HashMap, HashSet};

use tau_engine::core::Expression;
use tau_engine::{Document, Value};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Bidirectional canonical-name <-> alias table, built once per `Hunter`.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    canonical_to_alias: HashMap<String, String>,
    alias_to_canonical: HashMap<String, String>,
}

impl AliasTable {
    pub fn build(names: &HashSet<String>) -> Self {
        let mut canonical_to_alias = HashMap::new();
        let mut alias_to_canonical = HashMap::new();
        let mut sorted: Vec<&String> = names.iter().collect();
        sorted.sort();
        let capacity = ALPHABET.len() * ALPHABET.len();
        for (i, name) in sorted.into_iter().enumerate() {
            if i >= capacity {
                // More distinct field names than a two-byte alphabet can
                // address: leave the rest under their canonical name
                // rather than fabricate a colliding alias.
                break;
            }
            let alias = two_byte_alias(i);
            canonical_to_alias.insert(name.clone(), alias.clone());
            alias_to_canonical.insert(alias, name.clone());
        }
        Self {
            canonical_to_alias,
            alias_to_canonical,
        }
    }

    pub fn alias_of(&self, name: &str) -> String {
        self.canonical_to_alias.get(name).cloned().unwrap_or_else(|| name.to_string())
    }
}

fn two_byte_alias(i: usize) -> String {
    let n = ALPHABET.len();
    let hi = ALPHABET[(i / n) % n] as char;
    let lo = ALPHABET[i % n] as char;
    format!("{hi}{lo}")
}

/// Collect every field name this expression references as a complete
/// lookup key, per the soundness rule above: everything except the
/// interior of `Nested` subtrees.
pub fn collect_field_names(expr: &Expression, names: &mut HashSet<String>) {
    match expr {
        Expression::Field(name) => {
            names.insert(name.clone());
        }
        Expression::Search(_, name, _) => {
            names.insert(name.clone());
        }
        Expression::Nested(name, _inner) => {
            // Only the outer name is a standalone lookup key; `_inner`'s
            // field references are concatenated onto it and must not be
            // aliased independently.
            names.insert(name.clone());
        }
        Expression::Matrix(fields, _) => {
            names.extend(fields.iter().cloned());
        }
        Expression::Cast(inner, _) => collect_field_names(inner, names),
        Expression::BooleanGroup(_, children) => {
            for c in children {
                collect_field_names(c, names);
            }
        }
        Expression::BooleanExpression(lhs, _, rhs) => {
            collect_field_names(lhs, names);
            collect_field_names(rhs, names);
        }
        Expression::Negate(inner) => collect_field_names(inner, names),
        Expression::Match(_, field) => collect_field_names(field, names),
        Expression::Null | Expression::Boolean(_) | Expression::Integer(_) | Expression::Float(_) | Expression::Identifier(_) => {}
    }
}

/// Rewrite `expr` to reference aliases instead of canonical field names,
/// per the same soundness rule `collect_field_names` uses.
pub fn update_fields(expr: Expression, table: &AliasTable) -> Expression {
    match expr {
        Expression::Field(name) => Expression::Field(table.alias_of(&name)),
        Expression::Search(search, name, ic) => Expression::Search(search, table.alias_of(&name), ic),
        Expression::Nested(name, inner) => Expression::Nested(table.alias_of(&name), inner),
        Expression::Matrix(fields, rows) => {
            Expression::Matrix(fields.into_iter().map(|f| table.alias_of(&f)).collect(), rows)
        }
        Expression::Cast(inner, sym) => Expression::Cast(Box::new(update_fields(*inner, table)), sym),
        Expression::BooleanGroup(op, children) => {
            Expression::BooleanGroup(op, children.into_iter().map(|c| update_fields(c, table)).collect())
        }
        Expression::BooleanExpression(lhs, op, rhs) => {
            Expression::BooleanExpression(Box::new(update_fields(*lhs, table)), op, Box::new(update_fields(*rhs, table)))
        }
        Expression::Negate(inner) => Expression::Negate(Box::new(update_fields(*inner, table))),
        Expression::Match(pattern, field) => Expression::Match(pattern, Box::new(update_fields(*field, table))),
        other => other,
    }
}

/// Wraps a document so that alias-rewritten expressions can still resolve
/// against it: unaliases only the first dot-separated segment of any
/// lookup key (the only part any rewritten expression could have renamed)
/// before delegating to the real document.
pub struct AliasDocument<'a> {
    inner: &'a dyn Document,
    table: &'a AliasTable,
}

impl<'a> AliasDocument<'a> {
    pub fn new(inner: &'a dyn Document, table: &'a AliasTable) -> Self {
        Self { inner, table }
    }
}

impl<'a> Document for AliasDocument<'a> {
    fn find(&self, key: &str) -> Option<Value<'_>> {
        let (head, rest) = match key.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (key, None),
        };
        match self.table.alias_to_canonical.get(head) {
            Some(canonical) => {
                let resolved = match rest {
                    Some(rest) => format!("{canonical}.{rest}"),
                    None => canonical.clone(),
                };
                self.inner.find(&resolved)
            }
            None => self.inner.find(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tau_engine::core::Pattern;

    #[test]
    fn round_trips_simple_field() {
        let mut names = HashSet::new();
        names.insert("Event.System.EventID".to_string());
        let table = AliasTable::build(&names);

        let expr = Expression::Match(Pattern::Equal(4688), Box::new(Expression::Field("Event.System.EventID".into())));
        let rewritten = update_fields(expr, &table);

        let doc = json!({"Event": {"System": {"EventID": 4688}}});
        let alias_doc = AliasDocument::new(&doc, &table);
        assert!(tau_engine::solve(&rewritten, &alias_doc));
    }

    #[test]
    fn nested_interior_is_left_untouched() {
        let mut names = HashSet::new();
        collect_field_names(
            &Expression::Nested(
                "EventData".into(),
                Box::new(Expression::Match(Pattern::Exact("system".into()), Box::new(Expression::Field("User".into())))),
            ),
            &mut names,
        );
        // Only the outer Nested field name is collected.
        assert_eq!(names, HashSet::from(["EventData".to_string()]));

        let table = AliasTable::build(&names);
        let rewritten = update_fields(
            Expression::Nested(
                "EventData".into(),
                Box::new(Expression::Match(Pattern::Exact("system".into()), Box::new(Expression::Field("User".into())))),
            ),
            &table,
        );
        let doc = json!({"EventData": {"User": "SYSTEM"}});
        let alias_doc = AliasDocument::new(&doc, &table);
        assert!(tau_engine::solve(&rewritten, &alias_doc));
    }

    #[test]
    fn two_byte_aliases_are_distinct() {
        let mut names = HashSet::new();
        for i in 0..50 {
            names.insert(format!("field_{i}"));
        }
        let table = AliasTable::build(&names);
        let aliases: HashSet<&String> = table.canonical_to_alias.values().collect();
        assert_eq!(aliases.len(), 50);
    }
}
