//! The four-pass pipeline a freshly-parsed `Detection` runs through before
//! it is handed to the solver: `coalesce` inlines identifier references,
//! `shake` removes the resulting redundancy, `rewrite` puts boolean groups
//! into a canonical order, and `matrix` folds repeated same-shape AND groups
//! into a single row-oriented node the solver can evaluate without
//! re-walking a wide OR every time.

use std::collections::HashSet;

use anyhow::{bail, Result};

use super::parser::{BoolOp, Detection, Expression, MatrixRow, Pattern, Search};

/// Run all four passes and return the fully-optimised expression. The
/// caller is expected to discard `detection.identifiers` afterwards - every
/// reference has been inlined so the map no longer has a reason to exist.
pub fn optimise(detection: Detection) -> Result<Expression> {
    let coalesced = coalesce(detection.expression, &detection.identifiers, &mut HashSet::new())?;
    let shaken = shake(coalesced);
    let rewritten = rewrite(shaken);
    Ok(matrix(rewritten))
}

/// Replace every `Identifier(name)` leaf with the expression it names,
/// recursively, erroring out on a reference cycle.
fn coalesce(
    expr: Expression,
    identifiers: &std::collections::HashMap<String, Expression>,
    seen: &mut HashSet<String>,
) -> Result<Expression> {
    Ok(match expr {
        Expression::Identifier(name) => {
            if !seen.insert(name.clone()) {
                bail!("cyclic identifier reference: {name}");
            }
            let target = identifiers
                .get(&name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown identifier: {name}"))?;
            let resolved = coalesce(target, identifiers, seen)?;
            seen.remove(&name);
            resolved
        }
        Expression::BooleanGroup(op, children) => {
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                out.push(coalesce(child, identifiers, seen)?);
            }
            Expression::BooleanGroup(op, out)
        }
        Expression::BooleanExpression(lhs, op, rhs) => Expression::BooleanExpression(
            Box::new(coalesce(*lhs, identifiers, seen)?),
            op,
            Box::new(coalesce(*rhs, identifiers, seen)?),
        ),
        Expression::Negate(inner) => Expression::Negate(Box::new(coalesce(*inner, identifiers, seen)?)),
        Expression::Match(pattern, field) => {
            Expression::Match(pattern, Box::new(coalesce(*field, identifiers, seen)?))
        }
        Expression::Nested(field, inner) => {
            Expression::Nested(field, Box::new(coalesce(*inner, identifiers, seen)?))
        }
        Expression::Cast(inner, sym) => Expression::Cast(Box::new(coalesce(*inner, identifiers, seen)?), sym),
        other => other,
    })
}

/// Constant-fold and flatten: `Negate(Negate(x))` collapses to `x`,
/// single-child `BooleanGroup`s collapse to their child, and a nested
/// `BooleanGroup` with the same operator as its parent flattens into it.
fn shake(expr: Expression) -> Expression {
    match expr {
        Expression::Negate(inner) => match shake(*inner) {
            Expression::Negate(x) => *x,
            Expression::Boolean(b) => Expression::Boolean(!b),
            other => Expression::Negate(Box::new(other)),
        },
        Expression::BooleanGroup(op, children) => {
            let mut flat = Vec::with_capacity(children.len());
            for child in children {
                match shake(child) {
                    Expression::BooleanGroup(inner_op, inner_children) if inner_op == op => {
                        flat.extend(inner_children);
                    }
                    other => flat.push(other),
                }
            }
            // Short-circuit on a literal that already decides the group.
            let short_circuit = match op {
                BoolOp::And => Expression::Boolean(false),
                BoolOp::Or => Expression::Boolean(true),
            };
            if flat.iter().any(|e| *e == short_circuit) {
                return short_circuit;
            }
            let identity = match op {
                BoolOp::And => Expression::Boolean(true),
                BoolOp::Or => Expression::Boolean(false),
            };
            flat.retain(|e| *e != identity);
            match flat.len() {
                0 => identity,
                1 => flat.remove(0),
                _ => Expression::BooleanGroup(op, flat),
            }
        }
        Expression::BooleanExpression(lhs, op, rhs) => {
            Expression::BooleanExpression(Box::new(shake(*lhs)), op, Box::new(shake(*rhs)))
        }
        Expression::Match(pattern, field) => Expression::Match(pattern, Box::new(shake(*field))),
        Expression::Nested(field, inner) => Expression::Nested(field, Box::new(shake(*inner))),
        Expression::Cast(inner, sym) => Expression::Cast(Box::new(shake(*inner)), sym),
        other => other,
    }
}

/// Put `BooleanGroup` children into a stable, deterministic order so that
/// structurally-equal rule sets produce byte-identical trees; this is what
/// lets `matrix` recognise repeated shapes by simple adjacency rather than a
/// quadratic shape-comparison.
fn rewrite(expr: Expression) -> Expression {
    match expr {
        Expression::BooleanGroup(op, children) => {
            let mut children: Vec<Expression> = children.into_iter().map(rewrite).collect();
            children.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
            Expression::BooleanGroup(op, children)
        }
        Expression::BooleanExpression(lhs, op, rhs) => {
            Expression::BooleanExpression(Box::new(rewrite(*lhs)), op, Box::new(rewrite(*rhs)))
        }
        Expression::Negate(inner) => Expression::Negate(Box::new(rewrite(*inner))),
        Expression::Match(pattern, field) => Expression::Match(pattern, Box::new(rewrite(*field))),
        Expression::Nested(field, inner) => Expression::Nested(field, Box::new(rewrite(*inner))),
        Expression::Cast(inner, sym) => Expression::Cast(Box::new(rewrite(*inner)), sym),
        other => other,
    }
}

/// Fold a `BooleanGroup(Or, [row_0, row_1, ...])` where every row is itself
/// an `And` of `Match`/`Search`/`Negate(...)` leaves over the *same* ordered
/// set of fields into a single `Matrix` node, so the solver evaluates one
/// row table instead of re-walking N identically-shaped AND groups. A bare
/// `BooleanGroup(And, [...])` of such leaves (no enclosing `Or`) folds the
/// same way, into a one-row `Matrix`.
fn matrix(expr: Expression) -> Expression {
    match expr {
        Expression::BooleanGroup(BoolOp::Or, children) => {
            if let Some((fields, rows)) = extract_rows(&children) {
                return Expression::Matrix(fields, rows);
            }
            Expression::BooleanGroup(BoolOp::Or, children.into_iter().map(matrix).collect())
        }
        Expression::BooleanGroup(BoolOp::And, children) => {
            let children: Vec<Expression> = children.into_iter().map(matrix).collect();
            if let Some(row) = extract_row(&children) {
                let (fields, row) = row;
                return Expression::Matrix(fields, vec![row]);
            }
            Expression::BooleanGroup(BoolOp::And, children)
        }
        Expression::BooleanExpression(lhs, op, rhs) => {
            Expression::BooleanExpression(Box::new(matrix(*lhs)), op, Box::new(matrix(*rhs)))
        }
        Expression::Negate(inner) => Expression::Negate(Box::new(matrix(*inner))),
        Expression::Nested(field, inner) => Expression::Nested(field, Box::new(matrix(*inner))),
        Expression::Cast(inner, sym) => Expression::Cast(Box::new(matrix(*inner)), sym),
        other => other,
    }
}

/// A single-needle `Search` variant reduces losslessly to the equivalent
/// `Pattern`, so it can sit in a `MatrixRow` alongside `Match` leaves. The
/// multi-needle `AhoCorasick`/`Regex`/`Any` variants can't, and bail a row
/// out of folding entirely rather than dropping a needle silently.
fn pattern_of_search(search: &Search) -> Option<Pattern> {
    match search {
        Search::Contains(s) => Some(Pattern::Contains(s.clone())),
        Search::EndsWith(s) => Some(Pattern::EndsWith(s.clone())),
        Search::Exact(s) => Some(Pattern::Exact(s.clone())),
        Search::StartsWith(s) => Some(Pattern::StartsWith(s.clone())),
        Search::Any | Search::Regex(_, _) | Search::AhoCorasick(_, _, _) => None,
    }
}

/// Reduce one AND-row leaf to `(field, pattern, negated)`, or bail if it's
/// not a shape a `MatrixRow` can represent.
fn leaf_pattern(leaf: &Expression) -> Option<(String, Pattern, bool)> {
    match leaf {
        Expression::Match(pattern, field) => {
            let Expression::Field(name) = field.as_ref() else {
                return None;
            };
            Some((name.clone(), pattern.clone(), false))
        }
        Expression::Search(search, name, _) => Some((name.clone(), pattern_of_search(search)?, false)),
        Expression::Negate(inner) => {
            let (name, pattern, negated) = leaf_pattern(inner)?;
            Some((name, pattern, !negated))
        }
        _ => None,
    }
}

/// Reduce a flat list of AND-row leaves to one `MatrixRow`, bailing if any
/// leaf isn't foldable or the row mixes negated and non-negated leaves (a
/// shape `MatrixRow`'s single `negate` flag can't represent).
fn extract_row(leaves: &[Expression]) -> Option<(Vec<String>, MatrixRow)> {
    if leaves.len() < 2 {
        return None;
    }
    let mut fields = Vec::with_capacity(leaves.len());
    let mut row = MatrixRow {
        patterns: Vec::with_capacity(leaves.len()),
        negate: false,
    };
    let mut any_negated = false;
    let mut all_negated = true;
    for leaf in leaves {
        let (name, pattern, negated) = leaf_pattern(leaf)?;
        fields.push(name);
        row.patterns.push(pattern);
        any_negated |= negated;
        all_negated &= negated;
    }
    if any_negated && !all_negated {
        return None;
    }
    row.negate = any_negated;
    Some((fields, row))
}

fn extract_rows(children: &[Expression]) -> Option<(Vec<String>, Vec<MatrixRow>)> {
    if children.len() < 2 {
        return None;
    }
    let mut fields: Option<Vec<String>> = None;
    let mut rows = Vec::with_capacity(children.len());
    for child in children {
        let leaves: Vec<Expression> = match child {
            Expression::BooleanGroup(BoolOp::And, leaves) => leaves.clone(),
            single => vec![single.clone()],
        };
        let (row_fields, row) = if leaves.len() == 1 {
            let (name, pattern, negated) = leaf_pattern(&leaves[0])?;
            (vec![name], MatrixRow { patterns: vec![pattern], negate: negated })
        } else {
            extract_row(&leaves)?
        };
        match &fields {
            None => fields = Some(row_fields),
            Some(expected) if *expected != row_fields => return None,
            Some(_) => {}
        }
        rows.push(row);
    }
    Some((fields?, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::Pattern;
    use std::collections::HashMap;

    #[test]
    fn coalesce_inlines_identifier() {
        let mut identifiers = HashMap::new();
        identifiers.insert(
            "sel1".to_string(),
            Expression::Match(Pattern::Exact("a".into()), Box::new(Expression::Field("x".into()))),
        );
        let detection = Detection {
            expression: Expression::Identifier("sel1".into()),
            identifiers,
        };
        let optimised = optimise(detection).unwrap();
        assert!(matches!(optimised, Expression::Match(_, _)));
    }

    #[test]
    fn coalesce_detects_cycle() {
        let mut identifiers = HashMap::new();
        identifiers.insert("a".to_string(), Expression::Identifier("b".into()));
        identifiers.insert("b".to_string(), Expression::Identifier("a".into()));
        let detection = Detection {
            expression: Expression::Identifier("a".into()),
            identifiers,
        };
        assert!(optimise(detection).is_err());
    }

    #[test]
    fn shake_collapses_double_negate() {
        let expr = Expression::Negate(Box::new(Expression::Negate(Box::new(Expression::Boolean(true)))));
        assert_eq!(shake(expr), Expression::Boolean(true));
    }

    #[test]
    fn shake_short_circuits_or_with_true() {
        let expr = Expression::BooleanGroup(
            BoolOp::Or,
            vec![Expression::Boolean(false), Expression::Boolean(true)],
        );
        assert_eq!(shake(expr), Expression::Boolean(true));
    }

    #[test]
    fn matrix_folds_uniform_or_of_and() {
        let row = |a: &str, b: &str| {
            Expression::BooleanGroup(
                BoolOp::And,
                vec![
                    Expression::Match(Pattern::Exact(a.into()), Box::new(Expression::Field("f1".into()))),
                    Expression::Match(Pattern::Exact(b.into()), Box::new(Expression::Field("f2".into()))),
                ],
            )
        };
        let expr = Expression::BooleanGroup(BoolOp::Or, vec![row("1", "2"), row("3", "4")]);
        let folded = matrix(expr);
        match folded {
            Expression::Matrix(fields, rows) => {
                assert_eq!(fields, vec!["f1".to_string(), "f2".to_string()]);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected Matrix, got {other:?}"),
        }
    }

    #[test]
    fn matrix_folds_bare_and_of_search_exact() {
        use crate::core::parser::Search;

        let expr = Expression::BooleanGroup(
            BoolOp::And,
            vec![
                Expression::Search(Search::Exact("a".into()), "f1".into(), true),
                Expression::Search(Search::Exact("b".into()), "f2".into(), true),
            ],
        );
        let folded = matrix(expr);
        match folded {
            Expression::Matrix(fields, rows) => {
                assert_eq!(fields, vec!["f1".to_string(), "f2".to_string()]);
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].patterns, vec![Pattern::Exact("a".into()), Pattern::Exact("b".into())]);
                assert!(!rows[0].negate);
            }
            other => panic!("expected Matrix, got {other:?}"),
        }
    }

    #[test]
    fn matrix_leaves_non_foldable_and_untouched() {
        let expr = Expression::BooleanGroup(
            BoolOp::And,
            vec![
                Expression::Match(Pattern::Equal(1), Box::new(Expression::Field("a".into()))),
                Expression::BooleanGroup(
                    BoolOp::Or,
                    vec![
                        Expression::Match(Pattern::Equal(2), Box::new(Expression::Field("b".into()))),
                        Expression::Match(Pattern::Equal(3), Box::new(Expression::Field("c".into()))),
                    ],
                ),
            ],
        );
        let folded = matrix(expr);
        assert!(matches!(folded, Expression::BooleanGroup(BoolOp::And, _)));
    }
}
