//! The shared "selection" (per-identifier filter) and "condition" grammars
//! used by both the Chainsaw-native detection block and the Sigma loader
//! after it has rewritten Sigma's own modifier syntax into this shape. Both
//! rule kinds bottom out in the same `tau_engine::core::Detection`.

use anyhow::{bail, Context, Result};
use regex::RegexBuilder;

use super::parser::{BoolOp, Expression, Needle, NeedleKind, Pattern, Search};

/// Parse one identifier's filter body (the YAML value under a `detection`
/// key) into an `Expression`. Supports:
/// - a mapping of `field` (optionally `field|mod1|mod2`) -> scalar/list
///   value, AND'd across keys;
/// - a sequence of such mappings, OR'd together;
pub fn parse_selection(value: &serde_yaml::Value) -> Result<Expression> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut clauses = Vec::with_capacity(map.len());
            for (k, v) in map {
                let key = k
                    .as_str()
                    .context("selection keys must be strings")?
                    .to_string();
                clauses.push(parse_field_clause(&key, v)?);
            }
            Ok(fold(BoolOp::And, clauses))
        }
        serde_yaml::Value::Sequence(seq) => {
            let mut clauses = Vec::with_capacity(seq.len());
            for item in seq {
                clauses.push(parse_selection(item)?);
            }
            Ok(fold(BoolOp::Or, clauses))
        }
        other => bail!("unsupported selection shape: {other:?}"),
    }
}

fn fold(op: BoolOp, mut clauses: Vec<Expression>) -> Expression {
    if clauses.len() == 1 {
        return clauses.remove(0);
    }
    Expression::BooleanGroup(op, clauses)
}

const SUPPORTED_MODIFIERS: &[&str] = &[
    "all",
    "base64",
    "base64offset",
    "contains",
    "endswith",
    "startswith",
    "re",
];

fn parse_field_clause(key: &str, value: &serde_yaml::Value) -> Result<Expression> {
    let mut parts = key.split('|');
    let field = parts.next().unwrap_or(key).to_string();
    let modifiers: Vec<String> = parts.map(str::to_string).collect();
    for m in &modifiers {
        if !SUPPORTED_MODIFIERS.contains(&m.as_str()) {
            bail!("unsupported modifier '{m}' on field '{field}'");
        }
    }
    let all = modifiers.iter().any(|m| m == "all");
    let rest: Vec<String> = modifiers.into_iter().filter(|m| m != "all").collect();

    let values = scalarize(value)?;
    let mut patterns = Vec::with_capacity(values.len());
    for raw in &values {
        patterns.extend(transform(raw, &rest)?);
    }

    // `all` gives every pattern AND semantics, so each one must be checked
    // independently - collapsing them into one multi-needle automaton would
    // turn "every value must match" into "any value matches".
    if all {
        let leaves: Vec<Expression> = patterns
            .into_iter()
            .map(|p| Expression::Match(p, Box::new(Expression::Field(field.clone()))))
            .collect();
        return Ok(fold(BoolOp::And, leaves));
    }

    Ok(combine_or_patterns(field, patterns))
}

/// Combine the OR'd patterns produced for one field: two or more
/// needle-shaped patterns (contains/startswith/endswith/exact) collapse into
/// a single `Search::aho_corasick` node, so the solver scans the field's
/// value once against every needle instead of re-scanning it per pattern.
/// Anything else (numeric comparisons, `Any`, `Regex`) stays a plain `Match`
/// leaf, and a lone needle stays a `Match` too since there's nothing to fold
/// it with.
fn combine_or_patterns(field: String, patterns: Vec<Pattern>) -> Expression {
    let mut needles = Vec::with_capacity(patterns.len());
    let mut rest = Vec::new();
    for pattern in patterns {
        match needle_of(&pattern) {
            Some(needle) => needles.push(needle),
            None => rest.push(pattern),
        }
    }

    let mut leaves = Vec::with_capacity(rest.len() + 1);
    match needles.len() {
        0 => {}
        1 => {
            let pattern = pattern_of(needles.remove(0));
            leaves.push(Expression::Match(pattern, Box::new(Expression::Field(field.clone()))));
        }
        _ => {
            let search = Search::aho_corasick(needles, true)
                .expect("needle values built from already-validated patterns are never invalid");
            leaves.push(Expression::Search(search, field.clone(), true));
        }
    }
    leaves.extend(
        rest.into_iter()
            .map(|p| Expression::Match(p, Box::new(Expression::Field(field.clone())))),
    );
    fold(BoolOp::Or, leaves)
}

fn needle_of(pattern: &Pattern) -> Option<Needle> {
    let (kind, value) = match pattern {
        Pattern::Contains(s) => (NeedleKind::Contains, s),
        Pattern::EndsWith(s) => (NeedleKind::EndsWith, s),
        Pattern::Exact(s) => (NeedleKind::Exact, s),
        Pattern::StartsWith(s) => (NeedleKind::StartsWith, s),
        _ => return None,
    };
    Some(Needle {
        kind,
        value: value.clone(),
    })
}

fn pattern_of(needle: Needle) -> Pattern {
    match needle.kind {
        NeedleKind::Contains => Pattern::Contains(needle.value),
        NeedleKind::EndsWith => Pattern::EndsWith(needle.value),
        NeedleKind::Exact => Pattern::Exact(needle.value),
        NeedleKind::StartsWith => Pattern::StartsWith(needle.value),
    }
}

#[derive(Clone)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

fn scalarize(value: &serde_yaml::Value) -> Result<Vec<Scalar>> {
    match value {
        serde_yaml::Value::String(s) => Ok(vec![Scalar::Str(s.clone())]),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(vec![Scalar::Int(i)])
            } else {
                Ok(vec![Scalar::Float(n.as_f64().unwrap_or_default())])
            }
        }
        serde_yaml::Value::Bool(b) => Ok(vec![Scalar::Bool(*b)]),
        serde_yaml::Value::Null => Ok(vec![Scalar::Str(String::new())]),
        serde_yaml::Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.extend(scalarize(item)?);
            }
            Ok(out)
        }
        other => bail!("unsupported field value: {other:?}"),
    }
}

/// Apply the modifier chain (minus `all`, which only affects combination)
/// to one raw scalar value, per the Sigma modifier-transform table; reused
/// unmodified by Chainsaw-native selections since they share the same
/// pattern grammar.
fn transform(raw: &Scalar, modifiers: &[String]) -> Result<Vec<Pattern>> {
    if modifiers.is_empty() {
        match raw {
            Scalar::Int(i) => return Ok(vec![Pattern::Equal(*i)]),
            Scalar::Float(f) => return Ok(vec![Pattern::FEqual(*f)]),
            Scalar::Bool(b) => {
                return Ok(vec![Pattern::Exact(b.to_string())]);
            }
            Scalar::Str(_) => {}
        }
    }
    let s = match raw {
        Scalar::Str(s) => s.clone(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    };

    if let Some(rest) = without(modifiers, "base64") {
        let encoded = base64_encode(s.as_bytes());
        return transform(&Scalar::Str(encoded), &rest);
    }
    if let Some(rest) = without(modifiers, "base64offset") {
        let mut out = Vec::with_capacity(3);
        for (pad, trim_start, trim_end) in [(0usize, 0usize, 0usize), (1, 2, 3), (2, 3, 2)] {
            let mut padded = " ".repeat(pad);
            padded.push_str(&s);
            let encoded = base64_encode(padded.as_bytes());
            let end = encoded.len().saturating_sub(trim_end);
            let trimmed = encoded[trim_start.min(end)..end].to_string();
            out.extend(transform(&Scalar::Str(trimmed), &rest)?);
        }
        return Ok(out);
    }
    if modifiers.iter().any(|m| m == "re") {
        let rx = regex::Regex::new(&s).context("invalid regex pattern")?;
        return Ok(vec![Pattern::Regex(rx)]);
    }
    if modifiers.iter().any(|m| m == "contains") {
        return Ok(vec![Pattern::Contains(s.to_ascii_lowercase())]);
    }
    if modifiers.iter().any(|m| m == "startswith") {
        return Ok(vec![Pattern::StartsWith(s.to_ascii_lowercase())]);
    }
    if modifiers.iter().any(|m| m == "endswith") {
        return Ok(vec![Pattern::EndsWith(s.to_ascii_lowercase())]);
    }
    // No recognised string modifier: bare value. `*`/`?` glob characters
    // fall back to a regex, otherwise a case-insensitive exact match.
    if s.contains('*') || s.contains('?') {
        let pattern = glob_to_regex(&s);
        let rx = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .context("invalid glob-derived regex")?;
        Ok(vec![Pattern::Regex(rx)])
    } else {
        Ok(vec![Pattern::Exact(s.to_ascii_lowercase())])
    }
}

fn without(modifiers: &[String], remove: &str) -> Option<Vec<String>> {
    if !modifiers.iter().any(|m| m == remove) {
        return None;
    }
    Some(modifiers.iter().filter(|m| *m != remove).cloned().collect())
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('$');
    out
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// The boolean `condition` grammar: identifiers, `and`/`or`/`not`,
/// parentheses, and the `all|1 of (them|prefix*)` special forms.
pub fn parse_condition(src: &str, identifiers: &[String]) -> Result<Expression> {
    if src.contains('|') {
        bail!("aggregation pipelines are not supported in conditions");
    }
    for bad in ["avg", "max", "min", "sum", "near"] {
        if src.split_whitespace().any(|t| t == bad) {
            bail!("unsupported condition keyword '{bad}'");
        }
    }
    let tokens = tokenize(src)?;
    let mut parser = CondParser {
        tokens,
        pos: 0,
        identifiers,
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        bail!(
            "trailing tokens in condition: {:?}",
            &parser.tokens[parser.pos..]
        );
    }
    Ok(expr)
}

fn tokenize(src: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in src.chars() {
        match c {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

struct CondParser<'a> {
    tokens: Vec<String>,
    pos: usize,
    identifiers: &'a [String],
}

impl<'a> CondParser<'a> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn bump(&mut self) -> Option<String> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some("or") {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = merge(BoolOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some("and") {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = merge(BoolOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.peek() == Some("not") {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(Expression::Negate(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expression> {
        match self.peek() {
            Some("(") => {
                self.bump();
                let expr = self.parse_or()?;
                if self.bump().as_deref() != Some(")") {
                    bail!("unbalanced parentheses in condition");
                }
                Ok(expr)
            }
            Some(_) => self.parse_of_or_identifier(),
            None => bail!("unexpected end of condition"),
        }
    }

    fn parse_of_or_identifier(&mut self) -> Result<Expression> {
        let first = self.bump().unwrap();
        if first == "all" || first == "1" {
            if self.peek() != Some("of") {
                bail!("expected 'of' after '{first}'");
            }
            self.bump();
            let target = self
                .bump()
                .ok_or_else(|| anyhow::anyhow!("expected target after 'of'"))?;
            let names: Vec<String> = if target == "them" {
                self.identifiers.to_vec()
            } else if let Some(prefix) = target.strip_suffix('*') {
                if prefix.is_empty() {
                    self.identifiers.to_vec()
                } else {
                    self.identifiers
                        .iter()
                        .filter(|n| n.starts_with(prefix))
                        .cloned()
                        .collect()
                }
            } else {
                bail!("unsupported 'of' target: {target}");
            };
            if names.is_empty() {
                bail!("'{first} of {target}' matched no identifiers");
            }
            let op = if first == "all" { BoolOp::And } else { BoolOp::Or };
            return Ok(Expression::BooleanGroup(
                op,
                names.into_iter().map(Expression::Identifier).collect(),
            ));
        }
        if first.contains('*') {
            bail!("raw wildcards are not supported outside 'of' forms");
        }
        Ok(Expression::Identifier(first))
    }
}

fn merge(op: BoolOp, lhs: Expression, rhs: Expression) -> Expression {
    match (lhs, op) {
        (Expression::BooleanGroup(lop, mut xs), op2) if lop == op2 => {
            xs.push(rhs);
            Expression::BooleanGroup(lop, xs)
        }
        (lhs, _) => Expression::BooleanGroup(op, vec![lhs, rhs]),
    }
}

/// Parse a Chainsaw rule's raw Tau expression string - the alternative a
/// `filter` field may take instead of a tagged `{condition, <identifiers>}`
/// detection block. This is a standalone little language: `and`/`or`/`not`,
/// parentheses, `int(f)`/`str(f)`/`flt(f)` casts, and comparisons against a
/// quoted string or numeric literal, e.g.
/// `int(Event.System.EventID) == 4688 and not EventData.User == 'SYSTEM'`.
pub fn parse_expression(src: &str) -> Result<Expression> {
    let tokens = tokenize_expr(src)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        bail!("trailing tokens in expression: {:?}", &parser.tokens[parser.pos..]);
    }
    Ok(expr)
}

#[derive(Clone, Debug, PartialEq)]
enum ExprTok {
    Ident(String),
    Str(String),
    Num(String),
    LParen,
    RParen,
    Comma,
    Op(String),
    And,
    Or,
    Not,
}

fn tokenize_expr(src: &str) -> Result<Vec<ExprTok>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(ExprTok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprTok::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(ExprTok::Comma);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                for c in chars.by_ref() {
                    if c == quote {
                        break;
                    }
                    s.push(c);
                }
                tokens.push(ExprTok::Str(s));
            }
            '=' | '>' | '<' | '!' => {
                let mut op = String::new();
                op.push(c);
                chars.next();
                if chars.peek() == Some(&'=') {
                    op.push('=');
                    chars.next();
                }
                tokens.push(ExprTok::Op(op));
            }
            c if c.is_ascii_digit() || (c == '-' && tokens.is_empty()) => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(ExprTok::Num(s));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match s.as_str() {
                    "and" => tokens.push(ExprTok::And),
                    "or" => tokens.push(ExprTok::Or),
                    "not" => tokens.push(ExprTok::Not),
                    _ => tokens.push(ExprTok::Ident(s)),
                }
            }
            other => bail!("unexpected character in expression: {other}"),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<ExprTok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&ExprTok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<ExprTok> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&ExprTok::Or) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = merge(BoolOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&ExprTok::And) {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = merge(BoolOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.peek() == Some(&ExprTok::Not) {
            self.bump();
            return Ok(Expression::Negate(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let lhs = self.parse_atom()?;
        let Some(ExprTok::Op(op)) = self.peek().cloned() else {
            return Ok(lhs);
        };
        self.bump();
        let rhs_tok = self.bump().ok_or_else(|| anyhow::anyhow!("expected value after '{op}'"))?;
        match rhs_tok {
            ExprTok::Str(s) => {
                if op != "==" {
                    bail!("operator '{op}' is not supported against a string literal");
                }
                Ok(Expression::Match(Pattern::Exact(s.to_ascii_lowercase()), Box::new(lhs)))
            }
            ExprTok::Num(n) => {
                if let Ok(i) = n.parse::<i64>() {
                    let tau_op = numeric_op(&op)?;
                    Ok(Expression::BooleanExpression(Box::new(lhs), tau_op, Box::new(Expression::Integer(i))))
                } else {
                    let f: f64 = n.parse().context("invalid numeric literal")?;
                    let tau_op = numeric_op(&op)?;
                    Ok(Expression::BooleanExpression(Box::new(lhs), tau_op, Box::new(Expression::Float(f))))
                }
            }
            other => bail!("unexpected right-hand side: {other:?}"),
        }
    }

    fn parse_atom(&mut self) -> Result<Expression> {
        match self.bump() {
            Some(ExprTok::LParen) => {
                let expr = self.parse_or()?;
                if self.bump() != Some(ExprTok::RParen) {
                    bail!("unbalanced parentheses in expression");
                }
                Ok(expr)
            }
            Some(ExprTok::Ident(name)) if matches!(self.peek(), Some(ExprTok::LParen)) => {
                let sym = match name.as_str() {
                    "int" => super::parser::ModSym::Int,
                    "str" => super::parser::ModSym::Str,
                    "flt" => super::parser::ModSym::Flt,
                    other => bail!("unknown function '{other}'"),
                };
                self.bump();
                let inner = self.parse_atom()?;
                if self.bump() != Some(ExprTok::RParen) {
                    bail!("unbalanced parentheses in cast");
                }
                Ok(Expression::Cast(Box::new(inner), sym))
            }
            Some(ExprTok::Ident(name)) => Ok(Expression::Field(name)),
            other => bail!("unexpected token: {other:?}"),
        }
    }
}

fn numeric_op(op: &str) -> Result<Op> {
    Ok(match op {
        "==" => Op::Eq,
        ">" => Op::Gt,
        ">=" => Op::Ge,
        "<" => Op::Lt,
        "<=" => Op::Le,
        other => bail!("unsupported operator: {other}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_of_them_ands_every_identifier() {
        let expr = parse_condition("all of them", &ids(&["sel1", "sel2"])).unwrap();
        match expr {
            Expression::BooleanGroup(BoolOp::And, xs) => assert_eq!(xs.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn and_not_combination() {
        let expr = parse_condition("sel1 and not sel2", &ids(&["sel1", "sel2"])).unwrap();
        match expr {
            Expression::BooleanGroup(BoolOp::And, xs) => {
                assert_eq!(xs.len(), 2);
                assert!(matches!(xs[1], Expression::Negate(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn pipe_is_rejected() {
        assert!(parse_condition("sel1 | count() > 5", &ids(&["sel1"])).is_err());
    }

    #[test]
    fn base64offset_yields_three_variants() {
        let value = serde_yaml::Value::String("powershell".to_string());
        let expr = parse_field_clause("CommandLine|base64offset", &value).unwrap();
        match expr {
            Expression::Search(Search::AhoCorasick(_, needles, ignore_case), field, expr_ic) => {
                assert_eq!(needles.len(), 3);
                assert_eq!(field, "CommandLine");
                assert!(ignore_case);
                assert!(expr_ic);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn single_contains_value_stays_a_plain_match() {
        let value = serde_yaml::Value::String("cmd".to_string());
        let expr = parse_field_clause("CommandLine|contains", &value).unwrap();
        assert!(matches!(expr, Expression::Match(Pattern::Contains(_), _)));
    }

    #[test]
    fn all_modifier_keeps_needles_separate() {
        let value = serde_yaml::Value::Sequence(vec![
            serde_yaml::Value::String("a".to_string()),
            serde_yaml::Value::String("b".to_string()),
        ]);
        let expr = parse_field_clause("CommandLine|contains|all", &value).unwrap();
        match expr {
            Expression::BooleanGroup(BoolOp::And, xs) => assert_eq!(xs.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn raw_expression_numeric_comparison() {
        let expr = parse_expression("int(Event.System.EventID) == 4688").unwrap();
        assert!(matches!(expr, Expression::BooleanExpression(_, Op::Eq, _)));
    }

    #[test]
    fn raw_expression_and_not_with_string_match() {
        let expr = parse_expression("EventID == 4688 and not User == 'SYSTEM'").unwrap();
        match expr {
            Expression::BooleanGroup(BoolOp::And, xs) => {
                assert_eq!(xs.len(), 2);
                assert!(matches!(xs[1], Expression::Negate(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn raw_expression_rejects_trailing_garbage() {
        assert!(parse_expression("EventID == 4688 and").is_err());
    }
}
