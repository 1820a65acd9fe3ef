//! A tagged expression tree ("Tau") and the solver that evaluates it against
//! arbitrary structured documents. This crate has no notion of files, rules,
//! or hunting; it only knows how to parse a `Detection` out of YAML, run the
//! optimiser pipeline over it, and answer "does this document match".

pub mod core;
mod document;

pub use document::{find_json, json_to_value, Document, Value};

use core::Detection;

/// Parse and fully optimise a YAML `detection` block in one step: this is
/// the shape every rule loader actually wants, since nothing outside of the
/// optimiser itself should ever see an un-coalesced `Detection`.
pub fn parse_detection(yaml: &serde_yaml::Value) -> anyhow::Result<core::Expression> {
    let detection: Detection = serde_yaml::from_value(yaml.clone())?;
    core::optimise(detection)
}

/// Parse and fully optimise a standalone Tau expression string - the
/// alternative shape a Chainsaw rule's `filter` field may take instead of a
/// tagged detection block.
pub fn parse_expression(src: &str) -> anyhow::Result<core::Expression> {
    let expression = core::parse_expression(src)?;
    core::optimise(Detection {
        expression,
        identifiers: Default::default(),
    })
}

/// Evaluate an already-optimised expression against a document.
pub fn solve(expression: &core::Expression, document: &dyn Document) -> bool {
    core::solve(expression, document)
}
