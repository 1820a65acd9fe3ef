use std::fs;
use std::path::Path;

use serde_json::Value as Json;

use crate::error::{Error, Result};

/// One `Json` value per non-empty line.
pub fn parse(path: &Path) -> Result<Vec<Json>> {
    let raw = fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut docs = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Json = serde_json::from_str(line).map_err(|e| Error::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        docs.push(value);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.jsonl");
        fs::write(&path, "{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        let docs = parse(&path).unwrap();
        assert_eq!(docs.len(), 2);
    }
}
