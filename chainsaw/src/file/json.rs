use std::fs;
use std::path::Path;

use serde_json::Value as Json;

use crate::error::{Error, Result};

/// Parse a single JSON document (object, array, or scalar) from `path`.
pub fn parse(path: &Path) -> Result<Vec<Json>> {
    let raw = fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: Json = serde_json::from_str(&raw).map_err(|e| Error::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(vec![value])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, r#"{"a": 1}"#).unwrap();
        let docs = parse(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["a"], 1);
    }
}
