//! The uniform `Reader` abstraction over every decoder, and the `Kind`
//! dispatch table extension/filename sniffing uses to pick one.

pub mod esedb;
pub mod evtx;
pub mod hve;
pub mod json;
pub mod jsonl;
pub mod mft;
pub mod xml;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tau_engine::{Document, Value};

use crate::error::{Error, Result};

/// The decoded-file kind a document belongs to; `Unknown` in a rule's
/// `kind` field means "match documents from any source".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Esedb,
    Evtx,
    Hve,
    Json,
    Jsonl,
    Mft,
    Unknown,
    Xml,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Esedb => "esedb",
            Self::Evtx => "evtx",
            Self::Hve => "hve",
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Mft => "mft",
            Self::Unknown => "unknown",
            Self::Xml => "xml",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Kind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "esedb" => Self::Esedb,
            "evtx" => Self::Evtx,
            "hve" => Self::Hve,
            "json" => Self::Json,
            "jsonl" => Self::Jsonl,
            "mft" => Self::Mft,
            "xml" => Self::Xml,
            other => anyhow::bail!("unknown file kind: {other}"),
        })
    }
}

/// Sniff a `Kind` from a path's extension/filename, per the fixed dispatch
/// table; returns `None` for anything unrecognised (the `load_unknown`
/// probe path then takes over).
fn kind_from_path(path: &Path) -> Option<Kind> {
    if path.file_name().and_then(|n| n.to_str()) == Some("$MFT") {
        return Some(Kind::Mft);
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "evt" | "evtx" => Kind::Evtx,
        "json" => Kind::Json,
        "jsonl" => Kind::Jsonl,
        "bin" | "mft" => Kind::Mft,
        "xml" => Kind::Xml,
        "hve" => Kind::Hve,
        "dat" | "edb" => Kind::Esedb,
        _ => return None,
    })
}

/// The fixed probe order `load_unknown` tries when a file's kind can't be
/// determined from its name: MFT especially can partially parse arbitrary
/// bytes, so strict signature checks inside each decoder matter more than
/// probe order elegance.
const PROBE_ORDER: [Kind; 6] = [Kind::Evtx, Kind::Mft, Kind::Json, Kind::Xml, Kind::Hve, Kind::Esedb];

/// A decoded document plus the file kind it came from, handed to the hunt
/// engine as a `tau_engine::Document`.
pub struct Record {
    pub kind: Kind,
    pub value: Json,
}

impl Document for Record {
    fn find(&self, key: &str) -> Option<Value<'_>> {
        self.value.find(key)
    }
}

/// A fully-materialised sequence of decoded documents from one file. Real
/// chainsaw streams per-decoder; this core keeps decode-then-iterate, since
/// every decoder here already reads its whole source file up front.
pub struct Reader {
    path: PathBuf,
    kind: Kind,
    records: std::vec::IntoIter<Json>,
}

impl Reader {
    pub fn open(path: &Path, load_unknown: bool, skip_errors: bool) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound { path: path.to_path_buf() });
        }
        if let Some(kind) = kind_from_path(path) {
            return Self::open_as(path, kind, skip_errors);
        }
        if !load_unknown {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                message: "file kind could not be determined from its name".into(),
            });
        }
        for kind in PROBE_ORDER {
            if let Ok(reader) = Self::open_as(path, kind, true) {
                if reader.records.len() > 0 {
                    return Ok(reader);
                }
            }
        }
        Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            message: "no decoder produced any documents".into(),
        })
    }

    fn open_as(path: &Path, kind: Kind, skip_errors: bool) -> Result<Self> {
        let result = match kind {
            Kind::Evtx => evtx::parse(path, skip_errors),
            Kind::Json => json::parse(path),
            Kind::Jsonl => jsonl::parse(path),
            Kind::Xml => xml::parse(path),
            Kind::Hve => hve::parse(path, skip_errors).map(|keys| keys.into_iter().map(|k| k.into_value()).collect()),
            Kind::Mft => mft::parse(path).map(|entries| entries.into_iter().map(|e| e.into_value()).collect()),
            Kind::Esedb => esedb::parse(path).map(|rows| rows.into_iter().map(|r| r.into_value()).collect()),
            Kind::Unknown => Ok(Vec::new()),
        };
        match result {
            Ok(records) => Ok(Self {
                path: path.to_path_buf(),
                kind,
                records: records.into_iter(),
            }),
            Err(_) if skip_errors => Ok(Self {
                path: path.to_path_buf(),
                kind,
                records: Vec::new().into_iter(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }
}

impl Iterator for Reader {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|value| Record { kind: self.kind, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn dispatches_by_extension() {
        assert_eq!(kind_from_path(Path::new("a.evtx")), Some(Kind::Evtx));
        assert_eq!(kind_from_path(Path::new("a.jsonl")), Some(Kind::Jsonl));
        assert_eq!(kind_from_path(Path::new("$MFT")), Some(Kind::Mft));
        assert_eq!(kind_from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        fs::write(&path, r#"{"a": 1}"#).unwrap();
        let reader = Reader::open(&path, false, false).unwrap();
        let records: Vec<_> = reader.collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, Kind::Json);
    }

    #[test]
    fn missing_file_errors() {
        let err = Reader::open(Path::new("/nonexistent/path.json"), false, false);
        assert!(matches!(err, Err(Error::FileNotFound { .. })));
    }
}
