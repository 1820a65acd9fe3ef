mod binxml;
mod value;

use std::fs;
use std::path::Path;

use serde_json::Value as Json;

use crate::error::{Error, Result};

use self::binxml::ChunkCache;

const FILE_MAGIC: &[u8; 8] = b"ElfFile\0";
const CHUNK_MAGIC: &[u8; 8] = b"ElfChnk\0";
const RECORD_SIGNATURE: u32 = 0x0000_2a2a;
const CHUNK_SIZE: usize = 65536;
const FILE_HEADER_SIZE: usize = 4096;

/// Parse an EVTX file into zero or more JSON documents, one per record that
/// successfully decodes. A record whose declared size exceeds the chunk's
/// remaining bytes is skipped and iteration continues with the next chunk;
/// a chunk with no valid records yields zero records from that chunk.
pub fn parse(path: &Path, skip_errors: bool) -> Result<Vec<Json>> {
    let bytes = fs::read(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if bytes.len() < FILE_HEADER_SIZE || &bytes[0..8] != FILE_MAGIC {
        return Err(Error::InvalidSignature {
            path: path.to_path_buf(),
            message: "missing ElfFile\\0 magic".into(),
        });
    }

    let mut docs = Vec::new();
    let mut offset = FILE_HEADER_SIZE;
    while offset + CHUNK_SIZE <= bytes.len() {
        let chunk = &bytes[offset..offset + CHUNK_SIZE];
        offset += CHUNK_SIZE;
        if &chunk[0..8] != CHUNK_MAGIC {
            continue;
        }
        match parse_chunk(chunk, path) {
            Ok(mut chunk_docs) => docs.append(&mut chunk_docs),
            Err(e) if skip_errors => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corrupt evtx chunk");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(docs)
}

fn parse_chunk(chunk: &[u8], path: &Path) -> Result<Vec<Json>> {
    // Chunk header: magic(8) ... free_space_offset at byte offset 0x44,
    // per the 512-byte chunk header layout.
    let free_space_offset = u64::from_le_bytes(
        chunk
            .get(0x44..0x4c)
            .ok_or_else(|| Error::ParseError {
                path: path.to_path_buf(),
                message: "chunk header truncated".into(),
            })?
            .try_into()
            .unwrap(),
    ) as usize;

    let mut cache = ChunkCache::default();
    let mut docs = Vec::new();
    let mut offset = 512usize;
    let limit = free_space_offset.min(chunk.len());

    while offset + 24 <= limit {
        let record = &chunk[offset..];
        let signature = u32::from_le_bytes(record[0..4].try_into().unwrap());
        if signature != RECORD_SIGNATURE {
            break;
        }
        let size = u32::from_le_bytes(record[4..8].try_into().unwrap()) as usize;
        if size < 24 || offset + size > limit {
            // Declared size exceeds what remains in the chunk: skip the
            // rest of this chunk rather than desynchronising further.
            break;
        }
        let record_id = u64::from_le_bytes(record[8..16].try_into().unwrap());
        let filetime = u64::from_le_bytes(record[16..24].try_into().unwrap());
        let binxml_data = &chunk[offset + 24..offset + size - 4];

        match binxml::parse_fragment(binxml_data, &mut cache, chunk) {
            Ok(xml) => {
                if let Ok(mut value) = super::xml::parse_str(&xml) {
                    apply_aliases(&mut value);
                    if let Json::Object(ref mut obj) = value {
                        obj.insert("record_id".to_string(), Json::from(record_id));
                        obj.insert(
                            "timestamp".to_string(),
                            Json::String(value::format_filetime(filetime)),
                        );
                        obj.insert("kind".to_string(), Json::String("Evtx".to_string()));
                    }
                    docs.push(value);
                }
            }
            Err(_) => {
                // A single malformed record does not abort the chunk.
            }
        }

        offset += size;
    }
    Ok(docs)
}

/// Attach the two EVTX-specific lookup aliases: `Provider` and
/// `TimeCreated` resolve through their rendered `_attributes` siblings,
/// since the BinXML→XML conversion otherwise hides them behind that
/// convention.
fn apply_aliases(value: &mut Json) {
    let Some(system) = value
        .get_mut("Event")
        .and_then(|e| e.get_mut("System"))
    else {
        return;
    };
    if let Some(name) = system
        .get("Provider_attributes")
        .and_then(|a| a.get("Name"))
        .cloned()
    {
        if let Json::Object(obj) = system {
            obj.entry("Provider").or_insert(name);
        }
    }
    if let Some(system_time) = system
        .get("TimeCreated_attributes")
        .and_then(|a| a.get("SystemTime"))
        .cloned()
    {
        if let Json::Object(obj) = system {
            obj.entry("TimeCreated").or_insert(system_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_file_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.evtx");
        fs::write(&path, vec![0u8; 4096]).unwrap();
        assert!(matches!(parse(&path, false), Err(Error::InvalidSignature { .. })));
    }

    #[test]
    fn empty_chunk_yields_zero_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.evtx");
        let mut bytes = vec![0u8; FILE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(FILE_MAGIC);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        chunk[0..8].copy_from_slice(CHUNK_MAGIC);
        // free_space_offset == 512: no records present.
        chunk[0x44..0x4c].copy_from_slice(&512u64.to_le_bytes());
        bytes.extend_from_slice(&chunk);
        fs::write(&path, &bytes).unwrap();
        let docs = parse(&path, false).unwrap();
        assert!(docs.is_empty());
    }
}
