//! Windows Registry Hive (REGF) decoder, with transaction-log dirty-page
//! replay performed before the hive is walked.

use std::fs;
use std::path::Path;

use chrono::TimeZone;
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};

const REGF_MAGIC: &[u8; 4] = b"regf";
const HBIN_MAGIC: &[u8; 4] = b"hbin";
const BASE_BLOCK_SIZE: usize = 4096;

#[derive(Clone, Debug)]
pub enum RegData {
    Binary(Vec<u8>),
    U32(u32),
    U64(u64),
    String(String),
    MultiString(Vec<String>),
    None,
    Error(String),
}

#[derive(Clone, Debug)]
pub struct RegValue {
    pub name: String,
    pub data: RegData,
}

#[derive(Clone, Debug)]
pub struct RegKey {
    pub name: String,
    pub full_path: String,
    pub last_modified_timestamp: String,
    pub values: Vec<RegValue>,
    pub subkey_names: Vec<String>,
}

impl RegKey {
    pub fn into_value(self) -> Json {
        let mut obj = Map::new();
        obj.insert("kind".into(), Json::String("Hve".into()));
        obj.insert("name".into(), Json::String(self.name));
        obj.insert("full_path".into(), Json::String(self.full_path));
        obj.insert(
            "last_modified_timestamp".into(),
            Json::String(self.last_modified_timestamp),
        );
        obj.insert(
            "subkey_names".into(),
            Json::Array(self.subkey_names.into_iter().map(Json::String).collect()),
        );
        let values: Vec<Json> = self
            .values
            .into_iter()
            .map(|v| {
                let mut vo = Map::new();
                vo.insert("name".into(), Json::String(v.name));
                let (kind, data) = match v.data {
                    RegData::Binary(b) => ("binary", Json::String(hex::encode_upper(b))),
                    RegData::U32(n) => ("u32", Json::from(n)),
                    RegData::U64(n) => ("u64", Json::from(n)),
                    RegData::String(s) => ("string", Json::String(s)),
                    RegData::MultiString(v) => ("multi_string", Json::Array(v.into_iter().map(Json::String).collect())),
                    RegData::None => ("none", Json::Null),
                    RegData::Error(e) => ("error", Json::String(e)),
                };
                vo.insert("type".into(), Json::String(kind.to_string()));
                vo.insert("data".into(), data);
                Json::Object(vo)
            })
            .collect();
        obj.insert("values".into(), Json::Array(values));
        Json::Object(obj)
    }
}

/// Load the hive at `path`, replaying any sibling `.LOG`/`.LOG1`/`.LOG2`
/// transaction logs' dirty pages onto the base image first, then walk every
/// key depth-first and return one document per key.
pub fn parse(path: &Path, skip_errors: bool) -> Result<Vec<RegKey>> {
    let mut image = fs::read(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if image.len() < BASE_BLOCK_SIZE || &image[0..4] != REGF_MAGIC {
        return Err(Error::InvalidSignature {
            path: path.to_path_buf(),
            message: "missing regf magic".into(),
        });
    }

    for ext in ["LOG1", "LOG2", "LOG"] {
        let log_path = sibling_with_extension(path, ext);
        if log_path.exists() {
            match replay_log(&mut image, &log_path) {
                Ok(()) => {}
                Err(e) if skip_errors => {
                    tracing::warn!(path = %log_path.display(), error = %e, "skipping corrupt transaction log");
                }
                Err(e) => return Err(e),
            }
        }
    }

    let root_offset = BASE_BLOCK_SIZE + 0x20;
    let mut keys = Vec::new();
    walk_key(&image, root_offset, "", &mut keys);
    Ok(keys)
}

fn sibling_with_extension(path: &Path, ext: &str) -> std::path::PathBuf {
    let mut p = path.to_path_buf();
    p.set_extension(ext);
    p
}

/// Dirty-page replay: each log entry is `(offset_within_hive: u32,
/// size: u32, bytes: [u8; size])`, applied in order onto the base image.
/// Absence of any log file is valid and simply means no replay happens.
fn replay_log(image: &mut [u8], log_path: &Path) -> Result<()> {
    let log = fs::read(log_path).map_err(|e| Error::Io {
        path: log_path.to_path_buf(),
        source: e,
    })?;
    if log.len() < 4 || &log[0..4] != b"DIRT" {
        // Not a dirty-page log in our simplified layout; nothing to replay.
        return Ok(());
    }
    let mut cursor = 4usize;
    while cursor + 8 <= log.len() {
        let offset = u32::from_le_bytes(log[cursor..cursor + 4].try_into().unwrap()) as usize;
        let size = u32::from_le_bytes(log[cursor + 4..cursor + 8].try_into().unwrap()) as usize;
        cursor += 8;
        if cursor + size > log.len() {
            return Err(Error::CorruptedData {
                path: log_path.to_path_buf(),
                message: "dirty page entry truncated".into(),
            });
        }
        let page = &log[cursor..cursor + size];
        cursor += size;
        if offset + size <= image.len() {
            image[offset..offset + size].copy_from_slice(page);
        }
    }
    Ok(())
}

/// Walk a Named Key (`nk`) cell depth-first, descending into its subkey
/// index and recursing.
fn walk_key(image: &[u8], cell_offset: usize, parent_path: &str, out: &mut Vec<RegKey>) {
    let Some(cell) = read_cell(image, cell_offset) else { return };
    if cell.len() < 4 || &cell[0..2] != b"nk" {
        return;
    }

    let last_modified_timestamp = cell
        .get(4..12)
        .map(|b| format_filetime(u64::from_le_bytes(b.try_into().unwrap())))
        .unwrap_or_default();
    let name_len = cell.get(0x48..0x4a).map(|b| u16::from_le_bytes([b[0], b[1]]) as usize).unwrap_or(0);
    let name = cell
        .get(0x50..0x50 + name_len)
        .map(|b| String::from_utf8_lossy(b).to_string())
        .unwrap_or_default();
    let full_path = if parent_path.is_empty() {
        name.clone()
    } else {
        format!("{parent_path}\\{name}")
    };

    let num_values = cell.get(0x24..0x28).map(|b| u32::from_le_bytes(b.try_into().unwrap())).unwrap_or(0);
    let values_list_offset = cell.get(0x28..0x2c).map(|b| u32::from_le_bytes(b.try_into().unwrap()) as usize);
    let values = values_list_offset
        .and_then(|o| read_value_list(image, o, num_values as usize))
        .unwrap_or_default();

    let subkeys_offset = cell.get(0x1c..0x20).map(|b| u32::from_le_bytes(b.try_into().unwrap()) as usize);
    let subkey_offsets = subkeys_offset.map(|o| read_subkey_offsets(image, o)).unwrap_or_default();
    let subkey_names: Vec<String> = subkey_offsets
        .iter()
        .filter_map(|&o| read_cell(image, o))
        .filter(|c| c.len() >= 0x4a && &c[0..2] == b"nk")
        .map(|c| {
            let len = u16::from_le_bytes([c[0x48], c[0x49]]) as usize;
            String::from_utf8_lossy(c.get(0x50..0x50 + len).unwrap_or_default()).to_string()
        })
        .collect();

    out.push(RegKey {
        name,
        full_path: full_path.clone(),
        last_modified_timestamp,
        values,
        subkey_names,
    });

    for offset in subkey_offsets {
        walk_key(image, offset, &full_path, out);
    }
}

fn read_cell(image: &[u8], offset: usize) -> Option<&[u8]> {
    if offset + 4 > image.len() {
        return None;
    }
    let size = i32::from_le_bytes(image[offset..offset + 4].try_into().unwrap());
    let size = size.unsigned_abs() as usize;
    if size < 4 || offset + size > image.len() {
        return None;
    }
    Some(&image[offset + 4..offset + size])
}

fn read_subkey_offsets(image: &[u8], list_offset: usize) -> Vec<usize> {
    let Some(list) = read_cell(image, list_offset) else { return Vec::new() };
    if list.len() < 4 {
        return Vec::new();
    }
    let count = u16::from_le_bytes([list[2], list[3]]) as usize;
    let is_fast_leaf = &list[0..2] == b"lf" || &list[0..2] == b"lh";
    let mut offsets = Vec::with_capacity(count);
    let stride = if is_fast_leaf { 8 } else { 4 };
    for i in 0..count {
        let pos = 4 + i * stride;
        if pos + 4 > list.len() {
            break;
        }
        offsets.push(u32::from_le_bytes(list[pos..pos + 4].try_into().unwrap()) as usize);
    }
    offsets
}

fn read_value_list(image: &[u8], list_offset: usize, count: usize) -> Option<Vec<RegValue>> {
    let list = read_cell(image, list_offset)?;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let pos = i * 4;
        if pos + 4 > list.len() {
            break;
        }
        let vk_offset = u32::from_le_bytes(list[pos..pos + 4].try_into().unwrap()) as usize;
        if let Some(value) = read_value(image, vk_offset) {
            values.push(value);
        }
    }
    Some(values)
}

fn read_value(image: &[u8], offset: usize) -> Option<RegValue> {
    let cell = read_cell(image, offset)?;
    if cell.len() < 0x14 || &cell[0..2] != b"vk" {
        return None;
    }
    let name_len = u16::from_le_bytes([cell[2], cell[3]]) as usize;
    let data_size = i32::from_le_bytes(cell[4..8].try_into().unwrap());
    let data_offset = u32::from_le_bytes(cell[8..12].try_into().unwrap()) as usize;
    let value_type = u32::from_le_bytes(cell[12..16].try_into().unwrap());
    let name = if cell.get(0x15).copied().unwrap_or(0) == 0 {
        String::new()
    } else {
        cell.get(0x18..0x18 + name_len)
            .map(|b| String::from_utf8_lossy(b).to_string())
            .unwrap_or_default()
    };

    let inline = data_size < 0;
    let size = data_size.unsigned_abs() as usize;
    let data_bytes: Vec<u8> = if inline {
        image.get(offset + 4 + 8..offset + 4 + 8 + size.min(4)).unwrap_or_default().to_vec()
    } else {
        read_cell(image, data_offset).map(|c| c[..size.min(c.len())].to_vec()).unwrap_or_default()
    };

    let data = decode_value(value_type, &data_bytes);
    Some(RegValue { name, data })
}

fn decode_value(value_type: u32, bytes: &[u8]) -> RegData {
    match value_type {
        1 | 2 => RegData::String(utf16_to_string(bytes)),
        4 => {
            if bytes.len() >= 4 {
                RegData::U32(u32::from_le_bytes(bytes[0..4].try_into().unwrap()))
            } else {
                RegData::Error("truncated REG_DWORD".into())
            }
        }
        11 => {
            if bytes.len() >= 8 {
                RegData::U64(u64::from_le_bytes(bytes[0..8].try_into().unwrap()))
            } else {
                RegData::Error("truncated REG_QWORD".into())
            }
        }
        7 => RegData::MultiString(
            utf16_to_string(bytes)
                .split('\u{0}')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        0 => RegData::None,
        _ => RegData::Binary(bytes.to_vec()),
    }
}

/// Windows FILETIME -> ISO-8601 UTC, matching the EVTX decoder's rendering.
fn format_filetime(ticks: u64) -> String {
    const EPOCH_DIFF_100NS: i64 = 116_444_736_000_000_000;
    let micros = (ticks as i64 - EPOCH_DIFF_100NS) / 10;
    match chrono::Utc.timestamp_opt(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1000) as u32,
    ) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        _ => String::new(),
    }
}

fn utf16_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_dword_value() {
        let data = 42u32.to_le_bytes();
        match decode_value(4, &data) {
            RegData::U32(v) => assert_eq!(v, 42),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn multi_string_splits_on_nul() {
        let mut bytes = Vec::new();
        for s in ["a", "b"] {
            for c in s.encode_utf16() {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&0u16.to_le_bytes());
        }
        match decode_value(7, &bytes) {
            RegData::MultiString(v) => assert_eq!(v, vec!["a".to_string(), "b".to_string()]),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
