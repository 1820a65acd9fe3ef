//! NTFS $MFT decoder: fixed-size entry records with a fixup-protected
//! sector layout, walked attribute-by-attribute, with lazy parent-chain
//! path reconstruction.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};

const DEFAULT_ENTRY_SIZE: usize = 1024;
const MAX_PATH_DEPTH: usize = 256;
const ROOT_ENTRY_ID: u64 = 5;

#[derive(Clone, Debug, Default)]
pub struct MftEntry {
    pub entry_id: u64,
    pub sequence: u16,
    pub signature: &'static str,
    pub allocated: bool,
    pub is_directory: bool,
    pub parent_entry_id: Option<u64>,
    pub name: Option<String>,
    pub full_path: Option<String>,
    pub file_size: Option<u64>,
    pub has_alternate_data_streams: bool,
    pub flags_display: String,
    pub fixup_mismatch: bool,
    pub file_attribute_flags_display: String,
    pub created: Option<String>,
    pub last_modified: Option<String>,
    pub mft_modified: Option<String>,
    pub last_access: Option<String>,
}

impl MftEntry {
    pub fn into_value(self) -> Json {
        let mut obj = Map::new();
        obj.insert("record_id".into(), Json::from(self.entry_id));
        obj.insert("kind".into(), Json::String("Mft".into()));
        obj.insert("sequence".into(), Json::from(self.sequence));
        obj.insert("signature".into(), Json::String(self.signature.to_string()));
        obj.insert("flags".into(), Json::String(self.flags_display));
        obj.insert(
            "file_attribute_flags".into(),
            Json::String(self.file_attribute_flags_display),
        );
        obj.insert("is_directory".into(), Json::Bool(self.is_directory));
        if let Some(name) = self.name {
            obj.insert("name".into(), Json::String(name));
        }
        if let Some(path) = self.full_path {
            obj.insert("full_path".into(), Json::String(path));
        }
        if let Some(size) = self.file_size {
            obj.insert("file_size".into(), Json::from(size));
        }
        obj.insert(
            "has_alternate_data_streams".into(),
            Json::Bool(self.has_alternate_data_streams),
        );
        if let Some(created) = self.created {
            obj.insert("created".into(), Json::String(created));
        }
        if let Some(last_modified) = self.last_modified {
            obj.insert("last_modified".into(), Json::String(last_modified));
        }
        if let Some(mft_modified) = self.mft_modified {
            obj.insert("mft_modified".into(), Json::String(mft_modified));
        }
        if let Some(last_access) = self.last_access {
            obj.insert("last_access".into(), Json::String(last_access));
        }
        obj.insert("fixup_mismatch".into(), Json::Bool(self.fixup_mismatch));
        Json::Object(obj)
    }
}

struct Names {
    name: Option<String>,
    parent: Option<u64>,
    namespace_rank: u8,
}

pub fn parse(path: &Path) -> Result<Vec<Json>> {
    let bytes = fs::read(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let entry_size = detect_entry_size(&bytes);
    let mut lookup: HashMap<u64, Names> = HashMap::new();
    let mut entries = Vec::new();

    let mut offset = 0;
    while offset + entry_size <= bytes.len() {
        if let Some(parsed) = parse_entry(&bytes[offset..offset + entry_size]) {
            if let (Some(name), Some(parent)) = (&parsed.name, parsed.parent_entry_id) {
                let rank = namespace_rank(parsed.name_namespace);
                let slot = lookup.entry(parsed.entry_id).or_insert(Names {
                    name: None,
                    parent: None,
                    namespace_rank: u8::MAX,
                });
                if rank < slot.namespace_rank {
                    slot.name = Some(name.clone());
                    slot.parent = Some(parent);
                    slot.namespace_rank = rank;
                }
            }
            entries.push(parsed);
        }
        offset += entry_size;
    }

    let docs = entries
        .into_iter()
        .map(|raw| {
            let full_path = raw
                .parent_entry_id
                .map(|_| reconstruct_path(raw.entry_id, &lookup));
            MftEntry {
                entry_id: raw.entry_id,
                sequence: raw.sequence,
                signature: raw.signature,
                allocated: raw.allocated,
                is_directory: raw.is_directory,
                parent_entry_id: raw.parent_entry_id,
                name: raw.name,
                full_path,
                file_size: raw.file_size,
                has_alternate_data_streams: raw.has_alternate_data_streams,
                flags_display: raw.flags_display,
                fixup_mismatch: raw.fixup_mismatch,
                file_attribute_flags_display: raw.file_attribute_flags_display,
                created: raw.created,
                last_modified: raw.last_modified,
                mft_modified: raw.mft_modified,
                last_access: raw.last_access,
            }
            .into_value()
        })
        .collect();
    Ok(docs)
}

fn detect_entry_size(bytes: &[u8]) -> usize {
    bytes
        .get(28..30)
        .map(|s| u16::from_le_bytes([s[0], s[1]]) as usize)
        .filter(|s| *s > 0 && *s <= bytes.len())
        .unwrap_or(DEFAULT_ENTRY_SIZE)
}

fn namespace_rank(ns: u8) -> u8 {
    // 0=POSIX 1=Win32 2=DOS 3=Win32+DOS: prefer Win32 or Win32+DOS.
    match ns {
        1 | 3 => 0,
        0 => 2,
        2 => 3,
        _ => 4,
    }
}

struct RawEntry {
    entry_id: u64,
    sequence: u16,
    signature: &'static str,
    allocated: bool,
    is_directory: bool,
    parent_entry_id: Option<u64>,
    name: Option<String>,
    name_namespace: u8,
    file_size: Option<u64>,
    has_alternate_data_streams: bool,
    flags_display: String,
    fixup_mismatch: bool,
    file_attribute_flags_display: String,
    created: Option<String>,
    last_modified: Option<String>,
    mft_modified: Option<String>,
    last_access: Option<String>,
}

const FILE_ATTRIBUTE_NAMES: &[(u32, &str)] = &[
    (0x1, "FILE_ATTRIBUTE_READONLY"),
    (0x2, "FILE_ATTRIBUTE_HIDDEN"),
    (0x4, "FILE_ATTRIBUTE_SYSTEM"),
    (0x10, "FILE_ATTRIBUTE_DIRECTORY"),
    (0x20, "FILE_ATTRIBUTE_ARCHIVE"),
    (0x40, "FILE_ATTRIBUTE_DEVICE"),
    (0x80, "FILE_ATTRIBUTE_NORMAL"),
    (0x100, "FILE_ATTRIBUTE_TEMPORARY"),
    (0x200, "FILE_ATTRIBUTE_SPARSE_FILE"),
    (0x400, "FILE_ATTRIBUTE_REPARSE_POINT"),
    (0x800, "FILE_ATTRIBUTE_COMPRESSED"),
    (0x1000, "FILE_ATTRIBUTE_OFFLINE"),
    (0x2000, "FILE_ATTRIBUTE_NOT_CONTENT_INDEXED"),
    (0x4000, "FILE_ATTRIBUTE_ENCRYPTED"),
];

fn render_file_attribute_flags(flags: u32) -> String {
    FILE_ATTRIBUTE_NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn parse_entry(raw: &[u8]) -> Option<RawEntry> {
    if raw.len() < 48 {
        return None;
    }
    let signature = match &raw[0..4] {
        b"FILE" => "FILE",
        b"BAAD" => "BAAD",
        _ => return None,
    };

    let fixup_offset = u16::from_le_bytes([raw[4], raw[5]]) as usize;
    let fixup_count = u16::from_le_bytes([raw[6], raw[7]]) as usize;
    let sequence = u16::from_le_bytes([raw[16], raw[17]]);
    let flags = u16::from_le_bytes([raw[22], raw[23]]);
    let used_size = u32::from_le_bytes(raw[24..28].try_into().unwrap()) as usize;
    let first_attr_offset = u16::from_le_bytes([raw[20], raw[21]]) as usize;
    let base_ref = u64::from_le_bytes(raw[32..40].try_into().unwrap());
    let entry_id = base_ref & 0x0000_FFFF_FFFF_FFFF;

    let mut entry = raw.to_vec();
    let fixup_mismatch = apply_fixup(&mut entry, fixup_offset, fixup_count);

    let allocated = flags & 0x1 != 0;
    let is_directory = flags & 0x2 != 0;
    let mut flags_display = Vec::new();
    if allocated {
        flags_display.push("ALLOCATED");
    }
    if is_directory {
        flags_display.push("INDEX_PRESENT");
    }

    let mut name = None;
    let mut name_namespace = u8::MAX;
    let mut parent_entry_id = None;
    let mut file_size = None;
    let mut has_alternate_data_streams = false;
    let mut file_attribute_flags_display = String::new();
    let mut created = None;
    let mut last_modified = None;
    let mut mft_modified = None;
    let mut last_access = None;

    let mut attr_offset = first_attr_offset;
    while attr_offset + 8 <= entry.len().min(used_size.max(first_attr_offset + 8)) {
        let attr_type = u32::from_le_bytes(entry[attr_offset..attr_offset + 4].try_into().unwrap());
        if attr_type == 0xFFFF_FFFF {
            break;
        }
        let attr_len = u32::from_le_bytes(entry[attr_offset + 4..attr_offset + 8].try_into().unwrap()) as usize;
        if attr_len == 0 || attr_offset + attr_len > entry.len() {
            break;
        }
        let non_resident = entry.get(attr_offset + 8).copied().unwrap_or(0) != 0;
        let attr = &entry[attr_offset..attr_offset + attr_len];

        match attr_type {
            0x10 if !non_resident => {
                if let Some(content_offset) = resident_content_offset(attr) {
                    if attr.len() >= content_offset + 36 {
                        let content = &attr[content_offset..];
                        let read_u64 = |off: usize| u64::from_le_bytes(content[off..off + 8].try_into().unwrap());
                        created = Some(format_filetime(read_u64(0)));
                        last_modified = Some(format_filetime(read_u64(8)));
                        mft_modified = Some(format_filetime(read_u64(16)));
                        last_access = Some(format_filetime(read_u64(24)));
                        let attrs = u32::from_le_bytes(content[32..36].try_into().unwrap());
                        file_attribute_flags_display = render_file_attribute_flags(attrs);
                    }
                }
            }
            0x30 if !non_resident => {
                if let Some(content_offset) = resident_content_offset(attr) {
                    if attr.len() >= content_offset + 66 {
                        let content = &attr[content_offset..];
                        let parent_ref = u64::from_le_bytes(content[0..8].try_into().unwrap());
                        let ns = content[65];
                        let name_len_chars = content[64] as usize;
                        let name_start = content_offset + 66;
                        let name_bytes = attr.get(name_start..name_start + name_len_chars * 2);
                        if let Some(nb) = name_bytes {
                            let rank = namespace_rank(ns);
                            if rank < name_namespace {
                                let units: Vec<u16> =
                                    nb.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                                name = Some(String::from_utf16_lossy(&units));
                                name_namespace = rank;
                                parent_entry_id = Some(parent_ref & 0x0000_FFFF_FFFF_FFFF);
                            }
                        }
                    }
                }
            }
            0x80 => {
                let name_len = entry.get(attr_offset + 9).copied().unwrap_or(0);
                if name_len > 0 {
                    has_alternate_data_streams = true;
                } else if !non_resident {
                    if let Some(content_offset) = resident_content_offset(attr) {
                        let content_size =
                            u32::from_le_bytes(attr[16..20].try_into().unwrap_or_default());
                        let _ = content_offset;
                        file_size = Some(content_size as u64);
                    }
                } else if attr.len() >= 56 {
                    let real_size = u64::from_le_bytes(attr[48..56].try_into().unwrap());
                    file_size = Some(real_size);
                }
            }
            _ => {}
        }

        attr_offset += attr_len;
    }

    Some(RawEntry {
        entry_id,
        sequence,
        signature,
        allocated,
        is_directory,
        parent_entry_id,
        name,
        name_namespace: if name_namespace == u8::MAX { 0 } else { name_namespace },
        file_size,
        has_alternate_data_streams,
        flags_display: flags_display.join(" | "),
        fixup_mismatch,
        file_attribute_flags_display,
        created,
        last_modified,
        mft_modified,
        last_access,
    })
}

fn resident_content_offset(attr: &[u8]) -> Option<usize> {
    attr.get(20..22).map(|s| u16::from_le_bytes([s[0], s[1]]) as usize)
}

/// Replace the last two bytes of every 512-byte sector with the recorded
/// original value; returns `true` if any sector's fixup signature didn't
/// match (the mismatch is noted, not fatal).
fn apply_fixup(entry: &mut [u8], fixup_offset: usize, fixup_count: usize) -> bool {
    if fixup_count == 0 || fixup_offset + 2 > entry.len() {
        return false;
    }
    let signature = [entry[fixup_offset], entry[fixup_offset + 1]];
    let mut mismatch = false;
    for sector in 0..fixup_count.saturating_sub(1) {
        let sector_end = sector * 512 + 510;
        if sector_end + 2 > entry.len() {
            break;
        }
        if entry[sector_end..sector_end + 2] != signature {
            mismatch = true;
        }
        let fixup_value_offset = fixup_offset + 2 + sector * 2;
        if fixup_value_offset + 2 > entry.len() {
            break;
        }
        let value = [entry[fixup_value_offset], entry[fixup_value_offset + 1]];
        entry[sector_end] = value[0];
        entry[sector_end + 1] = value[1];
    }
    mismatch
}

fn reconstruct_path(entry_id: u64, lookup: &HashMap<u64, Names>) -> String {
    let mut parts = Vec::new();
    let mut current = entry_id;
    let mut visited = std::collections::HashSet::new();
    for _ in 0..MAX_PATH_DEPTH {
        if current == ROOT_ENTRY_ID || !visited.insert(current) {
            break;
        }
        let Some(names) = lookup.get(&current) else { break };
        let Some(name) = &names.name else { break };
        parts.push(name.clone());
        match names.parent {
            Some(p) if p != current => current = p,
            _ => break,
        }
    }
    parts.reverse();
    parts.join("\\")
}

fn format_filetime(ticks: u64) -> String {
    const EPOCH_DIFF_100NS: i64 = 116_444_736_000_000_000;
    let micros = (ticks as i64 - EPOCH_DIFF_100NS) / 10;
    match Utc.timestamp_opt(micros.div_euclid(1_000_000), (micros.rem_euclid(1_000_000) * 1000) as u32) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_reconstruction_walks_parent_chain() {
        let mut lookup = HashMap::new();
        lookup.insert(5, Names { name: Some(".".into()), parent: Some(5), namespace_rank: 0 });
        lookup.insert(100, Names { name: Some("Windows".into()), parent: Some(5), namespace_rank: 0 });
        lookup.insert(200, Names { name: Some("System32".into()), parent: Some(100), namespace_rank: 0 });
        lookup.insert(300, Names { name: Some("cmd.exe".into()), parent: Some(200), namespace_rank: 0 });
        assert_eq!(reconstruct_path(300, &lookup), "Windows\\System32\\cmd.exe");
    }

    #[test]
    fn unresolved_parent_truncates_without_error() {
        let mut lookup = HashMap::new();
        lookup.insert(300, Names { name: Some("cmd.exe".into()), parent: Some(999), namespace_rank: 0 });
        assert_eq!(reconstruct_path(300, &lookup), "cmd.exe");
    }

    #[test]
    fn standard_information_attribute_yields_timestamps_and_flags() {
        let mut entry = vec![0u8; 112];
        entry[0..4].copy_from_slice(b"FILE");
        entry[16..18].copy_from_slice(&1u16.to_le_bytes()); // sequence
        entry[20..22].copy_from_slice(&48u16.to_le_bytes()); // first_attr_offset
        entry[22..24].copy_from_slice(&1u16.to_le_bytes()); // flags: ALLOCATED
        entry[24..28].copy_from_slice(&112u32.to_le_bytes()); // used_size

        // $STANDARD_INFORMATION attribute header at offset 48.
        entry[48..52].copy_from_slice(&0x10u32.to_le_bytes()); // type
        entry[52..56].copy_from_slice(&60u32.to_le_bytes()); // attr_len
        entry[56] = 0; // resident
        entry[68..70].copy_from_slice(&24u16.to_le_bytes()); // content_offset (relative to attr start)

        let content_start = 48 + 24;
        let created: u64 = 132_000_000_000_000_000;
        entry[content_start..content_start + 8].copy_from_slice(&created.to_le_bytes());
        entry[content_start + 32..content_start + 36].copy_from_slice(&0x20u32.to_le_bytes()); // ARCHIVE

        let parsed = parse_entry(&entry).expect("entry parses");
        assert_eq!(parsed.created, Some(format_filetime(created)));
        assert_eq!(parsed.file_attribute_flags_display, "FILE_ATTRIBUTE_ARCHIVE");
    }
}
