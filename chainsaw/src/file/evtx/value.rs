//! BinXML value-type decoding: the leaf types a `Value` or `Substitution`
//! token's payload can carry, each rendered to a string for inclusion in the
//! reconstructed XML skeleton.

use chrono::{TimeZone, Utc};

/// BinXML value type tags (the subset chainsaw-native rules actually see).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueType {
    WString,
    AnsiString,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Bool,
    Hex32,
    Hex64,
    Guid,
    FileTime,
    SystemTime,
    Sid,
    Binary,
    BinXml,
}

impl ValueType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::WString,
            0x02 => Self::AnsiString,
            0x04 => Self::UInt8,
            0x03 => Self::Int8,
            0x05 => Self::UInt16,
            0x06 => Self::Int16,
            0x07 => Self::UInt32,
            0x08 => Self::Int32,
            0x09 => Self::UInt64,
            0x0a => Self::Int64,
            0x0d => Self::Bool,
            0x14 => Self::Hex32,
            0x15 => Self::Hex64,
            0x0f => Self::Guid,
            0x11 => Self::FileTime,
            0x12 => Self::SystemTime,
            0x13 => Self::Sid,
            0x0e => Self::Binary,
            0x21 => Self::BinXml,
            _ => return None,
        })
    }
}

/// Render a value's raw bytes to the textual form that lands in the final
/// reconstructed XML, per the type's binary encoding.
pub fn render(kind: ValueType, bytes: &[u8]) -> String {
    match kind {
        ValueType::WString => decode_utf16(bytes),
        ValueType::AnsiString => String::from_utf8_lossy(bytes).to_string(),
        ValueType::Int8 => bytes.first().map(|b| *b as i8).unwrap_or(0).to_string(),
        ValueType::UInt8 => bytes.first().copied().unwrap_or(0).to_string(),
        ValueType::Int16 => read_i16(bytes).to_string(),
        ValueType::UInt16 => read_u16(bytes).to_string(),
        ValueType::Int32 => read_i32(bytes).to_string(),
        ValueType::UInt32 => read_u32(bytes).to_string(),
        ValueType::Int64 => read_i64(bytes).to_string(),
        ValueType::UInt64 => read_u64(bytes).to_string(),
        ValueType::Bool => (read_i32(bytes) != 0).to_string(),
        ValueType::Hex32 => format!("0x{:08x}", read_u32(bytes)),
        ValueType::Hex64 => format!("0x{:016x}", read_u64(bytes)),
        ValueType::Guid => format_guid(bytes),
        ValueType::FileTime => format_filetime(read_u64(bytes)),
        ValueType::SystemTime => format_systemtime(bytes),
        ValueType::Sid => format_sid(bytes),
        ValueType::Binary => hex::encode_upper(bytes),
        ValueType::BinXml => String::new(),
    }
}

fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn read_i16(b: &[u8]) -> i16 {
    i16::from_le_bytes(b.get(0..2).map(|s| [s[0], s[1]]).unwrap_or_default())
}
fn read_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes(b.get(0..2).map(|s| [s[0], s[1]]).unwrap_or_default())
}
fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes(b.get(0..4).map(|s| s.try_into().unwrap()).unwrap_or([0; 4]))
}
fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes(b.get(0..4).map(|s| s.try_into().unwrap()).unwrap_or([0; 4]))
}
fn read_i64(b: &[u8]) -> i64 {
    i64::from_le_bytes(b.get(0..8).map(|s| s.try_into().unwrap()).unwrap_or([0; 8]))
}
fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes(b.get(0..8).map(|s| s.try_into().unwrap()).unwrap_or([0; 8]))
}

fn format_guid(b: &[u8]) -> String {
    if b.len() < 16 {
        return String::new();
    }
    let d1 = read_u32(&b[0..4]);
    let d2 = read_u16(&b[4..6]);
    let d3 = read_u16(&b[6..8]);
    format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        d1, d2, d3, b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    )
}

/// Windows FILETIME: 100ns intervals since 1601-01-01, converted to an
/// ISO-8601 UTC timestamp with microsecond precision.
pub fn format_filetime(ticks: u64) -> String {
    const EPOCH_DIFF_100NS: i64 = 116_444_736_000_000_000;
    let adjusted = ticks as i64 - EPOCH_DIFF_100NS;
    let micros = adjusted / 10;
    let secs = micros.div_euclid(1_000_000);
    let subsec_micros = micros.rem_euclid(1_000_000);
    match Utc.timestamp_opt(secs, (subsec_micros * 1000) as u32) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        _ => String::new(),
    }
}

fn format_systemtime(b: &[u8]) -> String {
    if b.len() < 16 {
        return String::new();
    }
    let year = read_u16(&b[0..2]);
    let month = read_u16(&b[2..4]);
    let day = read_u16(&b[6..8]);
    let hour = read_u16(&b[8..10]);
    let minute = read_u16(&b[10..12]);
    let second = read_u16(&b[12..14]);
    let milli = read_u16(&b[14..16]);
    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{milli:03}000Z"
    )
}

fn format_sid(b: &[u8]) -> String {
    if b.len() < 8 {
        return String::new();
    }
    let revision = b[0];
    let sub_count = b[1] as usize;
    let authority = {
        let mut v = 0u64;
        for byte in &b[2..8] {
            v = (v << 8) | *byte as u64;
        }
        v
    };
    let mut out = format!("S-{revision}-{authority}");
    for i in 0..sub_count {
        let offset = 8 + i * 4;
        if offset + 4 > b.len() {
            break;
        }
        out.push('-');
        out.push_str(&read_u32(&b[offset..offset + 4]).to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filetime_epoch_matches_unix_epoch() {
        let rendered = format_filetime(116_444_736_000_000_000);
        assert_eq!(rendered, "1970-01-01T00:00:00.000000Z");
    }

    #[test]
    fn sid_formats_as_dash_separated() {
        let mut bytes = vec![1u8, 2, 0, 0, 0, 0, 0, 5];
        bytes.extend_from_slice(&21u32.to_le_bytes());
        bytes.extend_from_slice(&500u32.to_le_bytes());
        assert_eq!(format_sid(&bytes), "S-1-5-21-500");
    }

    #[test]
    fn guid_is_uppercase_canonical() {
        let bytes: Vec<u8> = (0..16).collect();
        let formatted = format_guid(&bytes);
        assert_eq!(formatted.len(), 36);
        assert!(formatted.chars().all(|c| c.is_ascii_uppercase() || c == '-' || c.is_ascii_digit()));
    }
}
