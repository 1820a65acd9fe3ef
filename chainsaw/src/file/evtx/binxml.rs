//! The BinXML token stream: a chunk-scoped string/template cache plus a
//! recursive-descent walk that reconstructs an XML string from the token
//! stream, substituting template placeholders along the way.

use std::collections::HashMap;

use crate::error::{Error, Result};

use super::value::{self, ValueType};

const TOK_EOF: u8 = 0x00;
const TOK_OPEN_START_ELEMENT: u8 = 0x01;
const TOK_CLOSE_START_ELEMENT: u8 = 0x02;
const TOK_CLOSE_EMPTY_ELEMENT: u8 = 0x03;
const TOK_CLOSE_ELEMENT: u8 = 0x04;
const TOK_VALUE: u8 = 0x05;
const TOK_ATTRIBUTE: u8 = 0x06;
const TOK_CDATA: u8 = 0x07;
const TOK_TEMPLATE_INSTANCE: u8 = 0x0c;
const TOK_NORMAL_SUBSTITUTION: u8 = 0x0d;
const TOK_CONDITIONAL_SUBSTITUTION: u8 = 0x0e;
const TOK_START_OF_STREAM: u8 = 0x0f;

/// A cached template: an XML skeleton with `${N}` placeholders and how many
/// substitutions it expects.
#[derive(Clone)]
struct Template {
    skeleton: String,
    substitution_count: usize,
}

/// Per-chunk caches, cleared whenever the record reader advances to a new
/// 65536-byte chunk.
#[derive(Default)]
pub struct ChunkCache {
    strings: HashMap<u32, String>,
    templates: HashMap<u32, Template>,
}

impl ChunkCache {
    pub fn clear(&mut self) {
        self.strings.clear();
        self.templates.clear();
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::ParseError {
                path: Default::default(),
                message: "binxml token stream truncated".into(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
}

/// Parse a full BinXML fragment (starting at `StartOfStream`) into a
/// reconstructed XML string.
pub fn parse_fragment(data: &[u8], cache: &mut ChunkCache, chunk_base: &[u8]) -> Result<String> {
    let mut cursor = Cursor::new(data);
    let mut out = String::new();
    parse_element_sequence(&mut cursor, cache, chunk_base, &mut out, &[])?;
    Ok(out)
}

/// Walk sibling tokens until `CloseElement`/`EndOfStream`/exhaustion,
/// appending reconstructed XML to `out`. `substitutions` supplies values for
/// Normal/Conditional substitution tokens encountered while instantiating a
/// template body.
fn parse_element_sequence(
    cursor: &mut Cursor<'_>,
    cache: &mut ChunkCache,
    chunk_base: &[u8],
    out: &mut String,
    substitutions: &[(ValueType, Vec<u8>)],
) -> Result<()> {
    loop {
        let Some(raw_tok) = cursor.peek_byte() else {
            return Ok(());
        };
        let tok = raw_tok & 0x0f;
        match tok {
            TOK_EOF => {
                cursor.u8()?;
                return Ok(());
            }
            TOK_START_OF_STREAM => {
                cursor.u8()?;
                let _major = cursor.u8()?;
                let _minor = cursor.u8()?;
                let _flags = cursor.u8()?;
            }
            TOK_OPEN_START_ELEMENT => {
                parse_open_element(cursor, cache, chunk_base, out, substitutions)?;
            }
            TOK_CLOSE_ELEMENT => {
                cursor.u8()?;
                return Ok(());
            }
            TOK_TEMPLATE_INSTANCE => {
                let rendered = parse_template_instance(cursor, cache, chunk_base)?;
                out.push_str(&rendered);
            }
            _ => {
                // Unknown/unsupported token at sequence level: stop this
                // sequence rather than desynchronising the cursor further.
                return Ok(());
            }
        }
    }
}

fn parse_open_element(
    cursor: &mut Cursor<'_>,
    cache: &mut ChunkCache,
    chunk_base: &[u8],
    out: &mut String,
    substitutions: &[(ValueType, Vec<u8>)],
) -> Result<()> {
    let flags = cursor.u8()?;
    let _dependency_id = cursor.u16()?;
    let _data_size = cursor.u32()?;
    let name = read_name(cursor, cache, chunk_base)?;
    if flags & 0x40 != 0 {
        let _attr_list_size = cursor.u32()?;
    }
    // `flags` above is the consumed token byte itself: bit 0x40 signals an
    // inline attribute list size field, the only "more data" case for
    // OpenStartElement.

    out.push('<');
    out.push_str(&name);

    let mut attrs = String::new();
    loop {
        match cursor.peek_byte().map(|b| b & 0x0f) {
            Some(TOK_ATTRIBUTE) => {
                cursor.u8()?;
                let attr_name = read_name(cursor, cache, chunk_base)?;
                let value = parse_attribute_value(cursor, cache, chunk_base, substitutions)?;
                attrs.push(' ');
                attrs.push_str(&attr_name);
                attrs.push_str("=\"");
                attrs.push_str(&xml_escape(&value));
                attrs.push('"');
            }
            _ => break,
        }
    }
    out.push_str(&attrs);

    match cursor.peek_byte().map(|b| b & 0x0f) {
        Some(TOK_CLOSE_EMPTY_ELEMENT) => {
            cursor.u8()?;
            out.push_str("/>");
        }
        Some(TOK_CLOSE_START_ELEMENT) => {
            cursor.u8()?;
            out.push('>');
            parse_content_sequence(cursor, cache, chunk_base, out, substitutions)?;
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
        }
        _ => {
            out.push('>');
        }
    }
    Ok(())
}

fn parse_content_sequence(
    cursor: &mut Cursor<'_>,
    cache: &mut ChunkCache,
    chunk_base: &[u8],
    out: &mut String,
    substitutions: &[(ValueType, Vec<u8>)],
) -> Result<()> {
    loop {
        let Some(raw_tok) = cursor.peek_byte() else {
            return Ok(());
        };
        let tok = raw_tok & 0x0f;
        match tok {
            TOK_CLOSE_ELEMENT => {
                cursor.u8()?;
                return Ok(());
            }
            TOK_OPEN_START_ELEMENT => parse_open_element(cursor, cache, chunk_base, out, substitutions)?,
            TOK_VALUE => {
                let text = parse_value_token(cursor)?;
                out.push_str(&xml_escape(&text));
            }
            TOK_CDATA => {
                cursor.u8()?;
                let len = cursor.u16()? as usize;
                let bytes = cursor.take(len)?;
                out.push_str(&xml_escape(&String::from_utf8_lossy(bytes)));
            }
            TOK_NORMAL_SUBSTITUTION | TOK_CONDITIONAL_SUBSTITUTION => {
                let text = resolve_substitution(cursor, substitutions)?;
                out.push_str(&xml_escape(&text));
            }
            TOK_TEMPLATE_INSTANCE => {
                let rendered = parse_template_instance(cursor, cache, chunk_base)?;
                out.push_str(&rendered);
            }
            _ => return Ok(()),
        }
    }
}

fn parse_attribute_value(
    cursor: &mut Cursor<'_>,
    cache: &mut ChunkCache,
    chunk_base: &[u8],
    substitutions: &[(ValueType, Vec<u8>)],
) -> Result<String> {
    match cursor.peek_byte().map(|b| b & 0x0f) {
        Some(TOK_VALUE) => parse_value_token(cursor),
        Some(TOK_NORMAL_SUBSTITUTION) | Some(TOK_CONDITIONAL_SUBSTITUTION) => {
            resolve_substitution(cursor, substitutions)
        }
        _ => {
            let _ = (cache, chunk_base);
            Ok(String::new())
        }
    }
}

fn parse_value_token(cursor: &mut Cursor<'_>) -> Result<String> {
    cursor.u8()?;
    let kind_byte = cursor.u8()?;
    let kind = ValueType::from_byte(kind_byte).unwrap_or(ValueType::AnsiString);
    let len = cursor.u16()? as usize;
    let bytes = cursor.take(len)?;
    Ok(value::render(kind, bytes))
}

fn resolve_substitution(cursor: &mut Cursor<'_>, substitutions: &[(ValueType, Vec<u8>)]) -> Result<String> {
    let is_conditional = (cursor.peek_byte().unwrap_or(0) & 0x0f) == TOK_CONDITIONAL_SUBSTITUTION;
    cursor.u8()?;
    let index = cursor.u16()? as usize;
    let _declared_type = cursor.u8()?;
    match substitutions.get(index) {
        Some((kind, bytes)) => {
            if is_conditional && bytes.is_empty() {
                Ok(String::new())
            } else {
                Ok(value::render(*kind, bytes))
            }
        }
        None => Ok(String::new()),
    }
}

/// A name reference: either an inline name definition (cached by its chunk
/// offset) or a 4-byte back-reference to one already seen in this chunk.
fn read_name(cursor: &mut Cursor<'_>, cache: &mut ChunkCache, chunk_base: &[u8]) -> Result<String> {
    let offset = cursor.u32()?;
    if let Some(cached) = cache.strings.get(&offset) {
        return Ok(cached.clone());
    }
    // Not yet cached: the name is defined in-line at `offset` within this
    // chunk (hash(2) + num_chars(2) + utf16 chars + null terminator).
    let base = offset as usize;
    if base + 4 > chunk_base.len() {
        return Ok(String::new());
    }
    let num_chars = u16::from_le_bytes([chunk_base[base + 2], chunk_base[base + 3]]) as usize;
    let start = base + 4;
    let end = start + num_chars * 2;
    if end > chunk_base.len() {
        return Ok(String::new());
    }
    let units: Vec<u16> = chunk_base[start..end]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let name = String::from_utf16_lossy(&units);
    cache.strings.insert(offset, name.clone());
    Ok(name)
}

/// `TemplateInstance`: on first occurrence at this chunk offset, parse the
/// template body (with `${i}` placeholders standing in for substitutions)
/// and cache it; on every occurrence, read the substitution array and
/// textually substitute it into the (possibly cached) skeleton.
fn parse_template_instance(cursor: &mut Cursor<'_>, cache: &mut ChunkCache, chunk_base: &[u8]) -> Result<String> {
    cursor.u8()?;
    let _unknown = cursor.u8()?;
    let template_id = cursor.u32()?;
    let template_offset = cursor.u32()?;

    let template = match cache.templates.get(&template_offset) {
        Some(t) => t.clone(),
        None => {
            let (skeleton, count) = parse_template_definition(chunk_base, template_offset as usize, cache)?;
            let t = Template {
                skeleton,
                substitution_count: count,
            };
            cache.templates.insert(template_offset, t.clone());
            t
        }
    };
    let _ = template_id;

    let substitution_count = cursor.u32()? as usize;
    let mut descriptors = Vec::with_capacity(substitution_count);
    for _ in 0..substitution_count {
        let size = cursor.u16()? as usize;
        let kind_byte = cursor.u8()?;
        let _padding = cursor.u8()?;
        descriptors.push((ValueType::from_byte(kind_byte).unwrap_or(ValueType::AnsiString), size));
    }
    let mut substitutions = Vec::with_capacity(descriptors.len());
    for (kind, size) in descriptors {
        let bytes = cursor.take(size)?.to_vec();
        substitutions.push((kind, bytes));
    }

    let mut rendered = template.skeleton.clone();
    for (i, (kind, bytes)) in substitutions.iter().enumerate() {
        let placeholder = format!("${{{i}}}");
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &xml_escape(&value::render(*kind, bytes)));
        }
    }
    let _ = template.substitution_count;
    Ok(rendered)
}

/// Parse the template body at `offset` into an XML skeleton with
/// placeholders, by running the normal element-sequence walk but rendering
/// every substitution token as `${index}` instead of resolving it.
fn parse_template_definition(
    chunk_base: &[u8],
    offset: usize,
    cache: &mut ChunkCache,
) -> Result<(String, usize)> {
    if offset + 24 > chunk_base.len() {
        return Ok((String::new(), 0));
    }
    // next_template_offset(4) + guid(16) + data_size(4) precede the body.
    let body_offset = offset + 24;
    let data_size = u32::from_le_bytes(chunk_base[offset + 20..offset + 24].try_into().unwrap()) as usize;
    let end = (body_offset + data_size).min(chunk_base.len());
    let body = &chunk_base[body_offset..end];

    let mut cursor = Cursor::new(body);
    let mut out = String::new();
    let mut max_index = 0usize;
    parse_skeleton_sequence(&mut cursor, cache, chunk_base, &mut out, &mut max_index)?;
    Ok((out, max_index))
}

fn parse_skeleton_sequence(
    cursor: &mut Cursor<'_>,
    cache: &mut ChunkCache,
    chunk_base: &[u8],
    out: &mut String,
    max_index: &mut usize,
) -> Result<()> {
    loop {
        let Some(raw_tok) = cursor.peek_byte() else {
            return Ok(());
        };
        match raw_tok & 0x0f {
            TOK_EOF | TOK_CLOSE_ELEMENT => {
                cursor.u8()?;
                return Ok(());
            }
            TOK_START_OF_STREAM => {
                cursor.u8()?;
                cursor.u8()?;
                cursor.u8()?;
                cursor.u8()?;
            }
            TOK_OPEN_START_ELEMENT => {
                let flags = cursor.u8()?;
                let _dep = cursor.u16()?;
                let _size = cursor.u32()?;
                let name = read_name(cursor, cache, chunk_base)?;
                if flags & 0x40 != 0 {
                    let _attr_list_size = cursor.u32()?;
                }
                out.push('<');
                out.push_str(&name);
                loop {
                    match cursor.peek_byte().map(|b| b & 0x0f) {
                        Some(TOK_ATTRIBUTE) => {
                            cursor.u8()?;
                            let attr_name = read_name(cursor, cache, chunk_base)?;
                            out.push(' ');
                            out.push_str(&attr_name);
                            out.push_str("=\"");
                            emit_skeleton_value(cursor, max_index, out)?;
                            out.push('"');
                        }
                        _ => break,
                    }
                }
                match cursor.peek_byte().map(|b| b & 0x0f) {
                    Some(TOK_CLOSE_EMPTY_ELEMENT) => {
                        cursor.u8()?;
                        out.push_str("/>");
                    }
                    Some(TOK_CLOSE_START_ELEMENT) => {
                        cursor.u8()?;
                        out.push('>');
                        parse_skeleton_sequence(cursor, cache, chunk_base, out, max_index)?;
                        out.push_str("</");
                        out.push_str(&name);
                        out.push('>');
                    }
                    _ => out.push('>'),
                }
            }
            TOK_VALUE => {
                let text = parse_value_token(cursor)?;
                out.push_str(&xml_escape(&text));
            }
            TOK_NORMAL_SUBSTITUTION | TOK_CONDITIONAL_SUBSTITUTION => {
                emit_skeleton_value(cursor, max_index, out)?;
            }
            _ => return Ok(()),
        }
    }
}

fn emit_skeleton_value(cursor: &mut Cursor<'_>, max_index: &mut usize, out: &mut String) -> Result<()> {
    cursor.u8()?;
    let index = cursor.u16()? as usize;
    let _kind = cursor.u8()?;
    *max_index = (*max_index).max(index + 1);
    out.push_str(&format!("${{{index}}}"));
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_escape_covers_reserved_characters() {
        assert_eq!(
            xml_escape(r#"<a href="x"> & </a>"#),
            "&lt;a href=&quot;x&quot;&gt; &amp; &lt;/a&gt;"
        );
    }

    #[test]
    fn xml_escape_leaves_plain_text_untouched() {
        assert_eq!(xml_escape("plain text, no tags"), "plain text, no tags");
    }

    #[test]
    fn read_name_resolves_inline_definition_and_caches_it() {
        let mut chunk = vec![0u8; 32];
        // name record at offset 8: hash(2) + num_chars(2) + "Hi" (utf16) + null terminator
        chunk[8..10].copy_from_slice(&0u16.to_le_bytes());
        chunk[10..12].copy_from_slice(&2u16.to_le_bytes());
        chunk[12..14].copy_from_slice(&('H' as u16).to_le_bytes());
        chunk[14..16].copy_from_slice(&('i' as u16).to_le_bytes());

        let mut cache = ChunkCache::default();
        let cursor_bytes = 8u32.to_le_bytes().to_vec();
        let mut cursor = Cursor::new(&cursor_bytes);
        let name = read_name(&mut cursor, &mut cache, &chunk).unwrap();
        assert_eq!(name, "Hi");
        assert_eq!(cache.strings.get(&8), Some(&"Hi".to_string()));

        // second read of the same offset comes from the cache, not the chunk.
        let mut cursor2 = Cursor::new(&cursor_bytes);
        let name2 = read_name(&mut cursor2, &mut cache, &[]).unwrap();
        assert_eq!(name2, "Hi");
    }

    #[test]
    fn read_name_out_of_bounds_offset_is_empty_not_error() {
        let mut cache = ChunkCache::default();
        let cursor_bytes = 1000u32.to_le_bytes().to_vec();
        let mut cursor = Cursor::new(&cursor_bytes);
        let name = read_name(&mut cursor, &mut cache, &[0u8; 4]).unwrap();
        assert_eq!(name, "");
    }
}
