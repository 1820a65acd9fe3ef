use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader as XmlReader;
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};

/// Parse an XML document into a `Value` tree using the same convention the
/// EVTX decoder's final XML stage uses: attributes of element `X` land in
/// the sibling key `X_attributes` on `X`'s *parent* object, repeated child
/// element names become arrays, text mixed with child elements is
/// aggregated under `$text`, and integer-looking text is parsed to `Int64`.
pub fn parse(path: &Path) -> Result<Vec<Json>> {
    let raw = fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value = parse_str(&raw).map_err(|message| Error::ParseError {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(vec![value])
}

struct Frame {
    name: String,
    attrs: Map<String, Json>,
    children: Map<String, Json>,
    text: String,
}

pub fn parse_str(xml: &str) -> std::result::Result<Json, String> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    // A sentinel root frame holds the document's single top-level element as
    // its only child, so "attributes go on the parent" needs no special case.
    let mut stack = vec![Frame {
        name: String::new(),
        attrs: Map::new(),
        children: Map::new(),
        text: String::new(),
    }];

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let attrs = read_attrs(&e)?;
                stack.push(Frame {
                    name,
                    attrs,
                    children: Map::new(),
                    text: String::new(),
                });
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| e.to_string())?.to_string();
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or("unbalanced closing tag")?;
                close_frame(stack.last_mut().ok_or("closing tag at document root")?, frame);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let attrs = read_attrs(&e)?;
                let frame = Frame {
                    name,
                    attrs,
                    children: Map::new(),
                    text: String::new(),
                };
                close_frame(stack.last_mut().ok_or("empty tag at document root")?, frame);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let root = stack.pop().ok_or("empty xml document")?;
    if root.children.is_empty() {
        return Err("empty xml document".to_string());
    }
    Ok(Json::Object(root.children))
}

fn read_attrs(e: &quick_xml::events::BytesStart<'_>) -> std::result::Result<Map<String, Json>, String> {
    let mut attrs = Map::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let val = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
        attrs.insert(key, coerce(&val));
    }
    Ok(attrs)
}

fn close_frame(parent: &mut Frame, frame: Frame) {
    let Frame {
        name,
        attrs,
        children,
        text,
    } = frame;
    let trimmed = text.trim();
    let value = if children.is_empty() {
        if trimmed.is_empty() {
            Json::Null
        } else {
            coerce(trimmed)
        }
    } else {
        let mut obj = children;
        if !trimmed.is_empty() {
            obj.insert("$text".to_string(), coerce(trimmed));
        }
        Json::Object(obj)
    };
    insert_child(&mut parent.children, name.clone(), value);
    if !attrs.is_empty() {
        insert_child(&mut parent.children, format!("{name}_attributes"), Json::Object(attrs));
    }
}

/// Inserting a child that already has a sibling of the same name promotes
/// the existing slot to an array.
fn insert_child(parent: &mut Map<String, Json>, name: String, value: Json) {
    match parent.get_mut(&name) {
        Some(Json::Array(arr)) => arr.push(value),
        Some(existing) => {
            let previous = existing.clone();
            parent.insert(name, Json::Array(vec![previous, value]));
        }
        None => {
            parent.insert(name, value);
        }
    }
}

fn coerce(text: &str) -> Json {
    if let Ok(i) = text.parse::<i64>() {
        Json::Number(i.into())
    } else {
        Json::String(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_land_on_parent_as_sibling_key() {
        let value = parse_str(r#"<Event><System id="4688"><EventID>4688</EventID></System></Event>"#).unwrap();
        assert_eq!(value["Event"]["System_attributes"]["id"], 4688);
        assert_eq!(value["Event"]["System"]["EventID"], 4688);
    }

    #[test]
    fn repeated_children_become_array() {
        let value = parse_str(r#"<Data><Item>a</Item><Item>b</Item></Data>"#).unwrap();
        let items = &value["Data"]["Item"];
        assert!(items.is_array());
        assert_eq!(items[0], "a");
        assert_eq!(items[1], "b");
    }

    #[test]
    fn mixed_text_and_children_uses_text_key() {
        let value = parse_str(r#"<E attr="1">hello<Child/></E>"#).unwrap();
        assert_eq!(value["E"]["$text"], "hello");
    }
}
