//! Parsing `symbols.xml` into version records.

use roxmltree::{Document, Node};

use dfview_types::VersionInfo;

use crate::{load::parse_uint, ErrorLog, Schema};

pub(crate) fn load_symbols(schema: &mut Schema, content: &str, log: &mut ErrorLog) {
    log.current_file = "symbols.xml".to_string();
    let doc = match Document::parse(content) {
        Ok(doc) => doc,
        Err(error) => {
            log.error(format!("Failed to parse symbols.xml: {}", error));
            return;
        }
    };
    for table in doc
        .root_element()
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "symbol-table")
    {
        let version = load_symbol_table(&table, log);
        schema.versions.push(version);
    }
}

fn load_symbol_table(table: &Node<'_, '_>, log: &mut ErrorLog) -> VersionInfo {
    let mut version = VersionInfo::new(table.attribute("name").unwrap_or_default());
    for element in table.children().filter(|node| node.is_element()) {
        match element.tag_name().name() {
            "binary-timestamp" => {
                let timestamp = element
                    .attribute("value")
                    .and_then(parse_uint)
                    .unwrap_or_default() as u32;
                version.id = timestamp.to_be_bytes().to_vec();
            }
            "md5-hash" => match parse_md5(element.attribute("value").unwrap_or_default()) {
                Some(id) => version.id = id,
                None => log.error_at(&element, "invalid md5 string"),
            },
            "global-address" => {
                let name = element.attribute("name").unwrap_or_default().to_string();
                let value = element
                    .attribute("value")
                    .and_then(parse_uint)
                    .unwrap_or_default();
                if version.global_addresses.contains_key(&name) {
                    log.error_at(&element, format!("Duplicate global-address for {}", name));
                } else {
                    version.global_addresses.insert(name, value);
                }
            }
            "vtable-address" => {
                let name = element.attribute("name").unwrap_or_default().to_string();
                let value = element
                    .attribute("value")
                    .and_then(parse_uint)
                    .unwrap_or_default();
                if version.vtable_addresses.contains_key(&name) {
                    log.error_at(&element, format!("Duplicate vtable-address for {}", name));
                } else {
                    version.vtable_addresses.insert(name, value);
                }
            }
            tag => log.error_at(&element, format!("Unknown element {} in symbol-table", tag)),
        }
    }
    version
}

fn parse_md5(value: &str) -> Option<Vec<u8>> {
    if value.len() != 32 {
        return None;
    }
    (0..16)
        .map(|i| u8::from_str_radix(&value[2 * i..2 * i + 2], 16).ok())
        .collect()
}
