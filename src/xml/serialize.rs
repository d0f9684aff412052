//! XML request serialization for Azure Blob Storage API.

use crate::models::BlockId;

/// Escapes special XML characters.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serializes a Put Block List body.
///
/// Every id is sent as `Latest` so the service picks the most recently
/// staged block with that id.
pub fn serialize_block_list(block_ids: &[BlockId]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<BlockList>");
    for id in block_ids {
        xml.push_str(&format!("<Latest>{}</Latest>", id.encoded()));
    }
    xml.push_str("</BlockList>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::block_ids_through;

    #[test]
    fn test_serialize_block_list() {
        let ids = block_ids_through(1).unwrap();
        assert_eq!(
            serialize_block_list(&ids),
            r#"<?xml version="1.0" encoding="utf-8"?><BlockList><Latest>MDAwMDAwMDA=</Latest><Latest>MDAwMDAwMDE=</Latest></BlockList>"#
        );
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b>&'\""), "a&lt;b&gt;&amp;&apos;&quot;");
    }
}
