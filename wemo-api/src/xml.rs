//! XML helpers shared by response and event decoding.
//!
//! Scalar fields are pulled out with a plain tag search first because some
//! firmware emits bodies that are not well formed. A structured xmltree
//! search is the fallback when the tag is written differently.

use serde::de::DeserializeOwned;
use xmltree::{Element, XMLNode};

use crate::{ApiError, Result};

/// Text between the first `<tag>` and the following `</tag>`
pub(crate) fn extract_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = body.find(&open)? + open.len();
    let end = start + body[start..].find(&close)?;
    Some(&body[start..end])
}

/// Text of the first element named `name` anywhere in the document
pub(crate) fn find_text(body: &str, name: &str) -> Option<String> {
    let root = Element::parse(body.as_bytes()).ok()?;
    find_element(&root, name).map(|element| {
        element
            .get_text()
            .map(|text| text.into_owned())
            .unwrap_or_default()
    })
}

fn find_element<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    if element.name == name {
        return Some(element);
    }
    element.children.iter().find_map(|child| match child {
        XMLNode::Element(child) => find_element(child, name),
        _ => None,
    })
}

/// Scalar field lookup: tolerant tag search, then structured search
pub(crate) fn field(body: &str, tag: &str) -> Option<String> {
    extract_tag(body, tag)
        .map(|text| text.trim().to_string())
        .or_else(|| find_text(body, tag).map(|text| text.trim().to_string()))
}

/// Reverse the HTML-entity escaping devices apply to embedded documents
pub(crate) fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Drop a leading `<?xml ...?>` declaration
pub(crate) fn strip_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

/// Extract an escaped document carried inside `tag` and return it ready to parse
pub(crate) fn nested_document(body: &str, tag: &str) -> Result<String> {
    let escaped = field(body, tag).ok_or_else(|| ApiError::MissingField(tag.to_string()))?;
    let document = unescape(&escaped);
    Ok(strip_declaration(&document).trim().to_string())
}

/// Deserialize a document with quick-xml
pub(crate) fn parse<T: DeserializeOwned>(xml: &str) -> Result<T> {
    quick_xml::de::from_str(xml)
        .map_err(|e| ApiError::Parse(format!("XML deserialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag() {
        let body = "<s:Body><BinaryState>1</BinaryState></s:Body>";
        assert_eq!(extract_tag(body, "BinaryState"), Some("1"));
        assert_eq!(extract_tag(body, "InsightParams"), None);
    }

    #[test]
    fn test_extract_tag_survives_broken_documents() {
        let body = "garbage <BinaryState>0</BinaryState> <unterminated";
        assert_eq!(extract_tag(body, "BinaryState"), Some("0"));
    }

    #[test]
    fn test_field_falls_back_to_structured_search() {
        let body = r#"<Envelope><Body><BinaryState xmlns="">8</BinaryState></Body></Envelope>"#;
        assert_eq!(field(body, "BinaryState"), Some("8".to_string()));
    }

    #[test]
    fn test_strip_declaration() {
        assert_eq!(
            strip_declaration(r#"<?xml version="1.0" encoding="utf-8"?><DeviceLists/>"#),
            "<DeviceLists/>"
        );
        assert_eq!(strip_declaration("<DeviceLists/>"), "<DeviceLists/>");
    }

    #[test]
    fn test_nested_document() {
        let body = "<DeviceLists>&lt;?xml version=&quot;1.0&quot;?&gt;&lt;DeviceLists&gt;&lt;/DeviceLists&gt;</DeviceLists>";
        assert_eq!(
            nested_document(body, "DeviceLists").unwrap(),
            "<DeviceLists></DeviceLists>"
        );
        assert!(matches!(
            nested_document("<Other/>", "DeviceLists"),
            Err(ApiError::MissingField(_))
        ));
    }
}
