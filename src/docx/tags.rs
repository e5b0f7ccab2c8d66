use once_cell::sync::Lazy;
use regex::Regex;

use super::xml::{XmlEvent, XmlPart};

/// `{{ field }}` with optional padding; the name itself is any run of
/// non-whitespace characters. Matching happens against a paragraph's
/// flattened text, so a placeholder split across run boundaries is still one
/// placeholder. Nothing matches across paragraphs.
pub static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\S+?)\s*\}\}").expect("tag pattern"));

const IMAGE_SUFFIX: &str = "_image";

/// Image fields are named by convention, not typed by value.
pub fn is_image_field(name: &str) -> bool {
    let Some(split) = name.len().checked_sub(IMAGE_SUFFIX.len()) else {
        return false;
    };
    // A non-boundary split means a multibyte character overlaps the suffix
    // region, so the name cannot end with the ASCII suffix.
    name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(IMAGE_SUFFIX)
}

/// A paragraph whose flattened text contains at least one placeholder.
/// `start`/`end` are event indices of the `w:p` Start/End pair within the
/// part; `fields` preserves left-to-right order and duplicates.
#[derive(Clone, Debug)]
pub struct TagNode {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub fields: Vec<String>,
}

impl TagNode {
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .filter(|f| !is_image_field(f))
    }

    pub fn image_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .filter(|f| is_image_field(f))
    }
}

/// Walk a part's events and collect its tag nodes, in document order.
/// Read-only; the part is never modified here.
pub fn scan_part(part: &XmlPart) -> Vec<TagNode> {
    let mut nodes = Vec::new();

    let mut para_start: Option<usize> = None;
    let mut para_text = String::new();
    let mut in_w_t = false;

    for (idx, ev) in part.events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } => {
                if name == "w:p" {
                    para_start = Some(idx);
                    para_text.clear();
                    in_w_t = false;
                } else if para_start.is_some() && name == "w:t" {
                    in_w_t = true;
                }
            }
            XmlEvent::Text { text } => {
                if in_w_t {
                    para_text.push_str(text);
                }
            }
            XmlEvent::End { name } => {
                if name == "w:t" {
                    in_w_t = false;
                } else if name == "w:p" {
                    if let Some(start) = para_start.take() {
                        let fields: Vec<String> = TAG_PATTERN
                            .captures_iter(&para_text)
                            .map(|c| c[1].to_string())
                            .collect();
                        if !fields.is_empty() {
                            nodes.push(TagNode {
                                start,
                                end: idx,
                                text: para_text.clone(),
                                fields,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::{is_image_field, scan_part};
    use crate::docx::xml::parse_xml_part;

    fn part(xml: &str) -> crate::docx::xml::XmlPart {
        parse_xml_part("word/document.xml", xml.as_bytes()).expect("parse")
    }

    #[test]
    fn image_suffix_is_case_insensitive() {
        assert!(is_image_field("logo_image"));
        assert!(is_image_field("logo_IMAGE"));
        assert!(is_image_field("Logo_Image"));
        assert!(!is_image_field("logo_images"));
        assert!(!is_image_field("image"));
        assert!(!is_image_field("name"));
        assert!(!is_image_field("€_im"));
        assert!(is_image_field("logo€_image"));
    }

    #[test]
    fn finds_fields_in_document_order_with_duplicates() {
        let p = part(
            "<w:document><w:body>\
             <w:p><w:r><w:t>Dear {{name}}, welcome to {{company}} ({{name}})</w:t></w:r></w:p>\
             <w:p><w:r><w:t>no fields here</w:t></w:r></w:p>\
             </w:body></w:document>",
        );
        let nodes = scan_part(&p);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].fields, vec!["name", "company", "name"]);
    }

    #[test]
    fn detects_placeholder_split_across_runs() {
        let p = part(
            "<w:document><w:body><w:p>\
             <w:r><w:t>Hello {{na</w:t></w:r>\
             <w:r><w:rPr><w:b/></w:rPr><w:t>me}}</w:t></w:r>\
             </w:p></w:body></w:document>",
        );
        let nodes = scan_part(&p);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].fields, vec!["name"]);
        assert_eq!(nodes[0].text, "Hello {{name}}");
    }

    #[test]
    fn whitespace_inside_markers_is_trimmed() {
        let p = part("<w:document><w:body><w:p><w:r><w:t>{{  spaced_field  }}</w:t></w:r></w:p></w:body></w:document>");
        let nodes = scan_part(&p);
        assert_eq!(nodes[0].fields, vec!["spaced_field"]);
    }

    #[test]
    fn mixed_text_and_image_fields_in_one_paragraph() {
        let p = part(
            "<w:document><w:body><w:p><w:r>\
             <w:t>{{greeting}} {{logo_image}} and {{seal_image}} end</w:t>\
             </w:r></w:p></w:body></w:document>",
        );
        let nodes = scan_part(&p);
        let tag = &nodes[0];
        assert_eq!(
            tag.fields,
            vec!["greeting", "logo_image", "seal_image"]
        );
        assert_eq!(tag.text_fields().collect::<Vec<_>>(), vec!["greeting"]);
        assert_eq!(
            tag.image_fields().collect::<Vec<_>>(),
            vec!["logo_image", "seal_image"]
        );
    }

    #[test]
    fn text_outside_w_t_is_ignored() {
        let p = part(
            "<w:document><w:body><w:p>\
             <w:r><w:instrText>{{not_a_field}}</w:instrText></w:r>\
             <w:r><w:t>{{real_field}}</w:t></w:r>\
             </w:p></w:body></w:document>",
        );
        let nodes = scan_part(&p);
        assert_eq!(nodes[0].fields, vec!["real_field"]);
    }

    #[test]
    fn unterminated_marker_is_not_a_field() {
        let p = part(
            "<w:document><w:body><w:p><w:r><w:t>{{dangling and {not} much else</w:t></w:r></w:p></w:body></w:document>",
        );
        assert!(scan_part(&p).is_empty());
    }
}
