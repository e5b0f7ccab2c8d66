use anyhow::{anyhow, Context};

use super::xml::{find_attr, XmlEvent, XmlPart};

pub const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const NS_PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// An empty relationship manifest for a part that has none yet.
pub fn default_rels(name: &str) -> XmlPart {
    XmlPart {
        name: name.to_string(),
        events: vec![
            XmlEvent::Decl {
                version: "1.0".to_string(),
                encoding: Some("UTF-8".to_string()),
                standalone: Some("yes".to_string()),
            },
            XmlEvent::start("Relationships", &[("xmlns", NS_PACKAGE_RELS)]),
            XmlEvent::end("Relationships"),
        ],
    }
}

/// Largest numeric `rId<N>` across the given manifests; new ids are handed
/// out above every id any loaded manifest already uses, so one merge field
/// keeps one id in every part of the output.
pub fn next_relationship_id<'a>(manifests: impl Iterator<Item = &'a XmlPart>) -> u32 {
    let mut max = 0u32;
    for part in manifests {
        for ev in &part.events {
            let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
                continue;
            };
            if name != "Relationship" {
                continue;
            }
            if let Some(id) = find_attr(attrs, "Id") {
                if let Some(n) = id.strip_prefix("rId").and_then(|s| s.parse::<u32>().ok()) {
                    max = max.max(n);
                }
            }
        }
    }
    max + 1
}

/// Relationship id already registered for `target`, if any.
pub fn id_for_target(part: &XmlPart, target: &str) -> Option<String> {
    for ev in &part.events {
        let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
            continue;
        };
        if name == "Relationship" && find_attr(attrs, "Target") == Some(target) {
            return find_attr(attrs, "Id").map(str::to_string);
        }
    }
    None
}

/// Register an image relationship. Idempotent by target: re-linking an
/// already-present target is a no-op and returns the existing id.
pub fn ensure_image_relationship(
    part: &mut XmlPart,
    id: &str,
    target: &str,
) -> anyhow::Result<String> {
    if let Some(existing) = id_for_target(part, target) {
        return Ok(existing);
    }
    let insert_at = closing_tag_index(part, "Relationships")
        .with_context(|| format!("no <Relationships> element in {}", part.name))?;
    part.events.insert(
        insert_at,
        XmlEvent::empty(
            "Relationship",
            &[("Id", id), ("Type", REL_TYPE_IMAGE), ("Target", target)],
        ),
    );
    Ok(id.to_string())
}

/// Ensure `[Content_Types].xml` declares a default content type for an
/// image extension. Checked per extension (case-insensitive), not per file;
/// returns true when an entry was added.
pub fn ensure_default_extension(
    content_types: &mut XmlPart,
    extension: &str,
    content_type: &str,
) -> anyhow::Result<bool> {
    for ev in &content_types.events {
        let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
            continue;
        };
        if name != "Default" {
            continue;
        }
        if let Some(ext) = find_attr(attrs, "Extension") {
            if ext.eq_ignore_ascii_case(extension) {
                return Ok(false);
            }
        }
    }
    let insert_at = closing_tag_index(content_types, "Types")
        .with_context(|| format!("no <Types> element in {}", content_types.name))?;
    content_types.events.insert(
        insert_at,
        XmlEvent::empty(
            "Default",
            &[("Extension", extension), ("ContentType", content_type)],
        ),
    );
    Ok(true)
}

/// Index of the closing event of the named root element, expanding a
/// self-closed root into a start/end pair first when necessary.
fn closing_tag_index(part: &mut XmlPart, name: &str) -> anyhow::Result<usize> {
    if let Some(idx) = part
        .events
        .iter()
        .rposition(|ev| matches!(ev, XmlEvent::End { name: n } if n == name))
    {
        return Ok(idx);
    }
    let empty_idx = part
        .events
        .iter()
        .position(|ev| matches!(ev, XmlEvent::Empty { name: n, .. } if n == name))
        .ok_or_else(|| anyhow!("element {name} not found"))?;
    let XmlEvent::Empty { name: n, attrs } = part.events[empty_idx].clone() else {
        unreachable!();
    };
    part.events[empty_idx] = XmlEvent::Start {
        name: n.clone(),
        attrs,
    };
    part.events.insert(empty_idx + 1, XmlEvent::End { name: n });
    Ok(empty_idx + 1)
}
