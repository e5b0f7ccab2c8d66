use std::collections::HashMap;

use anyhow::{anyhow, bail};

use super::drawing::picture_events;
use super::image::Image;
use super::tags::{is_image_field, TagNode, TAG_PATTERN};
use super::xml::{XmlEvent, XmlPart};

/// A resolved image ready to splice into a paragraph: the descriptor, the
/// relationship id registered for it, and its page-fit extent in EMU.
pub struct PlacedImage<'a> {
    pub image: &'a Image,
    pub rel_id: &'a str,
    pub extent: (i64, i64),
}

/// Rebuild one tagged paragraph into a replacement event list.
///
/// The paragraph's `w:pPr` block is preserved verbatim, and the first
/// `w:rPr` found in any of its runs is re-applied to every rebuilt text run,
/// so the substituted text keeps the template's formatting. Substitution is
/// two ordered passes over the flattened text: the text is first split at
/// image placeholders, then text placeholders inside each piece are replaced
/// with their mapped values (missing entries become the empty string; the
/// markers are stripped either way). Resolved images become picture runs at
/// their split positions; unresolved images contribute nothing.
///
/// Returns the events replacing the `w:p` range `tag.start..=tag.end`.
/// Errors mean the paragraph structure defeated us; the caller keeps the
/// original events and moves on.
pub fn rebuild_paragraph(
    part: &XmlPart,
    tag: &TagNode,
    texts: &HashMap<String, String>,
    images: &HashMap<String, PlacedImage<'_>>,
    object_ids: &mut u32,
) -> anyhow::Result<Vec<XmlEvent>> {
    let p_start = part
        .events
        .get(tag.start)
        .ok_or_else(|| anyhow!("paragraph start {} out of range", tag.start))?;
    let p_end = part
        .events
        .get(tag.end)
        .ok_or_else(|| anyhow!("paragraph end {} out of range", tag.end))?;
    if !matches!(p_start, XmlEvent::Start { name, .. } if name == "w:p") {
        bail!("event {} is not a w:p start", tag.start);
    }
    if !matches!(p_end, XmlEvent::End { name } if name == "w:p") {
        bail!("event {} is not a w:p end", tag.end);
    }

    let ppr = paragraph_properties(part, tag)?;
    let rpr = first_run_properties(part, tag)?;

    // Pass one: cut the flattened text at image placeholders.
    let (pieces, image_fields) = split_at_image_tags(&tag.text);

    // Pass two: substitute text fields inside each piece, then interleave
    // text runs with picture runs.
    let mut out: Vec<XmlEvent> = Vec::new();
    out.push(p_start.clone());
    out.extend(ppr);

    for (i, piece) in pieces.iter().enumerate() {
        let substituted = substitute_text_fields(piece, texts);
        if !substituted.is_empty() {
            push_text_run(&mut out, &rpr, &substituted);
        }
        if let Some(field) = image_fields.get(i) {
            if let Some(placed) = images.get(*field) {
                let id = *object_ids;
                *object_ids += 1;
                out.push(XmlEvent::start("w:r", &[]));
                out.extend(picture_events(
                    field,
                    placed.image,
                    placed.rel_id,
                    id,
                    placed.extent,
                ));
                out.push(XmlEvent::end("w:r"));
            }
        }
    }

    out.push(p_end.clone());
    Ok(out)
}

/// Split flattened paragraph text at image placeholders. Returns the text
/// pieces between them (always one more piece than image fields) and the
/// image field names in occurrence order.
fn split_at_image_tags(text: &str) -> (Vec<String>, Vec<&str>) {
    let mut pieces: Vec<String> = Vec::new();
    let mut fields: Vec<&str> = Vec::new();
    let mut current = String::new();
    let mut cursor = 0usize;

    for caps in TAG_PATTERN.captures_iter(text) {
        let name = caps.get(1).expect("capture").as_str();
        if !is_image_field(name) {
            continue;
        }
        let m = caps.get(0).expect("match");
        current.push_str(&text[cursor..m.start()]);
        pieces.push(std::mem::take(&mut current));
        fields.push(name);
        cursor = m.end();
    }
    current.push_str(&text[cursor..]);
    pieces.push(current);
    (pieces, fields)
}

fn substitute_text_fields(piece: &str, texts: &HashMap<String, String>) -> String {
    TAG_PATTERN
        .replace_all(piece, |caps: &regex::Captures<'_>| {
            texts.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn push_text_run(out: &mut Vec<XmlEvent>, rpr: &[XmlEvent], text: &str) {
    out.push(XmlEvent::start("w:r", &[]));
    out.extend_from_slice(rpr);
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        out.push(XmlEvent::start("w:t", &[("xml:space", "preserve")]));
    } else {
        out.push(XmlEvent::start("w:t", &[]));
    }
    out.push(XmlEvent::text(text));
    out.push(XmlEvent::end("w:t"));
    out.push(XmlEvent::end("w:r"));
}

/// The paragraph's `w:pPr` block, cloned. Per the schema it is the first
/// element child of `w:p`; anything else first means no properties.
fn paragraph_properties(part: &XmlPart, tag: &TagNode) -> anyhow::Result<Vec<XmlEvent>> {
    for idx in tag.start + 1..tag.end {
        match &part.events[idx] {
            XmlEvent::Start { name, .. } if name == "w:pPr" => {
                let end = matching_end(part, idx, tag.end, "w:pPr")?;
                return Ok(part.events[idx..=end].to_vec());
            }
            XmlEvent::Empty { name, .. } if name == "w:pPr" => {
                return Ok(vec![part.events[idx].clone()]);
            }
            XmlEvent::Start { .. } | XmlEvent::Empty { .. } => return Ok(Vec::new()),
            _ => {}
        }
    }
    Ok(Vec::new())
}

/// The first `w:rPr` block inside a run of this paragraph, cloned. The
/// paragraph-mark properties under `w:pPr` don't count.
fn first_run_properties(part: &XmlPart, tag: &TagNode) -> anyhow::Result<Vec<XmlEvent>> {
    let mut in_ppr = false;
    let mut in_run = false;
    for idx in tag.start + 1..tag.end {
        match &part.events[idx] {
            XmlEvent::Start { name, .. } => match name.as_str() {
                "w:pPr" => in_ppr = true,
                "w:r" if !in_ppr => in_run = true,
                "w:rPr" if in_run && !in_ppr => {
                    let end = matching_end(part, idx, tag.end, "w:rPr")?;
                    return Ok(part.events[idx..=end].to_vec());
                }
                _ => {}
            },
            XmlEvent::Empty { name, .. } if name == "w:rPr" && in_run && !in_ppr => {
                return Ok(vec![part.events[idx].clone()]);
            }
            XmlEvent::End { name } => match name.as_str() {
                "w:pPr" => in_ppr = false,
                "w:r" => in_run = false,
                _ => {}
            },
            _ => {}
        }
    }
    Ok(Vec::new())
}

/// Index of the End event matching the Start at `start_idx`, searched within
/// `limit`. Unbalanced nesting is a structural error.
fn matching_end(
    part: &XmlPart,
    start_idx: usize,
    limit: usize,
    name: &str,
) -> anyhow::Result<usize> {
    let mut depth = 0usize;
    for idx in start_idx..=limit {
        match &part.events[idx] {
            XmlEvent::Start { name: n, .. } if n == name => depth += 1,
            XmlEvent::End { name: n } if n == name => {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
            _ => {}
        }
    }
    bail!("unbalanced <{name}> in {}", part.name)
}
