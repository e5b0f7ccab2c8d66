use super::xml::{find_attr, XmlEvent, XmlPart};

pub const EMU_PER_INCH: i64 = 914_400;
/// `w:pgSz`/`w:pgMar` are measured in twentieths of a point.
pub const EMU_PER_TWIP: i64 = 635;

// US Letter in twips, the same fallback Word itself assumes when a section
// declares no size: 8.5in wide, 11in tall, 1in margins.
const DEFAULT_PAGE_WIDTH_TWIPS: i64 = 12_240;
const DEFAULT_PAGE_HEIGHT_TWIPS: i64 = DEFAULT_PAGE_WIDTH_TWIPS * 11 * 10 / 85;
const DEFAULT_MARGIN_TWIPS: i64 = 1_440;

/// Content area of the page in EMU: declared page size minus declared
/// margins, less a 10% buffer so a best-fit image never touches the edges.
/// Reads the last `w:sectPr` in the part; a document's trailing section
/// properties govern the body.
pub fn usable_area(part: &XmlPart) -> (i64, i64) {
    let mut page_w = DEFAULT_PAGE_WIDTH_TWIPS;
    let mut page_h = DEFAULT_PAGE_HEIGHT_TWIPS;
    let mut margin_left = DEFAULT_MARGIN_TWIPS;
    let mut margin_right = DEFAULT_MARGIN_TWIPS;
    let mut margin_top = DEFAULT_MARGIN_TWIPS;
    let mut margin_bottom = DEFAULT_MARGIN_TWIPS;

    for ev in &part.events {
        let (name, attrs) = match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => (name, attrs),
            _ => continue,
        };
        match name.as_str() {
            "w:pgSz" => {
                if let Some(w) = twips_attr(attrs, "w:w") {
                    page_w = w;
                }
                if let Some(h) = twips_attr(attrs, "w:h") {
                    page_h = h;
                }
            }
            "w:pgMar" => {
                if let Some(v) = twips_attr(attrs, "w:left") {
                    margin_left = v;
                }
                if let Some(v) = twips_attr(attrs, "w:right") {
                    margin_right = v;
                }
                if let Some(v) = twips_attr(attrs, "w:top") {
                    margin_top = v;
                }
                if let Some(v) = twips_attr(attrs, "w:bottom") {
                    margin_bottom = v;
                }
            }
            _ => {}
        }
    }

    let usable_w = (page_w - margin_left - margin_right).max(0) * EMU_PER_TWIP;
    let usable_h = (page_h - margin_top - margin_bottom).max(0) * EMU_PER_TWIP;
    (usable_w * 9 / 10, usable_h * 9 / 10)
}

fn twips_attr(attrs: &[(String, String)], key: &str) -> Option<i64> {
    find_attr(attrs, key).and_then(|v| v.trim().parse::<i64>().ok())
}

/// Best fit of `(width, height)` inside `(max_width, max_height)`: the
/// smaller of the two axis ratios, capped at 1.0 so an image that already
/// fits keeps its size. Applied uniformly, so aspect ratio survives up to
/// integer truncation.
pub fn fit_within(width: i64, height: i64, max_width: i64, max_height: i64) -> (i64, i64) {
    if width <= 0 || height <= 0 {
        return (0, 0);
    }
    let width_ratio = max_width as f64 / width as f64;
    let height_ratio = max_height as f64 / height as f64;
    let ratio = width_ratio.min(height_ratio).min(1.0);
    (
        (width as f64 * ratio) as i64,
        (height as f64 * ratio) as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::{fit_within, usable_area, EMU_PER_TWIP};
    use crate::docx::xml::parse_xml_part;

    #[test]
    fn defaults_apply_without_sect_pr() {
        let part = parse_xml_part(
            "word/document.xml",
            b"<w:document><w:body><w:p/></w:body></w:document>",
        )
        .expect("parse");
        let (w, h) = usable_area(&part);
        // letter minus 1in margins, less the 10% buffer
        assert_eq!(w, (12_240 - 2 * 1_440) * EMU_PER_TWIP * 9 / 10);
        assert_eq!(h, (15_840 - 2 * 1_440) * EMU_PER_TWIP * 9 / 10);
    }

    #[test]
    fn declared_size_and_margins_win() {
        let part = parse_xml_part(
            "word/document.xml",
            br#"<w:document><w:body><w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="720" w:bottom="720" w:left="720" w:right="720"/></w:sectPr></w:body></w:document>"#,
        )
        .expect("parse");
        let (w, h) = usable_area(&part);
        assert_eq!(w, (11_906 - 1_440) * EMU_PER_TWIP * 9 / 10);
        assert_eq!(h, (16_838 - 1_440) * EMU_PER_TWIP * 9 / 10);
    }

    #[test]
    fn fit_keeps_small_images_unscaled() {
        assert_eq!(fit_within(100, 50, 1_000, 1_000), (100, 50));
    }

    #[test]
    fn fit_never_upscales() {
        let (w, h) = fit_within(10, 10, 1_000_000, 1_000_000);
        assert_eq!((w, h), (10, 10));
    }

    #[test]
    fn fit_scales_down_uniformly() {
        // width is the binding constraint: ratio 0.5
        let (w, h) = fit_within(2_000, 1_000, 1_000, 1_000);
        assert_eq!((w, h), (1_000, 500));
    }

    #[test]
    fn fit_preserves_aspect_with_truncation() {
        let (w, h) = fit_within(3_000, 1_001, 1_500, 1_500);
        assert_eq!(w, 1_500);
        assert_eq!(h, 500); // 1001 * 0.5 truncated
    }
}
