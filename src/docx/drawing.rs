use super::image::Image;
use super::xml::XmlEvent;

const NS_DRAWINGML: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PICTURE: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Build the detached `w:drawing` fragment that embeds a picture: a floating
/// anchor centered on the text column, wrapped square, extent set to the
/// scaled size and the blip pointing at `rel_id`. The caller splices these
/// events into a run at the placeholder's position.
///
/// `object_id` feeds the non-visual ids (`wp:docPr`, `pic:cNvPr`); the
/// session hands out one per embedded picture so ids stay unique within an
/// output.
pub fn picture_events(
    field_name: &str,
    image: &Image,
    rel_id: &str,
    object_id: u32,
    extent: (i64, i64),
) -> Vec<XmlEvent> {
    let (cx, cy) = extent;
    let cx = cx.to_string();
    let cy = cy.to_string();
    let object_id = object_id.to_string();

    vec![
        XmlEvent::start("w:drawing", &[]),
        XmlEvent::start(
            "wp:anchor",
            &[
                ("xmlns:wp", NS_WP),
                ("distT", "0"),
                ("distB", "0"),
                ("distL", "0"),
                ("distR", "0"),
                ("simplePos", "0"),
                ("relativeHeight", "0"),
                ("behindDoc", "0"),
                ("locked", "0"),
                ("layoutInCell", "1"),
                ("allowOverlap", "1"),
            ],
        ),
        XmlEvent::empty("wp:simplePos", &[("x", "0"), ("y", "0")]),
        XmlEvent::start("wp:positionH", &[("relativeFrom", "column")]),
        XmlEvent::start("wp:align", &[]),
        XmlEvent::text("center"),
        XmlEvent::end("wp:align"),
        XmlEvent::end("wp:positionH"),
        XmlEvent::start("wp:positionV", &[("relativeFrom", "paragraph")]),
        XmlEvent::start("wp:posOffset", &[]),
        XmlEvent::text("0"),
        XmlEvent::end("wp:posOffset"),
        XmlEvent::end("wp:positionV"),
        XmlEvent::empty("wp:extent", &[("cx", &cx), ("cy", &cy)]),
        XmlEvent::empty(
            "wp:effectExtent",
            &[("l", "0"), ("t", "0"), ("r", "0"), ("b", "0")],
        ),
        XmlEvent::empty("wp:wrapSquare", &[("wrapText", "bothSides")]),
        XmlEvent::empty(
            "wp:docPr",
            &[
                ("id", &object_id),
                ("name", field_name),
                ("descr", image.name()),
            ],
        ),
        XmlEvent::start("wp:cNvGraphicFramePr", &[]),
        XmlEvent::empty(
            "a:graphicFrameLocks",
            &[("xmlns:a", NS_DRAWINGML), ("noChangeAspect", "1")],
        ),
        XmlEvent::end("wp:cNvGraphicFramePr"),
        XmlEvent::start("a:graphic", &[("xmlns:a", NS_DRAWINGML)]),
        XmlEvent::start("a:graphicData", &[("uri", NS_PICTURE)]),
        XmlEvent::start("pic:pic", &[("xmlns:pic", NS_PICTURE)]),
        XmlEvent::start("pic:nvPicPr", &[]),
        XmlEvent::empty(
            "pic:cNvPr",
            &[
                ("id", &object_id),
                ("name", image.name()),
                ("descr", image.name()),
            ],
        ),
        XmlEvent::start("pic:cNvPicPr", &[]),
        XmlEvent::empty("a:picLocks", &[("noChangeAspect", "1")]),
        XmlEvent::end("pic:cNvPicPr"),
        XmlEvent::end("pic:nvPicPr"),
        XmlEvent::start("pic:blipFill", &[]),
        XmlEvent::empty(
            "a:blip",
            &[("xmlns:r", NS_RELATIONSHIPS), ("r:embed", rel_id)],
        ),
        XmlEvent::start("a:stretch", &[]),
        XmlEvent::empty("a:fillRect", &[]),
        XmlEvent::end("a:stretch"),
        XmlEvent::end("pic:blipFill"),
        XmlEvent::start("pic:spPr", &[]),
        XmlEvent::start("a:xfrm", &[]),
        XmlEvent::empty("a:off", &[("x", "0"), ("y", "0")]),
        XmlEvent::empty("a:ext", &[("cx", &cx), ("cy", &cy)]),
        XmlEvent::end("a:xfrm"),
        XmlEvent::start("a:prstGeom", &[("prst", "rect")]),
        XmlEvent::empty("a:avLst", &[]),
        XmlEvent::end("a:prstGeom"),
        XmlEvent::end("pic:spPr"),
        XmlEvent::end("pic:pic"),
        XmlEvent::end("a:graphicData"),
        XmlEvent::end("a:graphic"),
        XmlEvent::end("wp:anchor"),
        XmlEvent::end("w:drawing"),
    ]
}

#[cfg(test)]
mod tests {
    use super::picture_events;
    use crate::docx::image::Image;
    use crate::docx::xml::{write_xml_part, XmlPart};

    fn render(events: Vec<crate::docx::xml::XmlEvent>) -> String {
        let part = XmlPart {
            name: "fragment.xml".to_string(),
            events,
        };
        String::from_utf8(write_xml_part(&part).expect("write")).expect("utf8")
    }

    #[test]
    fn fragment_is_balanced_and_references_relationship() {
        let img = Image::from_bytes("logo.png", 256, 61, vec![]);
        let xml = render(picture_events("logo_image", &img, "rId9", 4, (100, 200)));

        assert!(xml.starts_with("<w:drawing>"));
        assert!(xml.ends_with("</w:drawing>"));
        assert!(xml.contains(r#"r:embed="rId9""#));
        assert!(xml.contains(r#"<wp:extent cx="100" cy="200"/>"#));
        assert!(xml.contains(r#"<a:ext cx="100" cy="200"/>"#));
        assert!(xml.contains(r#"descr="logo.png""#));
        assert!(xml.contains(r#"<wp:docPr id="4" name="logo_image" descr="logo.png"/>"#));
    }

    #[test]
    fn anchor_is_floating_centered_and_square_wrapped() {
        let img = Image::from_bytes("logo.png", 10, 10, vec![]);
        let xml = render(picture_events("logo_image", &img, "rId1", 1, (10, 10)));

        assert!(xml.contains(r#"relativeFrom="column""#));
        assert!(xml.contains("<wp:align>center</wp:align>"));
        assert!(xml.contains(r#"<wp:wrapSquare wrapText="bothSides"/>"#));
        assert!(xml.contains(r#"noChangeAspect="1""#));
    }
}
