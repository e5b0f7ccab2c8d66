use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

/// One node of a parsed part, in document order. Parts are held as owned
/// event vectors rather than a linked tree: paragraph surgery then becomes
/// splicing a contiguous range of events, and everything we never touch
/// writes back exactly as it was read.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

impl XmlEvent {
    pub fn start(name: &str, attrs: &[(&str, &str)]) -> Self {
        XmlEvent::Start {
            name: name.to_string(),
            attrs: own_attrs(attrs),
        }
    }

    pub fn empty(name: &str, attrs: &[(&str, &str)]) -> Self {
        XmlEvent::Empty {
            name: name.to_string(),
            attrs: own_attrs(attrs),
        }
    }

    pub fn end(name: &str) -> Self {
        XmlEvent::End {
            name: name.to_string(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        XmlEvent::Text { text: text.into() }
    }
}

fn own_attrs(attrs: &[(&str, &str)]) -> Vec<(String, String)> {
    attrs
        .iter()
        .map(|(k, v)| (k.to_string(), escape_attr_value(v)))
        .collect()
}

/// A named content part of the package, parsed into owned events.
#[derive(Clone)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);
    // Mismatched end tags stream through instead of failing the whole part;
    // paragraph rebuilds detect the imbalance locally and leave the
    // paragraph alone. Unparseable syntax still errors here.
    reader.config_mut().check_end_names = false;

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).context("read xml event")?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::End(e) => {
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::Comment(t) => {
                events.push(XmlEvent::Comment {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                events.push(XmlEvent::DocType {
                    text: bytes_to_string(t.into_inner()),
                });
            }
        }
    }

    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        let key = bytes_to_string(a.key.as_ref());
        // Attribute values are kept as the raw, already-escaped bytes from the
        // wire. VML payloads such as `o:gfxdata` encode CRLF as character
        // references; unescaping and re-escaping them would let XML attribute
        // normalization turn those newlines into spaces and corrupt the value.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Escape a literal string for use as an attribute value. Required for any
/// attribute we synthesize ourselves, since stored attribute values are
/// written back verbatim.
pub fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn set_attr(ev: &mut XmlEvent, key: &str, value: &str) {
    if let XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } = ev {
        let escaped = escape_attr_value(value);
        for (k, v) in attrs.iter_mut() {
            if k == key {
                *v = escaped;
                return;
            }
        }
        attrs.push((key.to_string(), escaped));
    }
}

pub fn write_xml_part(part: &XmlPart) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();

    for ev in &part.events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let d =
                    BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer.write_event(Event::Decl(d)).context("write decl")?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => {
                write_start_like(&mut out, name, attrs, false);
            }
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => {
                write_start_like(&mut out, name, attrs, true);
            }
            XmlEvent::Text { text } => {
                escape_text_into(&mut out, text);
            }
            XmlEvent::CData { text } => {
                // CDATA content must remain unescaped.
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }

    Ok(out)
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(name.as_bytes());
    // Stored attribute values are already escaped; do NOT escape again.
    for (k, v) in attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    if empty {
        out.extend_from_slice(b"/>");
    } else {
        out.extend_from_slice(b">");
    }
}
