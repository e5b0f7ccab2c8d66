use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use log::{debug, warn};

use super::geometry::{fit_within, usable_area};
use super::image::Image;
use super::package::{
    rels_name_for, DocxPackage, CONTENT_TYPES_NAME, MAIN_DOCUMENT_NAME, SETTINGS_NAME,
};
use super::rebuild::{rebuild_paragraph, PlacedImage};
use super::rels::{
    default_rels, ensure_default_extension, ensure_image_relationship, id_for_target,
    next_relationship_id,
};
use super::tags::{is_image_field, scan_part};
use super::xml::{parse_xml_part, write_xml_part, XmlPart};

/// A value supplied for a merge field. Which *kind* of field a name denotes
/// is decided by the name alone (`*_image` suffix); a mismatched value kind
/// degrades to a blank substitution rather than an error.
#[derive(Debug)]
pub enum FieldValue {
    Text(String),
    Image(Image),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Image> for FieldValue {
    fn from(img: Image) -> Self {
        FieldValue::Image(img)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OpenOptions {
    /// Replace `word/settings.xml` with a minimal known-good settings part.
    /// Templates edited by hand often carry settings that make Word offer a
    /// repair dialog over the merged output; forcing them is the default.
    pub force_settings: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            force_settings: true,
        }
    }
}

const STANDARD_SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math" xmlns:v="urn:schemas-microsoft-com:vml" xmlns:w10="urn:schemas-microsoft-com:office:word" xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:sl="http://schemas.openxmlformats.org/schemaLibrary/2006/main"><w:zoom w:percent="100"/></w:settings>"#;

/// How much of a structural failure message makes it into the log.
const DIAGNOSTIC_LIMIT: usize = 120;

/// One merge session over an opened package.
///
/// The session holds the parsed inputs immutably; applying a mapping fills
/// an output accumulator (serialized part bytes, linked manifests, media
/// blobs to add), and writing streams the original package with those
/// overlaid. Applying a second mapping discards the accumulator and starts
/// over from the pristine parsed parts.
pub struct Merge {
    package: DocxPackage,
    parts: Vec<XmlPart>,
    rels: BTreeMap<String, XmlPart>,
    content_types: XmlPart,
    force_settings: bool,
    images: BTreeMap<String, Option<Image>>,
    rel_ids: BTreeMap<String, String>,
    output: HashMap<String, Vec<u8>>,
}

impl Merge {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let package = DocxPackage::read(path)?;

        let mut parts = Vec::new();
        for name in package.content_part_names() {
            let entry = package.entry(&name).expect("listed entry");
            let part = parse_xml_part(&name, &entry.data)
                .with_context(|| format!("parse content part: {name}"))?;
            parts.push(part);
        }
        if parts.first().map(|p| p.name.as_str()) != Some(MAIN_DOCUMENT_NAME) {
            anyhow::bail!(
                "{} is not a word-processing package (no {MAIN_DOCUMENT_NAME})",
                path.display()
            );
        }
        debug!(
            "opened {} with {} content part(s)",
            path.display(),
            parts.len()
        );

        let mut rels = BTreeMap::new();
        for part in &parts {
            let rels_name = rels_name_for(&part.name);
            let manifest = match package.entry(&rels_name) {
                Some(entry) => parse_xml_part(&rels_name, &entry.data)
                    .with_context(|| format!("parse relationships: {rels_name}"))?,
                None => default_rels(&rels_name),
            };
            rels.insert(part.name.clone(), manifest);
        }

        let content_types = match package.entry(CONTENT_TYPES_NAME) {
            Some(entry) => parse_xml_part(CONTENT_TYPES_NAME, &entry.data)
                .with_context(|| format!("parse {CONTENT_TYPES_NAME}"))?,
            None => anyhow::bail!("package has no {CONTENT_TYPES_NAME}"),
        };

        Ok(Self {
            package,
            parts,
            rels,
            content_types,
            force_settings: options.force_settings,
            images: BTreeMap::new(),
            rel_ids: BTreeMap::new(),
            output: HashMap::new(),
        })
    }

    /// Text field names discovered across all content parts, ordered by
    /// first occurrence (main document first), de-duplicated.
    pub fn text_field_names(&self) -> Vec<String> {
        self.field_names(|f| !is_image_field(f))
    }

    /// Image field names discovered across all content parts, ordered by
    /// first occurrence (main document first), de-duplicated.
    pub fn image_field_names(&self) -> Vec<String> {
        self.field_names(is_image_field)
    }

    fn field_names(&self, keep: impl Fn(&str) -> bool) -> Vec<String> {
        let mut seen = Vec::new();
        for part in &self.parts {
            for tag in scan_part(part) {
                for field in &tag.fields {
                    if keep(field) && !seen.iter().any(|s| s == field) {
                        seen.push(field.clone());
                    }
                }
            }
        }
        seen
    }

    /// The relationship id assigned to an image field by the last `apply`.
    pub fn relationship_id_for(&self, field: &str) -> Option<&str> {
        self.rel_ids.get(field).map(String::as_str)
    }

    /// Merge the supplied mapping into the loaded parts.
    ///
    /// Resolves every image field discovered in the package, links
    /// relationship and content-type manifests (all linking finishes before
    /// any substitution), then rebuilds each tagged paragraph per part and
    /// stores the serialized results. A paragraph whose structure defeats
    /// the rebuilder is logged and left as it was; the merge continues.
    pub fn apply(&mut self, mut fields: HashMap<String, FieldValue>) -> anyhow::Result<()> {
        self.output.clear();
        self.rel_ids.clear();
        self.images = resolve_images(&mut fields, self.image_field_names());

        let texts: HashMap<String, String> = fields
            .into_iter()
            .filter_map(|(name, value)| match value {
                FieldValue::Text(text) if !is_image_field(&name) => Some((name, text)),
                FieldValue::Text(_) => {
                    warn!("field {name} is an image field; ignoring its text value");
                    None
                }
                FieldValue::Image(_) => {
                    warn!("field {name} is a text field; ignoring its image value");
                    None
                }
            })
            .collect();

        // Manifests restart from their pristine parsed state on every apply.
        let mut linked_rels: BTreeMap<String, XmlPart> = self.rels.clone();
        let mut content_types = self.content_types.clone();

        // Link every resolved image into every part manifest before any
        // substitution runs; substitution only reads the assigned ids.
        let mut next_id = next_relationship_id(linked_rels.values());
        for (field, image) in &self.images {
            let Some(image) = image else { continue };
            let target = image.media_path();
            let existing = linked_rels
                .values()
                .find_map(|manifest| id_for_target(manifest, &target));
            let rel_id = match existing {
                Some(id) => id,
                None => {
                    let id = format!("rId{next_id}");
                    next_id += 1;
                    id
                }
            };
            for manifest in linked_rels.values_mut() {
                ensure_image_relationship(manifest, &rel_id, &target)?;
            }
            debug!("image field {field} -> {target} as {rel_id}");
            self.rel_ids.insert(field.clone(), rel_id);

            if let Some(ext) = image.extension() {
                ensure_default_extension(&mut content_types, &ext, image.content_type())?;
            }
        }

        let area = usable_area(&self.parts[0]);
        let extents: BTreeMap<&str, (i64, i64)> = self
            .images
            .iter()
            .filter_map(|(field, image)| {
                image.as_ref().map(|img| {
                    let fitted =
                        fit_within(img.emu_width(), img.emu_height(), area.0, area.1);
                    (field.as_str(), fitted)
                })
            })
            .collect();

        for part in &self.parts {
            let substituted = self.substitute_part(part, &texts, &extents)?;
            if let Some(bytes) = substituted {
                self.output.insert(part.name.clone(), bytes);
            }
        }

        // Manifests and content types only enter the output when linking
        // actually registered something; otherwise their original bytes pass
        // through untouched.
        if !self.rel_ids.is_empty() {
            for manifest in linked_rels.values() {
                let bytes = write_xml_part(manifest)
                    .with_context(|| format!("serialize {}", manifest.name))?;
                self.output.insert(manifest.name.clone(), bytes);
            }
            self.output.insert(
                CONTENT_TYPES_NAME.to_string(),
                write_xml_part(&content_types).context("serialize content types")?,
            );
        }
        if self.force_settings {
            self.output
                .insert(SETTINGS_NAME.to_string(), STANDARD_SETTINGS.into());
        }

        Ok(())
    }

    /// Substitute one part against the resolved mapping. Works on a
    /// duplicate of the pristine events; returns `None` when the part has no
    /// tagged paragraphs (so its original bytes pass through untouched).
    fn substitute_part(
        &self,
        part: &XmlPart,
        texts: &HashMap<String, String>,
        extents: &BTreeMap<&str, (i64, i64)>,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let tags = scan_part(part);
        if tags.is_empty() {
            return Ok(None);
        }

        let mut work = part.clone();
        let mut object_ids = 1u32;

        // Back to front, so earlier tag indices stay valid across splices.
        for tag in tags.iter().rev() {
            let mut placed: HashMap<String, PlacedImage<'_>> = HashMap::new();
            for field in tag.image_fields() {
                let (Some(Some(image)), Some(rel_id), Some(extent)) = (
                    self.images.get(field),
                    self.rel_ids.get(field),
                    extents.get(field),
                ) else {
                    continue;
                };
                placed.insert(
                    field.to_string(),
                    PlacedImage {
                        image,
                        rel_id: rel_id.as_str(),
                        extent: *extent,
                    },
                );
            }

            match rebuild_paragraph(part, tag, texts, &placed, &mut object_ids) {
                Ok(events) => {
                    let _ = work.events.splice(tag.start..=tag.end, events);
                }
                Err(err) => {
                    warn!(
                        "skipping paragraph in {}: {}",
                        part.name,
                        truncate_diagnostic(&format!("{err:#}"))
                    );
                }
            }
        }

        let bytes =
            write_xml_part(&work).with_context(|| format!("serialize {}", part.name))?;
        Ok(Some(bytes))
    }

    /// Write the merged package: original entries in order with substituted
    /// bytes overlaid, then the new media blobs. Image payloads are fetched
    /// here, and an unreadable byte source is fatal at this point.
    pub fn write_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut additions: Vec<(String, Vec<u8>)> = Vec::new();
        for image in self.images.values().flatten() {
            let storage = image.storage_path();
            if additions.iter().any(|(name, _)| *name == storage) {
                continue;
            }
            let bytes = image
                .contents()
                .with_context(|| format!("load image for {storage}"))?;
            additions.push((storage, bytes.to_vec()));
        }
        for (name, bytes) in &self.output {
            if !self.package.contains(name) {
                additions.push((name.clone(), bytes.clone()));
            }
        }

        self.package
            .write_merged(path.as_ref(), &self.output, &additions)
    }
}

/// Build the field-to-image resolution map: every image field discovered in
/// the package resolves once, to the mapping's image value or to the "no
/// image" sentinel. Shared across parts so ids and paths agree everywhere.
fn resolve_images(
    fields: &mut HashMap<String, FieldValue>,
    image_field_names: Vec<String>,
) -> BTreeMap<String, Option<Image>> {
    let mut resolved = BTreeMap::new();
    for name in image_field_names {
        let image = match fields.remove(&name) {
            Some(FieldValue::Image(img)) => Some(img),
            Some(FieldValue::Text(_)) | None => None,
        };
        if image.is_none() {
            debug!("image field {name} has no value; substituting blank");
        }
        resolved.insert(name, image);
    }
    resolved
}

fn truncate_diagnostic(msg: &str) -> String {
    if msg.len() <= DIAGNOSTIC_LIMIT {
        return msg.to_string();
    }
    let mut cut = DIAGNOSTIC_LIMIT;
    while !msg.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &msg[..cut])
}
