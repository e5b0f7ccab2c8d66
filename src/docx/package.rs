use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES_NAME: &str = "[Content_Types].xml";
pub const SETTINGS_NAME: &str = "word/settings.xml";

/// The whole zip container, read eagerly at open time. Entry metadata is
/// preserved so untouched entries round-trip without byte churn.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        let mut zip = ZipArchive::new(f).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).context("read zip entry")?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Write a new package: every original entry in order, with `replacements`
    /// bytes substituted where present, then `additions` appended for names
    /// the original package did not contain (new media blobs, defaulted
    /// relationship manifests).
    pub fn write_merged(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
        additions: &[(String, Vec<u8>)],
    ) -> anyhow::Result<()> {
        let f = File::create(output_path)
            .with_context(|| format!("create output docx: {}", output_path.display()))?;
        let mut zout = ZipWriter::new(f);
        for ent in &self.entries {
            let data = replacements
                .get(&ent.name)
                .cloned()
                .unwrap_or_else(|| ent.data.clone());
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(&data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        for (name, data) in additions {
            if self.contains(name) {
                continue;
            }
            let opts =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zout.start_file(name, opts)
                .with_context(|| format!("start zip file: {name}"))?;
            zout.write_all(data)
                .with_context(|| format!("write zip file: {name}"))?;
        }
        zout.finish().context("finish zip")?;
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Content parts subject to merging: the main body plus headers, footers,
    /// footnotes and endnotes under the document root. The main document
    /// comes first; the rest follow in name order so field discovery is
    /// deterministic.
    pub fn content_part_names(&self) -> Vec<String> {
        let mut rest: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_dir && is_aux_content_part(&e.name))
            .map(|e| e.name.clone())
            .collect();
        rest.sort();

        let mut names = Vec::with_capacity(rest.len() + 1);
        if self.contains(MAIN_DOCUMENT_NAME) {
            names.push(MAIN_DOCUMENT_NAME.to_string());
        }
        names.extend(rest);
        names
    }
}

pub const MAIN_DOCUMENT_NAME: &str = "word/document.xml";

fn is_aux_content_part(name: &str) -> bool {
    let Some(base) = name.strip_prefix("word/") else {
        return false;
    };
    if base.contains('/') || !base.ends_with(".xml") {
        return false;
    }
    let stem = base.trim_end_matches(".xml");
    stem.starts_with("header")
        || stem.starts_with("footer")
        || stem == "footnotes"
        || stem == "endnotes"
}

/// Relationship manifest path for a content part:
/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_name_for(part_name: &str) -> String {
    match part_name.rfind('/') {
        Some(idx) => format!(
            "{}/_rels/{}.rels",
            &part_name[..idx],
            &part_name[idx + 1..]
        ),
        None => format!("_rels/{part_name}.rels"),
    }
}

#[cfg(test)]
mod tests {
    use super::{is_aux_content_part, rels_name_for};

    #[test]
    fn rels_path_is_derived_from_part_path() {
        assert_eq!(
            rels_name_for("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(
            rels_name_for("word/header1.xml"),
            "word/_rels/header1.xml.rels"
        );
    }

    #[test]
    fn content_part_pattern() {
        assert!(is_aux_content_part("word/header1.xml"));
        assert!(is_aux_content_part("word/footer3.xml"));
        assert!(is_aux_content_part("word/footnotes.xml"));
        assert!(is_aux_content_part("word/endnotes.xml"));
        assert!(!is_aux_content_part("word/document.xml"));
        assert!(!is_aux_content_part("word/styles.xml"));
        assert!(!is_aux_content_part("word/media/header1.xml"));
        assert!(!is_aux_content_part("customXml/header1.xml"));
    }
}
