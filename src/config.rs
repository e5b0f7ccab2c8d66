use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::docx::image::Image;
use crate::docx::merge::FieldValue;

/// Merge data file for the CLI: text values under `[fields]`, image values
/// under `[images.<field_name>]`. TOML by default, JSON when the file ends
/// in `.json`.
///
/// ```toml
/// [fields]
/// name = "Alice Aardvark"
/// company_name = "TinyCo"
///
/// [images.logo_image]
/// path = "artwork/logo.png"
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MergeData {
    #[serde(default)]
    pub fields: HashMap<String, String>,
    #[serde(default)]
    pub images: HashMap<String, ImageSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImageSpec {
    pub path: String,
    /// Name the image is stored under in the package; defaults to the
    /// source file name.
    #[serde(default)]
    pub name: Option<String>,
    /// Pixel size; probed from the file when omitted.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// DPI used to derive the physical size; 72 when omitted.
    #[serde(default)]
    pub resolution: Option<f64>,
}

pub fn load_merge_data(path: &Path) -> anyhow::Result<MergeData> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read merge data: {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text).context("parse merge data json")
    } else {
        toml::from_str(&text).context("parse merge data toml")
    }
}

impl MergeData {
    /// Turn the file model into the mapping `Merge::apply` takes. Image
    /// paths are resolved relative to `base_dir` (the data file's directory).
    pub fn into_field_values(
        self,
        base_dir: &Path,
    ) -> anyhow::Result<HashMap<String, FieldValue>> {
        let mut values: HashMap<String, FieldValue> = HashMap::new();
        for (name, text) in self.fields {
            values.insert(name, FieldValue::Text(text));
        }
        for (field, spec) in self.images {
            let image = spec
                .into_image(base_dir)
                .with_context(|| format!("image for field {field}"))?;
            values.insert(field, FieldValue::Image(image));
        }
        Ok(values)
    }
}

impl ImageSpec {
    fn into_image(self, base_dir: &Path) -> anyhow::Result<Image> {
        let path = {
            let p = Path::new(&self.path);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };
        let mut image = match (self.width, self.height) {
            (Some(w), Some(h)) => {
                let name = match self.name {
                    Some(name) => name,
                    None => path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .context("image path has no file name")?
                        .to_string(),
                };
                Image::from_path(name, w, h, path)
            }
            _ => {
                let probed = Image::probe_path(&path)?;
                match self.name {
                    Some(name) => Image::from_path(
                        name,
                        probed.width_px(),
                        probed.height_px(),
                        path,
                    ),
                    None => probed,
                }
            }
        };
        if let Some(dpi) = self.resolution {
            image = image.with_resolution(dpi, dpi)?;
        }
        Ok(image)
    }
}
