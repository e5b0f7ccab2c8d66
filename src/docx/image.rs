use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use once_cell::sync::OnceCell;

use super::geometry::EMU_PER_INCH;

/// A source image supplied for an `*_image` merge field.
///
/// Dimension and resolution metadata is materialized eagerly; the byte
/// payload stays lazy. Sources are tried in a fixed order — inline bytes,
/// then a filesystem path, then a caller-supplied fetcher for remote
/// locations — and the first success is cached, so the payload is resolved
/// at most once and only if the merge actually embeds the image.
pub struct Image {
    name: String,
    width: u32,
    height: u32,
    h_resolution: f64,
    v_resolution: f64,
    bytes: Option<Vec<u8>>,
    path: Option<PathBuf>,
    fetcher: Option<Box<dyn ImageFetcher>>,
    contents: OnceCell<Vec<u8>>,
}

/// Remote byte I/O belongs to the caller; the merge engine only ever asks
/// for the bytes.
pub trait ImageFetcher: Send {
    fn fetch(&self) -> anyhow::Result<Vec<u8>>;
}

impl<F> ImageFetcher for F
where
    F: Fn() -> anyhow::Result<Vec<u8>> + Send,
{
    fn fetch(&self) -> anyhow::Result<Vec<u8>> {
        self()
    }
}

pub const DEFAULT_RESOLUTION: f64 = 72.0;

impl Image {
    /// An image backed by inline bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        width: u32,
        height: u32,
        bytes: Vec<u8>,
    ) -> Self {
        Self::build(name.into(), width, height, Some(bytes), None, None)
    }

    /// An image backed by a file on disk; bytes are read when first needed.
    pub fn from_path(
        name: impl Into<String>,
        width: u32,
        height: u32,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::build(name.into(), width, height, None, Some(path.into()), None)
    }

    /// An image backed by a caller-supplied fetcher (e.g. an HTTP client).
    pub fn from_fetcher(
        name: impl Into<String>,
        width: u32,
        height: u32,
        fetcher: Box<dyn ImageFetcher>,
    ) -> Self {
        Self::build(name.into(), width, height, None, None, Some(fetcher))
    }

    /// Probe pixel dimensions from a file header. The payload itself is
    /// still read lazily at embed time.
    pub fn probe_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("image path has no file name: {}", path.display()))?
            .to_string();
        let (width, height) = image::ImageReader::open(&path)
            .with_context(|| format!("open image: {}", path.display()))?
            .into_dimensions()
            .with_context(|| format!("read image dimensions: {}", path.display()))?;
        Ok(Self::build(name, width, height, None, Some(path), None))
    }

    fn build(
        name: String,
        width: u32,
        height: u32,
        bytes: Option<Vec<u8>>,
        path: Option<PathBuf>,
        fetcher: Option<Box<dyn ImageFetcher>>,
    ) -> Self {
        Self {
            name,
            width,
            height,
            h_resolution: DEFAULT_RESOLUTION,
            v_resolution: DEFAULT_RESOLUTION,
            bytes,
            path,
            fetcher,
            contents: OnceCell::new(),
        }
    }

    /// Override the DPI used to derive physical size. Values must be > 0;
    /// higher DPI means a smaller physical image for the same pixel count.
    pub fn with_resolution(mut self, horizontal: f64, vertical: f64) -> anyhow::Result<Self> {
        if horizontal <= 0.0 || vertical <= 0.0 {
            return Err(anyhow!(
                "image {}: resolution must be positive (got {horizontal}x{vertical})",
                self.name
            ));
        }
        self.h_resolution = horizontal;
        self.v_resolution = vertical;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width_px(&self) -> u32 {
        self.width
    }

    pub fn height_px(&self) -> u32 {
        self.height
    }

    /// Path referencing this image from a content part's relationships.
    pub fn media_path(&self) -> String {
        format!("media/{}", self.name)
    }

    /// Path this image is stored at inside the package.
    pub fn storage_path(&self) -> String {
        format!("word/{}", self.media_path())
    }

    pub fn emu_width(&self) -> i64 {
        px_to_emu(self.width, self.h_resolution)
    }

    pub fn emu_height(&self) -> i64 {
        px_to_emu(self.height, self.v_resolution)
    }

    /// Lowercased file extension of the image name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn content_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("bmp") => "image/bmp",
            Some("tif") | Some("tiff") => "image/tiff",
            Some("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        }
    }

    /// The byte payload, resolved on first use and cached. Fails only when
    /// invoked and no source yields bytes; an image that is never embedded
    /// never performs I/O.
    pub fn contents(&self) -> anyhow::Result<&[u8]> {
        self.contents
            .get_or_try_init(|| {
                if let Some(bytes) = &self.bytes {
                    return Ok(bytes.clone());
                }
                if let Some(path) = &self.path {
                    return std::fs::read(path)
                        .with_context(|| format!("read image: {}", path.display()));
                }
                if let Some(fetcher) = &self.fetcher {
                    return fetcher
                        .fetch()
                        .with_context(|| format!("fetch image: {}", self.name));
                }
                Err(anyhow!("image {} has no byte source", self.name))
            })
            .map(Vec::as_slice)
    }
}

fn px_to_emu(px: u32, dpi: f64) -> i64 {
    (px as f64 * EMU_PER_INCH as f64 / dpi) as i64
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("h_resolution", &self.h_resolution)
            .field("v_resolution", &self.v_resolution)
            .field("has_bytes", &self.bytes.is_some())
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Read dimensions out of in-memory bytes, for callers that fetched the
/// payload themselves but don't know its size.
pub fn probe_dimensions(bytes: &[u8]) -> anyhow::Result<(u32, u32)> {
    let cursor = std::io::Cursor::new(bytes);
    image::ImageReader::new(cursor)
        .with_guessed_format()
        .context("guess image format")?
        .into_dimensions()
        .context("read image dimensions")
}

#[cfg(test)]
mod tests {
    use super::Image;

    #[test]
    fn derives_package_paths_from_name() {
        let img = Image::from_bytes("logo.png", 256, 61, vec![1, 2, 3]);
        assert_eq!(img.media_path(), "media/logo.png");
        assert_eq!(img.storage_path(), "word/media/logo.png");
    }

    #[test]
    fn emu_size_at_default_resolution() {
        // 914400 / 72 = 12700 EMU per pixel at 72 dpi
        let img = Image::from_bytes("logo.png", 256, 61, vec![]);
        assert_eq!(img.emu_width(), 256 * 12_700);
        assert_eq!(img.emu_height(), 61 * 12_700);
    }

    #[test]
    fn higher_resolution_shrinks_physical_size() {
        let img = Image::from_bytes("logo.png", 288, 144, vec![])
            .with_resolution(144.0, 144.0)
            .expect("resolution");
        assert_eq!(img.emu_width(), 288 * 914_400 / 144);
        assert!(img.emu_width() < 288 * 12_700);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        assert!(Image::from_bytes("x.png", 1, 1, vec![])
            .with_resolution(0.0, 72.0)
            .is_err());
    }

    #[test]
    fn inline_bytes_win_over_other_sources() {
        let img = Image::from_bytes("a.png", 1, 1, vec![9, 9]);
        assert_eq!(img.contents().expect("contents"), &[9, 9]);
    }

    #[test]
    fn fetcher_is_invoked_lazily_and_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let img = Image::from_fetcher(
            "r.png",
            2,
            2,
            Box::new(move || -> anyhow::Result<Vec<u8>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![7])
            }),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(img.contents().expect("contents"), &[7]);
        assert_eq!(img.contents().expect("contents"), &[7]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_source_fails_only_when_requested() {
        let img = Image::from_path("gone.png", 1, 1, "/definitely/not/here.png");
        let err = img.contents().expect_err("should fail");
        assert!(err.to_string().contains("read image"));
    }

    #[test]
    fn extension_and_content_type() {
        assert_eq!(
            Image::from_bytes("logo.png", 1, 1, vec![]).content_type(),
            "image/png"
        );
        assert_eq!(
            Image::from_bytes("photo.JPG", 1, 1, vec![]).extension().as_deref(),
            Some("jpg")
        );
        assert_eq!(
            Image::from_bytes("noext", 1, 1, vec![]).content_type(),
            "application/octet-stream"
        );
    }
}
