//! Image blob files.
//!
//! Image entries store a path relative to the data root (`images/<name>.png`)
//! in the `content` column; the pixels live in PNG files managed here. Paths
//! handed to this module are always validated to stay inside the data root.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use image::ImageEncoder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Directory under the data root holding image blobs.
pub const IMAGES_DIR: &str = "images";

/// Uncompressed RGBA8 pixels as exchanged with the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

impl RawImage {
    /// Encode as PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length does not match the dimensions or
    /// the encoder fails.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let width = u32::try_from(self.width)
            .map_err(|_| Error::Image(format!("width {} too large", self.width)))?;
        let height = u32::try_from(self.height)
            .map_err(|_| Error::Image(format!("height {} too large", self.height)))?;

        let expected = self.width.saturating_mul(self.height).saturating_mul(4);
        if expected == 0 || self.bytes.len() != expected {
            return Err(Error::Image(format!(
                "pixel buffer has {} bytes, expected {expected} for {}x{}",
                self.bytes.len(),
                self.width,
                self.height
            )));
        }

        let mut png = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(&self.bytes, width, height, image::ExtendedColorType::Rgba8)
            .map_err(|e| Error::Image(e.to_string()))?;
        Ok(png)
    }

    /// Decode PNG bytes into RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a readable PNG.
    pub fn decode_png(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| Error::Image(e.to_string()))?
            .to_rgba8();
        Ok(Self {
            width: decoded.width() as usize,
            height: decoded.height() as usize,
            bytes: decoded.into_raw(),
        })
    }
}

/// SHA-256 hex digest of encoded image bytes.
#[must_use]
pub fn fingerprint(encoded: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(encoded);
    format!("{:x}", hasher.finalize())
}

/// Where an image came from; selects the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Clipboard,
    Screenshot,
}

impl ImageOrigin {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Clipboard => "img",
            Self::Screenshot => "ss",
        }
    }
}

/// PNG files under `<data root>/images`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    #[must_use]
    pub fn new(data_root: &Path) -> Self {
        Self {
            root: data_root.to_path_buf(),
        }
    }

    /// Data root the relative paths are resolved against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Encode `raw` as PNG and store it. Returns the relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn save(&self, raw: &RawImage, origin: ImageOrigin) -> Result<String> {
        let png = raw.encode_png()?;
        self.save_png(&png, origin)
    }

    /// Store already-encoded PNG bytes. Returns the relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_png(&self, png: &[u8], origin: ImageOrigin) -> Result<String> {
        let dir = self.images_dir();
        fs::create_dir_all(&dir)?;

        let stem = format!("{}_{}", origin.prefix(), chrono::Local::now().timestamp_millis());
        let mut name = format!("{stem}.png");
        let mut n = 1;
        while dir.join(&name).exists() {
            name = format!("{stem}_{n}.png");
            n += 1;
        }

        fs::write(dir.join(&name), png)?;
        let relative = format!("{IMAGES_DIR}/{name}");
        debug!(path = %relative, bytes = png.len(), "Image saved");
        Ok(relative)
    }

    /// Absolute path for a stored relative path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the path is absolute or escapes the data root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let safe = !relative.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(Error::InvalidArgument(format!(
                "image path must be relative to the data root: {relative}"
            )));
        }
        Ok(self.root.join(path))
    }

    /// Whether the blob for `relative` is present.
    #[must_use]
    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_ok_and(|p| p.is_file())
    }

    /// Read a stored blob back into pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid, the file is unreadable or
    /// not a PNG.
    pub fn load(&self, relative: &str) -> Result<RawImage> {
        let bytes = fs::read(self.resolve(relative)?)?;
        RawImage::decode_png(&bytes)
    }

    /// Remove a blob. A missing file is not an error.
    ///
    /// Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or removal fails for a reason
    /// other than the file being absent.
    pub fn delete(&self, relative: &str) -> Result<bool> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %relative, "Image deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete each path, logging failures instead of stopping.
    ///
    /// Returns how many files were removed.
    pub fn delete_all<'a, I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut removed = 0;
        for path in paths {
            match self.delete(path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %path, error = %e, "Failed to delete image"),
            }
        }
        removed
    }

    /// Delete PNG files in the images directory that no row references.
    ///
    /// Returns the relative paths removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn collect_orphans(&self, referenced: &BTreeSet<String>) -> Result<Vec<String>> {
        let dir = self.images_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_png = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if !is_png || !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let relative = format!("{IMAGES_DIR}/{name}");
            if referenced.contains(&relative) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed.push(relative),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove orphaned image"),
            }
        }

        removed.sort();
        Ok(removed)
    }
}
