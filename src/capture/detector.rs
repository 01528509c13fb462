//! Clipboard change detection.
//!
//! The detector keeps one fingerprint per channel and reports a change when
//! the current clipboard differs from it. Images take priority over text.
//! Whenever a change is reported, both fingerprints are set from that same
//! sample, so a clipboard exposing text and an image for one copy yields one
//! change, while copying A, then an image, then A again yields three.

use tracing::{debug, warn};

use crate::capture::clipboard::ClipboardAccess;
use crate::capture::ignore::IgnoreMarker;
use crate::storage::images::{ImageOrigin, ImageStore, fingerprint};

/// A new clipboard item worth recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardChange {
    TextChanged(String),
    /// Relative path of the PNG already written by the detector.
    ImageChanged(String),
}

/// One read of both channels.
struct Sample {
    text: Option<(String, String)>,
    image: Option<(Vec<u8>, String)>,
}

impl Sample {
    fn text_fingerprint(&self) -> Option<&str> {
        self.text.as_ref().map(|(_, fp)| fp.as_str())
    }

    fn image_fingerprint(&self) -> Option<&str> {
        self.image.as_ref().map(|(_, fp)| fp.as_str())
    }
}

pub struct ChangeDetector<C> {
    clipboard: C,
    images: ImageStore,
    log_images: bool,
    ignore: IgnoreMarker,
    last_text: Option<String>,
    last_image: Option<String>,
}

impl<C: ClipboardAccess> ChangeDetector<C> {
    pub fn new(clipboard: C, images: ImageStore, log_images: bool, ignore: IgnoreMarker) -> Self {
        Self {
            clipboard,
            images,
            log_images,
            ignore,
            last_text: None,
            last_image: None,
        }
    }

    /// Adopt the current clipboard contents as already seen.
    ///
    /// Called at startup so whatever was on the clipboard before the watcher
    /// started is not recorded.
    pub fn prime(&mut self) {
        let sample = self.sample();
        self.adopt(&sample);
    }

    /// Sample the clipboard once.
    pub fn tick(&mut self) -> Option<ClipboardChange> {
        let sample = self.sample();

        if let Some(pending) = self.ignore.pending() {
            if pending.matches(sample.text_fingerprint(), sample.image_fingerprint()) {
                self.ignore.clear();
                self.adopt(&sample);
                debug!("Skipped self-initiated clipboard write");
                return None;
            }
        }

        let change = self
            .image_change(&sample)
            .or_else(|| self.text_change(&sample));
        if change.is_some() {
            self.adopt(&sample);
        }
        change
    }

    fn adopt(&mut self, sample: &Sample) {
        self.last_text = sample.text_fingerprint().map(str::to_string);
        self.last_image = sample.image_fingerprint().map(str::to_string);
    }

    fn image_change(&mut self, sample: &Sample) -> Option<ClipboardChange> {
        let (png, fp) = sample.image.as_ref()?;
        if self.last_image.as_deref() == Some(fp.as_str()) {
            return None;
        }

        // Remember the fingerprint even if saving fails, so a broken image
        // is not retried every tick.
        self.last_image = Some(fp.clone());
        match self.images.save_png(png, ImageOrigin::Clipboard) {
            Ok(relative) => Some(ClipboardChange::ImageChanged(relative)),
            Err(e) => {
                warn!(error = %e, "Failed to save clipboard image");
                None
            }
        }
    }

    fn text_change(&self, sample: &Sample) -> Option<ClipboardChange> {
        let (text, fp) = sample.text.as_ref()?;
        if self.last_text.as_deref() == Some(fp.as_str()) {
            return None;
        }
        Some(ClipboardChange::TextChanged(text.clone()))
    }

    fn sample(&mut self) -> Sample {
        let image = if self.log_images {
            self.current_image()
        } else {
            None
        };
        let text = self.current_text().map(|text| {
            let fp = fingerprint(text.as_bytes());
            (text, fp)
        });
        Sample { text, image }
    }

    fn current_text(&mut self) -> Option<String> {
        match self.clipboard.read_text() {
            Ok(text) => text.filter(|t| !t.is_empty()),
            Err(e) => {
                debug!(error = %e, "Clipboard text read failed");
                None
            }
        }
    }

    /// Encoded PNG and its fingerprint, if the clipboard holds an image.
    fn current_image(&mut self) -> Option<(Vec<u8>, String)> {
        let raw = match self.clipboard.read_image() {
            Ok(raw) => raw?,
            Err(e) => {
                debug!(error = %e, "Clipboard image read failed");
                return None;
            }
        };
        match raw.encode_png() {
            Ok(png) => {
                let fp = fingerprint(&png);
                Some((png, fp))
            }
            Err(e) => {
                debug!(error = %e, "Clipboard image could not be encoded");
                None
            }
        }
    }
}
