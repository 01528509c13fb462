//! System clipboard access.
//!
//! [`ClipboardAccess`] is the seam between the change detector and the OS.
//! [`ArboardClipboard`] talks to the real clipboard; [`MemoryClipboard`] is
//! an in-process stand-in for headless runs and tests.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::storage::RawImage;

/// Read and write the clipboard's text and image channels.
///
/// Reads return `Ok(None)` when the channel holds nothing of that kind.
pub trait ClipboardAccess {
    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be read.
    fn read_text(&mut self) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be read.
    fn read_image(&mut self) -> Result<Option<RawImage>>;

    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be written.
    fn write_text(&mut self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be written.
    fn write_image(&mut self, image: &RawImage) -> Result<()>;
}

impl<C: ClipboardAccess + ?Sized> ClipboardAccess for Box<C> {
    fn read_text(&mut self) -> Result<Option<String>> {
        (**self).read_text()
    }

    fn read_image(&mut self) -> Result<Option<RawImage>> {
        (**self).read_image()
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        (**self).write_text(text)
    }

    fn write_image(&mut self, image: &RawImage) -> Result<()> {
        (**self).write_image(image)
    }
}

/// OS clipboard via `arboard`.
///
/// A fresh `arboard::Clipboard` is opened per call, so the handle is cheap
/// to move between tasks and never holds the clipboard open while idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArboardClipboard;

impl ArboardClipboard {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn open() -> Result<arboard::Clipboard> {
        arboard::Clipboard::new().map_err(clipboard_error)
    }
}

fn clipboard_error(e: arboard::Error) -> Error {
    Error::Clipboard(e.to_string())
}

impl ClipboardAccess for ArboardClipboard {
    fn read_text(&mut self) -> Result<Option<String>> {
        match Self::open()?.get_text() {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(clipboard_error(e)),
        }
    }

    fn read_image(&mut self) -> Result<Option<RawImage>> {
        match Self::open()?.get_image() {
            Ok(data) => Ok(Some(RawImage {
                width: data.width,
                height: data.height,
                bytes: data.bytes.into_owned(),
            })),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(clipboard_error(e)),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        Self::open()?.set_text(text).map_err(clipboard_error)
    }

    fn write_image(&mut self, image: &RawImage) -> Result<()> {
        Self::open()?
            .set_image(arboard::ImageData {
                width: image.width,
                height: image.height,
                bytes: Cow::Borrowed(&image.bytes),
            })
            .map_err(clipboard_error)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    text: Option<String>,
    image: Option<RawImage>,
    fail_reads: bool,
}

/// In-process clipboard. Clones share the same contents.
///
/// Setting text clears the image and vice versa, like most OS clipboards.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Clipboard("clipboard state lock poisoned".to_string()))
    }

    /// Replace the contents with text, as if another application copied it.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn set_text(&self, text: &str) -> Result<()> {
        let mut state = self.state()?;
        state.text = Some(text.to_string());
        state.image = None;
        Ok(())
    }

    /// Replace the contents with an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn set_image(&self, image: RawImage) -> Result<()> {
        let mut state = self.state()?;
        state.image = Some(image);
        state.text = None;
        Ok(())
    }

    /// Make every read fail until turned off again.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn set_fail_reads(&self, fail: bool) -> Result<()> {
        self.state()?.fail_reads = fail;
        Ok(())
    }

    /// Current text contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn text(&self) -> Result<Option<String>> {
        Ok(self.state()?.text.clone())
    }

    /// Current image contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn image(&self) -> Result<Option<RawImage>> {
        Ok(self.state()?.image.clone())
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn read_text(&mut self) -> Result<Option<String>> {
        let state = self.state()?;
        if state.fail_reads {
            return Err(Error::Clipboard("clipboard busy".to_string()));
        }
        Ok(state.text.clone().filter(|t| !t.is_empty()))
    }

    fn read_image(&mut self) -> Result<Option<RawImage>> {
        let state = self.state()?;
        if state.fail_reads {
            return Err(Error::Clipboard("clipboard busy".to_string()));
        }
        Ok(state.image.clone())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.set_text(text)
    }

    fn write_image(&mut self, image: &RawImage) -> Result<()> {
        self.set_image(image.clone())
    }
}
