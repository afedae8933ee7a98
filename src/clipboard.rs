use base64::Engine;
use parking_lot::Mutex;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Plain-text clipboard sink.
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Sets the terminal's clipboard with an OSC 52 escape sequence.
pub struct Osc52Clipboard<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl Osc52Clipboard<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

pub fn osc52_sequence(text: &str) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    format!("\x1b]52;c;{}\x07", payload)
}

impl<W: Write + Send> Clipboard for Osc52Clipboard<W> {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut out = self.out.lock();
        out.write_all(osc52_sequence(text).as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps the copied text so the caller can hand it to another clipboard,
/// e.g. the browser's.
#[derive(Debug, Default)]
pub struct CapturedClipboard {
    last: Mutex<Option<String>>,
}

impl CapturedClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<String> {
        self.last.lock().take()
    }
}

impl Clipboard for CapturedClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        *self.last.lock() = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn osc52_wraps_base64_payload() {
        let clipboard = Osc52Clipboard::new(Vec::new());
        clipboard.write_text("Lumo").unwrap();
        let written = String::from_utf8(clipboard.into_inner()).unwrap();
        assert_eq!(written, "\x1b]52;c;THVtbw==\x07");
    }

    #[test]
    fn captured_clipboard_hands_back_text_once() {
        let clipboard = CapturedClipboard::new();
        clipboard.write_text("Solaris").unwrap();
        assert_eq!(clipboard.take().as_deref(), Some("Solaris"));
        assert_eq!(clipboard.take(), None);
    }
}
