//! Decides whether a response body is really a PDF.

/// PDF readers accept junk before the header within the first kilobyte.
const MAGIC_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pdf,
    Html,
    Other(String),
}

pub fn sniff(bytes: &[u8], content_type: Option<&str>) -> Verdict {
    if has_pdf_magic(bytes) {
        return Verdict::Pdf;
    }
    let content_type = content_type.unwrap_or("").to_ascii_lowercase();
    if content_type.contains("html") || looks_like_html(bytes) {
        return Verdict::Html;
    }
    if content_type.is_empty() {
        Verdict::Other(format!("{} bytes without PDF header", bytes.len()))
    } else {
        Verdict::Other(format!("{content_type} without PDF header"))
    }
}

pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(MAGIC_WINDOW)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.starts_with("<head")
}
