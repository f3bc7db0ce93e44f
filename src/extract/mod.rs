//! Raw-text extraction collaborator seam
//!
//! Per-format parsing (PDF, DOCX, ...) lives outside the engine. The trait
//! contract is deliberately soft: unsupported or corrupt input degrades to an
//! empty string, it never fails for format reasons.

/// Turns raw document bytes into plain text
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes`. Returns an empty string for unsupported or
    /// corrupt input rather than an error.
    fn extract(&self, bytes: &[u8], filename: &str, mime_hint: &str) -> String;
}

/// Extensions the plain-text extractor refuses to decode as text
const BINARY_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "png", "jpg", "jpeg", "gif", "zip",
];

/// Default extractor: lossy UTF-8 decoding for text-like files, empty output
/// for known binary formats.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str, mime_hint: &str) -> String {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if BINARY_EXTENSIONS.contains(&extension.as_str())
            || mime_hint.starts_with("application/pdf")
            || mime_hint.starts_with("image/")
        {
            tracing::warn!(
                "No text extractor for {} ({}); treating as empty",
                filename,
                if mime_hint.is_empty() { &extension } else { mime_hint }
            );
            return String::new();
        }

        String::from_utf8_lossy(bytes).into_owned()
    }
}
