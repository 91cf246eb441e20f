//! Text Extractor
//!
//! Pulls a bounded text snippet out of a file for classification and naming.
//!
//! ## Supported Formats
//! - Plain text: direct bounded read, malformed UTF-8 skipped
//! - PDF: first pages via pdf-extract
//! - Word: .docx body paragraphs via docx-rs
//!
//! Extraction never fails: any problem produces [`ExtractedText::Empty`] with a reason,
//! and the classifier carries on with the file name alone.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Documents larger than this are not decoded
const MAX_DOCUMENT_BYTES: u64 = 32 * 1024 * 1024;

/// Number of PDF pages read
const PDF_PAGES: u32 = 2;

/// Wall-clock budget for one extraction
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Decoding strategy, selected by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    PlainText,
    Pdf,
    Docx,
}

impl ExtractionKind {
    /// Pick a strategy for a lower-case extension without the dot
    pub fn for_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" | "csv" | "log" | "json" | "xml" | "yaml" | "yml" | "ini" | "cfg"
            | "conf" | "toml" | "html" | "htm" => Some(Self::PlainText),
            "" => None,
            other => {
                let guess = mime_guess::from_ext(other).first()?;
                (guess.type_() == mime_guess::mime::TEXT).then_some(Self::PlainText)
            }
        }
    }
}

/// Outcome of an extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedText {
    Text {
        content: String,
        kind: ExtractionKind,
    },
    Empty {
        reason: String,
    },
}

impl ExtractedText {
    fn empty(reason: impl Into<String>) -> Self {
        Self::Empty {
            reason: reason.into(),
        }
    }

    /// The text, or "" when nothing was extracted
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text { content, .. } => content,
            Self::Empty { .. } => "",
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Text { content, .. } => content,
            Self::Empty { .. } => String::new(),
        }
    }
}

/// Extract up to `max_bytes` of text from `path`.
///
/// Decoding runs on the blocking pool under a timeout, so this is bounded in time
/// regardless of the file.
pub async fn extract(path: &Path, extension: &str, max_bytes: usize) -> ExtractedText {
    let ext = extension.trim_start_matches('.').to_lowercase();
    let Some(kind) = ExtractionKind::for_extension(&ext) else {
        return ExtractedText::empty(format!("no text decoder for '{}'", ext));
    };

    let owned: PathBuf = path.to_path_buf();
    let task = tokio::task::spawn_blocking(move || extract_sync(&owned, kind, max_bytes));

    let result = match tokio::time::timeout(EXTRACTION_TIMEOUT, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => ExtractedText::empty(format!("extraction task failed: {}", join_err)),
        Err(_) => ExtractedText::empty(format!(
            "extraction timed out after {}s",
            EXTRACTION_TIMEOUT.as_secs()
        )),
    };

    match &result {
        ExtractedText::Text { content, kind } => {
            tracing::debug!(path = %path.display(), ?kind, chars = content.len(), "Extracted text");
        }
        ExtractedText::Empty { reason } => {
            tracing::debug!(path = %path.display(), reason = %reason, "No text extracted");
        }
    }
    result
}

/// Blocking extraction
pub fn extract_sync(path: &Path, kind: ExtractionKind, max_bytes: usize) -> ExtractedText {
    let outcome = match kind {
        ExtractionKind::PlainText => read_plain_text(path, max_bytes),
        ExtractionKind::Pdf => extract_pdf(path),
        ExtractionKind::Docx => extract_docx(path),
    };

    match outcome {
        Ok(text) => {
            let text = truncate_to_bytes(clean_text(&text), max_bytes);
            if text.is_empty() {
                ExtractedText::empty("document contains no text")
            } else {
                ExtractedText::Text { content: text, kind }
            }
        }
        Err(reason) => ExtractedText::Empty { reason },
    }
}

/// Bounded read; invalid UTF-8 sequences are dropped
fn read_plain_text(path: &Path, max_bytes: usize) -> Result<String, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("Failed to open file: {}", e))?;

    let mut buffer = Vec::with_capacity(max_bytes.min(64 * 1024));
    file.take(max_bytes as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| format!("Failed to read file: {}", e))?;

    Ok(decode_lossy_skip(&buffer))
}

fn decode_lossy_skip(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

fn check_document_size(path: &Path) -> Result<(), String> {
    let size = std::fs::metadata(path)
        .map_err(|e| format!("Failed to read metadata: {}", e))?
        .len();
    if size > MAX_DOCUMENT_BYTES {
        return Err(format!("document too large to decode ({} bytes)", size));
    }
    Ok(())
}

/// First pages of a PDF. Only those pages are decoded. pdf-extract can panic on
/// malformed fonts, so it is wrapped in catch_unwind.
fn extract_pdf(path: &Path) -> Result<String, String> {
    check_document_size(path)?;
    let bytes = std::fs::read(path).map_err(|e| format!("Failed to read PDF file: {}", e))?;

    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| leading_pdf_pages(&bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "PDF extraction failed");
            Err(format!("PDF extraction failed: {}", e))
        }
        Err(_panic) => {
            tracing::warn!(path = %path.display(), "PDF extraction panicked - likely malformed font/glyph");
            Err("PDF extraction panicked".to_string())
        }
    }
}

fn leading_pdf_pages(bytes: &[u8]) -> Result<String, String> {
    let mut doc = pdf_extract::Document::load_mem(bytes).map_err(|e| e.to_string())?;
    if doc.is_encrypted() {
        doc.decrypt("").map_err(|e| format!("encrypted document: {}", e))?;
    }

    let page_count = u32::try_from(doc.get_pages().len()).unwrap_or(u32::MAX);
    let mut text = String::new();
    for page in 1..=page_count.min(PDF_PAGES) {
        let mut page_text = String::new();
        {
            let mut output = pdf_extract::PlainTextOutput::new(&mut page_text);
            pdf_extract::output_doc_page(&doc, &mut output, page).map_err(|e| e.to_string())?;
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&page_text);
    }
    Ok(text)
}

fn extract_docx(path: &Path) -> Result<String, String> {
    check_document_size(path)?;
    let bytes = std::fs::read(path).map_err(|e| format!("Failed to read DOCX file: {}", e))?;
    let doc = docx_rs::read_docx(&bytes).map_err(|e| format!("Failed to parse DOCX: {}", e))?;

    let mut text = String::new();
    for child in &doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(para) = child {
            for p_child in &para.children {
                if let docx_rs::ParagraphChild::Run(run) = p_child {
                    for run_child in &run.children {
                        if let docx_rs::RunChild::Text(t) = run_child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }
    Ok(text)
}

/// Trim lines and drop blank ones
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut to at most `max_bytes`, backing off to a char boundary
fn truncate_to_bytes(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_kind_for_extension() {
        assert_eq!(ExtractionKind::for_extension("pdf"), Some(ExtractionKind::Pdf));
        assert_eq!(ExtractionKind::for_extension("docx"), Some(ExtractionKind::Docx));
        assert_eq!(ExtractionKind::for_extension("md"), Some(ExtractionKind::PlainText));
        assert_eq!(ExtractionKind::for_extension("png"), None);
        assert_eq!(ExtractionKind::for_extension(""), None);
    }

    #[tokio::test]
    async fn test_plain_text_is_bounded() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "{}", "word ".repeat(10_000)).unwrap();

        let text = extract(file.path(), ".txt", 100).await;
        assert!(matches!(text, ExtractedText::Text { kind: ExtractionKind::PlainText, .. }));
        assert!(text.as_str().len() <= 100);
        assert!(text.as_str().starts_with("word word"));
    }

    #[test]
    fn test_malformed_bytes_are_skipped() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(b"Invoice \xff\xfe number 42").unwrap();

        let text = extract_sync(file.path(), ExtractionKind::PlainText, 2000);
        assert_eq!(text.as_str(), "Invoice  number 42");
    }

    #[tokio::test]
    async fn test_broken_pdf_yields_empty() {
        let mut file = NamedTempFile::with_suffix(".pdf").unwrap();
        file.write_all(b"this is not a pdf").unwrap();

        let text = extract(file.path(), "pdf", 2000).await;
        assert!(matches!(text, ExtractedText::Empty { .. }));
        assert_eq!(text.as_str(), "");
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty() {
        let text = extract(Path::new("/definitely/not/here.txt"), "txt", 2000).await;
        assert!(matches!(text, ExtractedText::Empty { .. }));
    }

    #[tokio::test]
    async fn test_unknown_extension_yields_empty() {
        let file = NamedTempFile::with_suffix(".bin").unwrap();
        let text = extract(file.path(), "bin", 2000).await;
        assert!(matches!(text, ExtractedText::Empty { .. }));
    }

    #[tokio::test]
    async fn test_pdf_text_is_extracted() {
        let mut file = NamedTempFile::with_suffix(".pdf").unwrap();
        file.write_all(&fixtures::pdf(&["Invoice 2024-03-01 total due"])).unwrap();

        let text = extract(file.path(), ".pdf", 2000).await;
        assert!(matches!(text, ExtractedText::Text { kind: ExtractionKind::Pdf, .. }));
        assert!(text.as_str().contains("Invoice"), "got {:?}", text);
    }

    #[test]
    fn test_pdf_reads_only_leading_pages() {
        let mut file = NamedTempFile::with_suffix(".pdf").unwrap();
        file.write_all(&fixtures::pdf(&["First page", "Second page", "Third page"]))
            .unwrap();

        let text = extract_sync(file.path(), ExtractionKind::Pdf, 2000);
        assert!(text.as_str().contains("First"));
        assert!(text.as_str().contains("Second"));
        assert!(!text.as_str().contains("Third"));
    }

    #[tokio::test]
    async fn test_docx_text_is_extracted() {
        let mut file = NamedTempFile::with_suffix(".docx").unwrap();
        file.write_all(&fixtures::docx(&["Receipt", "Paid in full"])).unwrap();

        let text = extract(file.path(), "docx", 2000).await;
        assert!(matches!(text, ExtractedText::Text { kind: ExtractionKind::Docx, .. }));
        assert_eq!(text.as_str(), "Receipt\nPaid in full");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "ééé".to_string(); // 6 bytes
        assert_eq!(truncate_to_bytes(text, 3), "é");
    }

    #[test]
    fn test_clean_text() {
        let messy = "  Line 1  \n\n  Line 2  \n  \n  Line 3  ";
        assert_eq!(clean_text(messy), "Line 1\nLine 2\nLine 3");
    }
}
