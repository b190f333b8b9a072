//! Multi-format text extraction for uploaded documents.
//!
//! Converts raw bytes plus a declared MIME type into normalized plain
//! text. Supported formats: PDF, Word-processor OOXML packages, and plain
//! text (any `text/*` type). Anything else is rejected before analysis
//! runs. Output is whitespace-normalized but otherwise byte-faithful;
//! semantic cleaning belongs to the analyzer.

use std::io::Read;
use std::path::Path;

use crate::error::{PipelineError, Result};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract normalized text from raw bytes. Fails with `UnsupportedFormat`
/// for unknown MIME types and `ExtractionFailed` for malformed containers
/// or extractions that yield no usable text; callers must never store
/// empty text as if it were valid.
pub fn extract_text(bytes: &[u8], declared_mime: &str) -> Result<String> {
    let mime = declared_mime
        .split(';')
        .next()
        .unwrap_or(declared_mime)
        .trim();

    let raw = match mime {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_DOCX => extract_docx(bytes)?,
        m if m == MIME_TEXT || m.starts_with("text/") => extract_plain(bytes)?,
        other => return Err(PipelineError::UnsupportedFormat(other.to_string())),
    };

    let normalized = normalize_whitespace(&raw);
    if normalized.is_empty() {
        return Err(PipelineError::ExtractionFailed(
            "extraction produced no text".to_string(),
        ));
    }
    Ok(normalized)
}

/// Guess a MIME type from a file extension, for CLI uploads.
pub fn guess_mime(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase()
        .as_str()
    {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "txt" | "md" | "text" => Some(MIME_TEXT),
        _ => None,
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::ExtractionFailed(format!("PDF: {}", e)))
}

fn extract_plain(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| PipelineError::ExtractionFailed(format!("invalid UTF-8: {}", e)))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::ExtractionFailed(format!("OOXML: {}", e)))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| PipelineError::ExtractionFailed(format!("OOXML: {}", e)))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| PipelineError::ExtractionFailed(format!("OOXML: {}", e)))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(PipelineError::ExtractionFailed(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(PipelineError::ExtractionFailed(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Pull the text runs (`w:t` elements) out of a DOCX document body,
/// inserting paragraph breaks at `w:p` boundaries.
fn extract_w_t_elements(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(PipelineError::ExtractionFailed(format!("OOXML: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Normalize whitespace: consistent `\n` line endings, collapsed runs of
/// spaces/tabs, at most one blank line between paragraphs, trimmed ends.
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.split('\n') {
        let mut collapsed = String::with_capacity(line.len());
        let mut in_gap = false;
        for ch in line.chars() {
            if ch == ' ' || ch == '\t' {
                in_gap = true;
            } else {
                if in_gap && !collapsed.is_empty() {
                    collapsed.push(' ');
                }
                in_gap = false;
                collapsed.push(ch);
            }
        }

        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&collapsed);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Clip a string to at most `max` characters on a char boundary.
pub fn clip_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_mime_rejected_before_analysis() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_fails_rather_than_returning_garbage() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
    }

    #[test]
    fn invalid_zip_fails_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
    }

    #[test]
    fn plain_text_passes_through_normalized() {
        let text = extract_text(b"Hello\r\n\r\n\r\nWorld  \t again", MIME_TEXT).unwrap();
        assert_eq!(text, "Hello\n\nWorld again");
    }

    #[test]
    fn mime_parameters_are_ignored() {
        let text = extract_text(b"plain", "text/plain; charset=utf-8").unwrap();
        assert_eq!(text, "plain");
    }

    #[test]
    fn whitespace_only_input_is_extraction_failure() {
        let err = extract_text(b"  \n\t \n ", MIME_TEXT).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
    }

    #[test]
    fn normalize_collapses_runs_and_blank_lines() {
        let s = normalize_whitespace("a  b\t\tc\n\n\n\n\nd\r\ne");
        assert_eq!(s, "a b c\n\nd\ne");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip_chars("héllo", 2), "hé");
        assert_eq!(clip_chars("ab", 10), "ab");
        assert_eq!(clip_chars("", 3), "");
    }

    #[test]
    fn guess_mime_by_extension() {
        assert_eq!(guess_mime(Path::new("cv.pdf")), Some(MIME_PDF));
        assert_eq!(guess_mime(Path::new("cv.DOCX")), Some(MIME_DOCX));
        assert_eq!(guess_mime(Path::new("notes.md")), Some(MIME_TEXT));
        assert_eq!(guess_mime(Path::new("archive.tar.gz")), None);
    }
}
