//! Text extraction for uploaded binary documents (PDF, DOCX).
//!
//! Upload handling is upstream: callers hand this module raw bytes plus a
//! file kind and get back plain UTF-8 text with word/character statistics.
//! The extracted text feeds the chunker directly; no chunking happens here.

use std::io::Read;

use crate::error::{Error, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
}

impl FileKind {
    /// Map a file extension (case-insensitive) to a supported kind.
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "docx" => Ok(FileKind::Docx),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Extraction result handed to the chunker.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub text: String,
    /// Known for PDFs; DOCX flow-layout has no fixed page count.
    pub page_count: Option<usize>,
    pub word_count: usize,
    pub character_count: usize,
}

/// Extract plain text from an uploaded document.
///
/// Fails with [`Error::ParseFailure`] when the underlying extractor
/// rejects the bytes (corrupt or truncated file).
pub fn parse_document(bytes: &[u8], kind: FileKind) -> Result<ParsedDocument> {
    let (text, page_count) = match kind {
        FileKind::Pdf => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| Error::ParseFailure(format!("PDF extraction failed: {}", e)))?;
            (text, pdf_page_count(bytes))
        }
        FileKind::Docx => (extract_docx(bytes)?, None),
    };

    let word_count = text.split_whitespace().count();
    let character_count = text.chars().count();
    Ok(ParsedDocument {
        text,
        page_count,
        word_count,
        character_count,
    })
}

fn pdf_page_count(bytes: &[u8]) -> Option<usize> {
    lopdf::Document::load_mem(bytes)
        .ok()
        .map(|doc| doc.get_pages().len())
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::ParseFailure(format!("DOCX archive invalid: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| Error::ParseFailure("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| Error::ParseFailure(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(Error::ParseFailure(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_text_runs(&doc_xml)
}

/// Pull the text of every `w:t` run, inserting line breaks at paragraph
/// ends so the chunker sees paragraph boundaries.
fn extract_text_runs(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(Error::ParseFailure(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
