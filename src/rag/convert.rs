//! Text extraction for uploaded `.txt`, `.pdf` and `.docx` files.

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_file_name(file_name: &str) -> Result<Self, RagError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "txt" => Ok(DocumentFormat::Text),
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            other => Err(RagError::UnsupportedFormat(if other.is_empty() {
                file_name.to_string()
            } else {
                other.to_string()
            })),
        }
    }
}

pub fn extract_text(
    format: DocumentFormat,
    bytes: &[u8],
    source_name: &str,
) -> Result<String, RagError> {
    let extraction = |reason: String| RagError::Extraction {
        source_name: source_name.to_string(),
        reason,
    };

    match format {
        DocumentFormat::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| extraction(e.to_string()))
        }
        DocumentFormat::Docx => extract_docx(bytes).map_err(extraction),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a docx archive: {}", e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("word/document.xml missing: {}", e))?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;
    docx_paragraphs(&xml)
}

/// Collects the `w:t` runs of `word/document.xml`, one line per `w:p`.
fn docx_paragraphs(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed document xml: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n"))
}
