//! Per-page PDF text extraction.
//!
//! Primary path is lopdf's font-aware `extract_text`; pages where that
//! fails or comes back empty fall through to a raw content-stream scan of
//! the Tj/TJ text operators. A page that yields nothing becomes an empty
//! page rather than failing the whole document.

use anyhow::{Context, Result};
use lopdf::content::Operation;
use lopdf::{Document, Object};
use regex::Regex;
use std::sync::LazyLock;

use crate::types::PdfPage;

static TRAILING_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("trailing space regex is valid"));

pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PdfPage>> {
    let doc = Document::load_mem(bytes).context("lopdf: failed to load PDF from memory")?;

    let mut pages = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let text = match doc.extract_text(&[page_num]) {
            Ok(t) if !t.trim().is_empty() => t,
            _ => {
                tracing::debug!(page = page_num, "extract_text empty, scanning content stream");
                extract_page_stream_text(&doc, page_id).unwrap_or_default()
            }
        };

        pages.push(PdfPage {
            number: page_num as i64,
            text: normalize_whitespace(&text),
        });
    }

    Ok(pages)
}

/// Collapse trailing spaces before newlines and normalize line endings.
fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    TRAILING_SPACE_RE.replace_all(&text, "\n").into_owned()
}

// ── Content-stream fallback ──────────────────────────────────────────

fn extract_page_stream_text(doc: &Document, page_id: (u32, u16)) -> Result<String> {
    let page = doc.get_object(page_id)?;
    let page_dict = page
        .as_dict()
        .map_err(|_| anyhow::anyhow!("Page is not a dict"))?;

    match page_dict.get(b"Contents") {
        Ok(contents) => extract_content_text(doc, contents),
        Err(_) => Ok(String::new()),
    }
}

fn extract_content_text(doc: &Document, contents: &Object) -> Result<String> {
    match contents {
        Object::Reference(ref_id) => {
            let obj = doc.get_object(*ref_id)?;
            extract_content_text(doc, &obj)
        }
        Object::Array(arr) => {
            let mut text = String::new();
            for item in arr {
                if let Ok(t) = extract_content_text(doc, item) {
                    text.push_str(&t);
                }
            }
            Ok(text)
        }
        Object::Stream(stream) => match stream.decode_content() {
            Ok(content) => Ok(text_from_operations(&content.operations)),
            Err(_) => Ok(String::new()),
        },
        _ => Ok(String::new()),
    }
}

/// Collect text from Tj/TJ/'/" operators. String operands arrive already
/// unescaped (lopdf parses literal and hex string syntax); only the byte
/// encoding is left to resolve.
fn text_from_operations(ops: &[Operation]) -> String {
    let mut result = String::new();
    let mut current = String::new();

    for op in ops {
        match op.operator.as_str() {
            "Tj" | "'" | "\"" => {
                for operand in &op.operands {
                    if let Object::String(bytes, _) = operand {
                        current.push_str(&decode_pdf_string(bytes));
                        current.push(' ');
                    }
                }
            }
            "TJ" => {
                for operand in &op.operands {
                    if let Object::Array(items) = operand {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                current.push_str(&decode_pdf_string(bytes));
                            }
                        }
                        current.push(' ');
                    }
                }
            }
            "ET" => {
                if !current.is_empty() {
                    result.push_str(current.trim());
                    result.push('\n');
                    current.clear();
                }
            }
            _ => {}
        }
    }
    if !current.is_empty() {
        result.push_str(current.trim());
    }
    result
}

/// Decode PDF string bytes: UTF-16BE/LE (by BOM or null-byte pattern),
/// falling back to UTF-8 and then lossy for PDFDocEncoding leftovers.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16be(&bytes[2..]);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return decode_utf16le(&bytes[2..]);
    }

    // UTF-16 without BOM shows up as a regular null-byte pattern: big-endian
    // text keeps the high (null) byte at even offsets, little-endian at odd.
    if bytes.len() >= 4 && bytes.len() % 2 == 0 {
        let odd_nulls = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
        let even_nulls = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
        if even_nulls > bytes.len() / 4 && even_nulls > odd_nulls {
            return decode_utf16be(bytes);
        }
        if odd_nulls > bytes.len() / 4 && odd_nulls > even_nulls {
            return decode_utf16le(bytes);
        }
    }

    String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

fn decode_utf16be(bytes: &[u8]) -> String {
    let values: Vec<u16> = bytes
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    clean_decoded(&String::from_utf16_lossy(&values))
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let values: Vec<u16> = bytes
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    clean_decoded(&String::from_utf16_lossy(&values))
}

fn clean_decoded(s: &str) -> String {
    s.chars()
        .filter(|&c| c != '\0' && (c >= ' ' || c == '\t' || c == '\n'))
        .collect::<String>()
        .trim()
        .to_string()
}
