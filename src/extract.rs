//! Multi-format text extraction.
//!
//! Callers supply raw bytes plus a MIME type; this module returns plain
//! UTF-8 text. Four format families are handled:
//!
//! | Family | MIME types |
//! |--------|------------|
//! | Word processor | `.docx` |
//! | PDF | `application/pdf` |
//! | Spreadsheet | `.xlsx`, `text/csv` |
//! | Text | `text/plain`, `text/markdown`, `application/json`, `application/xml`, `text/xml` |
//!
//! Presentations (`.pptx`) are also read, slide by slide.
//!
//! Extraction never panics: unknown types yield
//! [`ExtractError::UnsupportedFormat`], unreadable bytes yield
//! [`ExtractError::Extraction`].

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;

use crate::error::ExtractError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_JSON: &str = "application/json";
pub const MIME_XML: &str = "application/xml";
pub const MIME_TEXT_XML: &str = "text/xml";

const SUPPORTED: &[(&str, &[&str])] = &[
    (MIME_DOCX, &["docx"]),
    (MIME_PDF, &["pdf"]),
    (MIME_PPTX, &["pptx"]),
    (MIME_XLSX, &["xlsx"]),
    (MIME_CSV, &["csv"]),
    (MIME_TEXT, &["txt", "text", "log"]),
    (MIME_MARKDOWN, &["md", "markdown"]),
    (MIME_JSON, &["json"]),
    (MIME_XML, &["xml"]),
    (MIME_TEXT_XML, &[]),
];

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Every MIME type [`extract_text`] accepts.
pub fn supported_types() -> Vec<String> {
    SUPPORTED.iter().map(|(mime, _)| mime.to_string()).collect()
}

/// Every file extension [`mime_for_path`] recognises, with a leading dot.
pub fn supported_extensions() -> Vec<String> {
    SUPPORTED
        .iter()
        .flat_map(|(_, exts)| exts.iter().map(|e| format!(".{}", e)))
        .collect()
}

pub fn is_supported(mime: &str) -> bool {
    SUPPORTED.iter().any(|(m, _)| *m == normalize_mime(mime))
}

/// Infer the MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(mime, _)| *mime)
}

/// Strip parameters (`; charset=utf-8`) and lowercase.
fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extracts plain text from `bytes` interpreted as `mime`.
pub fn extract_text(bytes: &[u8], mime: &str) -> Result<String, ExtractError> {
    match normalize_mime(mime).as_str() {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_CSV => Ok(format_csv(&decode_utf8(bytes))),
        MIME_TEXT | MIME_MARKDOWN => Ok(decode_utf8(bytes)),
        MIME_JSON => Ok(format_json(&decode_utf8(bytes))),
        MIME_XML | MIME_TEXT_XML => extract_xml_text(bytes),
        _ => Err(ExtractError::UnsupportedFormat {
            mime: mime.to_string(),
            supported: supported_types().join(", "),
        }),
    }
}

fn decode_utf8(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

// ============ PDF ============

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::extraction("pdf", e))
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive<'a>(bytes: &'a [u8], format: &'static str) -> Result<Archive<'a>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::extraction(format, e))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    format: &'static str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::extraction(format, format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::extraction(format, e))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::extraction(
            format,
            format!(
                "ZIP entry {} exceeds size limit ({} bytes)",
                name, MAX_XML_ENTRY_BYTES
            ),
        ));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes, "docx")?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", "docx")?;
    collect_text_runs(&xml, b"p", "docx")
}

/// Concatenate the text of every `<t>` element, one line per
/// `paragraph` element.
fn collect_text_runs(
    xml: &[u8],
    paragraph: &[u8],
    format: &'static str,
) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::extraction(format, e))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_t = false;
                } else if name.as_ref() == paragraph && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::extraction(format, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes, "pptx")?;
    let slides = numbered_entries(&archive, "ppt/slides/slide");
    let mut out = String::new();
    for name in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, "pptx")?;
        let text = collect_text_runs(&xml, b"p", "pptx")?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

// ============ Spreadsheets ============

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes, "xlsx")?;
    let shared_strings = if archive.by_name("xl/sharedStrings.xml").is_ok() {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheet_titles = if archive.by_name("xl/workbook.xml").is_ok() {
        read_sheet_titles(&mut archive)?
    } else {
        Vec::new()
    };
    let sheets = numbered_entries(&archive, "xl/worksheets/sheet");

    let mut out = String::new();
    for (idx, name) in sheets.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
        let title = sheet_titles
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        let xml = read_zip_entry_bounded(&mut archive, &name, "xlsx")?;
        let rows = read_sheet_rows(&xml, &shared_strings)?;

        out.push_str(&format!("=== Sheet: {} ===\n", title));
        for (row_number, cells) in rows {
            if cells.iter().any(|c| !c.is_empty()) {
                out.push_str(&format!("Row {}: {}\n", row_number, cells.join(" | ")));
            }
        }
        out.push('\n');
    }
    Ok(out.trim_end().to_string())
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", "xlsx")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    let text = te
                        .unescape()
                        .map_err(|e| ExtractError::extraction("xlsx", e))?;
                    s.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::extraction("xlsx", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn read_sheet_titles(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml", "xlsx")?;
    let mut titles = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                if let Some(attr) = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"name")
                {
                    let value = attr
                        .unescape_value()
                        .map_err(|e| ExtractError::extraction("xlsx", e))?;
                    titles.push(value.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::extraction("xlsx", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(titles)
}

#[derive(PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

/// Rows as `(row number, cell texts)` in sheet order.
fn read_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Vec<(usize, Vec<String>)>, ExtractError> {
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut kind = CellKind::Value;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    let number = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"r")
                        .and_then(|a| std::str::from_utf8(&a.value).ok()?.parse::<usize>().ok())
                        .unwrap_or(rows.len() + 1);
                    rows.push((number, Vec::new()));
                }
                b"c" => {
                    let t = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned());
                    kind = match t.as_deref() {
                        Some(b"s") => CellKind::Shared,
                        Some(b"inlineStr") => CellKind::Inline,
                        _ => CellKind::Value,
                    };
                    if let Some((_, cells)) = rows.last_mut() {
                        cells.push(String::new());
                    }
                    cell_count += 1;
                }
                b"v" => in_value = true,
                b"t" if kind == CellKind::Inline => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te
                    .unescape()
                    .map_err(|e| ExtractError::extraction("xlsx", e))?;
                let text = match kind {
                    CellKind::Shared => raw
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default(),
                    _ => raw.trim().to_string(),
                };
                if let Some(cell) = rows.last_mut().and_then(|(_, cells)| cells.last_mut()) {
                    cell.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => kind = CellKind::Value,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::extraction("xlsx", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn format_csv(text: &str) -> String {
    let mut out = String::from("=== CSV Data ===\n");
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<String> = line
            .split(',')
            .map(|col| col.trim().replace('"', ""))
            .collect();
        out.push_str(&format!("Row {}: {}\n", idx + 1, columns.join(" | ")));
    }
    out
}

// ============ Structured text ============

/// Render JSON as indented `key: value` lines. Unparseable input is
/// returned as-is.
fn format_json(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => {
            let mut out = String::new();
            render_json(&value, "", &mut out);
            out
        }
        Err(_) => text.to_string(),
    }
}

fn render_json(value: &serde_json::Value, prefix: &str, out: &mut String) {
    let nested = format!("{}  ", prefix);
    match value {
        serde_json::Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                out.push_str(&format!("{}[{}]: ", prefix, idx));
                render_json_inline(item, &nested, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                out.push_str(&format!("{}{}: ", prefix, key));
                render_json_inline(item, &nested, out);
            }
        }
        scalar => out.push_str(&scalar_text(scalar)),
    }
}

fn render_json_inline(value: &serde_json::Value, prefix: &str, out: &mut String) {
    if value.is_array() || value.is_object() {
        out.push('\n');
        render_json(value, prefix, out);
    } else {
        out.push_str(&scalar_text(value));
        out.push('\n');
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep only character data, one space between text nodes.
fn extract_xml_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut parts: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(te)) => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::extraction("xml", e))?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Ok(Event::CData(cd)) => {
                let text = String::from_utf8_lossy(&cd).trim().to_string();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::extraction("xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_lists_supported() {
        let err = extract_text(b"foo", "image/png").unwrap_err();
        match err {
            ExtractError::UnsupportedFormat { mime, supported } => {
                assert_eq!(mime, "image/png");
                assert!(supported.contains(MIME_PDF));
                assert!(supported.contains(MIME_CSV));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Extraction { format: "pdf", .. }));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Extraction { format: "docx", .. }));
    }

    #[test]
    fn plain_text_passes_through_and_ignores_charset() {
        let text = extract_text("\u{feff}hello\nworld".as_bytes(), "text/plain; charset=utf-8")
            .unwrap();
        assert_eq!(text, "hello\nworld");
    }

    #[test]
    fn csv_rows_are_labelled() {
        let text = extract_text(b"name,days\n\"alice\",15\n\nbob,20\n", MIME_CSV).unwrap();
        assert_eq!(
            text,
            "=== CSV Data ===\nRow 1: name | days\nRow 2: alice | 15\nRow 4: bob | 20\n"
        );
    }

    #[test]
    fn json_is_rendered_as_key_value_lines() {
        let text = extract_text(br#"{"policy": {"days": 15, "carry": [1, 2]}}"#, MIME_JSON)
            .unwrap();
        assert!(text.contains("policy: \n"), "{}", text);
        assert!(text.contains("  carry: \n    [0]: 1\n    [1]: 2\n"), "{}", text);
        assert!(text.contains("  days: 15\n"), "{}", text);
    }

    #[test]
    fn invalid_json_falls_back_to_raw() {
        let raw = "{not json";
        assert_eq!(extract_text(raw.as_bytes(), MIME_JSON).unwrap(), raw);
    }

    #[test]
    fn xml_tags_are_stripped() {
        let xml = br#"<?xml version="1.0"?><policy><days>15</days><note>per &amp; year</note></policy>"#;
        assert_eq!(extract_text(xml, MIME_XML).unwrap(), "15 per & year");
    }

    #[test]
    fn mime_is_inferred_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/Report.PDF")), Some(MIME_PDF));
        assert_eq!(mime_for_path(Path::new("notes.md")), Some(MIME_MARKDOWN));
        assert_eq!(mime_for_path(Path::new("photo.png")), None);
        assert_eq!(mime_for_path(Path::new("README")), None);
    }

    #[test]
    fn supported_listing_is_consistent() {
        for mime in supported_types() {
            assert!(is_supported(&mime));
        }
        assert!(supported_extensions().contains(&".docx".to_string()));
        assert!(!is_supported("application/msword"));
    }
}
