//! Extraction of the zipped office formats, built in memory with `zip`.

use std::io::Write;
use std::path::Path;

use docqa::error::ExtractError;
use docqa::extract::{extract_text, mime_for_path, MIME_DOCX, MIME_PPTX, MIME_XLSX};

fn zip_of(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    zip_of(&[("word/document.xml", xml)])
}

fn slide(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
        text
    )
}

fn xlsx_fixture() -> Vec<u8> {
    let shared = "<?xml version=\"1.0\"?><sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><si><t>Name</t></si><si><t>Days</t></si><si><t>Alice</t></si></sst>".to_string();
    let workbook = "<?xml version=\"1.0\"?><workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheets><sheet name=\"Leave\" sheetId=\"1\"/></sheets></workbook>".to_string();
    let sheet = "<?xml version=\"1.0\"?><worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData><row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row><row r=\"2\"><c r=\"A2\" t=\"s\"><v>2</v></c><c r=\"B2\"><v>15</v></c></row></sheetData></worksheet>".to_string();
    zip_of(&[
        ("xl/sharedStrings.xml", shared),
        ("xl/workbook.xml", workbook),
        ("xl/worksheets/sheet1.xml", sheet),
    ])
}

#[test]
fn docx_paragraphs_become_lines() {
    let bytes = docx_with_paragraphs(&["Vacation policy", "15 days &amp; more"]);
    let text = extract_text(&bytes, MIME_DOCX).unwrap();
    assert_eq!(text, "Vacation policy\n15 days & more");
}

#[test]
fn pptx_slides_follow_numeric_order() {
    let bytes = zip_of(&[
        ("ppt/slides/slide10.xml", slide("tenth")),
        ("ppt/slides/slide2.xml", slide("second")),
        ("ppt/slides/slide1.xml", slide("first")),
    ]);
    let text = extract_text(&bytes, MIME_PPTX).unwrap();
    assert_eq!(text, "first\nsecond\ntenth");
}

#[test]
fn xlsx_rows_resolve_shared_strings() {
    let text = extract_text(&xlsx_fixture(), MIME_XLSX).unwrap();
    assert!(text.starts_with("=== Sheet: Leave ==="), "{}", text);
    assert!(text.contains("Row 1: Name | Days"), "{}", text);
    assert!(text.contains("Row 2: Alice | 15"), "{}", text);
}

#[test]
fn mime_parameters_are_ignored() {
    let bytes = docx_with_paragraphs(&["hello"]);
    let mime = format!("{}; charset=binary", MIME_DOCX.to_uppercase());
    assert_eq!(extract_text(&bytes, &mime).unwrap(), "hello");
}

#[test]
fn corrupt_archive_is_an_extraction_error() {
    let err = extract_text(b"not a zip file", MIME_DOCX).unwrap_err();
    match err {
        ExtractError::Extraction { format, .. } => assert_eq!(format, "docx"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn docx_without_document_part_fails() {
    let bytes = zip_of(&[("word/styles.xml", "<styles/>".to_string())]);
    assert!(matches!(
        extract_text(&bytes, MIME_DOCX),
        Err(ExtractError::Extraction { .. })
    ));
}

#[test]
fn unknown_mime_lists_supported_types() {
    let err = extract_text(b"GIF89a", "image/gif").unwrap_err();
    match err {
        ExtractError::UnsupportedFormat { mime, supported } => {
            assert_eq!(mime, "image/gif");
            assert!(supported.contains(MIME_XLSX));
            assert!(supported.contains("text/plain"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn extensions_map_to_mime_types() {
    assert_eq!(mime_for_path(Path::new("Handbook.DOCX")), Some(MIME_DOCX));
    assert_eq!(mime_for_path(Path::new("deck.pptx")), Some(MIME_PPTX));
    assert_eq!(mime_for_path(Path::new("notes.md")), Some("text/markdown"));
    assert_eq!(mime_for_path(Path::new("photo.png")), None);
    assert_eq!(mime_for_path(Path::new("README")), None);
}
