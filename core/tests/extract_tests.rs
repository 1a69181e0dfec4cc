use docfind_core::{DocumentExtractor, FileType, TextExtractor};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

fn write_zip(path: &Path, parts: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in parts {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn plain_text_utf8() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("memo.txt");
    fs::write(&file, "hello 한글 world").unwrap();

    let extractor = DocumentExtractor::default();
    assert_eq!(extractor.file_type(&file), FileType::Text);
    assert_eq!(extractor.extract_text(&file).unwrap(), "hello 한글 world");
}

#[test]
fn plain_text_euc_kr_fallback() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("legacy.txt");
    // "한글" encoded as EUC-KR.
    fs::write(&file, [0xC7u8, 0xD1, 0xB1, 0xDB]).unwrap();

    let extractor = DocumentExtractor::default();
    assert_eq!(extractor.extract_text(&file).unwrap(), "한글");
}

#[test]
fn oversized_text_file_is_refused() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("big.log");
    fs::write(&file, "tiny but over a zero-MB limit").unwrap();

    let extractor = DocumentExtractor::new(0);
    let err = extractor.extract_text(&file).unwrap_err();
    assert!(err.to_string().contains("too large"));
}

#[test]
fn file_info_reports_size_and_support() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("memo.txt");
    fs::write(&file, "0123456789").unwrap();

    let extractor = DocumentExtractor::default();
    let info = extractor.file_info(&file).unwrap();
    assert!(info.supported);
    assert_eq!(info.file_type, FileType::Text);
    assert!(info.size_mb >= 0.0);

    let odd = dir.path().join("blob.bin");
    fs::write(&odd, "x").unwrap();
    let info = extractor.file_info(&odd).unwrap();
    assert!(!info.supported);
    assert_eq!(info.file_type, FileType::Unknown);
}

#[test]
fn docx_text_runs_are_extracted() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("minutes.docx");
    write_zip(
        &file,
        &[(
            "word/document.xml",
            r#"<?xml version="1.0"?><w:document><w:body>
                <w:p><w:r><w:t>Meeting minutes</w:t></w:r></w:p>
                <w:p><w:r><w:t>Action</w:t></w:r><w:r><w:t> items follow</w:t></w:r></w:p>
            </w:body></w:document>"#,
        )],
    );

    let extractor = DocumentExtractor::default();
    assert_eq!(extractor.file_type(&file), FileType::Word);
    let text = extractor.extract_text(&file).unwrap();
    assert!(text.contains("Meeting minutes"));
    assert!(text.contains("Action items follow"));
}

#[test]
fn pptx_slides_come_out_in_order() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("deck.pptx");
    write_zip(
        &file,
        &[
            (
                "ppt/slides/slide2.xml",
                r#"<p:sld><p:txBody><a:p><a:r><a:t>second slide</a:t></a:r></a:p></p:txBody></p:sld>"#,
            ),
            (
                "ppt/slides/slide1.xml",
                r#"<p:sld><p:txBody><a:p><a:r><a:t>first slide</a:t></a:r></a:p></p:txBody></p:sld>"#,
            ),
        ],
    );

    let extractor = DocumentExtractor::default();
    assert_eq!(extractor.file_type(&file), FileType::PowerPoint);
    let text = extractor.extract_text(&file).unwrap();
    let first = text.find("first slide").unwrap();
    let second = text.find("second slide").unwrap();
    assert!(first < second);
}

#[test]
fn corrupt_docx_reports_an_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("broken.docx");
    fs::write(&file, "this is not a zip archive").unwrap();

    let extractor = DocumentExtractor::default();
    assert!(extractor.extract_text(&file).is_err());
}

#[test]
fn images_and_spreadsheets_refuse_extraction() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("photo.png");
    let sheet = dir.path().join("data.xlsx");
    fs::write(&image, "png").unwrap();
    fs::write(&sheet, "xlsx").unwrap();

    let extractor = DocumentExtractor::default();
    assert!(extractor.is_supported(&image));
    assert!(extractor.is_supported(&sheet));
    assert!(extractor.extract_text(&image).is_err());
    assert!(extractor.extract_text(&sheet).is_err());
}
