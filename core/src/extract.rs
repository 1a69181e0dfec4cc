use anyhow::{bail, Context, Result};
use encoding_rs::{EUC_KR, WINDOWS_1252};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Semantic file category, classified from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Word,
    Excel,
    PowerPoint,
    Image,
    Text,
    Unknown,
}

impl FileType {
    pub fn from_path(path: &Path) -> FileType {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => FileType::Pdf,
            Some("ppt" | "pptx") => FileType::PowerPoint,
            Some("xls" | "xlsx" | "xlsm") => FileType::Excel,
            Some("doc" | "docx") => FileType::Word,
            Some("jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "svg") => FileType::Image,
            Some("txt" | "md" | "log") => FileType::Text,
            _ => FileType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Word => "word",
            FileType::Excel => "excel",
            FileType::PowerPoint => "powerpoint",
            FileType::Image => "image",
            FileType::Text => "text",
            FileType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic metadata about a file, independent of its content.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub file_type: FileType,
    pub size_mb: f64,
    pub supported: bool,
}

/// Capability for turning a raw file into plain text plus basic metadata.
///
/// Implementations are injected into the indexing orchestrator; workers call
/// them concurrently, so they must be `Send + Sync`.
pub trait TextExtractor: Send + Sync {
    fn file_type(&self, path: &Path) -> FileType;

    fn is_supported(&self, path: &Path) -> bool {
        self.file_type(path) != FileType::Unknown
    }

    fn file_info(&self, path: &Path) -> Result<FileInfo>;

    fn extract_text(&self, path: &Path) -> Result<String>;
}

/// Default extractor covering the document families the viewer supports.
///
/// Plain text is read directly with encoding fallbacks, PDF goes through
/// `pdf-extract`, and the OOXML formats (docx/pptx) are unpacked from their
/// ZIP containers and stripped down to their text runs. Spreadsheets and
/// images are classified but refuse text extraction.
pub struct DocumentExtractor {
    max_text_size_mb: u64,
}

impl DocumentExtractor {
    pub fn new(max_text_size_mb: u64) -> Self {
        Self { max_text_size_mb }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(crate::config::SearchSettings::default().max_file_size_mb)
    }
}

impl TextExtractor for DocumentExtractor {
    fn file_type(&self, path: &Path) -> FileType {
        FileType::from_path(path)
    }

    fn file_info(&self, path: &Path) -> Result<FileInfo> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("stat failed: {}", path.display()))?;
        let file_type = self.file_type(path);
        let size_mb = (meta.len() as f64) / (1024.0 * 1024.0);
        Ok(FileInfo {
            file_type,
            size_mb: (size_mb * 100.0).round() / 100.0,
            supported: file_type != FileType::Unknown,
        })
    }

    fn extract_text(&self, path: &Path) -> Result<String> {
        match self.file_type(path) {
            FileType::Text => read_text_file(path, self.max_text_size_mb),
            FileType::Pdf => pdf_extract::extract_text(path)
                .with_context(|| format!("pdf extraction failed: {}", path.display())),
            FileType::Word => extract_docx(path),
            FileType::PowerPoint => extract_pptx(path),
            FileType::Excel => bail!("spreadsheets are not extracted as text"),
            FileType::Image => bail!("images carry no extractable text"),
            FileType::Unknown => bail!("unsupported file format: {}", path.display()),
        }
    }
}

/// Read a plain text file, trying UTF-8 first and falling back to EUC-KR and
/// Windows-1252 for legacy documents.
fn read_text_file(path: &Path, max_size_mb: u64) -> Result<String> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("stat failed: {}", path.display()))?;
    let max_bytes = max_size_mb * 1024 * 1024;
    if meta.len() > max_bytes {
        bail!(
            "file too large ({:.1} MB, limit {} MB): {}",
            meta.len() as f64 / (1024.0 * 1024.0),
            max_size_mb,
            path.display()
        );
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("read failed: {}", path.display()))?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            let bytes = err.into_bytes();
            let (decoded, _, had_errors) = EUC_KR.decode(&bytes);
            if !had_errors {
                return Ok(decoded.into_owned());
            }
            // Windows-1252 accepts any byte sequence, so this always succeeds.
            let (decoded, _, _) = WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Pull the text runs out of a docx body (`word/document.xml`).
fn extract_docx(path: &Path) -> Result<String> {
    if path.extension().and_then(|e| e.to_str()) == Some("doc") {
        bail!("legacy .doc format is not supported: {}", path.display());
    }
    let file = File::open(path)
        .with_context(|| format!("open failed: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("not a docx container: {}", path.display()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .with_context(|| format!("docx body missing: {}", path.display()))?
        .read_to_string(&mut xml)?;
    collect_runs(&xml, b"w:t", b"w:p")
}

/// Pull the text runs out of every slide of a pptx, in slide order.
fn extract_pptx(path: &Path) -> Result<String> {
    if path.extension().and_then(|e| e.to_str()) == Some("ppt") {
        bail!("legacy .ppt format is not supported: {}", path.display());
    }
    let file = File::open(path)
        .with_context(|| format!("open failed: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("not a pptx container: {}", path.display()))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_by_key(|(n, _)| *n);

    let mut out = String::new();
    for (_, name) in slides {
        let mut xml = String::new();
        archive.by_name(&name)?.read_to_string(&mut xml)?;
        let text = collect_runs(&xml, b"a:t", b"a:p")?;
        if !text.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text.trim_end());
            out.push('\n');
        }
    }
    Ok(out)
}

fn slide_number(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("ppt/slides/slide")?;
    rest.strip_suffix(".xml")?.parse().ok()
}

/// Stream an OOXML part and concatenate the contents of `text_tag` elements,
/// breaking lines at the end of each `para_tag` element.
fn collect_runs(xml: &str, text_tag: &[u8], para_tag: &[u8]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader
            .read_event()
            .context("malformed document xml")?
        {
            Event::Start(e) if e.name().as_ref() == text_tag => in_text = true,
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == text_tag {
                    in_text = false;
                } else if name.as_ref() == para_tag {
                    out.push('\n');
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"w:br" => out.push('\n'),
            Event::Empty(e) if e.name().as_ref() == b"w:tab" => out.push('\t'),
            Event::Text(t) if in_text => out.push_str(&t.unescape().context("bad entity in document xml")?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}
