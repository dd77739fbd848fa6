//! Document loading from a source directory.
//!
//! Recognized files:
//! - `.txt`: one document per file
//! - `.csv`: one document per data row, rendered as `header: value` lines
//! - `.pdf`: one document per page with extractable text
//!
//! Anything else is skipped. A recognized file that fails to parse is
//! recorded as a load failure and the walk continues.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Csv,
    Txt,
}

impl FileType {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileType::Pdf),
            "csv" => Some(FileType::Csv),
            "txt" => Some(FileType::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Csv => "csv",
            FileType::Txt => "txt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pdf" => Some(FileType::Pdf),
            "csv" => Some(FileType::Csv),
            "txt" => Some(FileType::Txt),
            _ => None,
        }
    }
}

/// Raw text segment with provenance. Discarded after chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Path relative to the source directory, used for citations.
    pub source: String,
    pub file_type: FileType,
    pub content: String,
    /// 1-based PDF page.
    pub page: Option<u32>,
    /// 0-based CSV data row.
    pub row: Option<u64>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub files_loaded: usize,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<RagError>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Walks `dir` recursively in file-name order.
    pub fn load_dir(&self, dir: &Path) -> LoadReport {
        let mut report = LoadReport::default();

        if !dir.is_dir() {
            report
                .failures
                .push(RagError::load(dir, "source directory does not exist"));
            return report;
        }

        let walker = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    tracing::warn!(path = %path.display(), error = %err, "failed to read directory entry");
                    report.failures.push(RagError::load(path, err));
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(file_type) = FileType::from_path(path) else {
                tracing::debug!(path = %path.display(), "skipping unsupported file");
                report.skipped.push(path.to_path_buf());
                continue;
            };

            let source = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            match self.load_file(path, &source, file_type) {
                Ok(documents) => {
                    tracing::debug!(path = %path.display(), documents = documents.len(), "loaded file");
                    report.files_loaded += 1;
                    report.documents.extend(documents);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                    report.failures.push(err);
                }
            }
        }

        report
    }

    pub fn load_file(
        &self,
        path: &Path,
        source: &str,
        file_type: FileType,
    ) -> Result<Vec<Document>, RagError> {
        let documents = match file_type {
            FileType::Txt => load_txt(path, source)?,
            FileType::Csv => load_csv(path, source)?,
            FileType::Pdf => load_pdf(path, source)?,
        };

        Ok(documents
            .into_iter()
            .filter(|doc| !doc.content.trim().is_empty())
            .collect())
    }
}

fn load_txt(path: &Path, source: &str) -> Result<Vec<Document>, RagError> {
    let bytes = fs::read(path).map_err(|e| RagError::load(path, e))?;
    let content = String::from_utf8(bytes).map_err(|e| RagError::load(path, e))?;
    let content = content.trim_start_matches('\u{feff}').to_string();

    Ok(vec![Document {
        source: source.to_string(),
        file_type: FileType::Txt,
        content,
        page: None,
        row: None,
    }])
}

fn load_csv(path: &Path, source: &str) -> Result<Vec<Document>, RagError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| RagError::load(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| RagError::load(path, e))?
        .clone();
    if headers.is_empty() {
        return Err(RagError::load(path, "missing header row"));
    }

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RagError::load(path, e))?;
        let content = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| format!("{}: {}", header.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        documents.push(Document {
            source: source.to_string(),
            file_type: FileType::Csv,
            content,
            page: None,
            row: Some(row as u64),
        });
    }

    Ok(documents)
}

fn load_pdf(path: &Path, source: &str) -> Result<Vec<Document>, RagError> {
    let pdf = lopdf::Document::load(path).map_err(|e| RagError::load(path, e))?;
    if pdf.is_encrypted() {
        return Err(RagError::load(path, "encrypted PDFs are not supported"));
    }

    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(RagError::load(path, "PDF has no pages"));
    }

    let mut documents = Vec::new();
    let mut failed_pages = 0usize;
    for page_number in pages.keys().copied() {
        match pdf.extract_text(&[page_number]) {
            Ok(text) => documents.push(Document {
                source: source.to_string(),
                file_type: FileType::Pdf,
                content: text,
                page: Some(page_number),
                row: None,
            }),
            Err(err) => {
                tracing::debug!(path = %path.display(), page = page_number, error = %err, "no text on page");
                failed_pages += 1;
            }
        }
    }

    if failed_pages == pages.len() {
        return Err(RagError::load(path, "no extractable text on any page"));
    }

    Ok(documents)
}
