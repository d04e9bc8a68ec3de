//! Document records and file type classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File type classification sent to the document registrar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Word,
    Text,
    Markdown,
    Spreadsheet,
    Presentation,
    Other,
}

impl DocumentKind {
    /// Classify a file by content type, falling back to its extension.
    pub fn classify(name: &str, content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/pdf" => return DocumentKind::Pdf,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                return DocumentKind::Word
            }
            "text/markdown" | "text/x-markdown" => return DocumentKind::Markdown,
            "text/csv"
            | "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                return DocumentKind::Spreadsheet
            }
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                return DocumentKind::Presentation
            }
            "text/plain" => return DocumentKind::Text,
            _ => {}
        }

        match extension(name).as_deref() {
            Some("pdf") => DocumentKind::Pdf,
            Some("doc" | "docx") => DocumentKind::Word,
            Some("md" | "markdown") => DocumentKind::Markdown,
            Some("csv" | "xls" | "xlsx") => DocumentKind::Spreadsheet,
            Some("ppt" | "pptx") => DocumentKind::Presentation,
            Some("txt") => DocumentKind::Text,
            _ => DocumentKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Word => "word",
            DocumentKind::Text => "text",
            DocumentKind::Markdown => "markdown",
            DocumentKind::Spreadsheet => "spreadsheet",
            DocumentKind::Presentation => "presentation",
            DocumentKind::Other => "other",
        }
    }
}

/// Guess a content type from a file name's extension
pub fn guess_content_type(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("csv") => "text/csv",
        Some("md" | "markdown") => "text/markdown",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Metadata handed to the document registrar after a successful transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRegistration {
    #[serde(skip)]
    pub knowledge_base_id: String,
    pub name: String,
    pub url: String,
    pub file_type: DocumentKind,
    pub size: u64,
}

/// Persisted document record returned by the registrar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    pub url: String,
    pub file_type: DocumentKind,
    pub size: u64,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
