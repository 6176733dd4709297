use crate::error::{RagError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Extensions accepted by the loader. `.doc` passes the check but has no extractor.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = [".pdf", ".docx", ".doc", ".txt"];

/// Container formats the loader can extract text from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Derive the format from the path component of a document locator
    pub fn from_locator(locator: &str) -> Result<Self> {
        let extension = locator_extension(locator);

        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(RagError::UnsupportedFormat(extension));
        }

        match extension.as_str() {
            ".pdf" => Ok(DocumentFormat::Pdf),
            ".docx" => Ok(DocumentFormat::Docx),
            ".txt" => Ok(DocumentFormat::Txt),
            _ => Err(RagError::UnsupportedFormat(extension)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain text extracted from a fetched document
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub format: DocumentFormat,
    /// Size of the raw downloaded content
    pub byte_length: usize,
}

/// Source of document text for the indexing pipeline
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, reference: &str) -> Result<ExtractedDocument>;
}

/// Loader that downloads documents over HTTP(S)
pub struct HttpDocumentLoader {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpDocumentLoader {
    /// Create a new loader with a bounded fetch timeout and document size
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Fetch {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(HttpDocumentLoader { client, max_bytes })
    }

    /// Download the raw bytes behind a document URL
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |message: String| RagError::Fetch {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP status {}", response.status())));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_bytes {
                return Err(RagError::DocumentTooLarge {
                    size: length as usize,
                    limit: self.max_bytes,
                });
            }
        }

        // Without a declared length, stop reading as soon as the limit is crossed
        let mut content = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
        {
            content.extend_from_slice(&chunk);
            if content.len() > self.max_bytes {
                return Err(RagError::DocumentTooLarge {
                    size: content.len(),
                    limit: self.max_bytes,
                });
            }
        }

        Ok(content)
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn load(&self, reference: &str) -> Result<ExtractedDocument> {
        // Reject unsupported locators before spending a download on them
        let format = DocumentFormat::from_locator(reference)?;
        debug!("Detected document format: {}", format);

        let content = self.download(reference).await?;
        info!("Downloaded {} bytes from {}", content.len(), reference);

        let text = extract_text(&content, format)?;
        if text.trim().is_empty() {
            warn!("Extracted {} content is empty or contains only whitespace", format);
        }

        Ok(ExtractedDocument {
            text,
            format,
            byte_length: content.len(),
        })
    }
}

/// Extract plain text from raw document bytes
pub fn extract_text(content: &[u8], format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Pdf => extract_pdf(content),
        DocumentFormat::Docx => extract_docx(content),
        DocumentFormat::Txt => Ok(decode_text(content)),
    }
}

fn extract_pdf(content: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(content).map_err(|e| {
        RagError::Extraction {
            format: DocumentFormat::Pdf.to_string(),
            message: e.to_string(),
        }
    })?;

    debug!("Extracted {} PDF pages", pages.len());
    Ok(pages.join("\n").trim().to_string())
}

fn extract_docx(content: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(content).map_err(|e| RagError::Extraction {
        format: DocumentFormat::Docx.to_string(),
        message: e.to_string(),
    })?;

    // Only top-level body paragraphs carry text; tables and other blocks are skipped
    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
            _ => None,
        })
        .collect();

    Ok(paragraphs.join("\n").trim().to_string())
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    push_paragraph_children(&paragraph.children, &mut text);
    text
}

// Tabs and breaks keep their whitespace so adjacent words stay separate tokens
fn push_paragraph_children(children: &[docx_rs::ParagraphChild], text: &mut String) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                        docx_rs::RunChild::Tab(_) => text.push('\t'),
                        docx_rs::RunChild::Break(_) => text.push('\n'),
                        _ => {}
                    }
                }
            }
            docx_rs::ParagraphChild::Hyperlink(link) => {
                push_paragraph_children(&link.children, text)
            }
            _ => {}
        }
    }
}

/// Decode as UTF-8, falling back to Latin-1 which accepts every byte sequence
fn decode_text(content: &[u8]) -> String {
    match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("Content is not valid UTF-8, decoding as Latin-1");
            content.iter().map(|&b| b as char).collect()
        }
    }
}

/// Lower-cased extension (with leading dot) of the locator's path, ignoring query and fragment
fn locator_extension(locator: &str) -> String {
    let path = locator.split(['?', '#']).next().unwrap_or_default();

    // Drop the scheme and authority so a bare host never looks like a file name
    let path = match path.find("://") {
        Some(pos) => {
            let rest = &path[pos + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("")
        }
        None => path,
    };

    let file_name = path.rsplit('/').next().unwrap_or_default();
    match file_name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < file_name.len() => file_name[dot..].to_lowercase(),
        _ => String::new(),
    }
}
