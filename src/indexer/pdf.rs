use std::path::Path;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RagError;

/// Text of one PDF page. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// Extracts the text of every page of a PDF file.
///
/// Image-only pages come back with empty text rather than failing the whole
/// document; a page whose content stream cannot be decoded is logged and
/// returned empty as well.
pub fn extract_pages<P: AsRef<Path>>(path: P) -> Result<Vec<Page>, RagError> {
    let path = path.as_ref();
    info!("Extracting text from {}", path.display());

    let document = Document::load(path)
        .map_err(|e| RagError::Pdf(format!("{}: {e}", path.display())))?;
    let pages = pages_from_document(&document);

    info!(
        "Extracted text from {} pages ({} with text)",
        pages.len(),
        pages.iter().filter(|p| !p.text.trim().is_empty()).count()
    );
    Ok(pages)
}

/// Same as [`extract_pages`] for a PDF already held in memory.
pub fn extract_pages_from_bytes(bytes: &[u8]) -> Result<Vec<Page>, RagError> {
    let document = Document::load_mem(bytes).map_err(|e| RagError::Pdf(e.to_string()))?;
    let pages = pages_from_document(&document);
    info!("Extracted text from {} in-memory pages", pages.len());
    Ok(pages)
}

fn pages_from_document(document: &Document) -> Vec<Page> {
    document
        .get_pages()
        .keys()
        .map(|&page_number| {
            let text = match document.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Could not extract text from page {page_number}: {e}");
                    String::new()
                }
            };
            Page { page_number, text }
        })
        .collect()
}
