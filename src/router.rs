// src/router.rs

use crate::error::ExtractError;
use tracing::{info, warn};

/// Minimum trimmed text-layer length for a PDF to skip the OCR pipeline.
/// Cheap heuristic; no other signal (fonts, embedded images) is consulted.
const MIN_TEXT_LAYER_CHARS: usize = 150;

/// Pipeline selected for an uploaded document.
#[derive(Debug)]
pub enum RoutedDocument {
    /// The PDF carries a machine-readable text layer; extraction can run
    /// directly on this text.
    Text(String),
    /// A directly uploaded image, used as the sole OCR page.
    ImagePage,
    /// A PDF presumed scanned/image-based; pages must be rendered and
    /// transcribed.
    ScannedPdf,
}

/// Classify raw bytes by declared mime type and pick a pipeline.
pub fn route(bytes: &[u8], mime_type: &str) -> Result<RoutedDocument, ExtractError> {
    if mime_type.starts_with("image/") {
        info!(mime = %mime_type, "Routing image upload straight to OCR");
        return Ok(RoutedDocument::ImagePage);
    }

    if mime_type == "application/pdf" {
        return Ok(probe_pdf_text_layer(bytes));
    }

    Err(ExtractError::UnsupportedFormat(mime_type.to_string()))
}

/// Attempt text-layer extraction; anything short or broken is presumed a
/// scanned document and handed to the OCR pipeline.
fn probe_pdf_text_layer(bytes: &[u8]) -> RoutedDocument {
    // pdf-extract (via its font handling) can panic on malformed glyph
    // data, so the probe is wrapped in catch_unwind.
    let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));

    match extracted {
        Ok(Ok(text)) => {
            if has_text_layer(&text) {
                info!(chars = text.trim().chars().count(), "PDF text layer found, using text pipeline");
                RoutedDocument::Text(text)
            } else {
                info!(
                    chars = text.trim().chars().count(),
                    "Extracted text too short, treating PDF as scanned"
                );
                RoutedDocument::ScannedPdf
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "pdf-extract failed, treating PDF as scanned");
            RoutedDocument::ScannedPdf
        }
        Err(_) => {
            warn!("pdf-extract panicked, treating PDF as scanned");
            RoutedDocument::ScannedPdf
        }
    }
}

/// True when the trimmed text layer is long enough to trust.
fn has_text_layer(text: &str) -> bool {
    text.trim().chars().count() > MIN_TEXT_LAYER_CHARS
}
