// src/ocr.rs

use crate::client::{ChatRequest, LlmClient};
use crate::error::ExtractError;
use base64::Engine as _;
use image::ImageFormat;
use std::io::Cursor;
use tracing::{debug, info};

/// Scanned PDFs are capped at this many leading pages before transcription.
pub const MAX_OCR_PAGES: usize = 3;

/// Fixed upscale applied to page dimensions when rendering, so small print
/// stays legible to the vision model.
const RENDER_SCALE: f32 = 2.0;

/// Transcripts shorter than this are treated as unreadable input.
const MIN_TRANSCRIPT_CHARS: usize = 20;

/// Response token cap for the transcription call.
const TRANSCRIBE_MAX_TOKENS: u32 = 4096;

const TRANSCRIBE_INSTRUCTION: &str = "\
Transcribe everything visible in these document images verbatim, in reading \
order across all pages. Include every heading, table cell, number, code, and \
footer exactly as printed. Do not summarize, interpret, or omit anything. \
Output plain text only, no commentary.";

/// Renders the leading pages of a PDF to PNG bytes.
///
/// Trait seam so the pipeline and its tests run without the native PDFium
/// library.
pub trait PageRenderer: Send + Sync {
    /// Render at most `max_pages` pages, in document order.
    fn render_pages(&self, pdf_bytes: &[u8], max_pages: usize) -> Result<Vec<Vec<u8>>, ExtractError>;
}

/// Production renderer backed by Google PDFium.
///
/// Stateless: a fresh `Pdfium` handle is loaded per call because the
/// upstream type is `!Send`; the OS caches the dynamic library, so repeat
/// loads are near-free.
pub struct PdfiumRenderer;

impl PageRenderer for PdfiumRenderer {
    fn render_pages(&self, pdf_bytes: &[u8], max_pages: usize) -> Result<Vec<Vec<u8>>, ExtractError> {
        use pdfium_render::prelude::*;

        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(|e| ExtractError::PdfRender(format!("failed to load PDF: {e}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        let wanted = total.min(max_pages);
        let mut rendered = Vec::with_capacity(wanted);

        for index in 0..wanted {
            let page = pages
                .get(index as u16)
                .map_err(|e| ExtractError::PdfRender(format!("failed to open page {index}: {e}")))?;

            let width = (page.width().value * RENDER_SCALE) as i32;
            let height = (page.height().value * RENDER_SCALE) as i32;
            let config = PdfRenderConfig::new()
                .set_target_width(width)
                .set_maximum_height(height);

            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| ExtractError::PdfRender(format!("rendering page {index} failed: {e}")))?;

            let mut buffer = Cursor::new(Vec::new());
            bitmap
                .as_image()
                .write_to(&mut buffer, ImageFormat::Png)
                .map_err(|e| ExtractError::ImageEncoding(e.to_string()))?;

            debug!(page = index, bytes = buffer.get_ref().len(), "Rendered PDF page");
            rendered.push(buffer.into_inner());
        }

        info!(total_pages = total, rendered = rendered.len(), "PDF pages rendered for OCR");
        Ok(rendered)
    }
}

/// Load the PDFium dynamic library: `PDFIUM_DYNAMIC_LIB_PATH` first, then
/// the system search paths.
fn load_pdfium() -> Result<pdfium_render::prelude::Pdfium, ExtractError> {
    use pdfium_render::prelude::*;

    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractError::PdfRender(format!("failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractError::PdfRender(format!(
            "PDFium library not found; set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Bundle every page image into ONE vision request and return the single
/// text blob covering the whole document.
pub async fn transcribe_pages(
    client: &dyn LlmClient,
    credential: &str,
    model: &str,
    pages: &[Vec<u8>],
) -> Result<String, ExtractError> {
    let image_urls: Vec<String> = pages.iter().map(|bytes| to_data_url(bytes)).collect();

    info!(pages = image_urls.len(), model = %model, "Sending transcription request");
    let request = ChatRequest::with_images(model, TRANSCRIBE_INSTRUCTION, image_urls, TRANSCRIBE_MAX_TOKENS);
    let transcript = client.chat(credential, &request).await?;

    let chars = transcript.trim().chars().count();
    if chars < MIN_TRANSCRIPT_CHARS {
        return Err(ExtractError::EmptyOcrResult { chars });
    }

    info!(chars, "Transcription complete");
    Ok(transcript)
}

/// Inline a page image as a base64 data URL.
fn to_data_url(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", detect_image_mime(bytes), encoded)
}

/// Detect the image MIME type from magic bytes; rendered pages are PNG,
/// uploads may be anything.
fn detect_image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
        "image/webp"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else {
        "image/png"
    }
}

/// Mock renderer producing a minimal valid PNG per page, used by pipeline
/// tests that must run without the PDFium binary.
pub struct MockPageRenderer {
    page_count: usize,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PageRenderer for MockPageRenderer {
    fn render_pages(&self, _pdf_bytes: &[u8], max_pages: usize) -> Result<Vec<Vec<u8>>, ExtractError> {
        Ok((0..self.page_count.min(max_pages)).map(|_| minimal_png()).collect())
    }
}

/// Minimal valid 1x1 PNG for mock rendering.
fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
