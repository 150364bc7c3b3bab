// src/extract.rs

use crate::client::{ChatRequest, LlmClient};
use crate::config::{Config, Credentials};
use crate::credentials::CredentialPool;
use crate::error::ExtractError;
use crate::ocr::{self, MAX_OCR_PAGES, PageRenderer};
use crate::records::{DocumentKind, DocumentRecord, LineItem};
use crate::router::{self, RoutedDocument};
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// Response token cap for the structured-extraction call.
const EXTRACTION_MAX_TOKENS: u32 = 4096;

/// Source text is capped before prompting to stay within context limits.
const MAX_SOURCE_CHARS: usize = 12_000;

/// The instruction template that turns one PO's text into the three
/// canonical document records, with a literal field schema.
const EXTRACTION_INSTRUCTION: &str = r#"You are a purchase-order digitization assistant.
Given the raw text of a single purchase order, synthesize EXACTLY three document
records from it and return ONLY a valid JSON array containing, in this order:
one "Tax Invoice", one "Delivery Challan", and one "Purchase Invoice".

Each element must match this schema exactly:
{
  "type": "Tax Invoice" | "Delivery Challan" | "Purchase Invoice",
  "customer": "string or null",
  "customerAddress": "string or null",
  "customerPhone": "string or null",
  "customerEmail": "string or null",
  "poNumber": "string or null",
  "date": "string or null",
  "total": number,
  "status": "string or null",
  "items": [
    {
      "id": integer,
      "name": "string",
      "itemDescription": "string or null",
      "itemSpecification": "string or null",
      "itemQuantity": number,
      "unitOfMeasure": "string or null",
      "packageSize": "string or null",
      "itemRate": number
    }
  ],
  "taxRate": number,
  "delivery": number
}

Rules:
- Copy customer details, item names, and all other text fields VERBATIM from the
  source. Never fabricate a value: use null for unknown text fields and 0 for
  unknown numbers.
- Compute "total" per document type:
  - Tax Invoice: total = sum(itemQuantity * itemRate) * taxRate / 100
  - Purchase Invoice: total = sum(itemQuantity * itemRate) + delivery
  - Delivery Challan: total = sum(itemQuantity * itemRate)
      + sum(itemQuantity * itemRate) * taxRate / 100 + delivery
- Return ONLY the JSON array, no markdown fences, no commentary."#;

/// The document extraction pipeline: router, OCR aggregation, resilient
/// completion calling, and parsing, with the terminal placeholder fallback.
pub struct ExtractionPipeline {
    pub(crate) config: Config,
    pub(crate) pool: CredentialPool,
    pub(crate) vision_key: Option<String>,
    pub(crate) client: Arc<dyn LlmClient>,
    pub(crate) renderer: Box<dyn PageRenderer>,
}

impl ExtractionPipeline {
    pub fn new(
        config: Config,
        credentials: Credentials,
        client: Arc<dyn LlmClient>,
        renderer: Box<dyn PageRenderer>,
    ) -> Self {
        Self {
            config,
            pool: CredentialPool::new(credentials.completion_keys),
            vision_key: credentials.vision_key,
            client,
            renderer,
        }
    }

    /// Public entry point. Never fails: any error from any stage collapses
    /// into the deterministic placeholder dataset, so callers always get
    /// structured records.
    pub async fn extract_from_document(&self, bytes: &[u8], mime_type: &str) -> Vec<DocumentRecord> {
        info!(mime = %mime_type, bytes = bytes.len(), "Starting document extraction");
        match self.run_pipeline(bytes, mime_type).await {
            Ok(records) => {
                info!(records = records.len(), "Extraction complete");
                records
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed, returning placeholder documents");
                fallback_records()
            }
        }
    }

    /// The pure pipeline: both branches converge on one structured
    /// extraction call over a single text blob.
    async fn run_pipeline(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<DocumentRecord>, ExtractError> {
        let routed = router::route(bytes, mime_type)?;
        let text = match routed {
            RoutedDocument::Text(text) => text,
            RoutedDocument::ImagePage => self.transcribe(vec![bytes.to_vec()]).await?,
            RoutedDocument::ScannedPdf => {
                let pages = self.renderer.render_pages(bytes, MAX_OCR_PAGES)?;
                self.transcribe(pages).await?
            }
        };
        self.extract_structured(&text).await
    }

    async fn transcribe(&self, pages: Vec<Vec<u8>>) -> Result<String, ExtractError> {
        let key = self
            .vision_key
            .as_deref()
            .ok_or(ExtractError::NoCredentialsConfigured)?;
        ocr::transcribe_pages(self.client.as_ref(), key, &self.config.vision.model, &pages).await
    }

    /// One schema-constrained completion call through the credential pool,
    /// then strict parsing of the result.
    pub async fn extract_structured(&self, source_text: &str) -> Result<Vec<DocumentRecord>, ExtractError> {
        let source = sanitize_source_text(source_text);
        let prompt = format!("{EXTRACTION_INSTRUCTION}\n\nSource document text:\n{source}");
        let request = ChatRequest::text(&self.config.completion.model, prompt, EXTRACTION_MAX_TOKENS);

        let raw = self
            .pool
            .execute(|key| {
                let request = &request;
                async move { self.client.chat(&key, request).await }
            })
            .await?;

        parse_records(&raw)
    }
}

/// Parse the model's reply into document records.
///
/// Strips markdown fences, slices to the outermost JSON array (some models
/// wrap their answer in prose despite instructions), and requires a
/// non-empty array.
pub fn parse_records(raw: &str) -> Result<Vec<DocumentRecord>, ExtractError> {
    let stripped = strip_code_fences(raw);
    let json = slice_outer_array(stripped).ok_or_else(|| {
        ExtractError::MalformedModelOutput("no JSON array in model output".to_string())
    })?;

    let records: Vec<DocumentRecord> =
        serde_json::from_str(json).map_err(|e| ExtractError::MalformedModelOutput(e.to_string()))?;

    if records.is_empty() {
        return Err(ExtractError::MalformedModelOutput(
            "model returned an empty array".to_string(),
        ));
    }

    Ok(records)
}

/// Strip markdown fences if the model added them despite instructions.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    s.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Slice to the outermost `[...]` so prose around the array is ignored.
pub(crate) fn slice_outer_array(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = s.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(&s[start..=end])
}

/// Clean a text layer or transcript before prompting: drop stray control
/// characters, collapse blank runs, cap the length.
fn sanitize_source_text(text: &str) -> String {
    let printable: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let blank_runs = Regex::new(r"\n{3,}").unwrap();
    let collapsed = blank_runs.replace_all(&printable, "\n\n");

    if collapsed.chars().count() > MAX_SOURCE_CHARS {
        collapsed.chars().take(MAX_SOURCE_CHARS).collect()
    } else {
        collapsed.into_owned()
    }
}

/// The deterministic dataset returned when any pipeline stage fails.
///
/// Item names point the operator at the missing credential setup.
pub fn fallback_records() -> Vec<DocumentRecord> {
    [
        DocumentKind::TaxInvoice,
        DocumentKind::DeliveryChallan,
        DocumentKind::PurchaseInvoice,
    ]
    .into_iter()
    .map(placeholder_record)
    .collect()
}

fn placeholder_record(kind: DocumentKind) -> DocumentRecord {
    DocumentRecord {
        kind,
        customer: Some("Sample Customer".to_string()),
        customer_address: None,
        customer_phone: None,
        customer_email: None,
        po_number: Some("PO-SAMPLE".to_string()),
        date: None,
        total: 0.0,
        status: Some("Pending".to_string()),
        items: vec![LineItem {
            id: 1,
            name: "Sample item (set COMPLETION_API_KEYS to enable extraction)".to_string(),
            item_description: Some(
                "Placeholder generated because live extraction was unavailable".to_string(),
            ),
            item_specification: None,
            item_quantity: 1.0,
            unit_of_measure: Some("unit".to_string()),
            package_size: None,
            item_rate: 0.0,
        }],
        tax_rate: 0.0,
        delivery: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLlmClient;
    use crate::error::ApiError;
    use crate::ocr::MockPageRenderer;

    const RECORDS_JSON: &str = r#"[
        {"type": "Tax Invoice", "customer": "Acme Traders", "poNumber": "PO-9",
         "date": "2026-03-01", "total": 18.0, "status": "Pending",
         "items": [{"id": 1, "name": "A4 Paper", "itemQuantity": 10, "itemRate": 10.0}],
         "taxRate": 18, "delivery": 0},
        {"type": "Delivery Challan", "customer": "Acme Traders", "poNumber": "PO-9",
         "date": "2026-03-01", "total": 130.0, "status": "Pending",
         "items": [{"id": 1, "name": "A4 Paper", "itemQuantity": 10, "itemRate": 10.0}],
         "taxRate": 0, "delivery": 30},
        {"type": "Purchase Invoice", "customer": "Acme Traders", "poNumber": "PO-9",
         "date": "2026-03-01", "total": 130.0, "status": "Pending",
         "items": [{"id": 1, "name": "A4 Paper", "itemQuantity": 10, "itemRate": 10.0}],
         "taxRate": 0, "delivery": 30}
    ]"#;

    fn pipeline_with(
        client: Arc<MockLlmClient>,
        renderer_pages: usize,
        completion_keys: usize,
        vision: bool,
    ) -> ExtractionPipeline {
        let credentials = Credentials {
            completion_keys: (0..completion_keys).map(|i| format!("ck-{i}")).collect(),
            vision_key: vision.then(|| "vk".to_string()),
        };
        ExtractionPipeline::new(
            Config::default(),
            credentials,
            client,
            Box::new(MockPageRenderer::new(renderer_pages)),
        )
    }

    // --- parsing ---

    #[test]
    fn parses_fenced_model_output() {
        let fenced = format!("```json\n{RECORDS_JSON}\n```");
        let records = parse_records(&fenced).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, DocumentKind::TaxInvoice);
        assert_eq!(records[2].kind, DocumentKind::PurchaseInvoice);
    }

    #[test]
    fn parses_array_wrapped_in_prose() {
        let wrapped = format!("Here are the documents you asked for:\n{RECORDS_JSON}\nDone.");
        assert_eq!(parse_records(&wrapped).unwrap().len(), 3);
    }

    #[test]
    fn rejects_output_without_json() {
        let err = parse_records("no json here").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedModelOutput(_)));
    }

    #[test]
    fn rejects_empty_array() {
        let err = parse_records("[]").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedModelOutput(_)));
    }

    #[test]
    fn rejects_bare_object() {
        let err = parse_records(r#"{"type": "Tax Invoice"}"#).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedModelOutput(_)));
    }

    #[test]
    fn sanitize_caps_source_length() {
        let long = "line\n".repeat(10_000);
        assert_eq!(sanitize_source_text(&long).chars().count(), MAX_SOURCE_CHARS);
        let messy = "a\x00b\n\n\n\n\nc";
        assert_eq!(sanitize_source_text(messy), "ab\n\nc");
    }

    // --- fallback dataset ---

    #[test]
    fn fallback_has_one_record_per_kind_with_consistent_totals() {
        let records = fallback_records();
        assert_eq!(records.len(), 3);
        let kinds: Vec<DocumentKind> = records.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&DocumentKind::TaxInvoice));
        assert!(kinds.contains(&DocumentKind::DeliveryChallan));
        assert!(kinds.contains(&DocumentKind::PurchaseInvoice));
        for rec in &records {
            assert!((rec.total - rec.expected_total()).abs() < 1e-9);
            assert!(rec.items[0].name.contains("COMPLETION_API_KEYS"));
        }
    }

    // --- pipeline behavior ---

    #[tokio::test]
    async fn unsupported_mime_returns_fallback_not_error() {
        let client = Arc::new(MockLlmClient::always("unused"));
        let pipeline = pipeline_with(client.clone(), 1, 2, true);

        let records = pipeline.extract_from_document(b"...", "text/csv").await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].po_number.as_deref(), Some("PO-SAMPLE"));
        // Nothing was sent anywhere
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_upload_runs_ocr_then_extraction() {
        let transcript = "PURCHASE ORDER PO-9 Acme Traders 10x A4 Paper @ 10.00 tax 18%";
        let client = Arc::new(MockLlmClient::new(vec![
            Ok(transcript.to_string()),
            Ok(RECORDS_JSON.to_string()),
        ]));
        let pipeline = pipeline_with(client.clone(), 0, 1, true);

        let records = pipeline.extract_from_document(b"\x89PNG fake image", "image/png").await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].customer.as_deref(), Some("Acme Traders"));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        // First request is the vision call with the upload as sole page
        let vision = serde_json::to_value(&requests[0]).unwrap();
        let parts = vision["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        // Second request is the text completion carrying the transcript
        let completion = serde_json::to_value(&requests[1]).unwrap();
        let prompt = completion["messages"][0]["content"].as_str().unwrap();
        assert!(prompt.contains("PO-9"));
        assert!(prompt.contains("EXACTLY three"));
    }

    #[tokio::test]
    async fn scanned_pdf_never_sends_more_than_three_pages() {
        let client = Arc::new(MockLlmClient::new(vec![
            Ok("a transcript easily longer than twenty characters".to_string()),
            Ok(RECORDS_JSON.to_string()),
        ]));
        // 10-page document behind a renderer that honors the cap
        let pipeline = pipeline_with(client.clone(), 10, 1, true);

        let records = pipeline
            .extract_from_document(b"%PDF-1.7 image-only scan", "application/pdf")
            .await;
        assert_eq!(records.len(), 3);

        let requests = client.requests.lock().unwrap();
        let vision = serde_json::to_value(&requests[0]).unwrap();
        let parts = vision["messages"][0]["content"].as_array().unwrap();
        // instruction + at most 3 page images
        assert_eq!(parts.len(), 4);
    }

    #[tokio::test]
    async fn any_stage_error_collapses_into_fallback() {
        // Vision call fails outright
        let client = Arc::new(MockLlmClient::new(vec![Err(ApiError::Status {
            status: 503,
            body: "down".to_string(),
        })]));
        let pipeline = pipeline_with(client, 1, 1, true);
        let records = pipeline.extract_from_document(b"img", "image/jpeg").await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].po_number.as_deref(), Some("PO-SAMPLE"));

        // Model answers with garbage instead of JSON
        let client = Arc::new(MockLlmClient::new(vec![
            Ok("a transcript easily longer than twenty characters".to_string()),
            Ok("no json here".to_string()),
        ]));
        let pipeline = pipeline_with(client, 1, 1, true);
        let records = pipeline.extract_from_document(b"img", "image/jpeg").await;
        assert_eq!(records[0].po_number.as_deref(), Some("PO-SAMPLE"));
    }

    #[tokio::test]
    async fn missing_vision_credential_yields_fallback() {
        let client = Arc::new(MockLlmClient::always("unused"));
        let pipeline = pipeline_with(client.clone(), 1, 1, false);
        let records = pipeline.extract_from_document(b"img", "image/png").await;
        assert_eq!(records[0].po_number.as_deref(), Some("PO-SAMPLE"));
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_credential_pool_errors_before_calling_model() {
        let client = Arc::new(MockLlmClient::always(RECORDS_JSON));
        let pipeline = pipeline_with(client.clone(), 1, 0, true);
        let result = pipeline.extract_structured("some PO text").await;
        assert!(matches!(result, Err(ExtractError::NoCredentialsConfigured)));
    }

    #[tokio::test]
    async fn extraction_rotates_credentials_until_one_works() {
        let client = Arc::new(MockLlmClient::new(vec![
            Err(ApiError::RateLimited),
            Err(ApiError::AuthRejected),
            Ok(RECORDS_JSON.to_string()),
        ]));
        let pipeline = pipeline_with(client.clone(), 1, 2, true);
        let records = pipeline.extract_structured("some PO text").await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(client.requests.lock().unwrap().len(), 3);
        assert_eq!(pipeline.pool.cursor(), 2 % pipeline.pool.len());
    }
}
