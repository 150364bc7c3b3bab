use thiserror::Error;

/// Failure taxonomy for the extraction and quotation pipelines.
///
/// Every inner stage returns one of these; only the top-level
/// `extract_from_document` converts them into the placeholder dataset.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("no completion credentials configured")]
    NoCredentialsConfigured,

    #[error("all credentials exhausted after {attempts} attempts")]
    AllCredentialsExhausted { attempts: usize },

    #[error("OCR produced only {chars} chars; document may be blank or unreadable")]
    EmptyOcrResult { chars: usize },

    #[error("model output is not a non-empty JSON array: {0}")]
    MalformedModelOutput(String),

    #[error("quotation response JSON is unusable: {0}")]
    InvalidJsonStructure(String),

    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    #[error("PDF page rendering failed: {0}")]
    PdfRender(String),

    #[error("image encoding failed: {0}")]
    ImageEncoding(String),
}

/// Transport-level classification of a single completion/vision call.
///
/// The executor rotates the credential pool on every variant; the split
/// exists so rate-limit and auth rejections are visible in the logs.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("credential rejected (HTTP 401)")]
    AuthRejected,

    #[error("API error (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("request transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response carried no completion content")]
    EmptyResponse,
}
