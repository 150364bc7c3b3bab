//! Purchase-order digitization: classify an uploaded PO (PDF or image),
//! transcribe scanned input through a vision model, extract three canonical
//! invoice documents through a schema-constrained completion call, and
//! reconcile item names against a live inventory catalog.
//!
//! Extraction never fails from the caller's point of view: every pipeline
//! error collapses into a deterministic placeholder dataset at the single
//! top-level entry point, [`extract::ExtractionPipeline::extract_from_document`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod ocr;
pub mod quote;
pub mod records;
pub mod router;

pub use error::ExtractError;
pub use extract::ExtractionPipeline;
pub use records::{DocumentRecord, InventoryItem, MatchResult};
