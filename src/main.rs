use po_extract::client::HttpLlmClient;
use po_extract::config::{Config, Credentials};
use po_extract::extract::ExtractionPipeline;
use po_extract::ocr::PdfiumRenderer;
use po_extract::records::InventoryItem;
use std::sync::Arc;
use tracing::info;

const CONFIG_PATH: &str = ".config/po_extract.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("extract") => {
            let Some(path) = args.get(2) else {
                return usage();
            };
            let bytes = std::fs::read(path)?;
            let mime = match args.get(3) {
                Some(m) => m.clone(),
                None => mime_guess::from_path(path)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string(),
            };
            info!(path = %path, mime = %mime, bytes = bytes.len(), "Extracting document");

            let pipeline = build_pipeline()?;
            let records = pipeline.extract_from_document(&bytes, &mime).await;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Some("quote") => {
            let (Some(query), Some(catalog_path)) = (args.get(2), args.get(3)) else {
                return usage();
            };
            let catalog: Vec<InventoryItem> =
                serde_json::from_str(&std::fs::read_to_string(catalog_path)?)?;
            info!(items = catalog.len(), query = %query, "Matching purchasing request");

            let pipeline = build_pipeline()?;
            match pipeline.parse_purchase_request(query, &catalog).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    eprintln!("✗ Quotation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ => return usage(),
    }

    Ok(())
}

fn build_pipeline() -> Result<ExtractionPipeline, Box<dyn std::error::Error>> {
    let config = Config::load_or_default(CONFIG_PATH);
    let credentials = Credentials::from_env();
    let client = Arc::new(HttpLlmClient::new(&config.completion.base_url)?);
    Ok(ExtractionPipeline::new(
        config,
        credentials,
        client,
        Box::new(PdfiumRenderer),
    ))
}

fn usage() -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Usage:");
    eprintln!("  po_extract extract <file> [mime]              digitize a PO document");
    eprintln!("  po_extract quote \"<request>\" <catalog.json>   match a purchasing request");
    Ok(())
}
