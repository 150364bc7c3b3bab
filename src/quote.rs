// src/quote.rs

use crate::client::ChatRequest;
use crate::error::ExtractError;
use crate::extract::{ExtractionPipeline, slice_outer_array, strip_code_fences};
use crate::records::{InventoryItem, MatchResult, MatchedItem, RequestedItem};
use serde::Deserialize;
use tracing::{info, warn};

/// Response token cap for the quotation call; half the extraction cap.
const QUOTE_MAX_TOKENS: u32 = 2048;

/// Tokens longer than this qualify for the local fallback matcher on
/// length alone; shorter ones need the priority keyword list.
const FALLBACK_TOKEN_MIN_CHARS: usize = 3;

const QUOTE_INSTRUCTION: &str = r#"You are an inventory quotation assistant.
Given a free-text purchasing request and the inventory catalog below, propose
the catalog items the request refers to. Return ONLY a valid JSON array of:
{
  "id": integer,           // the catalog item id
  "name": "string",        // the catalog item name, copied exactly
  "quantity": integer,     // requested quantity, 1 if unstated
  "matchReason": "string"  // why this item fits the request
}
Only propose items the request genuinely asks for; return [] when nothing fits.
Return ONLY the JSON array, no markdown fences, no commentary."#;

/// One candidate match proposed by the model, re-validated locally before
/// it is trusted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposedMatch {
    id: u32,
    name: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
    #[serde(default)]
    #[allow(dead_code)]
    match_reason: String,
}

fn default_quantity() -> u32 {
    1
}

impl ExtractionPipeline {
    /// Turn a free-text purchasing request into matched/unmatched inventory
    /// line items.
    ///
    /// AI transport failures degrade to the local token matcher; only an
    /// unusable response shape surfaces as `InvalidJsonStructure`, which the
    /// caller presents to the user.
    pub async fn parse_purchase_request(
        &self,
        query: &str,
        catalog: &[InventoryItem],
    ) -> Result<MatchResult, ExtractError> {
        if self.pool.is_empty() {
            info!("No completion credentials, using local token matching");
            return Ok(local_fallback(
                query,
                catalog,
                &self.config.matching.priority_keywords,
            ));
        }

        let prompt = format!(
            "{QUOTE_INSTRUCTION}\n\nCatalog:\n{}\n\nRequest: {query}",
            catalog_context(catalog)
        );
        let request = ChatRequest::text(&self.config.completion.model, prompt, QUOTE_MAX_TOKENS);

        let raw = match self
            .pool
            .execute(|key| {
                let request = &request;
                async move { self.client.chat(&key, request).await }
            })
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Quotation model call failed, using local token matching");
                return Ok(local_fallback(
                    query,
                    catalog,
                    &self.config.matching.priority_keywords,
                ));
            }
        };

        let proposals = parse_proposals(&raw)?;
        info!(proposals = proposals.len(), "Hydrating model proposals");
        Ok(hydrate_proposals(proposals, catalog))
    }
}

/// Simplified catalog context handed to the model, one line per item.
fn catalog_context(catalog: &[InventoryItem]) -> String {
    catalog
        .iter()
        .map(|item| {
            format!(
                "id={} name=\"{}\" sku={} stock={}",
                item.id, item.name, item.sku, item.stock
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the model's proposal array; an unusable shape is the one error the
/// quotation path surfaces.
fn parse_proposals(raw: &str) -> Result<Vec<ProposedMatch>, ExtractError> {
    let stripped = strip_code_fences(raw);
    let json = slice_outer_array(stripped)
        .ok_or_else(|| ExtractError::InvalidJsonStructure("no JSON array in response".to_string()))?;
    serde_json::from_str(json).map_err(|e| ExtractError::InvalidJsonStructure(e.to_string()))
}

/// Accept each proposal only when the proposed id's catalog name exactly
/// equals the proposed name (case-insensitive). A model that returns a
/// plausible id with a name that does not match (say "laptop" against a
/// generic "Electronics" SKU) is demoted to `missing`.
fn hydrate_proposals(proposals: Vec<ProposedMatch>, catalog: &[InventoryItem]) -> MatchResult {
    let mut result = MatchResult::default();

    for proposal in proposals {
        let requested = RequestedItem {
            name: proposal.name.clone(),
            quantity: proposal.quantity,
        };

        let verified = catalog
            .iter()
            .find(|item| item.id == proposal.id)
            .filter(|item| item.name.trim().eq_ignore_ascii_case(proposal.name.trim()));

        match verified {
            Some(item) => result.available.push(MatchedItem {
                is_shortage: item.stock < proposal.quantity,
                inventory_item: item.clone(),
                item: requested,
            }),
            None => {
                warn!(id = proposal.id, name = %proposal.name, "Proposal failed name check, demoting to missing");
                result.missing.push(requested);
            }
        }
    }

    result
}

/// Deterministic matcher used when no credential is usable: whitespace
/// tokens of the query, substring-matched against catalog names. A token
/// qualifies by length or by the configured priority keyword list.
pub fn local_fallback(
    query: &str,
    catalog: &[InventoryItem],
    priority_keywords: &[String],
) -> MatchResult {
    let mut result = MatchResult::default();

    for token in query.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() {
            continue;
        }

        let qualifies = token.chars().count() > FALLBACK_TOKEN_MIN_CHARS
            || priority_keywords.iter().any(|k| k.eq_ignore_ascii_case(token));
        if !qualifies {
            continue;
        }

        let lowered = token.to_lowercase();
        if let Some(item) = catalog
            .iter()
            .find(|it| it.name.to_lowercase().contains(&lowered))
        {
            result.available.push(MatchedItem {
                item: RequestedItem {
                    name: token.to_string(),
                    quantity: 1,
                },
                is_shortage: item.stock < 1,
                inventory_item: item.clone(),
            });
        }
    }

    if result.available.is_empty() {
        result.missing.push(RequestedItem {
            name: "Unknown Item".to_string(),
            quantity: 1,
        });
    }

    result
}
