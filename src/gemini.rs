use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::RawOffer;
use crate::error::FetchError;
use crate::fetch::OfferSource;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Offer source backed by the Gemini generateContent API with the
/// Google-search tool enabled. The model is asked for strict JSON; anything
/// that does not parse back into the offer payload is a malformed-payload
/// failure and goes through the normal retry loop.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    http: Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key, model)
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            http: Client::new(),
        }
    }

    fn build_prompt(product_name: &str) -> String {
        [
            "Find pricing offers on the public web for this product in the U.S. market only:".to_string(),
            format!("Product: {product_name}"),
            "Constraints:".to_string(),
            "- Use trusted U.S. sellers only.".to_string(),
            "- Include Best Buy, Target, Costco, Walmart when possible.".to_string(),
            "- Include official manufacturer and authorized brand stores if available.".to_string(),
            "- Exclude international-shipping-only offers.".to_string(),
            "- If an offer is membership-gated, only Costco membership pricing is acceptable.".to_string(),
            "Output format:".to_string(),
            "Return strict JSON with this shape only:".to_string(),
            r#"{"offers":[{"productName":"","priceAmount":0,"shippingAmount":0,"priceCurrency":"USD","storeName":"","productUrl":"https://...","discountText":"","notes":"","shipsToUs":true,"sourceTrustLevel":"trusted|official_manufacturer|authorized_brand|unknown"}]}"#.to_string(),
            "Rules:".to_string(),
            "- shippingAmount must be numeric and >= 0.".to_string(),
            "- priceAmount must be numeric and >= 0.".to_string(),
            "- Include notes for shipping assumptions or membership terms.".to_string(),
            "- Do not include markdown fences.".to_string(),
        ]
        .join("\n")
    }
}

#[async_trait]
impl OfferSource for GeminiClient {
    async fn fetch_offers(&self, product_name: &str) -> Result<Vec<RawOffer>, FetchError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![Part {
                    text: Self::build_prompt(product_name),
                }],
            }],
            tools: vec![Tool {
                google_search: serde_json::json!({}),
            }],
            generation_config: GenerationConfig { temperature: 0.1 },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .map(|part| part.text)
            .collect();

        parse_offer_payload(&text)
    }
}

/// Parse the model's response text into raw offers, tolerating ```json
/// fences the model sometimes emits despite instructions.
fn parse_offer_payload(text: &str) -> Result<Vec<RawOffer>, FetchError> {
    let stripped = strip_code_fences(text);
    let payload: OfferPayload = serde_json::from_str(stripped)
        .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;
    Ok(payload.offers)
}

fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    tools: Vec<Tool>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "googleSearch")]
    google_search: serde_json::Value,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct OfferPayload {
    offers: Vec<RawOffer>,
}
