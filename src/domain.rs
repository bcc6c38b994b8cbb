use serde::{Deserialize, Serialize};

/// Provenance tag declared by the offer source itself. `OfficialManufacturer`
/// and `AuthorizedBrand` bypass trusted-seller name matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Trusted,
    OfficialManufacturer,
    AuthorizedBrand,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One candidate offer as reported by the upstream source. Entirely
/// untrusted input: amounts may be negative or non-finite, URLs may be
/// garbage. The normalizer decides what survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOffer {
    pub product_name: String,
    pub price_amount: f64,
    pub shipping_amount: f64,
    #[serde(default = "default_currency")]
    pub price_currency: String,
    pub store_name: String,
    pub product_url: String,
    #[serde(default)]
    pub discount_text: String,
    #[serde(default)]
    pub notes: String,
    pub ships_to_us: bool,
    #[serde(default)]
    pub source_trust_level: TrustLevel,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A raw offer that passed filtering, with `total_amount` recomputed from
/// price + shipping. The upstream never gets to claim its own total.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub product_name: String,
    pub price_amount: f64,
    pub shipping_amount: f64,
    pub total_amount: f64,
    pub price_currency: String,
    pub store_name: String,
    pub product_url: String,
    pub discount_text: String,
    pub notes: String,
    pub source_trust_level: TrustLevel,
}

/// Terminal state for one watched product. A product either produced a
/// ranked offer list or failed; it never carries both offers and an error.
/// The failed variant still carries warnings so a disambiguation note
/// survives a fetch failure.
#[derive(Debug, Clone)]
pub enum ProductOutcome {
    Ready {
        product_name: String,
        offers: Vec<Offer>,
        warnings: Vec<String>,
    },
    Failed {
        product_name: String,
        warnings: Vec<String>,
        error: String,
    },
}

impl ProductOutcome {
    pub fn product_name(&self) -> &str {
        match self {
            ProductOutcome::Ready { product_name, .. } => product_name,
            ProductOutcome::Failed { product_name, .. } => product_name,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProductOutcome::Failed { .. })
    }
}

/// One scheduled run's outcomes, in watch-list order.
pub type BatchResult = Vec<ProductOutcome>;
