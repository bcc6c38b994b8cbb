use std::cmp::Ordering;

use url::Url;

use crate::domain::{Offer, RawOffer, TrustLevel};

const MEMBERSHIP_KEYWORDS: [&str; 5] = ["member", "membership", "club", "plus", "prime"];

pub const TOO_FEW_OFFERS_WARNING: &str = "Fewer than 3 qualified offers were found.";

/// Output of [`normalize_and_filter`]: ranked offers plus advisory notes.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub offers: Vec<Offer>,
    pub warnings: Vec<String>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn hostname(raw_url: &str) -> String {
    let Ok(parsed) = Url::parse(raw_url) else {
        return String::new();
    };
    let host = parsed
        .host_str()
        .map(str::to_lowercase)
        .unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

fn has_membership_gate_text(offer: &Offer) -> bool {
    let blob = format!("{} {}", offer.discount_text, offer.notes).to_lowercase();
    MEMBERSHIP_KEYWORDS.iter().any(|kw| blob.contains(kw))
}

fn is_costco_offer(offer: &Offer) -> bool {
    offer.store_name.to_lowercase().contains("costco")
        || hostname(&offer.product_url).contains("costco")
}

fn is_trusted_seller(offer: &Offer, trusted_sellers: &[String]) -> bool {
    if matches!(
        offer.source_trust_level,
        TrustLevel::OfficialManufacturer | TrustLevel::AuthorizedBrand
    ) {
        return true;
    }

    let store = offer.store_name.to_lowercase();
    let host = hostname(&offer.product_url);
    trusted_sellers.iter().any(|trusted| {
        // Hostnames carry no spaces, so "best buy" must match bestbuy.com.
        let squashed: String = trusted.split_whitespace().collect();
        store.contains(trusted.as_str()) || host.contains(&squashed)
    })
}

fn is_valid_offer(offer: &Offer) -> bool {
    let has_valid_url = offer.product_url.starts_with("http://")
        || offer.product_url.starts_with("https://");

    offer.price_amount.is_finite()
        && offer.shipping_amount.is_finite()
        && offer.total_amount.is_finite()
        && offer.price_amount >= 0.0
        && offer.shipping_amount >= 0.0
        && offer.total_amount >= 0.0
        && has_valid_url
}

fn recompute_total(raw: RawOffer) -> Offer {
    let total_amount = round2(raw.price_amount + raw.shipping_amount);
    Offer {
        product_name: raw.product_name,
        price_amount: raw.price_amount,
        shipping_amount: raw.shipping_amount,
        total_amount,
        price_currency: raw.price_currency,
        store_name: raw.store_name,
        product_url: raw.product_url,
        discount_text: raw.discount_text,
        notes: raw.notes,
        source_trust_level: raw.source_trust_level,
    }
}

/// Pure normalization pipeline: recompute totals, filter to qualified
/// offers, rank ascending by total, truncate.
///
/// A malformed individual offer is dropped by the validity check rather than
/// failing the product. Sorting is stable, so equal totals keep their input
/// order.
pub fn normalize_and_filter(
    raw_offers: Vec<RawOffer>,
    trusted_sellers: &[String],
    max_results: usize,
) -> Normalized {
    let mut accepted: Vec<Offer> = raw_offers
        .into_iter()
        .filter(|raw| raw.ships_to_us)
        .map(recompute_total)
        .filter(|offer| {
            is_trusted_seller(offer, trusted_sellers)
                && (!has_membership_gate_text(offer) || is_costco_offer(offer))
                && is_valid_offer(offer)
        })
        .collect();

    accepted.sort_by(|a, b| {
        a.total_amount
            .partial_cmp(&b.total_amount)
            .unwrap_or(Ordering::Equal)
    });
    accepted.truncate(max_results);

    let mut warnings = Vec::new();
    if accepted.len() < 3 {
        warnings.push(TOO_FEW_OFFERS_WARNING.to_string());
    }

    Normalized {
        offers: accepted,
        warnings,
    }
}
