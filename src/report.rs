use chrono::{DateTime, Utc};

use crate::domain::{Offer, ProductOutcome};

/// Subject/HTML/text triple handed to the mail transport.
#[derive(Debug, Clone)]
pub struct EmailReport {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn build_report(results: &[ProductOutcome]) -> EmailReport {
    build_report_at(results, Utc::now())
}

pub fn build_report_at(results: &[ProductOutcome], now: DateTime<Utc>) -> EmailReport {
    let subject = format!(
        "Price Watch Update - {} UTC",
        now.format("%-m/%-d/%Y, %-I:%M:%S %p")
    );

    let html_sections: Vec<String> = results.iter().map(html_section).collect();
    let html = format!(
        "<html><body>\n<h1>Price Watch</h1>\n{}\n</body></html>",
        html_sections.join("\n<hr/>\n")
    );

    let mut text_sections = vec!["Price Watch".to_string()];
    text_sections.extend(results.iter().map(text_section));
    let text = text_sections.join("\n\n");

    EmailReport {
        subject,
        html,
        text,
    }
}

fn html_section(result: &ProductOutcome) -> String {
    let header = format!("<h2>{}</h2>", escape_html(result.product_name()));

    let (offers, warnings) = match result {
        ProductOutcome::Failed { error, .. } => {
            return format!(
                "{header}<p><strong>Error:</strong> {}</p>",
                escape_html(error)
            );
        }
        ProductOutcome::Ready {
            offers, warnings, ..
        } => (offers, warnings),
    };

    let warning_block = if warnings.is_empty() {
        String::new()
    } else {
        format!(
            "<p><strong>Notes:</strong> {}</p>",
            escape_html(&warnings.join(" "))
        )
    };

    let rows: Vec<String> = offers.iter().map(html_row).collect();
    let table = format!(
        "<table border=\"1\" cellpadding=\"8\" cellspacing=\"0\" style=\"border-collapse:collapse; width:100%;\">\n\
<thead>\n<tr>\n\
<th>Product Price</th>\n\
<th>Shipping Price</th>\n\
<th>Total Price</th>\n\
<th>Store</th>\n\
<th>Link</th>\n\
<th>Discount</th>\n\
<th>Notes</th>\n\
</tr>\n</thead>\n<tbody>\n{}\n</tbody>\n</table>",
        rows.join("\n")
    );

    format!("{header}{warning_block}{table}")
}

fn html_row(offer: &Offer) -> String {
    let link = format!(
        "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">Open</a>",
        escape_html(&offer.product_url)
    );
    format!(
        "<tr>\n<td>{}</td>\n<td>{}</td>\n<td><strong>{}</strong></td>\n<td>{}</td>\n<td>{}</td>\n<td>{}</td>\n<td>{}</td>\n</tr>",
        format_money(offer.price_amount, &offer.price_currency),
        format_money(offer.shipping_amount, &offer.price_currency),
        format_money(offer.total_amount, &offer.price_currency),
        escape_html(&offer.store_name),
        link,
        escape_html(or_dash(&offer.discount_text)),
        escape_html(or_dash(&offer.notes)),
    )
}

fn text_section(result: &ProductOutcome) -> String {
    let mut lines = vec![format!("Product: {}", result.product_name())];

    let (offers, warnings) = match result {
        ProductOutcome::Failed { error, .. } => {
            lines.push(format!("Error: {error}"));
            return lines.join("\n");
        }
        ProductOutcome::Ready {
            offers, warnings, ..
        } => (offers, warnings),
    };

    if !warnings.is_empty() {
        lines.push(format!("Notes: {}", warnings.join(" ")));
    }

    lines.push("Top offers:".to_string());
    for (idx, offer) in offers.iter().enumerate() {
        lines.push(
            [
                format!("{}. {}", idx + 1, offer.store_name),
                format!(
                    "Product: {}",
                    format_money(offer.price_amount, &offer.price_currency)
                ),
                format!(
                    "Shipping: {}",
                    format_money(offer.shipping_amount, &offer.price_currency)
                ),
                format!(
                    "Total: {}",
                    format_money(offer.total_amount, &offer.price_currency)
                ),
                format!("Link: {}", offer.product_url),
                format!("Discount: {}", or_dash(&offer.discount_text)),
                format!("Notes: {}", or_dash(&offer.notes)),
            ]
            .join(" | "),
        );
    }

    lines.join("\n")
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn format_money(amount: f64, currency: &str) -> String {
    if currency.eq_ignore_ascii_case("usd") {
        format!("${}", group_thousands(amount))
    } else {
        format!("{currency} {amount:.2}")
    }
}

fn group_thousands(amount: f64) -> String {
    let formatted = format!("{amount:.2}");
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some(parts) => parts,
        None => (formatted.as_str(), "00"),
    };

    let chars: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(chars.len() + chars.len() / 3);
    for (i, ch) in chars.iter().enumerate() {
        if i > 0
            && (chars.len() - i) % 3 == 0
            && ch.is_ascii_digit()
            && chars[i - 1].is_ascii_digit()
        {
            grouped.push(',');
        }
        grouped.push(*ch);
    }

    format!("{grouped}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::TrustLevel;
    use crate::offers::TOO_FEW_OFFERS_WARNING;

    fn sample_offer() -> Offer {
        Offer {
            product_name: "iPhone 16".into(),
            price_amount: 799.0,
            shipping_amount: 0.0,
            total_amount: 799.0,
            price_currency: "USD".into(),
            store_name: "Best Buy".into(),
            product_url: "https://bestbuy.com/p".into(),
            discount_text: "$20 off".into(),
            notes: "In stock".into(),
            source_trust_level: TrustLevel::Trusted,
        }
    }

    fn ready(offers: Vec<Offer>, warnings: Vec<&str>) -> ProductOutcome {
        ProductOutcome::Ready {
            product_name: "iPhone 16".into(),
            offers,
            warnings: warnings.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn renders_required_columns_including_notes() {
        let report = build_report(&[ready(vec![sample_offer()], vec![])]);

        assert!(report.html.contains("Product Price"));
        assert!(report.html.contains("Shipping Price"));
        assert!(report.html.contains("Total Price"));
        assert!(report.html.contains("Notes"));
        assert!(report.text.contains("Notes: In stock"));
        assert!(report.text.contains("1. Best Buy"));
    }

    #[test]
    fn failed_products_render_an_error_line() {
        let outcome = ProductOutcome::Failed {
            product_name: "Broken <Thing>".into(),
            warnings: vec![],
            error: "offer source timed out after 30s".into(),
        };

        let report = build_report(&[outcome]);
        assert!(report.html.contains("<strong>Error:</strong> offer source timed out after 30s"));
        assert!(report.html.contains("Broken &lt;Thing&gt;"));
        assert!(report.text.contains("Error: offer source timed out after 30s"));
        assert!(!report.html.contains("<table"));
    }

    #[test]
    fn warnings_appear_as_notes() {
        let report = build_report(&[ready(vec![sample_offer()], vec![TOO_FEW_OFFERS_WARNING])]);
        assert!(report.html.contains("<strong>Notes:</strong>"));
        assert!(report.html.contains("Fewer than 3 qualified offers were found."));
        assert!(report.text.contains("Notes: Fewer than 3 qualified offers were found."));
    }

    #[test]
    fn subject_carries_a_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 8, 27, 14, 30, 5).unwrap();
        let report = build_report_at(&[], now);
        assert_eq!(report.subject, "Price Watch Update - 8/27/2026, 2:30:05 PM UTC");
    }

    #[test]
    fn formats_usd_with_thousands_grouping() {
        assert_eq!(format_money(1234567.5, "USD"), "$1,234,567.50");
        assert_eq!(format_money(520.0, "usd"), "$520.00");
        assert_eq!(format_money(12.3, "EUR"), "EUR 12.30");
    }

    #[test]
    fn escapes_html_in_store_and_discount_fields() {
        let mut offer = sample_offer();
        offer.store_name = "Bob's <Deals> & Co".into();
        let report = build_report(&[ready(vec![offer], vec![])]);
        assert!(report.html.contains("Bob&#39;s &lt;Deals&gt; &amp; Co"));
    }
}
