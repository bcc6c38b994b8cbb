use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;

const DEFAULT_TRUSTED_SELLERS: [&str; 4] = ["best buy", "target", "costco", "walmart"];

#[derive(Debug, Clone)]
pub struct Config {
    // Offer source
    pub gemini_api_key: String,
    pub model_name: String,

    // Watch-list
    pub watched_products: Vec<String>,
    pub trusted_sellers: Vec<String>,
    pub max_results_per_product: usize,

    // Batch
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub request_retries: u32,

    // Delivery
    pub recipient_emails: Vec<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub smtp_from: String,

    // Schedule
    pub schedule_time: NaiveTime,
    pub timezone: Tz,
    pub run_on_startup: bool,
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String> {
    match vars.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(anyhow!("{key} is required")),
    }
}

fn optional(vars: &HashMap<String, String>, key: &str, default: &str) -> String {
    match vars.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn parse_bool(vars: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match vars.get(key).map(|v| v.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if ["1", "true", "yes", "y", "on"].contains(&v.as_str()) => true,
        Some(v) if ["0", "false", "no", "n", "off"].contains(&v.as_str()) => false,
        Some(_) => default,
    }
}

fn parse_ranged<T>(vars: &HashMap<String, String>, key: &str, default: T, min: T, max: T) -> Result<T>
where
    T: FromStr + PartialOrd + Copy + Display,
{
    let Some(raw) = vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    let value: T = raw
        .parse()
        .map_err(|_| anyhow!("{key} must be a number, got {raw:?}"))?;
    if value < min || value > max {
        return Err(anyhow!("{key} must be between {min} and {max}"));
    }
    Ok(value)
}

fn split_delimited(input: &str, delimiter: &str) -> Vec<String> {
    input
        .split(delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let gemini_api_key = required(vars, "GEMINI_API_KEY")?;
        let model_name = optional(vars, "MODEL_NAME", "gemini-2.5-flash");

        let product_delimiter = optional(vars, "PRODUCT_DELIMITER", "|");
        let email_delimiter = optional(vars, "EMAIL_DELIMITER", ",");

        let watched_products =
            split_delimited(&required(vars, "WATCHED_PRODUCTS")?, &product_delimiter);
        if watched_products.is_empty() {
            return Err(anyhow!("WATCHED_PRODUCTS must include at least one product"));
        }

        let recipient_emails =
            split_delimited(&required(vars, "RECIPIENT_EMAILS")?, &email_delimiter);
        if recipient_emails.is_empty() {
            return Err(anyhow!("RECIPIENT_EMAILS must include at least one email"));
        }

        let trusted_sellers = match vars.get("TRUSTED_SELLERS").map(|v| v.trim()) {
            Some(raw) if !raw.is_empty() => split_delimited(raw, &product_delimiter),
            _ => DEFAULT_TRUSTED_SELLERS.iter().map(|s| s.to_string()).collect(),
        }
        .into_iter()
        .map(|seller| seller.to_lowercase())
        .collect();

        let max_results_per_product =
            parse_ranged(vars, "MAX_RESULTS_PER_PRODUCT", 5usize, 3, 5)?;
        let concurrency = parse_ranged(vars, "CONCURRENCY", 3usize, 1, 10)?;
        let timeout_ms = parse_ranged(vars, "REQUEST_TIMEOUT_MS", 30_000u64, 1_000, 120_000)?;
        let request_retries = parse_ranged(vars, "REQUEST_RETRIES", 2u32, 0, 5)?;

        let smtp_host = required(vars, "SMTP_HOST")?;
        let smtp_port: u16 = required(vars, "SMTP_PORT")?
            .parse()
            .map_err(|_| anyhow!("SMTP_PORT must be a valid port number"))?;
        let smtp_user = required(vars, "SMTP_USER")?;
        let smtp_pass = required(vars, "SMTP_PASS")?;
        let smtp_from = required(vars, "SMTP_FROM")?;
        if !smtp_from.contains('@') {
            return Err(anyhow!("SMTP_FROM must be an email address"));
        }

        // Schedule settings are validated here, before any run-on-startup
        // send, so a bad schedule cannot cause a restart loop of emails.
        let raw_time = optional(vars, "SCHEDULE_TIME", "08:00");
        let schedule_time = NaiveTime::parse_from_str(&raw_time, "%H:%M")
            .map_err(|_| anyhow!("SCHEDULE_TIME must be HH:MM, got {raw_time:?}"))?;
        let raw_tz = optional(vars, "TIMEZONE", "UTC");
        let timezone: Tz = raw_tz
            .parse()
            .map_err(|_| anyhow!("invalid TIMEZONE: {raw_tz}"))?;

        let run_on_startup = parse_bool(vars, "RUN_ON_STARTUP", false);

        Ok(Self {
            gemini_api_key,
            model_name,
            watched_products,
            trusted_sellers,
            max_results_per_product,
            concurrency,
            request_timeout: Duration::from_millis(timeout_ms),
            request_retries,
            recipient_emails,
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            smtp_from,
            schedule_time,
            timezone,
            run_on_startup,
        })
    }
}
