use regex::Regex;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::dates::{self, HEADER_LINES};

pub const DEFAULT_DEAL_NAME: &str = "Untitled Deal";
pub const DEFAULT_OWNER: &str = "Unknown";
pub const DEFAULT_INDUSTRY: &str = "General";
pub const DEFAULT_STAGE: &str = "Closed Lost";

const DEAL_KEYS: [&str; 6] = ["deal", "deal name", "opportunity", "customer", "buyer", "client"];
const OWNER_KEYS: [&str; 5] = ["owner", "rep", "sales rep", "seller", "account manager"];
const INDUSTRY_KEYS: [&str; 3] = ["industry", "vertical", "sector"];
const VALUE_KEYS: [&str; 7] = ["value", "amount", "arr", "acv", "deal value", "deal size", "revenue"];
const STAGE_KEYS: [&str; 4] = ["stage", "sales stage", "status", "outcome"];
const TITLE_HINTS: [&str; 5] = ["deal", "opportunity", "platform", "system", "solution"];
const INDUSTRY_FAMILIES: [(&str, &[&str]); 6] = [
	("Technology", &["tech", "saas", "software", "platform", "cloud", "digital"]),
	("Healthcare", &["health", "medical", "hospital", "clinic", "patient"]),
	("Financial", &["finance", "banking", "financial", "investment", "capital"]),
	("Retail", &["retail", "e-commerce", "commerce", "store", "merchant"]),
	("Manufacturing", &["manufacturing", "production", "factory", "industrial"]),
	("Education", &["education", "school", "university", "learning", "student"]),
];
const AMOUNT_PATTERN: &str = r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(million|mm|m|thousand|k)?\b";
const LOOSE_VALUE_PATTERNS: [&str; 2] = [
	r"(?i)\$\s?(\d[\d,]*(?:\.\d+)?)\s*(million|mm|m|thousand|k)?\b",
	r"(?i)\bvalue[:\s]+\$?(\d[\d,]*(?:\.\d+)?)\s*(million|mm|m|thousand|k)?\b",
];
const OWNER_PATTERN: &str = r"\b(?i:owner|sales rep|account manager|rep)[:\s]+([A-Z][a-zA-Z]+(?: [A-Z][a-zA-Z]+)*)";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DealMetadata {
	pub deal_name: String,
	pub owner: String,
	pub industry: String,
	pub value: Option<f64>,
	#[serde(with = "crate::iso_date::option")]
	pub close_date: Option<Date>,
	pub stage: String,
}
impl Default for DealMetadata {
	fn default() -> Self {
		Self {
			deal_name: DEFAULT_DEAL_NAME.to_string(),
			owner: DEFAULT_OWNER.to_string(),
			industry: DEFAULT_INDUSTRY.to_string(),
			value: None,
			close_date: None,
			stage: DEFAULT_STAGE.to_string(),
		}
	}
}

/// Infers deal metadata from `key: value` header lines, then from loose patterns in the body.
pub fn infer_metadata(text: &str) -> DealMetadata {
	let mut metadata = DealMetadata::default();
	let mut named = false;
	let mut owned = false;
	let mut classified = false;

	for line in text.lines().take(HEADER_LINES) {
		let Some((key, value)) = line.trim().split_once(':') else {
			continue;
		};
		let key = key.trim().to_lowercase();
		let value = value.trim();

		if value.is_empty() {
			continue;
		}

		if DEAL_KEYS.contains(&key.as_str()) {
			metadata.deal_name = value.to_string();
			named = true;
		} else if OWNER_KEYS.contains(&key.as_str()) {
			metadata.owner = value.to_string();
			owned = true;
		} else if INDUSTRY_KEYS.contains(&key.as_str()) {
			metadata.industry = value.to_string();
			classified = true;
		} else if VALUE_KEYS.contains(&key.as_str()) {
			metadata.value = parse_amount(AMOUNT_PATTERN, value).or(metadata.value);
		} else if STAGE_KEYS.contains(&key.as_str()) {
			metadata.stage = value.to_string();
		}
	}

	metadata.close_date = dates::header_close_date(text);

	if metadata.value.is_none() {
		metadata.value =
			LOOSE_VALUE_PATTERNS.iter().find_map(|pattern| parse_amount(pattern, text));
	}
	if !named && let Some(title) = title_line(text) {
		metadata.deal_name = title;
	}
	if !owned && let Some(owner) = loose_owner(text) {
		metadata.owner = owner;
	}
	if !classified && let Some(industry) = industry_from_keywords(text) {
		metadata.industry = industry.to_string();
	}

	metadata
}

/// Parses the first amount matched by `pattern`, honouring `k` and `M` style suffixes.
fn parse_amount(pattern: &str, text: &str) -> Option<f64> {
	let caps = Regex::new(pattern).ok()?.captures(text)?;
	let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
	let multiplier = match caps.get(2).map(|unit| unit.as_str().to_lowercase()).as_deref() {
		Some("million" | "mm" | "m") => 1_000_000.0,
		Some("thousand" | "k") => 1_000.0,
		_ => 1.0,
	};

	Some(number * multiplier)
}

fn title_line(text: &str) -> Option<String> {
	text.lines().take(5).map(str::trim).find_map(|line| {
		let len = line.chars().count();

		if len <= 10 || len >= 100 || line.starts_with('#') {
			return None;
		}

		let lower = line.to_lowercase();

		TITLE_HINTS
			.iter()
			.any(|hint| lower.contains(hint))
			.then(|| crate::text::truncate_chars(line, 80).to_string())
	})
}

fn loose_owner(text: &str) -> Option<String> {
	let caps = Regex::new(OWNER_PATTERN).ok()?.captures(text)?;
	let owner = caps.get(1)?.as_str().trim();

	Some(crate::text::truncate_chars(owner, 50).to_string())
}

fn industry_from_keywords(text: &str) -> Option<&'static str> {
	let lower = text.to_lowercase();

	INDUSTRY_FAMILIES
		.iter()
		.find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
		.map(|(industry, _)| *industry)
}
