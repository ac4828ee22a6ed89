use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One closed deal from the historical corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDealRecord {
	pub deal_id: String,
	#[serde(default)]
	pub embedding: Option<Vec<f32>>,
	pub metadata: RecordMetadata,
	pub risk_summary: String,
	#[serde(default)]
	pub risk_tags: Vec<String>,
	/// Risk category to raw weight. Empty means one unit per risk tag.
	#[serde(default)]
	pub risk_weights: BTreeMap<String, f32>,
}
impl HistoricalDealRecord {
	/// Text embedded for records stored without a vector.
	pub fn summary_text(&self) -> String {
		let value = self.metadata.value.map(|value| format!("{value:.0}")).unwrap_or_default();

		format!(
			"Industry: {}. Value: {}. Outcome: {}. Risks: {}. {}",
			self.metadata.industry,
			value,
			self.metadata.outcome,
			self.risk_tags.join(", "),
			self.risk_summary
		)
	}

	/// Risk weights normalized to sum to one, or `None` when the record carries no risk signal.
	pub fn normalized_risk_weights(&self) -> Option<BTreeMap<String, f64>> {
		let mut raw: BTreeMap<String, f64> = self
			.risk_weights
			.iter()
			.filter(|(_, weight)| weight.is_finite() && **weight > 0.0)
			.map(|(category, weight)| (category.clone(), f64::from(*weight)))
			.collect();

		if raw.is_empty() {
			for tag in &self.risk_tags {
				raw.insert(tag.clone(), 1.0);
			}
		}

		let total: f64 = raw.values().sum();

		if total <= 0.0 {
			return None;
		}

		Some(raw.into_iter().map(|(category, weight)| (category, weight / total)).collect())
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
	pub industry: String,
	#[serde(default)]
	pub value: Option<f64>,
	pub outcome: String,
}
