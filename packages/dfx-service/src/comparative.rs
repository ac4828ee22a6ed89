use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{Analyzer, Result, retrieval, round2};
use dfx_config::Comparative;
use dfx_domain::{DealMetadata, HistoricalDealRecord, Sentiment, timeline::Timeline};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DealMatch {
	pub deal_id: String,
	pub similarity_percent: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Benchmark {
	/// Mean deal value over matches that carry one.
	pub average_value: Option<f64>,
	pub outcomes: BTreeMap<String, u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ComparisonResult {
	pub matches: Vec<DealMatch>,
	pub shared_patterns: BTreeSet<String>,
	/// Risk category to percent. Sums to 100 within rounding when non-empty.
	pub risk_distribution: BTreeMap<String, f64>,
	pub benchmark: Benchmark,
}

/// Summary text embedded for the analyzed deal. Mirrors the shape of
/// [`HistoricalDealRecord::summary_text`].
pub fn deal_summary(metadata: &DealMetadata, timeline: &Timeline) -> String {
	let value = metadata.value.map(|value| format!("{value:.0}")).unwrap_or_default();
	let genuine = timeline.events.iter().filter(|event| !event.synthesized);
	let risks = genuine
		.clone()
		.filter(|event| event.sentiment == Sentiment::Negative)
		.map(|event| event.phase.label())
		.collect::<Vec<_>>()
		.join(", ");
	let events = genuine
		.map(|event| format!("{}: {}", event.phase.label(), event.description))
		.collect::<Vec<_>>()
		.join(" ");

	format!(
		"Industry: {}. Value: {}. Outcome: {}. Risks: {}. {}",
		metadata.industry, value, metadata.stage, risks, events
	)
}

impl Analyzer {
	/// Ranks the historical corpus against `summary`.
	pub async fn compare(&self, summary: &str) -> Result<ComparisonResult> {
		if self.corpus.is_empty() {
			return Ok(ComparisonResult::default());
		}

		let query = self.embed_one(summary).await?;
		let missing: Vec<String> = self
			.corpus
			.iter()
			.filter(|record| record.embedding.is_none())
			.map(HistoricalDealRecord::summary_text)
			.collect();
		let mut computed = self.embed_texts(&missing).await?.into_iter();
		let fresh: Vec<Option<Vec<f32>>> = self
			.corpus
			.iter()
			.map(|record| if record.embedding.is_none() { computed.next() } else { None })
			.collect();
		let mut scored = Vec::with_capacity(self.corpus.len());

		for (record, fresh) in self.corpus.iter().zip(&fresh) {
			let Some(vector) = record.embedding.as_deref().or(fresh.as_deref()) else {
				continue;
			};

			if vector.len() != query.len() {
				tracing::warn!(
					deal_id = %record.deal_id,
					dimensions = vector.len(),
					expected = query.len(),
					"Skipping historical deal with mismatched embedding dimensions."
				);

				continue;
			}

			scored.push((record, retrieval::cosine(&query, vector)));
		}

		let result = rank(scored, &self.cfg.comparative);

		tracing::debug!(
			matches = result.matches.len(),
			shared_patterns = result.shared_patterns.len(),
			"Compared deal against historical corpus."
		);

		Ok(result)
	}
}

/// Applies the similarity floor and match limit, then aggregates patterns over the matches.
/// `scored` must be in corpus order so ties keep insertion order.
pub fn rank(scored: Vec<(&HistoricalDealRecord, f32)>, cfg: &Comparative) -> ComparisonResult {
	let mut kept: Vec<(&HistoricalDealRecord, f32)> =
		scored.into_iter().filter(|(_, similarity)| *similarity >= cfg.similarity_floor).collect();

	kept.sort_by(|left, right| retrieval::by_similarity(left.1, right.1));
	kept.truncate(cfg.max_matches as usize);

	let matches = kept
		.iter()
		.map(|(record, similarity)| DealMatch {
			deal_id: record.deal_id.clone(),
			similarity_percent: round2(f64::from(similarity.clamp(0.0, 1.0)) * 100.0),
		})
		.collect();
	let mut tag_support: BTreeMap<&str, u32> = BTreeMap::new();

	for (record, _) in &kept {
		let tags: BTreeSet<&str> = record.risk_tags.iter().map(String::as_str).collect();

		for tag in tags {
			*tag_support.entry(tag).or_default() += 1;
		}
	}

	let shared_patterns = tag_support
		.into_iter()
		.filter(|(_, support)| *support >= cfg.min_pattern_support)
		.map(|(tag, _)| tag.to_string())
		.collect();

	ComparisonResult {
		matches,
		shared_patterns,
		risk_distribution: risk_distribution(&kept),
		benchmark: benchmark(&kept),
	}
}

fn risk_distribution(kept: &[(&HistoricalDealRecord, f32)]) -> BTreeMap<String, f64> {
	let mut totals: BTreeMap<String, f64> = BTreeMap::new();

	for weights in kept.iter().filter_map(|(record, _)| record.normalized_risk_weights()) {
		for (category, weight) in weights {
			*totals.entry(category).or_default() += weight;
		}
	}

	let sum: f64 = totals.values().sum();

	if sum <= 0.0 {
		return BTreeMap::new();
	}

	totals.into_iter().map(|(category, weight)| (category, round2(weight / sum * 100.0))).collect()
}

fn benchmark(kept: &[(&HistoricalDealRecord, f32)]) -> Benchmark {
	let values: Vec<f64> = kept.iter().filter_map(|(record, _)| record.metadata.value).collect();
	let average_value =
		(!values.is_empty()).then(|| round2(values.iter().sum::<f64>() / values.len() as f64));
	let mut outcomes = BTreeMap::new();

	for (record, _) in kept {
		*outcomes.entry(record.metadata.outcome.clone()).or_default() += 1;
	}

	Benchmark { average_value, outcomes }
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use crate::comparative::rank;
	use dfx_config::Comparative;
	use dfx_domain::{HistoricalDealRecord, RecordMetadata};

	fn cfg(floor: f32) -> Comparative {
		Comparative {
			corpus_path: PathBuf::from("unused.json"),
			max_matches: 3,
			similarity_floor: floor,
			min_pattern_support: 2,
		}
	}

	fn record(id: &str, tags: &[&str], value: Option<f64>) -> HistoricalDealRecord {
		HistoricalDealRecord {
			deal_id: id.to_string(),
			embedding: None,
			metadata: RecordMetadata {
				industry: "Logistics".to_string(),
				value,
				outcome: "Closed Lost".to_string(),
			},
			risk_summary: String::new(),
			risk_tags: tags.iter().map(|tag| tag.to_string()).collect(),
			risk_weights: Default::default(),
		}
	}

	#[test]
	fn floor_limit_and_tie_order_are_applied() {
		let records = [
			record("A", &["pricing"], Some(100.0)),
			record("B", &["pricing", "competition"], Some(300.0)),
			record("C", &["competition"], None),
			record("D", &["delivery"], None),
			record("E", &["pricing"], None),
		];
		let scored = vec![
			(&records[0], 0.8),
			(&records[1], 0.9),
			(&records[2], 0.8),
			(&records[3], 0.2),
			(&records[4], 0.5),
		];
		let result = rank(scored, &cfg(0.35));
		let ids: Vec<&str> = result.matches.iter().map(|m| m.deal_id.as_str()).collect();

		assert_eq!(ids, vec!["B", "A", "C"]);
		assert_eq!(result.matches[0].similarity_percent, 90.0);
		assert_eq!(
			result.shared_patterns.iter().cloned().collect::<Vec<_>>(),
			vec!["competition".to_string(), "pricing".to_string()]
		);
		assert_eq!(result.benchmark.average_value, Some(200.0));
		assert_eq!(result.benchmark.outcomes.get("Closed Lost"), Some(&3));
	}

	#[test]
	fn risk_distribution_sums_to_one_hundred() {
		let records = [
			record("A", &["pricing", "delivery", "competition"], None),
			record("B", &["pricing"], None),
			record("C", &["communication", "pricing", "delivery"], None),
		];
		let scored = records.iter().map(|record| (record, 0.9)).collect();
		let result = rank(scored, &cfg(-1.0));
		let total: f64 = result.risk_distribution.values().sum();

		assert!((total - 100.0).abs() <= 1.0, "Unexpected total {total}.");
		assert!(result.risk_distribution["pricing"] > result.risk_distribution["delivery"]);
	}

	#[test]
	fn nothing_above_the_floor_yields_an_empty_result() {
		let records = [record("A", &["pricing"], Some(10.0))];
		let result = rank(vec![(&records[0], 0.1)], &cfg(0.35));

		assert!(result.matches.is_empty());
		assert!(result.risk_distribution.is_empty());
		assert_eq!(result.benchmark.average_value, None);
	}
}
