//! Deterministic sub-scores over the document text, the timeline and the comparison.

use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::{ComparisonResult, round2};
use dfx_config::{Config, ScoreWeights};
use dfx_domain::{
	Phase, Sentiment,
	signals::{self, count_occurrences, count_present},
	timeline::Timeline,
};

const SCORE_MAX: f64 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ScoreCard {
	pub timeline: f32,
	pub pricing_clarity: f32,
	pub communication_quality: f32,
	pub documentation_quality: f32,
	pub competitive_risk: f32,
	pub delivery_execution: f32,
	pub weights: ScoreWeights,
}
impl ScoreCard {
	/// Sub-scores in the same order as [`ScoreWeights::as_array`].
	pub fn sub_scores(&self) -> [f32; 6] {
		[
			self.timeline,
			self.pricing_clarity,
			self.communication_quality,
			self.documentation_quality,
			self.competitive_risk,
			self.delivery_execution,
		]
	}

	/// Weighted combination of the sub-scores. Derived on every call, never stored.
	pub fn final_health(&self) -> f32 {
		let weighted: f64 = self
			.weights
			.as_array()
			.iter()
			.zip(self.sub_scores())
			.map(|(weight, score)| f64::from(*weight) * f64::from(score))
			.sum();

		round2(weighted.clamp(0.0, SCORE_MAX)) as f32
	}
}

impl Serialize for ScoreCard {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut state = serializer.serialize_struct("ScoreCard", 8)?;

		state.serialize_field("timeline", &self.timeline)?;
		state.serialize_field("pricing_clarity", &self.pricing_clarity)?;
		state.serialize_field("communication_quality", &self.communication_quality)?;
		state.serialize_field("documentation_quality", &self.documentation_quality)?;
		state.serialize_field("competitive_risk", &self.competitive_risk)?;
		state.serialize_field("delivery_execution", &self.delivery_execution)?;
		state.serialize_field("final_health", &self.final_health())?;
		state.serialize_field("weights", &self.weights)?;
		state.end()
	}
}

/// Scores one analyzed deal. Pure: identical inputs give identical cards.
pub fn score(
	raw_text: &str,
	timeline: &Timeline,
	comparison: &ComparisonResult,
	cfg: &Config,
) -> ScoreCard {
	let lower = raw_text.to_lowercase();

	ScoreCard {
		timeline: finish(f64::from(timeline.score)),
		pricing_clarity: finish(pricing_clarity(&lower, timeline)),
		communication_quality: finish(communication_quality(&lower, timeline)),
		documentation_quality: finish(documentation_quality(&lower)),
		competitive_risk: finish(competitive_risk(raw_text, timeline, comparison)),
		delivery_execution: finish(delivery_execution(
			&lower,
			timeline,
			cfg.timeline.expected_cycle_days,
		)),
		weights: cfg.scoring.weights,
	}
}

fn pricing_clarity(lower: &str, timeline: &Timeline) -> f64 {
	let ambiguity = f64::from(count_present(lower, signals::PRICING_AMBIGUITY));
	let clarity = f64::from(count_present(lower, signals::PRICING_CLARITY));
	let risk = f64::from(count_present(lower, signals::PRICING_RISK));
	let negative = negative_mentions(timeline, &[Phase::PricingNegotiation]);
	let mut score = 8.0;

	score -= (0.5 * ambiguity).min(3.0);
	score += (0.5 * clarity).min(2.0);
	score -= (0.5 * risk).min(2.0);
	score -= (0.75 * negative).min(2.25);

	if count_occurrences(lower, signals::PRICING_MENTIONS) > 2 {
		score -= 1.0;
	}

	score
}

fn communication_quality(lower: &str, timeline: &Timeline) -> f64 {
	let total = timeline.mentions.len() as f64;
	let (negative_ratio, positive_ratio) = if total == 0.0 {
		(0.0, 0.0)
	} else {
		let count = |sentiment: Sentiment| {
			timeline.mentions.iter().filter(|event| event.sentiment == sentiment).count() as f64
		};

		(count(Sentiment::Negative) / total, count(Sentiment::Positive) / total)
	};
	let issues = f64::from(count_present(lower, signals::COMMUNICATION_ISSUES));
	let good = f64::from(count_present(lower, signals::COMMUNICATION_GOOD));
	let escalation = f64::from(count_present(lower, signals::ESCALATION));

	8.0 - 4.0 * negative_ratio + positive_ratio - (0.5 * issues).min(3.5) + (0.35 * good).min(2.0)
		- (0.5 * escalation).min(2.0)
}

fn documentation_quality(lower: &str) -> f64 {
	let verbal = f64::from(count_present(lower, signals::VERBAL_ONLY));
	let written = f64::from(count_present(lower, signals::WRITTEN_RECORD));
	let missing = f64::from(count_present(lower, signals::MISSING_DOCUMENT));

	7.0 - (0.6 * verbal).min(3.0) + (0.4 * written).min(3.0) - (0.5 * missing).min(3.0)
}

/// Higher is safer. Any competitor presence lands below 5.
fn competitive_risk(
	raw_text: &str,
	timeline: &Timeline,
	comparison: &ComparisonResult,
) -> f64 {
	let mentions = signals::competitor_mentions(raw_text);
	let name = signals::competitor_name(raw_text);
	let mut score = SCORE_MAX;

	if mentions > 0 || name.is_some() {
		score -= 5.5;
		score -= (0.75 * f64::from(mentions.saturating_sub(1))).min(3.0);
	}

	let name_lower = name.map(|name| name.to_lowercase());
	let late_reference = timeline
		.mentions
		.iter()
		.filter(|event| matches!(event.phase, Phase::IssueEscalation | Phase::FinalDecision))
		.any(|event| {
			let text = format!("{} {}", event.description, event.raw_mention).to_lowercase();

			signals::mentions_any(&text, signals::COMPETITOR)
				|| name_lower.as_deref().is_some_and(|name| text.contains(name))
		});

	if late_reference {
		score -= 1.0;
	}

	let share = comparison.risk_distribution.get("competition").copied().unwrap_or(0.0) / 100.0;

	score -= 2.0 * share;

	score
}

fn delivery_execution(lower: &str, timeline: &Timeline, cycle_days: u32) -> f64 {
	let vague = f64::from(count_present(lower, signals::DELIVERY_VAGUE));
	let specific = f64::from(count_present(lower, signals::DELIVERY_SPECIFIC));
	let issues = f64::from(count_present(lower, signals::DELIVERY_ISSUES));
	let negative = negative_mentions(timeline, &[Phase::DeliveryPlanning, Phase::IssueEscalation]);
	let mut score = 8.0;

	if timeline.is_phase_synthesized(Phase::DeliveryPlanning) {
		score -= 2.0;
	}

	score -= (0.5 * f64::from(timeline.stats.out_of_order)).min(2.0);

	if timeline.stats.span_days > 2 * i64::from(cycle_days) {
		score -= 1.5;
	}

	score -= (0.5 * vague).min(3.0);
	score += (0.5 * specific).min(2.0);
	score -= (0.7 * issues).min(3.5);
	score -= (0.75 * negative).min(3.0);

	score
}

fn negative_mentions(timeline: &Timeline, phases: &[Phase]) -> f64 {
	timeline
		.mentions
		.iter()
		.filter(|event| phases.contains(&event.phase) && event.sentiment == Sentiment::Negative)
		.count() as f64
}

fn finish(score: f64) -> f32 {
	round2(score.clamp(0.0, SCORE_MAX)) as f32
}
