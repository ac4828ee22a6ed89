//! Playbook synthesis: generated guidance merged with document-derived insights and bounded
//! with defaults.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Analyzer, ComparisonResult, Error, Result, RetrievalIndex, ScoreCard, comparative};
use dfx_config::Playbook as PlaybookCfg;
use dfx_domain::{
	DealMetadata, Phase, Sentiment,
	signals::{self, count_occurrences, mentions_any},
	text,
	timeline::Timeline,
};

const LOW_SCORE: f32 = 5.0;
const DEFAULT_WHAT_WENT_WRONG: [&str; 10] = [
	"Pricing stayed ambiguous and had to be renegotiated",
	"Communication with the customer broke down at key moments",
	"Competitive pressure was not addressed early enough",
	"Delivery expectations were never aligned with the customer",
	"Key agreements were never confirmed in writing",
	"Budget was qualified too late in the cycle",
	"Technical requirements were unclear when pricing was set",
	"No executive sponsor was secured on the customer side",
	"Differentiation from alternatives was not communicated",
	"Slipping timelines created resource conflicts",
];
const DEFAULT_RED_FLAGS: [&str; 10] = [
	"Repeated pricing discussions without a written confirmation",
	"Timeline references without specific dates",
	"Customer said it was evaluating alternatives",
	"Slow answers to critical customer questions",
	"No visible approval process on the customer side",
	"Verbal agreements with no written follow-up",
	"Pricing negotiations stalled more than once",
	"A competitor was named during negotiations",
	"Discounts offered verbally without confirmation",
	"Warranty or penalty clauses missing from the paperwork",
];
const DEFAULT_BEST_PRACTICES: [&str; 10] = [
	"Track every deal conversation and agreement in the CRM",
	"Start proposals from contract templates that include warranty terms",
	"Route pricing exceptions through a documented approval flow",
	"Review high-value opportunities on a fixed cadence",
	"Replace verbal commitments with written recaps",
	"Alert owners early when deal health drops",
	"Validate technical scope before committing to a price",
	"Maintain competitive intelligence for recurring rivals",
	"Put delay penalties into every contract",
	"Confirm verbal agreements in writing within one business day",
];
const DEFAULT_RECOMMENDATIONS: [(Priority, &str, u8, &str); 10] = [
	(Priority::High, "Qualify budget during discovery", 9, "Sales Rep"),
	(Priority::High, "Send a written summary after every pricing discussion", 8, "Sales Rep"),
	(Priority::High, "Build a competitive differentiation matrix", 8, "Sales Manager"),
	(Priority::High, "Secure an executive sponsor early in the cycle", 8, "Sales Manager"),
	(Priority::Med, "Hold a regular check-in with the customer", 7, "Sales Rep"),
	(Priority::Med, "Agree warranty and penalty clauses early", 7, "Sales Manager"),
	(Priority::Med, "Validate technical scope before pricing", 7, "Sales Engineer"),
	(Priority::Low, "Log every verbal agreement in the CRM", 6, "Sales Rep"),
	(Priority::Low, "Use a review checklist for high-value deals", 6, "Sales Manager"),
	(Priority::Low, "Confirm every discount discussion in writing", 6, "Sales Rep"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
	High,
	Med,
	Low,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recommendation {
	pub priority: Priority,
	pub action: String,
	/// 1 to 10.
	pub impact: u8,
	pub owner: String,
}
impl Recommendation {
	fn new(priority: Priority, action: impl Into<String>, impact: u8, owner: &str) -> Self {
		Self { priority, action: action.into(), impact, owner: owner.to_string() }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybookSource {
	Generated,
	Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Playbook {
	pub what_went_wrong: Vec<String>,
	pub red_flags: Vec<String>,
	pub recommendations: Vec<Recommendation>,
	pub best_practices: Vec<String>,
	pub source: PlaybookSource,
}

#[derive(Debug)]
pub struct PlaybookOutcome {
	pub playbook: Playbook,
	pub degradations: Vec<Error>,
}

/// Inputs the playbook is synthesized from.
#[derive(Clone, Copy, Debug)]
pub struct PlaybookInputs<'a> {
	pub raw_text: &'a str,
	pub metadata: &'a DealMetadata,
	pub timeline: &'a Timeline,
	pub comparison: &'a ComparisonResult,
	pub score_card: &'a ScoreCard,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Draft {
	what_went_wrong: Vec<String>,
	red_flags: Vec<String>,
	recommendations: Vec<Recommendation>,
	best_practices: Vec<String>,
}
impl Draft {
	fn extend(&mut self, other: Draft) {
		self.what_went_wrong.extend(other.what_went_wrong);
		self.red_flags.extend(other.red_flags);
		self.recommendations.extend(other.recommendations);
		self.best_practices.extend(other.best_practices);
	}
}

impl Analyzer {
	/// Builds the playbook. Generation problems fall back to document-derived content.
	pub async fn synthesize_playbook(
		&self,
		inputs: PlaybookInputs<'_>,
		index: &RetrievalIndex,
	) -> Result<PlaybookOutcome> {
		let mut degradations = Vec::new();
		let generated = match self.generate_playbook(inputs, index).await {
			Ok(draft) => Some(draft),
			Err(err) if !err.is_fatal() => {
				tracing::warn!(
					kind = err.kind(),
					error = %err,
					"Playbook generation degraded to the document-derived fallback."
				);

				degradations.push(err);

				None
			},
			Err(err) => return Err(err),
		};

		let playbook = assemble(generated, inputs, &self.cfg.playbook);

		Ok(PlaybookOutcome { playbook, degradations })
	}

	async fn generate_playbook(
		&self,
		inputs: PlaybookInputs<'_>,
		index: &RetrievalIndex,
	) -> Result<Draft> {
		let summary = comparative::deal_summary(inputs.metadata, inputs.timeline);
		let k = self.cfg.retrieval.summary_top_k as usize;
		let hits = self.query(index, &summary, k).await?;

		if hits.is_empty() {
			return Err(Error::RetrievalEmpty {
				message: "No chunks retrieved for playbook synthesis.".to_string(),
			});
		}

		let mut context: Vec<String> = hits.iter().map(|hit| hit.chunk.text.clone()).collect();
		let excerpt = text::truncate_chars(inputs.raw_text, self.cfg.playbook.context_chars as usize);

		context.push(format!("Document excerpt:\n{excerpt}"));

		let value = self.generate_json(&playbook_prompt(inputs), &context, "Playbook").await?;

		parse_playbook(value)
	}
}

/// Validates a generator response against the playbook shape.
pub(crate) fn parse_playbook(value: Value) -> Result<Draft> {
	let draft: Draft = serde_json::from_value(value).map_err(|err| Error::Generation {
		message: format!("Playbook response does not match the playbook shape: {err}"),
	})?;

	if let Some(bad) = draft.recommendations.iter().find(|rec| !(1..=10).contains(&rec.impact)) {
		return Err(Error::Generation {
			message: format!("Recommendation impact must be in 1-10, got {}.", bad.impact),
		});
	}
	if draft.recommendations.iter().any(|rec| rec.action.trim().is_empty()) {
		return Err(Error::Generation {
			message: "Recommendation action must be non-empty.".to_string(),
		});
	}

	Ok(draft)
}

fn assemble(generated: Option<Draft>, inputs: PlaybookInputs<'_>, cfg: &PlaybookCfg) -> Playbook {
	let source =
		if generated.is_some() { PlaybookSource::Generated } else { PlaybookSource::Fallback };
	let mut draft = generated.unwrap_or_default();

	draft.extend(document_insights(inputs.raw_text));
	draft.extend(score_insights(inputs.score_card));
	draft.extend(context_insights(inputs.timeline, inputs.comparison));

	let (min_items, max_items) = (cfg.min_items as usize, cfg.max_items as usize);
	let recommendations = bound(
		draft.recommendations,
		DEFAULT_RECOMMENDATIONS
			.iter()
			.map(|(priority, action, impact, owner)| {
				Recommendation::new(*priority, *action, *impact, owner)
			})
			.collect(),
		|rec| rec.action.as_str(),
		cfg.min_recommendations as usize,
		cfg.max_recommendations as usize,
	);

	Playbook {
		what_went_wrong: bound_text(
			draft.what_went_wrong,
			&DEFAULT_WHAT_WENT_WRONG,
			min_items,
			max_items,
		),
		red_flags: bound_text(draft.red_flags, &DEFAULT_RED_FLAGS, min_items, max_items),
		recommendations,
		best_practices: bound_text(
			draft.best_practices,
			&DEFAULT_BEST_PRACTICES,
			min_items,
			max_items,
		),
		source,
	}
}

fn bound_text(items: Vec<String>, defaults: &[&str], min: usize, max: usize) -> Vec<String> {
	bound(
		items.into_iter().map(|item| item.trim().to_string()).collect(),
		defaults.iter().map(|item| item.to_string()).collect(),
		String::as_str,
		min,
		max,
	)
}

/// Drops blanks and case-insensitive duplicates in order, pads from `defaults` up to `min` and
/// truncates to `max`.
fn bound<T, F>(items: Vec<T>, defaults: Vec<T>, key: F, min: usize, max: usize) -> Vec<T>
where
	F: Fn(&T) -> &str,
{
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for item in items {
		let normalized = key(&item).trim().to_lowercase();

		if !normalized.is_empty() && seen.insert(normalized) {
			out.push(item);
		}
	}
	for item in defaults {
		if out.len() >= min {
			break;
		}
		if seen.insert(key(&item).trim().to_lowercase()) {
			out.push(item);
		}
	}

	out.truncate(max);

	out
}

fn document_insights(raw_text: &str) -> Draft {
	let lower = raw_text.to_lowercase();
	let mut draft = Draft::default();

	if lower.trim().is_empty() {
		return draft;
	}

	let pricing_mentions = count_occurrences(&lower, signals::PRICING_MENTIONS);

	if pricing_mentions > 2 {
		draft.what_went_wrong.push(format!(
			"Pricing came up {pricing_mentions} times, so requirements were never settled up front"
		));
		draft.red_flags.push("Repeated pricing discussions without a written confirmation".into());
		draft.recommendations.push(Recommendation::new(
			Priority::High,
			"Run a budget qualification checklist in discovery to avoid renegotiation",
			9,
			"Sales Rep",
		));
	}
	if mentions_any(&lower, &["pricing gap", "budget gap"]) {
		draft.what_went_wrong.push("The proposal and the customer budget were far apart".into());
		draft.red_flags.push("Budget limits were not qualified early".into());
	}

	let competitor = signals::competitor_name(raw_text);

	if competitor.is_some() || lower.contains("competitor") {
		let name = competitor.unwrap_or_else(|| "a competitor".to_string());

		draft.what_went_wrong.push(format!("Pressure from {name} was not countered early enough"));
		draft.red_flags.push(format!("{name} was named during negotiations"));
		draft.recommendations.push(Recommendation::new(
			Priority::High,
			format!("Prepare a differentiation plan against {name} in discovery"),
			8,
			"Sales Manager",
		));
	}
	if mentions_any(&lower, &["delay", "timeline", "delivery"]) {
		if mentions_any(&lower, &["vague", "tbd", "flexible", "q2", "q3"]) {
			draft.what_went_wrong.push("Delivery expectations stayed vague and drifted apart".into());
			draft.red_flags.push("Delivery discussed without specific dates".into());
			draft.recommendations.push(Recommendation::new(
				Priority::Med,
				"Fix delivery dates and penalty clauses in the proposal",
				7,
				"Sales Manager",
			));
		} else if lower.contains("delay") {
			draft.what_went_wrong.push("Delivery slipped behind the agreed plan".into());
			draft.red_flags.push("Schedule delays point to weak planning".into());
		}
	}
	if mentions_any(&lower, &["delayed response", "no response", "miscommunication"]) {
		draft.what_went_wrong.push("Communication with the customer broke down at key moments".into());
		draft.red_flags.push("Slow answers to critical customer questions".into());
		draft.recommendations.push(Recommendation::new(
			Priority::Med,
			"Hold a regular check-in to keep answers flowing",
			7,
			"Sales Rep",
		));
	}
	if lower.contains("verbal") && mentions_any(&lower, &["agreement", "commitment", "discount"]) {
		draft.what_went_wrong.push("Commitments were only made verbally".into());
		draft.red_flags.push("Verbal agreements with no written follow-up".into());
		draft.recommendations.push(Recommendation::new(
			Priority::High,
			"Confirm every verbal agreement in writing within one business day",
			8,
			"Sales Rep",
		));
	}
	if mentions_any(&lower, signals::ESCALATION) {
		draft.what_went_wrong.push("Issues were escalated instead of being resolved early".into());
		draft.red_flags.push("Escalations without a recorded resolution".into());
		draft.recommendations.push(Recommendation::new(
			Priority::Med,
			"Agree escalation paths with the customer before issues arise",
			7,
			"Sales Manager",
		));
	}
	if !mentions_any(&lower, &["warranty", "guarantee"]) {
		draft.red_flags.push("No warranty or guarantee terms in the deal record".into());
		draft.best_practices.push("Include warranty and guarantee terms in every proposal".into());
	}
	if !mentions_any(&lower, &["penalty", "consequence"]) {
		draft.red_flags.push("No penalty clauses for delays or non-compliance".into());
		draft.best_practices.push("Put delay penalties into every contract".into());
	}
	if mentions_any(&lower, signals::VAGUE_DATES) {
		draft.red_flags.push("Timeline references without specific dates".into());
	}

	draft
}

fn score_insights(card: &ScoreCard) -> Draft {
	let mut draft = Draft::default();
	let rules = [
		(
			card.pricing_clarity,
			"Pricing clarity",
			Recommendation::new(
				Priority::High,
				"Confirm price, discounts and budget in writing before the proposal review",
				9,
				"Sales Rep",
			),
		),
		(
			card.communication_quality,
			"Communication quality",
			Recommendation::new(
				Priority::Med,
				"Send a written recap after every customer meeting",
				7,
				"Sales Rep",
			),
		),
		(
			card.documentation_quality,
			"Documentation quality",
			Recommendation::new(
				Priority::High,
				"Record every commitment in the CRM with a signed follow-up",
				8,
				"Sales Rep",
			),
		),
		(
			card.competitive_risk,
			"Competitive position",
			Recommendation::new(
				Priority::High,
				"Map competing vendors during discovery and plan the response",
				8,
				"Sales Manager",
			),
		),
		(
			card.delivery_execution,
			"Delivery execution",
			Recommendation::new(
				Priority::Med,
				"Commit delivery milestones with dates and named owners",
				7,
				"Product Team",
			),
		),
		(
			card.timeline,
			"Timeline health",
			Recommendation::new(
				Priority::Med,
				"Review the deal at every phase transition",
				6,
				"Sales Manager",
			),
		),
	];

	for (score, label, recommendation) in rules {
		if score < LOW_SCORE {
			draft.what_went_wrong.push(format!("{label} scored {score:.1} out of 10"));
			draft.recommendations.push(recommendation);
		}
	}

	draft
}

fn context_insights(timeline: &Timeline, comparison: &ComparisonResult) -> Draft {
	let mut draft = Draft::default();
	let missing: Vec<&str> = Phase::ALL
		.into_iter()
		.filter(|phase| timeline.is_phase_synthesized(*phase))
		.map(Phase::label)
		.collect();

	if !missing.is_empty() && missing.len() < Phase::ALL.len() {
		draft.red_flags.push(format!("No recorded activity for: {}", missing.join(", ")));
	}

	let negative =
		timeline.mentions.iter().filter(|event| event.sentiment == Sentiment::Negative).count();

	if !timeline.mentions.is_empty() && negative * 2 > timeline.mentions.len() {
		draft.what_went_wrong.push("Most recorded events carried negative sentiment".into());
	}
	if timeline.stats.out_of_order > 0 {
		draft.red_flags.push("Deal events were recorded out of order".into());
	}
	if !comparison.shared_patterns.is_empty() {
		let patterns = comparison.shared_patterns.iter().cloned().collect::<Vec<_>>().join(", ");

		draft.what_went_wrong.push(format!("Similar lost deals shared these risks: {patterns}"));
	}
	if let Some((category, percent)) = comparison
		.risk_distribution
		.iter()
		.max_by(|left, right| left.1.total_cmp(right.1))
	{
		draft
			.red_flags
			.push(format!("{category} drove {percent:.0}% of the risk in similar deals"));
	}

	draft
}

fn playbook_prompt(inputs: PlaybookInputs<'_>) -> String {
	let card = inputs.score_card;
	let events = inputs
		.timeline
		.events
		.iter()
		.map(|event| {
			format!(
				"- {} ({}, {}): {}",
				event.phase.label(),
				event.inferred_date,
				event.sentiment.as_str(),
				event.description
			)
		})
		.collect::<Vec<_>>()
		.join("\n");
	let patterns = inputs.comparison.shared_patterns.iter().cloned().collect::<Vec<_>>().join(", ");

	format!(
		"Playbook synthesis for deal: {}\n\
		Write a post-mortem playbook for this lost sales deal using only the excerpts.\n\
		Timeline:\n{events}\n\
		Scores out of 10: timeline {:.1}, pricing clarity {:.1}, communication {:.1}, \
		documentation {:.1}, competitive position {:.1}, delivery {:.1}, overall {:.1}.\n\
		Risk patterns shared with similar deals: {patterns}\n\
		Respond with one JSON object with exactly these keys: \"what_went_wrong\": [string], \
		\"red_flags\": [string], \"recommendations\": [{{\"priority\": \"High\" | \"Med\" | \"Low\", \
		\"action\": string, \"impact\": integer 1-10, \"owner\": string}}], \
		\"best_practices\": [string].",
		inputs.metadata.deal_name,
		card.timeline,
		card.pricing_clarity,
		card.communication_quality,
		card.documentation_quality,
		card.competitive_risk,
		card.delivery_execution,
		card.final_health(),
	)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::playbook::{Priority, bound_text, parse_playbook};

	#[test]
	fn bound_text_dedupes_pads_and_truncates() {
		let items = vec!["Late pricing".to_string(), "late pricing ".to_string(), " ".to_string()];
		let padded = bound_text(items, &["A", "B", "Late Pricing", "C"], 3, 4);

		assert_eq!(padded, vec!["Late pricing", "A", "B"]);

		let many = (0..12).map(|i| format!("Item {i}")).collect();

		assert_eq!(bound_text(many, &[], 3, 10).len(), 10);
	}

	#[test]
	fn playbook_payload_must_match_shape() {
		let draft = parse_playbook(json!({
			"what_went_wrong": ["Pricing drifted"],
			"red_flags": [],
			"recommendations": [
				{ "priority": "High", "action": "Qualify budget", "impact": 9, "owner": "Sales Rep" }
			],
			"best_practices": []
		}))
		.expect("Payload must parse.");

		assert_eq!(draft.recommendations[0].priority, Priority::High);

		for payload in [
			json!({ "what_went_wrong": [], "red_flags": [], "best_practices": [] }),
			json!({
				"what_went_wrong": [],
				"red_flags": [],
				"recommendations": [
					{ "priority": "Urgent", "action": "x", "impact": 5, "owner": "Sales Rep" }
				],
				"best_practices": []
			}),
			json!({
				"what_went_wrong": [],
				"red_flags": [],
				"recommendations": [
					{ "priority": "Low", "action": "x", "impact": 11, "owner": "Sales Rep" }
				],
				"best_practices": []
			}),
		] {
			let err = parse_playbook(payload).expect_err("Expected shape failure.");

			assert!(matches!(err, crate::Error::Generation { .. }), "Unexpected error: {err:?}");
		}
	}
}
