//! Phase-anchored event extraction and deterministic date resolution.

use serde::Deserialize;
use serde_json::Value;
use time::Date;

use crate::{Analyzer, Error, Result, RetrievalIndex, round2};
use dfx_config::Timeline as TimelineCfg;
use dfx_domain::{
	MentionKind, Phase, Sentiment, TimelineEvent,
	dates::{self, DateMention},
	timeline::{Timeline, TimelineStats},
};

const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventsPayload {
	events: Vec<EventPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventPayload {
	description: String,
	date_mention: String,
	sentiment: Sentiment,
	#[serde(default)]
	confidence: Option<f32>,
}

/// A generated event before its date is resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
	pub description: String,
	pub date_mention: String,
	pub sentiment: Sentiment,
	pub confidence: f32,
}

#[derive(Debug)]
pub struct TimelineOutcome {
	pub timeline: Timeline,
	/// Non-fatal errors absorbed by the missing-phase policy.
	pub degradations: Vec<Error>,
}

enum Entry {
	Mention { phase: Phase, candidate: Candidate, mention: DateMention },
	Placeholder(Phase),
}
impl Entry {
	fn is_absolute(&self) -> bool {
		matches!(self, Entry::Mention { mention: DateMention::Absolute(_), .. })
	}
}

impl Analyzer {
	/// Extracts one representative event per phase. Only fatal errors reach the caller.
	pub async fn extract_timeline(
		&self,
		raw_text: &str,
		index: &RetrievalIndex,
		as_of: Date,
	) -> Result<TimelineOutcome> {
		let (discovery, pricing, delivery, escalation, decision) = tokio::join!(
			self.phase_candidates(index, Phase::Discovery),
			self.phase_candidates(index, Phase::PricingNegotiation),
			self.phase_candidates(index, Phase::DeliveryPlanning),
			self.phase_candidates(index, Phase::IssueEscalation),
			self.phase_candidates(index, Phase::FinalDecision),
		);
		let mut per_phase = Vec::with_capacity(Phase::ALL.len());
		let mut degradations = Vec::new();

		for (phase, result) in
			Phase::ALL.into_iter().zip([discovery, pricing, delivery, escalation, decision])
		{
			match result {
				Ok(candidates) => per_phase.push((phase, candidates)),
				Err(err) if !err.is_fatal() => {
					tracing::warn!(
						phase = phase.as_str(),
						kind = err.kind(),
						error = %err,
						"Phase extraction degraded to a placeholder."
					);

					degradations.push(err);
					per_phase.push((phase, Vec::new()));
				},
				Err(err) => return Err(err),
			}
		}

		let reference = dates::reference_date(raw_text).unwrap_or(as_of);
		let timeline = resolve(per_phase, reference, &self.cfg.timeline);

		tracing::debug!(
			genuine_phases = timeline.stats.genuine_phases,
			mentions = timeline.stats.mentions,
			out_of_order = timeline.stats.out_of_order,
			score = timeline.score,
			"Resolved timeline."
		);

		Ok(TimelineOutcome { timeline, degradations })
	}

	async fn phase_candidates(&self, index: &RetrievalIndex, phase: Phase) -> Result<Vec<Candidate>> {
		let k = self.cfg.retrieval.phase_top_k as usize;
		let hits = self.query(index, &phase.anchor_query(), k).await?;

		if hits.is_empty() {
			return Err(Error::RetrievalEmpty {
				message: format!("No chunks retrieved for the {} phase.", phase.label()),
			});
		}

		let context: Vec<String> = hits.iter().map(|hit| hit.chunk.text.clone()).collect();
		let value = self.generate_json(&phase_prompt(phase), &context, phase.label()).await?;

		parse_events(phase, value)
	}
}

/// Validates a generator response against the events shape.
pub fn parse_events(phase: Phase, value: Value) -> Result<Vec<Candidate>> {
	let payload: EventsPayload = serde_json::from_value(value).map_err(|err| Error::Generation {
		message: format!("{} phase response does not match the events shape: {err}", phase.label()),
	})?;
	let mut candidates = Vec::with_capacity(payload.events.len());

	for event in payload.events {
		let description = event.description.trim();

		if description.is_empty() {
			return Err(Error::Generation {
				message: format!("{} phase event has an empty description.", phase.label()),
			});
		}

		let confidence = event.confidence.unwrap_or(DEFAULT_CONFIDENCE);

		if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
			return Err(Error::Generation {
				message: format!("{} phase event confidence must be in [0, 1].", phase.label()),
			});
		}

		candidates.push(Candidate {
			description: description.to_string(),
			date_mention: event.date_mention.trim().to_string(),
			sentiment: event.sentiment,
			confidence,
		});
	}

	Ok(candidates)
}

/// Resolves candidates into a strictly increasing five-phase timeline.
///
/// Candidates are walked in phase order, then response order. A phase with no candidates gets a
/// placeholder at its position in the walk.
pub fn resolve(
	per_phase: Vec<(Phase, Vec<Candidate>)>,
	reference: Date,
	cfg: &TimelineCfg,
) -> Timeline {
	let reference_year = reference.year();
	let mut walk = Vec::new();

	for phase in Phase::ALL {
		let candidates = per_phase
			.iter()
			.find(|(candidate_phase, _)| *candidate_phase == phase)
			.map(|(_, candidates)| candidates.as_slice())
			.unwrap_or_default();

		if candidates.is_empty() {
			walk.push(Entry::Placeholder(phase));

			continue;
		}

		for candidate in candidates {
			let mention = dates::classify(&candidate.date_mention, reference_year);

			walk.push(Entry::Mention { phase, candidate: candidate.clone(), mention });
		}
	}

	let anchor = anchor_date(&walk, reference, cfg);
	let mut prev: Option<Date> = None;
	let mut last_genuine: Option<Date> = None;
	let mut mentions = Vec::new();
	let mut placeholders = Vec::new();
	let mut stats = TimelineStats::default();
	let mut datable = 0_u32;

	for (position, entry) in walk.into_iter().enumerate() {
		let gap = gap_days(position, cfg);
		let after_prev = |days: i64| prev.map(|date| dates::add_days(date, days)).unwrap_or(anchor);
		let proposed = match &entry {
			Entry::Mention { mention: DateMention::Absolute(date), .. } => *date,
			Entry::Mention { mention: DateMention::Relative(offset), .. } =>
				prev.map(|date| offset.apply(date)).unwrap_or(anchor),
			Entry::Mention { mention: DateMention::Contextual, .. } | Entry::Placeholder(_) =>
				after_prev(gap),
		};
		let date = match prev {
			Some(previous) if proposed <= previous => dates::add_days(previous, gap),
			_ => dates::clamp_floor(proposed),
		};

		match entry {
			Entry::Placeholder(phase) => placeholders.push(TimelineEvent::placeholder(phase, date)),
			Entry::Mention { phase, candidate, mention } => {
				let kind = match mention {
					DateMention::Absolute(_) => MentionKind::Absolute,
					DateMention::Relative(_) => MentionKind::Relative,
					DateMention::Contextual => MentionKind::Contextual,
				};

				if kind == MentionKind::Contextual {
					stats.contextual_mentions += 1;
				} else {
					datable += 1;

					if last_genuine.is_some_and(|genuine| proposed <= genuine) {
						stats.out_of_order += 1;
					}
				}

				stats.mentions += 1;
				last_genuine = Some(date);

				mentions.push(TimelineEvent::genuine(
					phase,
					candidate.date_mention,
					candidate.description,
					date,
					candidate.sentiment,
					candidate.confidence,
					kind,
				));
			},
		}

		prev = Some(date);
	}

	let mut events = Vec::with_capacity(Phase::ALL.len());

	for phase in Phase::ALL {
		let representative = mentions
			.iter()
			.filter(|event| event.phase == phase)
			.fold(None::<&TimelineEvent>, |best, event| match best {
				Some(best)
					if best.confidence > event.confidence
						|| (best.confidence == event.confidence
							&& best.inferred_date <= event.inferred_date) =>
					Some(best),
				_ => Some(event),
			});

		match representative {
			Some(event) => {
				stats.genuine_phases += 1;

				events.push(event.clone());
			},
			None => {
				if let Some(placeholder) = placeholders.iter().find(|event| event.phase == phase) {
					events.push(placeholder.clone());
				}
			},
		}
	}

	stats.span_days = match (events.first(), events.last()) {
		(Some(first), Some(last)) => dates::days_between(first.inferred_date, last.inferred_date),
		_ => 0,
	};

	let score = timeline_score(&stats, datable, cfg);

	Timeline { events, mentions, reference_date: reference, score, stats }
}

/// Spacing used for contextual mentions, placeholders and out-of-order bumps.
pub fn gap_days(position: usize, cfg: &TimelineCfg) -> i64 {
	let min = i64::from(cfg.min_gap_days);
	let width = i64::from(cfg.max_gap_days.saturating_sub(cfg.min_gap_days)) + 1;

	min + (position as i64 % width)
}

fn anchor_date(walk: &[Entry], reference: Date, cfg: &TimelineCfg) -> Date {
	let earliest = walk
		.iter()
		.filter_map(|entry| match entry {
			Entry::Mention { mention: DateMention::Absolute(date), .. } => Some(*date),
			_ => None,
		})
		.min();
	let anchor = match (earliest, walk.iter().position(Entry::is_absolute)) {
		(Some(earliest), Some(leading)) =>
			dates::add_days(earliest, -(i64::from(cfg.max_gap_days) * leading as i64)),
		_ => dates::add_days(reference, -i64::from(cfg.expected_cycle_days)),
	};

	dates::clamp_floor(anchor)
}

fn timeline_score(stats: &TimelineStats, datable: u32, cfg: &TimelineCfg) -> f32 {
	let weights = &cfg.score_weights;
	let coverage = f64::from(stats.genuine_phases) / Phase::ALL.len() as f64;
	let ordering = if datable == 0 {
		1.0
	} else {
		(1.0 - f64::from(stats.out_of_order) / f64::from(datable)).max(0.0)
	};
	let clarity = if stats.mentions == 0 {
		0.0
	} else {
		1.0 - f64::from(stats.contextual_mentions) / f64::from(stats.mentions)
	};
	let span_fit = span_fit(stats.span_days, cfg.expected_cycle_days);
	let weighted = f64::from(weights.coverage) * coverage
		+ f64::from(weights.ordering) * ordering
		+ f64::from(weights.clarity) * clarity
		+ f64::from(weights.span) * span_fit;

	round2((1.0 + 9.0 * weighted).clamp(1.0, 10.0)) as f32
}

/// 1.0 inside `[0.25, 2.0] x cycle`, falling linearly to 0 outside.
fn span_fit(span_days: i64, cycle_days: u32) -> f64 {
	let cycle = f64::from(cycle_days);
	let (low, high) = (0.25 * cycle, 2.0 * cycle);
	let span = span_days.max(0) as f64;

	if span < low {
		if low <= 0.0 { 1.0 } else { span / low }
	} else if span > high {
		(1.0 - (span - high) / high).max(0.0)
	} else {
		1.0
	}
}

fn phase_prompt(phase: Phase) -> String {
	format!(
		"Phase: {}\n\
		You are reconstructing the timeline of a lost sales deal. From the document excerpts, list \
		every event that belongs to the {} phase.\n\
		Respond with one JSON object of the form {{\"events\": [{{\"description\": string, \
		\"date_mention\": string, \"sentiment\": \"positive\" | \"neutral\" | \"negative\", \
		\"confidence\": number}}]}}.\n\
		Copy date_mention exactly as written in the excerpt, or describe its context when no date \
		is given. Confidence is between 0 and 1. Return {{\"events\": []}} when the phase is not \
		discussed.",
		phase.as_str(),
		phase.label()
	)
}
