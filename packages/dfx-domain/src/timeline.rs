use serde::{Deserialize, Serialize};
use time::Date;

use crate::phase::{Phase, Sentiment};

/// Confidence carried by synthesized placeholder events.
pub const PLACEHOLDER_CONFIDENCE: f32 = 0.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
	Absolute,
	Relative,
	Contextual,
	Synthesized,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
	pub phase: Phase,
	pub raw_mention: String,
	pub description: String,
	#[serde(with = "crate::iso_date")]
	pub inferred_date: Date,
	pub sentiment: Sentiment,
	pub confidence: f32,
	pub mention_kind: MentionKind,
	pub synthesized: bool,
}
impl TimelineEvent {
	pub fn genuine(
		phase: Phase,
		raw_mention: impl Into<String>,
		description: impl Into<String>,
		inferred_date: Date,
		sentiment: Sentiment,
		confidence: f32,
		mention_kind: MentionKind,
	) -> Self {
		Self {
			phase,
			raw_mention: raw_mention.into(),
			description: description.into(),
			inferred_date,
			sentiment,
			confidence: confidence.clamp(0.0, 1.0),
			mention_kind,
			synthesized: false,
		}
	}

	/// Neutral, lowest-confidence stand-in for a phase that produced no events.
	pub fn placeholder(phase: Phase, inferred_date: Date) -> Self {
		Self {
			phase,
			raw_mention: String::new(),
			description: format!("No evidence recovered for the {} phase.", phase.label()),
			inferred_date,
			sentiment: Sentiment::Neutral,
			confidence: PLACEHOLDER_CONFIDENCE,
			mention_kind: MentionKind::Synthesized,
			synthesized: true,
		}
	}
}

/// Counters the timeline score is derived from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineStats {
	pub genuine_phases: u32,
	pub mentions: u32,
	pub contextual_mentions: u32,
	pub out_of_order: u32,
	pub span_days: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
	/// One representative per phase, strictly increasing by date.
	pub events: Vec<TimelineEvent>,
	/// Every resolved genuine candidate, in resolution order.
	pub mentions: Vec<TimelineEvent>,
	#[serde(with = "crate::iso_date")]
	pub reference_date: Date,
	pub score: f32,
	pub stats: TimelineStats,
}
impl Timeline {
	pub fn event(&self, phase: Phase) -> Option<&TimelineEvent> {
		self.events.iter().find(|event| event.phase == phase)
	}

	pub fn mentions_in(&self, phase: Phase) -> impl Iterator<Item = &TimelineEvent> {
		self.mentions.iter().filter(move |event| event.phase == phase)
	}

	pub fn is_phase_synthesized(&self, phase: Phase) -> bool {
		self.event(phase).map(|event| event.synthesized).unwrap_or(true)
	}
}
