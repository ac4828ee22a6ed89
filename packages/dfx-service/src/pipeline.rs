//! Ordered stage functions over one analysis context.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Analyzer, BoxFuture, ComparisonResult, Error, Playbook, Result, RetrievalIndex, ScoreCard,
	comparative, playbook::PlaybookInputs, scoring,
};
use dfx_domain::{DealMetadata, metadata, timeline::Timeline};

type StageFn = for<'a> fn(&'a Analyzer, &'a mut AnalysisContext) -> BoxFuture<'a, Result<()>>;

const STAGES: [(Stage, StageFn); 5] = [
	(Stage::Indexing, index_stage),
	(Stage::Timeline, timeline_stage),
	(Stage::Comparative, comparative_stage),
	(Stage::Scoring, scoring_stage),
	(Stage::Playbook, playbook_stage),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Indexing,
	Timeline,
	Comparative,
	Scoring,
	Playbook,
	Assembly,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Stage::Indexing => "indexing",
			Stage::Timeline => "timeline",
			Stage::Comparative => "comparative",
			Stage::Scoring => "scoring",
			Stage::Playbook => "playbook",
			Stage::Assembly => "assembly",
		}
	}
}

impl Display for Stage {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
	Validated,
	TimelineExtracted,
	Compared,
	Scored,
	PlaybookSynthesized,
	Complete,
	Failed { stage: Stage, reason: String },
}

/// A non-fatal error a stage absorbed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Degradation {
	pub stage: Stage,
	pub kind: String,
	pub reason: String,
}

#[derive(Debug, thiserror::Error)]
#[error("Analysis failed at the {stage} stage: {reason}")]
pub struct AnalysisFailure {
	pub stage: Stage,
	pub reason: String,
}

/// Working state of one run. Each stage reads earlier fields and writes its own.
#[derive(Debug)]
pub struct AnalysisContext {
	pub raw_text: String,
	pub as_of: Date,
	pub metadata: DealMetadata,
	pub index: Option<RetrievalIndex>,
	pub timeline: Option<Timeline>,
	pub comparison: Option<ComparisonResult>,
	pub score_card: Option<ScoreCard>,
	pub playbook: Option<Playbook>,
	pub degradations: Vec<Degradation>,
	pub state: State,
}
impl AnalysisContext {
	pub fn new(raw_text: impl Into<String>, as_of: Date) -> Self {
		let raw_text = raw_text.into();
		let metadata = metadata::infer_metadata(&raw_text);

		Self {
			raw_text,
			as_of,
			metadata,
			index: None,
			timeline: None,
			comparison: None,
			score_card: None,
			playbook: None,
			degradations: Vec::new(),
			state: State::Validated,
		}
	}

	fn absorb(&mut self, stage: Stage, errors: Vec<Error>) {
		self.degradations.extend(errors.into_iter().map(|err| Degradation {
			stage,
			kind: err.kind().to_string(),
			reason: err.to_string(),
		}));
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RunMetadata {
	pub run_id: Uuid,
	pub deal: DealMetadata,
	#[serde(with = "dfx_domain::iso_date")]
	pub as_of: Date,
	#[serde(with = "crate::time_serde")]
	pub generated_at: OffsetDateTime,
	pub chunk_count: usize,
	pub degradations: Vec<Degradation>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisResult {
	pub timeline: Timeline,
	pub comparison: ComparisonResult,
	pub score_card: ScoreCard,
	pub playbook: Playbook,
	pub metadata: RunMetadata,
}

impl Analyzer {
	/// Runs every stage over `raw_text`. Only fatal errors abort, reported with the stage that
	/// raised them.
	pub async fn analyze(
		&self,
		raw_text: &str,
		as_of: Date,
	) -> Result<AnalysisResult, AnalysisFailure> {
		let run_id = Uuid::new_v4();
		let mut ctx = AnalysisContext::new(raw_text, as_of);

		tracing::info!(%run_id, deal = %ctx.metadata.deal_name, "Starting deal analysis.");

		for (stage, run) in STAGES {
			if let Err(err) = run(self, &mut ctx).await {
				return Err(fail(run_id, &mut ctx, stage, err));
			}

			tracing::info!(%run_id, %stage, state = ?ctx.state, "Analysis stage completed.");
		}

		match assemble(run_id, ctx) {
			Ok(result) => {
				tracing::info!(
					%run_id,
					final_health = result.score_card.final_health(),
					degradations = result.metadata.degradations.len(),
					"Deal analysis complete."
				);

				Ok(result)
			},
			Err(err) => {
				tracing::error!(
					%run_id,
					stage = %Stage::Assembly,
					error = %err,
					"Deal analysis failed."
				);

				Err(AnalysisFailure { stage: Stage::Assembly, reason: err.to_string() })
			},
		}
	}

	/// [`Analyzer::analyze`] with today's UTC date as the reference fallback.
	pub async fn analyze_now(
		&self,
		raw_text: &str,
	) -> Result<AnalysisResult, AnalysisFailure> {
		self.analyze(raw_text, OffsetDateTime::now_utc().date()).await
	}
}

fn fail(run_id: Uuid, ctx: &mut AnalysisContext, stage: Stage, err: Error) -> AnalysisFailure {
	let reason = err.to_string();

	tracing::error!(%run_id, %stage, kind = err.kind(), error = %err, "Deal analysis failed.");

	ctx.state = State::Failed { stage, reason: reason.clone() };

	AnalysisFailure { stage, reason }
}

fn index_stage<'a>(
	analyzer: &'a Analyzer,
	ctx: &'a mut AnalysisContext,
) -> BoxFuture<'a, Result<()>> {
	Box::pin(async move {
		let index = analyzer.build_index(&ctx.raw_text).await?;

		ctx.index = Some(index);

		Ok(())
	})
}

fn timeline_stage<'a>(
	analyzer: &'a Analyzer,
	ctx: &'a mut AnalysisContext,
) -> BoxFuture<'a, Result<()>> {
	Box::pin(async move {
		let index = require(ctx.index.as_ref(), "retrieval index")?;
		let outcome = analyzer.extract_timeline(&ctx.raw_text, index, ctx.as_of).await?;

		ctx.timeline = Some(outcome.timeline);
		ctx.absorb(Stage::Timeline, outcome.degradations);
		ctx.state = State::TimelineExtracted;

		Ok(())
	})
}

fn comparative_stage<'a>(
	analyzer: &'a Analyzer,
	ctx: &'a mut AnalysisContext,
) -> BoxFuture<'a, Result<()>> {
	Box::pin(async move {
		let index = require(ctx.index.as_ref(), "retrieval index")?;
		let timeline = require(ctx.timeline.as_ref(), "timeline")?;
		let comparison = if index.is_empty() {
			let err = Error::RetrievalEmpty {
				message: "Document produced no chunks; comparison skipped.".to_string(),
			};

			tracing::warn!(kind = err.kind(), error = %err, "Comparison degraded to an empty result.");

			ctx.absorb(Stage::Comparative, vec![err]);

			ComparisonResult::default()
		} else {
			let summary = comparative::deal_summary(&ctx.metadata, timeline);

			analyzer.compare(&summary).await?
		};

		ctx.comparison = Some(comparison);
		ctx.state = State::Compared;

		Ok(())
	})
}

fn scoring_stage<'a>(
	analyzer: &'a Analyzer,
	ctx: &'a mut AnalysisContext,
) -> BoxFuture<'a, Result<()>> {
	Box::pin(async move {
		let timeline = require(ctx.timeline.as_ref(), "timeline")?;
		let comparison = require(ctx.comparison.as_ref(), "comparison")?;
		let card = scoring::score(&ctx.raw_text, timeline, comparison, &analyzer.cfg);

		ctx.score_card = Some(card);
		ctx.state = State::Scored;

		Ok(())
	})
}

fn playbook_stage<'a>(
	analyzer: &'a Analyzer,
	ctx: &'a mut AnalysisContext,
) -> BoxFuture<'a, Result<()>> {
	Box::pin(async move {
		let inputs = PlaybookInputs {
			raw_text: &ctx.raw_text,
			metadata: &ctx.metadata,
			timeline: require(ctx.timeline.as_ref(), "timeline")?,
			comparison: require(ctx.comparison.as_ref(), "comparison")?,
			score_card: require(ctx.score_card.as_ref(), "score card")?,
		};
		let index = require(ctx.index.as_ref(), "retrieval index")?;
		let outcome = analyzer.synthesize_playbook(inputs, index).await?;

		ctx.playbook = Some(outcome.playbook);
		ctx.absorb(Stage::Playbook, outcome.degradations);
		ctx.state = State::PlaybookSynthesized;

		Ok(())
	})
}

fn assemble(run_id: Uuid, mut ctx: AnalysisContext) -> Result<AnalysisResult> {
	let chunk_count = require(ctx.index.as_ref(), "retrieval index")?.len();
	let timeline = take(&mut ctx.timeline, "timeline")?;
	let comparison = take(&mut ctx.comparison, "comparison")?;
	let score_card = take(&mut ctx.score_card, "score card")?;
	let playbook = take(&mut ctx.playbook, "playbook")?;

	ctx.state = State::Complete;

	Ok(AnalysisResult {
		timeline,
		comparison,
		score_card,
		playbook,
		metadata: RunMetadata {
			run_id,
			deal: ctx.metadata,
			as_of: ctx.as_of,
			generated_at: OffsetDateTime::now_utc(),
			chunk_count,
			degradations: ctx.degradations,
		},
	})
}

fn require<'a, T>(field: Option<&'a T>, name: &str) -> Result<&'a T> {
	field.ok_or_else(|| Error::ContractViolation {
		message: format!("Stage input {name} is not populated."),
	})
}

fn take<T>(field: &mut Option<T>, name: &str) -> Result<T> {
	field.take().ok_or_else(|| Error::ContractViolation {
		message: format!("Stage output {name} is not populated."),
	})
}
