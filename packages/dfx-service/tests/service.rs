use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Value, json};
use time::{Date, macros::date};

use dfx_config::{Config, EmbeddingProviderConfig, GeneratorProviderConfig};
use dfx_domain::{Phase, dates};
use dfx_service::{
	Analyzer, BoxFuture, EmbeddingProvider, Error, GeneratorProvider, PlaybookSource, Providers,
	Result, Stage,
};
use dfx_storage::EmbeddingCache;
use dfx_testkit::SAMPLE_DEAL_TEXT;

const AS_OF: Date = date!(2024 - 06 - 30);

struct HashEmbedding {
	dimensions: usize,
	calls: AtomicUsize,
	/// Calls allowed to succeed before every later call fails.
	budget: Option<usize>,
}
impl HashEmbedding {
	fn new(dimensions: usize) -> Self {
		Self { dimensions, calls: AtomicUsize::new(0), budget: None }
	}

	fn failing_after(dimensions: usize, budget: usize) -> Self {
		Self { dimensions, calls: AtomicUsize::new(0), budget: Some(budget) }
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		_: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if self.budget.is_some_and(|budget| call >= budget) {
				return Err(Error::Embedding { message: "Embedding endpoint unavailable.".into() });
			}

			Ok(texts
				.iter()
				.map(|text| dfx_testkit::hash_embedding(text, self.dimensions))
				.collect())
		})
	}
}

enum Script {
	Scenario,
	Fail,
	Malformed,
	Slow(Duration),
}

struct ScriptedGenerator {
	script: Script,
	calls: AtomicUsize,
}
impl ScriptedGenerator {
	fn new(script: Script) -> Self {
		Self { script, calls: AtomicUsize::new(0) }
	}
}
impl GeneratorProvider for ScriptedGenerator {
	fn generate<'a>(
		&'a self,
		_: &'a GeneratorProviderConfig,
		prompt: &'a str,
		_: &'a [String],
	) -> BoxFuture<'a, Result<Value>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			match &self.script {
				Script::Scenario => Ok(scenario_response(prompt)),
				Script::Fail => Err(Error::Generation { message: "Model unavailable.".into() }),
				Script::Malformed => Ok(json!({ "unexpected": true })),
				Script::Slow(delay) => {
					tokio::time::sleep(*delay).await;

					Ok(scenario_response(prompt))
				},
			}
		})
	}
}

fn event(description: &str, date_mention: &str, sentiment: &str, confidence: f64) -> Value {
	json!({
		"description": description,
		"date_mention": date_mention,
		"sentiment": sentiment,
		"confidence": confidence,
	})
}

fn scenario_response(prompt: &str) -> Value {
	let phase = prompt.lines().next().and_then(|line| line.strip_prefix("Phase: "));
	let events = match phase {
		Some("discovery") => vec![event(
			"Discovery call on fleet tracking requirements.",
			"March 1",
			"positive",
			0.9,
		)],
		Some("pricing_negotiation") =>
			vec![event("Procurement said the price was too high.", "March 3", "negative", 0.8)],
		Some("delivery_planning") => vec![event(
			"Rollout date stayed TBD.",
			"during delivery planning",
			"neutral",
			0.6,
		)],
		Some("issue_escalation") => vec![event(
			"Customer escalated the integration delay and cited a competitor, Routeline Systems.",
			"March 10",
			"negative",
			0.8,
		)],
		Some("final_decision") => vec![event(
			"Steering committee chose Routeline Systems.",
			"two weeks later",
			"negative",
			0.9,
		)],
		_ => {
			return json!({
				"what_went_wrong": ["Pricing was challenged before value was established"],
				"red_flags": ["Competitor named during escalation"],
				"recommendations": [{
					"priority": "High",
					"action": "Qualify budget before sending the first quote",
					"impact": 9,
					"owner": "Sales Rep"
				}],
				"best_practices": ["Confirm discounts in writing"]
			});
		},
	};

	json!({ "events": events })
}

fn sample_cfg() -> Config {
	dfx_testkit::sample_config().expect("Sample config must be valid.")
}

fn analyzer_with(
	cfg: Config,
	embedding: Arc<HashEmbedding>,
	generator: Arc<ScriptedGenerator>,
) -> Analyzer {
	let cache = EmbeddingCache::in_memory(dfx_service::embedding_namespace(&cfg));
	let corpus = dfx_testkit::sample_corpus().expect("Sample corpus must decode.");

	Analyzer::with_providers(cfg, Arc::new(cache), corpus, Providers::new(embedding, generator))
}

fn dims(cfg: &Config) -> usize {
	cfg.providers.embedding.dimensions as usize
}

#[tokio::test]
async fn explicit_march_dates_with_competitor_yield_ordered_timeline() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding, generator);
	let result = analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await.expect("Analysis must succeed.");
	let timeline = &result.timeline;

	assert_eq!(timeline.events.len(), 5);

	for phase in Phase::ALL {
		assert_eq!(timeline.events.iter().filter(|event| event.phase == phase).count(), 1);
	}
	for pair in timeline.events.windows(2) {
		assert!(pair[0].inferred_date < pair[1].inferred_date, "Dates must strictly increase.");
	}

	let date_of = |phase| timeline.event(phase).expect("Phase must be present.").inferred_date;

	assert_eq!(date_of(Phase::Discovery), date!(2024 - 03 - 01));
	assert_eq!(date_of(Phase::PricingNegotiation), date!(2024 - 03 - 03));
	assert_eq!(date_of(Phase::DeliveryPlanning), date!(2024 - 03 - 06));
	assert_eq!(date_of(Phase::IssueEscalation), date!(2024 - 03 - 10));
	assert_eq!(date_of(Phase::FinalDecision), date!(2024 - 03 - 24));
	assert_eq!(timeline.reference_date, date!(2024 - 03 - 24));
	assert!(timeline.events.iter().all(|event| !event.synthesized));
	assert!(result.score_card.competitive_risk < 5.0);
	assert_eq!(result.playbook.source, PlaybookSource::Generated);
	assert_eq!(
		result.playbook.what_went_wrong[0],
		"Pricing was challenged before value was established"
	);
	assert_eq!(result.metadata.deal.deal_name, "Northwind Logistics Fleet Platform");
	assert!(result.metadata.degradations.is_empty(), "{:?}", result.metadata.degradations);
	assert!(result.metadata.chunk_count > 0);
}

#[tokio::test]
async fn empty_document_yields_placeholders_and_no_matches() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding.clone(), generator.clone());
	let result = analyzer.analyze("", AS_OF).await.expect("Analysis must succeed.");
	let events = &result.timeline.events;

	assert_eq!(events.len(), 5);
	assert!(events.iter().all(|event| event.synthesized && event.confidence == 0.0));
	assert!(events.iter().all(|event| event.inferred_date >= dates::MIN_DATE));
	assert_eq!(events[0].inferred_date, date!(2024 - 04 - 01));

	for pair in events.windows(2) {
		let gap = (pair[1].inferred_date - pair[0].inferred_date).whole_days();

		assert!((1..=7).contains(&gap), "Unexpected gap {gap}.");
	}

	assert!(result.comparison.matches.is_empty());
	assert_eq!(result.playbook.source, PlaybookSource::Fallback);
	assert_eq!(result.metadata.chunk_count, 0);
	assert_eq!(embedding.calls(), 0);
	assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
	assert!(result.metadata.degradations.iter().any(|d| d.kind == "retrieval_empty"));
}

#[tokio::test]
async fn query_is_bounded_ordered_and_free_on_empty_index() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding.clone(), generator);
	let empty = analyzer.build_index("   ").await.expect("Blank text must index.");
	let hits = analyzer.query(&empty, "pricing", 3).await.expect("Query must succeed.");

	assert!(hits.is_empty());
	assert_eq!(embedding.calls(), 0);

	let index = analyzer.build_index(SAMPLE_DEAL_TEXT).await.expect("Index must build.");

	for k in [1, 2, 10] {
		let hits =
			analyzer.query(&index, "price budget gap discount", k).await.expect("Query must succeed.");

		assert!(hits.len() <= k);
		assert!(!hits.is_empty());

		for pair in hits.windows(2) {
			assert!(pair[0].similarity >= pair[1].similarity);
		}
	}
}

#[tokio::test]
async fn cached_embeddings_skip_the_provider() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding.clone(), generator);
	let index = analyzer.build_index(SAMPLE_DEAL_TEXT).await.expect("Index must build.");

	assert_eq!(embedding.calls(), 1);

	let first = analyzer.query(&index, "competitor escalation", 2).await.expect("Query must succeed.");
	let second =
		analyzer.query(&index, "competitor escalation", 2).await.expect("Query must succeed.");

	assert_eq!(embedding.calls(), 2);
	assert_eq!(first[0].similarity.to_bits(), second[0].similarity.to_bits());

	analyzer.build_index(SAMPLE_DEAL_TEXT).await.expect("Index must rebuild.");

	assert_eq!(embedding.calls(), 2);
}

#[tokio::test]
async fn generator_failures_degrade_to_placeholders_and_fallback() {
	for script in [Script::Fail, Script::Malformed] {
		let cfg = sample_cfg();
		let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
		let generator = Arc::new(ScriptedGenerator::new(script));
		let analyzer = analyzer_with(cfg, embedding, generator);
		let result =
			analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await.expect("Analysis must succeed.");
		let timeline_failures = result
			.metadata
			.degradations
			.iter()
			.filter(|d| d.stage == Stage::Timeline && d.kind == "generation")
			.count();

		assert_eq!(result.timeline.events.len(), 5);
		assert!(result.timeline.events.iter().all(|event| event.synthesized));
		assert_eq!(timeline_failures, 5);
		assert_eq!(result.playbook.source, PlaybookSource::Fallback);
		assert!(result.metadata.degradations.iter().any(|d| d.stage == Stage::Playbook));
		assert!((8..=12).contains(&result.playbook.recommendations.len()));
		assert!((6..=10).contains(&result.playbook.red_flags.len()));
	}
}

#[tokio::test]
async fn slow_generation_times_out_into_placeholders() {
	let mut cfg = sample_cfg();

	cfg.timeline.generation_timeout_ms = 20;

	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Slow(Duration::from_millis(500))));
	let analyzer = analyzer_with(cfg, embedding, generator);
	let result = analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await.expect("Analysis must succeed.");

	assert!(result.timeline.events.iter().all(|event| event.synthesized));
	assert!(result.metadata.degradations.iter().any(|d| d.reason.contains("timed out")));
	assert_eq!(result.playbook.source, PlaybookSource::Fallback);
}

#[tokio::test]
async fn embedding_failure_reports_the_failing_stage() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::failing_after(dims(&cfg), 0));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding, generator);
	let failure = match analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await {
		Ok(_) => panic!("Expected analysis failure."),
		Err(failure) => failure,
	};

	assert_eq!(failure.stage, Stage::Indexing);
	assert!(failure.reason.contains("Embedding"), "Unexpected reason: {}", failure.reason);

	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::failing_after(dims(&cfg), 1));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding, generator);
	let failure = match analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await {
		Ok(_) => panic!("Expected analysis failure."),
		Err(failure) => failure,
	};

	assert_eq!(failure.stage, Stage::Timeline);
}

#[tokio::test]
async fn wrong_dimension_vectors_are_fatal() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg) + 1));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding, generator);
	let failure = match analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await {
		Ok(_) => panic!("Expected analysis failure."),
		Err(failure) => failure,
	};

	assert_eq!(failure.stage, Stage::Indexing);
	assert!(failure.reason.contains("dimension mismatch"), "Unexpected reason: {}", failure.reason);
}

#[tokio::test]
async fn risk_distribution_and_final_health_are_consistent() {
	let mut cfg = sample_cfg();

	cfg.comparative.similarity_floor = -1.0;

	let weights = cfg.scoring.weights;
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding, generator);
	let result = analyzer.analyze(SAMPLE_DEAL_TEXT, AS_OF).await.expect("Analysis must succeed.");
	let comparison = &result.comparison;

	assert_eq!(comparison.matches.len(), 5);

	for pair in comparison.matches.windows(2) {
		assert!(pair[0].similarity_percent >= pair[1].similarity_percent);
	}

	let total: f64 = comparison.risk_distribution.values().sum();

	assert!((total - 100.0).abs() <= 1.0, "Unexpected total {total}.");

	let card = &result.score_card;
	let recomputed: f32 =
		weights.as_array().iter().zip(card.sub_scores()).map(|(weight, score)| weight * score).sum();

	assert!((card.final_health() - recomputed).abs() <= 0.01);

	for score in card.sub_scores() {
		assert!((0.0..=10.0).contains(&score));
	}

	let json = serde_json::to_value(&result).expect("Result must serialize.");

	assert_eq!(json["metadata"]["as_of"], json!("2024-06-30"));
	assert!(json["score_card"]["final_health"].is_number());
	assert_eq!(json["timeline"]["events"][0]["inferred_date"], json!("2024-03-01"));
}

#[tokio::test]
async fn corpus_records_without_vectors_are_embedded_once() {
	let cfg = sample_cfg();
	let embedding = Arc::new(HashEmbedding::new(dims(&cfg)));
	let generator = Arc::new(ScriptedGenerator::new(Script::Scenario));
	let analyzer = analyzer_with(cfg, embedding.clone(), generator);

	analyzer.compare("Industry: Logistics. Risks: pricing.").await.expect("Compare must succeed.");

	let after_first = embedding.calls();

	analyzer.compare("Industry: Logistics. Risks: pricing.").await.expect("Compare must succeed.");

	assert_eq!(after_first, 2);
	assert_eq!(embedding.calls(), after_first);
}
