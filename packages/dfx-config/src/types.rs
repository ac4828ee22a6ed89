use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	pub chunking: Chunking,
	pub retrieval: Retrieval,
	#[serde(default)]
	pub cache: Cache,
	pub timeline: Timeline,
	pub comparative: Comparative,
	pub scoring: Scoring,
	pub playbook: Playbook,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generator: GeneratorProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GeneratorProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Segment sizes are measured in characters, not tokens.
#[derive(Clone, Debug, Deserialize)]
pub struct Chunking {
	pub segment_chars: u32,
	pub overlap_chars: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Retrieval {
	/// Chunks retrieved per phase-anchor query.
	pub phase_top_k: u32,
	/// Chunks retrieved for the deal summary that feeds playbook synthesis.
	pub summary_top_k: u32,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Cache {
	/// Optional. When absent the embedding cache lives in memory for the process lifetime.
	pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Timeline {
	pub min_gap_days: u32,
	pub max_gap_days: u32,
	pub expected_cycle_days: u32,
	pub generation_timeout_ms: u64,
	pub score_weights: TimelineScoreWeights,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TimelineScoreWeights {
	pub coverage: f32,
	pub ordering: f32,
	pub clarity: f32,
	pub span: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Comparative {
	pub corpus_path: PathBuf,
	pub max_matches: u32,
	pub similarity_floor: f32,
	#[serde(default = "default_min_pattern_support")]
	pub min_pattern_support: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Scoring {
	pub weights: ScoreWeights,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScoreWeights {
	pub timeline: f32,
	pub pricing_clarity: f32,
	pub communication_quality: f32,
	pub documentation_quality: f32,
	pub competitive_risk: f32,
	pub delivery_execution: f32,
}
impl ScoreWeights {
	pub fn as_array(&self) -> [f32; 6] {
		[
			self.timeline,
			self.pricing_clarity,
			self.communication_quality,
			self.documentation_quality,
			self.competitive_risk,
			self.delivery_execution,
		]
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Playbook {
	pub min_items: u32,
	pub max_items: u32,
	pub min_recommendations: u32,
	pub max_recommendations: u32,
	/// Upper bound on raw document characters sent to the generator.
	pub context_chars: u32,
}

fn default_min_pattern_support() -> u32 {
	2
}
