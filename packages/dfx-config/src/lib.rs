mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Chunking, Comparative, Config, EmbeddingProviderConfig, GeneratorProviderConfig,
	Playbook, Providers, Retrieval, ScoreWeights, Scoring, Service, Timeline,
	TimelineScoreWeights,
};

use std::{fs, path::Path};

const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("generator", &cfg.providers.generator.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if !cfg.providers.generator.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.generator.temperature must be a finite number.".to_string(),
		});
	}
	if cfg.chunking.segment_chars == 0 {
		return Err(Error::Validation {
			message: "chunking.segment_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_chars >= cfg.chunking.segment_chars {
		return Err(Error::Validation {
			message: "chunking.overlap_chars must be less than chunking.segment_chars.".to_string(),
		});
	}
	if cfg.retrieval.phase_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.phase_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.summary_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.summary_top_k must be greater than zero.".to_string(),
		});
	}

	validate_timeline(&cfg.timeline)?;
	validate_comparative(&cfg.comparative)?;
	validate_weights("scoring.weights", &cfg.scoring.weights.as_array())?;
	validate_playbook(&cfg.playbook)?;

	Ok(())
}

fn validate_timeline(timeline: &Timeline) -> Result<()> {
	if timeline.min_gap_days == 0 {
		return Err(Error::Validation {
			message: "timeline.min_gap_days must be at least one day.".to_string(),
		});
	}
	if timeline.max_gap_days < timeline.min_gap_days {
		return Err(Error::Validation {
			message: "timeline.max_gap_days must be at least timeline.min_gap_days.".to_string(),
		});
	}
	if timeline.expected_cycle_days == 0 {
		return Err(Error::Validation {
			message: "timeline.expected_cycle_days must be greater than zero.".to_string(),
		});
	}
	if timeline.generation_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "timeline.generation_timeout_ms must be greater than zero.".to_string(),
		});
	}

	let weights = &timeline.score_weights;

	validate_weights(
		"timeline.score_weights",
		&[weights.coverage, weights.ordering, weights.clarity, weights.span],
	)
}

fn validate_comparative(comparative: &Comparative) -> Result<()> {
	if !(3..=5).contains(&comparative.max_matches) {
		return Err(Error::Validation {
			message: "comparative.max_matches must be in the range 3-5.".to_string(),
		});
	}
	if !comparative.similarity_floor.is_finite() {
		return Err(Error::Validation {
			message: "comparative.similarity_floor must be a finite number.".to_string(),
		});
	}
	if !(-1.0..=1.0).contains(&comparative.similarity_floor) {
		return Err(Error::Validation {
			message: "comparative.similarity_floor must be in the range -1.0-1.0.".to_string(),
		});
	}
	if comparative.min_pattern_support == 0 {
		return Err(Error::Validation {
			message: "comparative.min_pattern_support must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_playbook(playbook: &Playbook) -> Result<()> {
	if playbook.max_items == 0 {
		return Err(Error::Validation {
			message: "playbook.max_items must be greater than zero.".to_string(),
		});
	}
	if playbook.min_items > playbook.max_items {
		return Err(Error::Validation {
			message: "playbook.min_items must not exceed playbook.max_items.".to_string(),
		});
	}
	if playbook.min_recommendations > playbook.max_recommendations {
		return Err(Error::Validation {
			message: "playbook.min_recommendations must not exceed playbook.max_recommendations."
				.to_string(),
		});
	}
	if playbook.context_chars == 0 {
		return Err(Error::Validation {
			message: "playbook.context_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_weights(label: &str, weights: &[f32]) -> Result<()> {
	if weights.iter().any(|weight| !weight.is_finite()) {
		return Err(Error::Validation { message: format!("{label} must be finite numbers.") });
	}
	if weights.iter().any(|weight| *weight < 0.0) {
		return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
	}

	let sum: f32 = weights.iter().sum();

	if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
		return Err(Error::Validation { message: format!("{label} must sum to 1.0.") });
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.cache
		.path
		.as_deref()
		.map(|path| path.as_os_str().to_string_lossy().trim().is_empty())
		.unwrap_or(false)
	{
		cfg.cache.path = None;
	}
	if cfg.providers.embedding.api_base.ends_with('/') && cfg.providers.embedding.path.starts_with('/')
	{
		cfg.providers.embedding.api_base.pop();
	}
	if cfg.providers.generator.api_base.ends_with('/') && cfg.providers.generator.path.starts_with('/')
	{
		cfg.providers.generator.api_base.pop();
	}
}
