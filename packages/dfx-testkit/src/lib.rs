mod error;

pub use error::{Error, Result};

use std::{
	env, fs,
	path::{Path, PathBuf},
};

use uuid::Uuid;

use dfx_config::Config;
use dfx_domain::HistoricalDealRecord;

pub const SAMPLE_CONFIG_TOML: &str =
	include_str!("../../dfx-config/tests/fixtures/sample_config.toml");
pub const SAMPLE_CORPUS_JSON: &str = include_str!("../fixtures/historical_deals.json");
/// A lost deal with explicit March dates and a competitor surfacing during escalation.
pub const SAMPLE_DEAL_TEXT: &str = include_str!("../fixtures/sample_deal.txt");

/// A unique path under the system temp dir, removed on drop.
pub struct TempPath {
	path: PathBuf,
}
impl TempPath {
	pub fn new(prefix: &str, extension: &str) -> Self {
		let mut path = env::temp_dir();

		path.push(format!("{prefix}_{}.{extension}", Uuid::new_v4().simple()));

		Self { path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn write(&self, contents: &str) -> Result<()> {
		fs::write(&self.path, contents)
			.map_err(|err| Error::Message(format!("Failed to write {:?}: {err}.", self.path)))
	}
}
impl Drop for TempPath {
	fn drop(&mut self) {
		let _ = fs::remove_file(&self.path);
	}
}

pub fn sample_config() -> Result<Config> {
	let cfg: Config = toml::from_str(SAMPLE_CONFIG_TOML)?;

	dfx_config::validate(&cfg)?;

	Ok(cfg)
}

pub fn sample_corpus() -> Result<Vec<HistoricalDealRecord>> {
	Ok(serde_json::from_str(SAMPLE_CORPUS_JSON)?)
}

/// Deterministic bag-of-words embedding: texts sharing words point in similar directions.
/// Returns a unit vector, or all zeros for text without words.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vector = vec![0.0_f32; dimensions.max(1)];
	let lowered = text.to_lowercase();

	for word in lowered.split(|ch: char| !ch.is_alphanumeric()).filter(|word| !word.is_empty()) {
		let digest = blake3::hash(word.as_bytes());
		let bytes = digest.as_bytes();
		let bucket = u64::from_le_bytes([
			bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
		]) as usize % vector.len();
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[bucket] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fixtures_load() {
		let cfg = sample_config().expect("Sample config must be valid.");
		let corpus = sample_corpus().expect("Sample corpus must decode.");

		assert_eq!(cfg.providers.embedding.dimensions, 64);
		assert!(corpus.len() >= 6);
		assert!(SAMPLE_DEAL_TEXT.contains("March 10"));
	}

	#[test]
	fn hash_embedding_is_deterministic_and_normalized() {
		let first = hash_embedding("pricing gap with competitor", 64);
		let second = hash_embedding("pricing gap with competitor", 64);
		let norm: f32 = first.iter().map(|value| value * value).sum::<f32>().sqrt();

		assert_eq!(first, second);
		assert!((norm - 1.0).abs() < 1e-5);
		assert!(hash_embedding("", 8).iter().all(|value| *value == 0.0));
	}
}
