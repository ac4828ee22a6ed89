pub mod comparative;
pub mod error;
pub mod pipeline;
pub mod playbook;
pub mod retrieval;
pub mod scoring;
pub mod time_serde;
pub mod timeline;

use std::{collections::HashSet, future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;

pub use comparative::{Benchmark, ComparisonResult, DealMatch};
use dfx_config::{Config, EmbeddingProviderConfig, GeneratorProviderConfig};
use dfx_domain::HistoricalDealRecord;
use dfx_providers::{embedding, generator};
use dfx_storage::EmbeddingCache;
pub use error::{Error, Result};
pub use pipeline::{
	AnalysisContext, AnalysisFailure, AnalysisResult, Degradation, RunMetadata, Stage, State,
};
pub use playbook::{
	Playbook, PlaybookInputs, PlaybookOutcome, PlaybookSource, Priority, Recommendation,
};
pub use retrieval::{Chunk, RetrievalIndex, ScoredChunk};
pub use scoring::ScoreCard;
pub use timeline::{Candidate, TimelineOutcome};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait GeneratorProvider
where
	Self: Send + Sync,
{
	/// Returns the structured JSON object the model produced for `prompt` over `context`.
	fn generate<'a>(
		&'a self,
		cfg: &'a GeneratorProviderConfig,
		prompt: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, Result<Value>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generator: Arc<dyn GeneratorProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generator: Arc<dyn GeneratorProvider>,
	) -> Self {
		Self { embedding, generator }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), generator: provider }
	}
}

/// Runs lost-deal analyses against one configuration, embedding cache and historical corpus.
pub struct Analyzer {
	pub cfg: Config,
	pub providers: Providers,
	pub cache: Arc<EmbeddingCache>,
	pub corpus: Arc<[HistoricalDealRecord]>,
}
impl Analyzer {
	pub fn new(cfg: Config, cache: Arc<EmbeddingCache>, corpus: Vec<HistoricalDealRecord>) -> Self {
		Self::with_providers(cfg, cache, corpus, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		cache: Arc<EmbeddingCache>,
		corpus: Vec<HistoricalDealRecord>,
		providers: Providers,
	) -> Self {
		Self { cfg, providers, cache, corpus: corpus.into() }
	}

	/// Opens the configured embedding cache and loads the historical corpus.
	pub fn open(cfg: Config) -> Result<Self> {
		let namespace = embedding_namespace(&cfg);
		let cache = match &cfg.cache.path {
			Some(path) => EmbeddingCache::open(path, namespace)?,
			None => EmbeddingCache::in_memory(namespace),
		};
		let corpus = dfx_storage::corpus::load_corpus(&cfg.comparative.corpus_path)?;

		Ok(Self::new(cfg, Arc::new(cache), corpus))
	}

	/// Embeds `texts` through the cache. Misses go to the provider in one batched call.
	pub(crate) async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let cached = self.cache.get_many(texts).await;
		let mut seen = HashSet::new();
		let missing: Vec<String> = texts
			.iter()
			.zip(&cached)
			.filter(|(text, hit)| hit.is_none() && seen.insert(self.cache.key(text)))
			.map(|(text, _)| text.clone())
			.collect();

		tracing::debug!(
			requested = texts.len(),
			misses = missing.len(),
			"Resolved embedding batch against cache."
		);

		if !missing.is_empty() {
			let vectors = self
				.providers
				.embedding
				.embed(&self.cfg.providers.embedding, &missing)
				.await
				.map_err(into_embedding_error)?;

			self.check_vectors(&vectors, missing.len())?;
			self.cache.insert_many(missing.into_iter().zip(vectors).collect()).await;
		}

		self.cache
			.get_many(texts)
			.await
			.into_iter()
			.map(|vector| {
				vector.ok_or_else(|| Error::Embedding {
					message: "Embedding cache is missing a computed vector.".to_string(),
				})
			})
			.collect()
	}

	/// Embeds one text through the cache with at most one provider call per key.
	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		self.cache
			.get_or_compute(text, || async {
				let input = vec![text.to_string()];
				let vectors = self
					.providers
					.embedding
					.embed(&self.cfg.providers.embedding, &input)
					.await
					.map_err(into_embedding_error)?;

				self.check_vectors(&vectors, 1)?;

				vectors.into_iter().next().ok_or_else(|| Error::Embedding {
					message: "Embedding provider returned no vectors.".to_string(),
				})
			})
			.await
	}

	/// Calls the generator under the configured generation timeout. Every failure, including a
	/// timeout, is a `Generation` error.
	pub(crate) async fn generate_json(
		&self,
		prompt: &str,
		context: &[String],
		label: &str,
	) -> Result<Value> {
		let timeout_ms = self.cfg.timeline.generation_timeout_ms;
		let generated = tokio::time::timeout(
			Duration::from_millis(timeout_ms),
			self.providers.generator.generate(&self.cfg.providers.generator, prompt, context),
		)
		.await;

		match generated {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => Err(into_generation_error(err)),
			Err(_) => Err(Error::Generation {
				message: format!("{label} generation timed out after {timeout_ms} ms."),
			}),
		}
	}

	fn check_vectors(&self, vectors: &[Vec<f32>], expected: usize) -> Result<()> {
		if vectors.len() != expected {
			return Err(Error::Embedding {
				message: format!(
					"Embedding provider returned {} vectors for {expected} inputs.",
					vectors.len()
				),
			});
		}

		let dimensions = self.cfg.providers.embedding.dimensions as usize;

		if vectors.iter().any(|vector| vector.len() != dimensions) {
			return Err(Error::Embedding {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(())
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding::embed(cfg, texts)
				.await
				.map_err(|err| Error::Embedding { message: err.to_string() })
		})
	}
}

impl GeneratorProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GeneratorProviderConfig,
		prompt: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move {
			generator::generate(cfg, prompt, context)
				.await
				.map_err(|err| Error::Generation { message: err.to_string() })
		})
	}
}

pub fn embedding_namespace(cfg: &Config) -> String {
	EmbeddingCache::namespace(
		&cfg.providers.embedding.provider_id,
		&cfg.providers.embedding.model,
		cfg.providers.embedding.dimensions,
	)
}

pub(crate) fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

fn into_embedding_error(err: Error) -> Error {
	match err {
		Error::Embedding { .. } => err,
		other => Error::Embedding { message: other.to_string() },
	}
}

fn into_generation_error(err: Error) -> Error {
	match err {
		Error::Generation { .. } => err,
		other => Error::Generation { message: other.to_string() },
	}
}
