use std::cmp::Ordering;

use serde::Serialize;

use crate::{Analyzer, Error, Result};
use dfx_chunking::ChunkingConfig;

/// One embedded segment of the analyzed document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chunk {
	pub id: usize,
	pub text: String,
	/// Byte offset of the segment in the source text.
	pub source_offset: usize,
	#[serde(skip)]
	pub embedding: Vec<f32>,
}

#[derive(Clone, Copy, Debug)]
pub struct ScoredChunk<'a> {
	pub chunk: &'a Chunk,
	pub similarity: f32,
}

/// Exact linear-scan cosine index over the chunks of one document.
#[derive(Clone, Debug, Default)]
pub struct RetrievalIndex {
	chunks: Vec<Chunk>,
}
impl RetrievalIndex {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
		Self { chunks }
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn chunks(&self) -> &[Chunk] {
		&self.chunks
	}

	/// Returns at most `k` chunks ordered by descending similarity, earlier chunks first on ties.
	pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk<'_>>> {
		if self.chunks.iter().any(|chunk| chunk.embedding.len() != query.len()) {
			return Err(Error::ContractViolation {
				message: format!(
					"Query vector has {} dimensions but the index holds a different size.",
					query.len()
				),
			});
		}

		let mut scored: Vec<ScoredChunk<'_>> = self
			.chunks
			.iter()
			.map(|chunk| ScoredChunk { chunk, similarity: cosine(query, &chunk.embedding) })
			.collect();

		scored.sort_by(|left, right| {
			right
				.similarity
				.total_cmp(&left.similarity)
				.then_with(|| left.chunk.source_offset.cmp(&right.chunk.source_offset))
				.then_with(|| left.chunk.id.cmp(&right.chunk.id))
		});
		scored.truncate(k);

		Ok(scored)
	}
}

impl Analyzer {
	/// Splits `text` into overlapping segments and embeds them in one batch.
	pub async fn build_index(&self, text: &str) -> Result<RetrievalIndex> {
		let cfg = ChunkingConfig {
			segment_chars: self.cfg.chunking.segment_chars,
			overlap_chars: self.cfg.chunking.overlap_chars,
		};
		let pieces = dfx_chunking::split_text(text, &cfg);

		if pieces.is_empty() {
			return Ok(RetrievalIndex::empty());
		}

		let texts: Vec<String> = pieces.iter().map(|piece| piece.text.clone()).collect();
		let vectors = self.embed_texts(&texts).await?;
		let chunks = pieces
			.into_iter()
			.zip(vectors)
			.map(|(piece, embedding)| Chunk {
				id: piece.chunk_index,
				text: piece.text,
				source_offset: piece.start_offset,
				embedding,
			})
			.collect::<Vec<_>>();

		tracing::info!(chunks = chunks.len(), "Built retrieval index.");

		Ok(RetrievalIndex::from_chunks(chunks))
	}

	/// Embeds `text` and returns the `k` closest chunks. An empty index answers without
	/// embedding anything.
	pub async fn query<'a>(
		&self,
		index: &'a RetrievalIndex,
		text: &str,
		k: usize,
	) -> Result<Vec<ScoredChunk<'a>>> {
		if index.is_empty() || k == 0 {
			return Ok(Vec::new());
		}

		let vector = self.embed_one(text).await?;

		index.search(&vector, k)
	}
}

/// Cosine similarity. Zero-norm vectors score zero against everything.
pub fn cosine(left: &[f32], right: &[f32]) -> f32 {
	let (mut dot, mut left_norm, mut right_norm) = (0.0_f64, 0.0_f64, 0.0_f64);

	for (a, b) in left.iter().zip(right) {
		let (a, b) = (f64::from(*a), f64::from(*b));

		dot += a * b;
		left_norm += a * a;
		right_norm += b * b;
	}

	if left_norm == 0.0 || right_norm == 0.0 {
		return 0.0;
	}

	(dot / (left_norm.sqrt() * right_norm.sqrt())) as f32
}

pub(crate) fn by_similarity(left: f32, right: f32) -> Ordering {
	right.total_cmp(&left)
}
