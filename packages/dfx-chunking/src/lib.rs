use unicode_segmentation::UnicodeSegmentation;

/// Segment bounds measured in characters.
#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub segment_chars: u32,
	pub overlap_chars: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
	pub chunk_index: usize,
	/// Byte offsets into the source text.
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

/// Splits `text` into overlapping segments of at most `segment_chars` characters, cutting on
/// sentence boundaries where possible. Sentences longer than a segment are hard-split.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
	if text.trim().is_empty() {
		return Vec::new();
	}

	let max_chars = cfg.segment_chars.max(1) as usize;
	let overlap_chars = (cfg.overlap_chars as usize).min(max_chars.saturating_sub(1));
	let pieces: Vec<(usize, &str)> = text
		.split_sentence_bound_indices()
		.flat_map(|(idx, sentence)| hard_split(idx, sentence, max_chars))
		.collect();
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_chars = 0_usize;
	let mut current_start = 0_usize;
	let mut last_end = 0_usize;

	for (idx, piece) in pieces {
		let piece_chars = piece.chars().count();

		if current_chars + piece_chars > max_chars && !current.is_empty() {
			push_chunk(&mut chunks, current_start, last_end, &current);

			let tail_chars = overlap_chars.min(max_chars - piece_chars);
			let overlap = char_tail(&current, tail_chars).to_string();

			current_start = last_end - overlap.len();
			current_chars = overlap.chars().count();
			current = overlap;
		}
		if current.is_empty() {
			current_start = idx;
		}

		current.push_str(piece);

		current_chars += piece_chars;
		last_end = idx + piece.len();
	}

	if !current.is_empty() {
		push_chunk(&mut chunks, current_start, last_end, &current);
	}

	tracing::debug!(chunks = chunks.len(), max_chars, overlap_chars, "Split document text.");

	chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, start_offset: usize, end_offset: usize, text: &str) {
	if text.trim().is_empty() {
		return;
	}

	chunks.push(Chunk { chunk_index: chunks.len(), start_offset, end_offset, text: text.to_string() });
}

fn hard_split(offset: usize, sentence: &str, max_chars: usize) -> Vec<(usize, &str)> {
	let mut pieces = Vec::new();
	let mut rest = sentence;
	let mut start = offset;

	while rest.chars().count() > max_chars {
		let cut = rest.char_indices().nth(max_chars).map(|(idx, _)| idx).unwrap_or(rest.len());
		let (head, tail) = rest.split_at(cut);

		pieces.push((start, head));

		start += head.len();
		rest = tail;
	}

	if !rest.is_empty() {
		pieces.push((start, rest));
	}

	pieces
}

fn char_tail(text: &str, chars: usize) -> &str {
	if chars == 0 {
		return "";
	}

	let total = text.chars().count();

	if chars >= total {
		return text;
	}

	match text.char_indices().nth(total - chars) {
		Some((idx, _)) => &text[idx..],
		None => "",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_into_chunks_with_overlap() {
		let cfg = ChunkingConfig { segment_chars: 24, overlap_chars: 6 };
		let text = "Pricing stalled. Delivery slipped. Legal went quiet. Deal lost.";
		let chunks = split_text(text, &cfg);

		assert!(chunks.len() > 1);
		assert!(chunks[0].text.contains("Pricing"));

		for window in chunks.windows(2) {
			assert!(window[1].start_offset < window[0].end_offset, "Chunks must overlap.");
		}
		for chunk in &chunks {
			assert!(chunk.text.chars().count() <= 24);
			assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
		}
	}

	#[test]
	fn next_chunk_starts_with_the_previous_tail() {
		let cfg = ChunkingConfig { segment_chars: 24, overlap_chars: 6 };
		let text = "Pricing stalled. Delivery slipped. Legal went quiet. Deal lost.";
		let chunks = split_text(text, &cfg);

		assert_eq!(chunks[1].text, "lled. Delivery slipped. ");

		for window in chunks.windows(2) {
			let overlap = &text[window[1].start_offset..window[0].end_offset];

			assert_eq!(overlap.chars().count(), 6);
			assert!(window[0].text.ends_with(overlap));
			assert!(window[1].text.starts_with(overlap));
		}
	}

	#[test]
	fn long_sentences_are_hard_split() {
		let cfg = ChunkingConfig { segment_chars: 10, overlap_chars: 0 };
		let text = "a".repeat(35);
		let chunks = split_text(&text, &cfg);

		assert_eq!(chunks.len(), 4);
		assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 10));
		assert_eq!(chunks.iter().map(|chunk| chunk.text.len()).sum::<usize>(), 35);
	}

	#[test]
	fn blank_text_yields_no_chunks() {
		let cfg = ChunkingConfig { segment_chars: 100, overlap_chars: 10 };

		assert!(split_text("", &cfg).is_empty());
		assert!(split_text(" \n\t ", &cfg).is_empty());
	}

	#[test]
	fn multibyte_text_keeps_char_boundaries() {
		let cfg = ChunkingConfig { segment_chars: 8, overlap_chars: 3 };
		let text = "Préstamo aprobado. Entrega retrasada. Décision finale.";
		let chunks = split_text(text, &cfg);

		for chunk in &chunks {
			assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.text);
		}
	}
}
