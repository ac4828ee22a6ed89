use unicode_normalization::UnicodeNormalization;

/// NFC-normalizes `text`, collapses whitespace runs to one space and trims.
pub fn normalize(text: &str) -> String {
	let composed: String = text.nfc().collect();

	composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}

#[cfg(test)]
mod tests {
	use crate::text::{normalize, truncate_chars};

	#[test]
	fn normalize_collapses_whitespace_and_composes() {
		assert_eq!(normalize("  pricing\t\n gap  "), "pricing gap");
		assert_eq!(normalize("cafe\u{301}"), "caf\u{e9}");
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		assert_eq!(truncate_chars("d\u{e9}j\u{e0} vu", 3), "d\u{e9}j");
		assert_eq!(truncate_chars("short", 10), "short");
	}
}
