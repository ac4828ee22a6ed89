//! Keyword families used by scoring and playbook synthesis. All matching is on lowercase text.

use regex::Regex;

pub const PRICING_MENTIONS: &[&str] = &["pricing", "price", "budget", "cost"];
pub const PRICING_AMBIGUITY: &[&str] = &[
	"unclear",
	"to be determined",
	"tbd",
	"discuss later",
	"negotiable",
	"flexible",
	"pricing gap",
	"budget gap",
	"price too high",
	"too expensive",
	"out of budget",
	"renegotiate",
	"renegotiation",
	"counter offer",
	"price dispute",
];
pub const PRICING_CLARITY: &[&str] = &[
	"final price",
	"agreed price",
	"contract price",
	"signed price",
	"approved price",
	"pricing confirmed",
	"price agreed",
	"budget approved",
	"pricing locked",
];
pub const PRICING_RISK: &[&str] =
	&["pricing issue", "price concern", "budget constraint", "cost overrun"];
pub const COMMUNICATION_ISSUES: &[&str] = &[
	"delayed response",
	"no response",
	"miscommunication",
	"confusion",
	"unclear",
	"communication breakdown",
	"poor communication",
	"lack of communication",
	"silence",
	"unresponsive",
	"delayed reply",
	"no reply",
];
pub const COMMUNICATION_GOOD: &[&str] = &[
	"clear communication",
	"prompt response",
	"confirmed",
	"documented",
	"written",
	"quick response",
	"regular updates",
	"transparent",
	"open communication",
];
pub const ESCALATION: &[&str] = &["escalation", "escalated", "escalate", "escalating"];
pub const VERBAL_ONLY: &[&str] =
	&["verbal agreement", "verbal commitment", "verbally", "said", "told", "mentioned"];
pub const WRITTEN_RECORD: &[&str] = &[
	"written",
	"documented",
	"contract",
	"agreement",
	"signed",
	"confirmed in writing",
];
pub const MISSING_DOCUMENT: &[&str] = &["missing", "not provided", "not received", "pending"];
pub const DELIVERY_VAGUE: &[&str] = &[
	"tbd",
	"to be determined",
	"flexible",
	"approximately",
	"around",
	"sometime",
	"tentative",
	"estimated",
	"roughly",
	"maybe",
	"possibly",
	"uncertain timeline",
];
pub const DELIVERY_SPECIFIC: &[&str] = &[
	"specific date",
	"exact timeline",
	"confirmed date",
	"signed timeline",
	"guaranteed timeline",
	"committed date",
	"firm deadline",
	"locked timeline",
];
pub const DELIVERY_ISSUES: &[&str] = &[
	"delay",
	"late",
	"behind schedule",
	"missed deadline",
	"timeline issue",
	"schedule slip",
	"timeline concern",
	"delivery problem",
	"execution issue",
];
pub const COMPETITOR: &[&str] =
	&["competitor", "competing", "alternative vendor", "other vendor", "rival"];
pub const VAGUE_DATES: &[&str] = &["q1", "q2", "q3", "q4", "sometime", "flexible", "tbd", "to be determined"];

const COMPETITOR_NAME_PATTERN: &str =
	r"(?i:lost to|competitor|alternative vendor)[:\s]+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+){0,2})";
const NAME_NOISE: &[&str] = &[
	"was", "is", "the", "a", "an", "vendor", "solution", "company", "due", "to", "pricing",
	"concerns", "and", "delivery", "timeline",
];

/// Number of distinct keywords from `keywords` present in `text_lower`.
pub fn count_present(text_lower: &str, keywords: &[&str]) -> u32 {
	keywords
		.iter()
		.filter_map(|keyword| keyword_regex(keyword))
		.filter(|re| re.is_match(text_lower))
		.count() as u32
}

/// Total occurrences of every keyword in `text_lower`.
pub fn count_occurrences(text_lower: &str, keywords: &[&str]) -> u32 {
	keywords
		.iter()
		.filter_map(|keyword| keyword_regex(keyword))
		.map(|re| re.find_iter(text_lower).count() as u32)
		.sum()
}

pub fn mentions_any(text_lower: &str, keywords: &[&str]) -> bool {
	keywords.iter().filter_map(|keyword| keyword_regex(keyword)).any(|re| re.is_match(text_lower))
}

pub fn competitor_mentions(text: &str) -> u32 {
	count_occurrences(&text.to_lowercase(), COMPETITOR)
}

/// Best-effort name of the competitor a deal was lost to.
pub fn competitor_name(text: &str) -> Option<String> {
	let re = Regex::new(COMPETITOR_NAME_PATTERN).ok()?;

	re.captures_iter(text).find_map(|caps| {
		let raw = caps.get(1)?.as_str();
		let words: Vec<&str> = raw
			.split_whitespace()
			.filter(|word| !NAME_NOISE.contains(&word.to_lowercase().as_str()))
			.take(2)
			.collect();
		let name = words.join(" ");

		(name.chars().count() > 3 && name.chars().count() <= 30).then_some(name)
	})
}

/// Whole-word match for `keyword`, allowing a plain inflection suffix.
fn keyword_regex(keyword: &str) -> Option<Regex> {
	Regex::new(&format!(r"\b{}(?:s|es|d|ed|ing)?\b", regex::escape(keyword))).ok()
}

#[cfg(test)]
mod tests {
	use crate::signals::{self, COMPETITOR, DELIVERY_ISSUES, PRICING_AMBIGUITY};

	#[test]
	fn count_present_counts_distinct_keywords() {
		let text = "the price is tbd and tbd again; pricing gap remains";

		assert_eq!(signals::count_present(text, PRICING_AMBIGUITY), 2);
	}

	#[test]
	fn competitor_mentions_count_each_occurrence() {
		assert_eq!(signals::competitor_mentions("A Competitor appeared. Competitors pushed."), 2);
		assert_eq!(signals::competitor_mentions("competitive pricing"), 0);
		assert_eq!(signals::competitor_mentions("The hardware arrival slipped by a week."), 0);
		assert_eq!(signals::competitor_mentions("A rival bid came in."), 1);
	}

	#[test]
	fn keywords_match_whole_words_only() {
		assert_eq!(signals::count_present("the ticket was escalated", DELIVERY_ISSUES), 0);
		assert_eq!(signals::count_present("a related template was late", DELIVERY_ISSUES), 1);
		assert!(signals::mentions_any("the rollout was delayed", DELIVERY_ISSUES));
		assert!(!signals::mentions_any("the arrival date moved", COMPETITOR));
	}

	#[test]
	fn competitor_name_is_extracted() {
		assert_eq!(
			signals::competitor_name("We lost to CloudTech Solutions after the review."),
			Some("CloudTech Solutions".to_string())
		);
		assert_eq!(
			signals::competitor_name("competitor: Nimbus was cheaper"),
			Some("Nimbus".to_string())
		);
		assert_eq!(signals::competitor_name("no rivals here"), None);
	}
}
