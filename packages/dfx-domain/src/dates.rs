use regex::{Captures, Regex};
use time::{Date, Duration, Month, macros::date};

/// No inferred date may precede this floor.
pub const MIN_DATE: Date = date!(2000 - 01 - 01);
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;
/// Header `key: value` lines are only looked for near the top of a document.
pub const HEADER_LINES: usize = 50;
pub const CLOSE_DATE_KEYS: [&str; 5] =
	["close date", "closed", "closed date", "decision date", "final date"];

const MONTH_PATTERN: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const COUNT_PATTERN: &str =
	r"\d{1,3}|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offset {
	Days(u32),
	Weeks(u32),
	Months(u32),
}
impl Offset {
	pub fn apply(self, from: Date) -> Date {
		match self {
			Offset::Days(days) => from.saturating_add(Duration::days(days.into())),
			Offset::Weeks(weeks) => from.saturating_add(Duration::weeks(weeks.into())),
			Offset::Months(months) => add_months(from, months),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateMention {
	Absolute(Date),
	Relative(Offset),
	Contextual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbsoluteDate {
	pub date: Date,
	/// False when the year was taken from the fallback.
	pub explicit_year: bool,
}

#[derive(Clone, Copy, Debug)]
enum Layout {
	Iso,
	Numeric,
	MonthFirst,
	DayFirst,
}
impl Layout {
	fn pattern(self) -> String {
		match self {
			Layout::Iso => r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b".to_string(),
			Layout::Numeric => r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b".to_string(),
			Layout::MonthFirst => format!(
				r"(?i)\b({MONTH_PATTERN})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s*(\d{{4}})\b)?"
			),
			Layout::DayFirst => format!(
				r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTH_PATTERN})\b\.?(?:,?\s*(\d{{4}})\b)?"
			),
		}
	}

	fn resolve(self, caps: &Captures<'_>, fallback_year: Option<i32>) -> Option<AbsoluteDate> {
		let (year, month, day) = match self {
			Layout::Iso => (
				Some(capture_number(caps, 1)?),
				month_from_number(capture_number(caps, 2)?)?,
				capture_number(caps, 3)?,
			),
			Layout::Numeric => (
				Some(capture_number(caps, 3)?),
				month_from_number(capture_number(caps, 1)?)?,
				capture_number(caps, 2)?,
			),
			Layout::MonthFirst => (
				capture_number(caps, 3),
				month_from_name(caps.get(1)?.as_str())?,
				capture_number(caps, 2)?,
			),
			Layout::DayFirst => (
				capture_number(caps, 3),
				month_from_name(caps.get(2)?.as_str())?,
				capture_number(caps, 1)?,
			),
		};
		let explicit_year = year.is_some();
		let year = match year {
			Some(year) => year,
			None => fallback_year?.clamp(MIN_YEAR, MAX_YEAR),
		};

		if !(MIN_YEAR..=MAX_YEAR).contains(&year) || !(1..=31).contains(&day) {
			return None;
		}

		let date = calendar_date(year, month, u8::try_from(day).ok()?)?;

		Some(AbsoluteDate { date, explicit_year })
	}
}

/// Classifies a free-form date mention. Absolute forms win over relative ones.
pub fn classify(mention: &str, reference_year: i32) -> DateMention {
	if let Some(found) = parse_absolute(mention, Some(reference_year)) {
		return DateMention::Absolute(found.date);
	}
	if let Some(offset) = parse_relative(mention) {
		return DateMention::Relative(offset);
	}

	DateMention::Contextual
}

/// First absolute date in `text`. Without `fallback_year`, only dates with an explicit year
/// are accepted.
pub fn parse_absolute(text: &str, fallback_year: Option<i32>) -> Option<AbsoluteDate> {
	scan(text, fallback_year).into_iter().next()
}

/// Every date in `text` that carries an explicit year, in text order.
pub fn full_dates(text: &str) -> Vec<Date> {
	scan(text, None).into_iter().filter(|found| found.explicit_year).map(|found| found.date).collect()
}

pub fn parse_relative(text: &str) -> Option<Offset> {
	let lower = text.to_lowercase();
	let counted = [
		format!(r"\b({COUNT_PATTERN})\s+(day|week|month)s?\s+(?:later|after|afterwards|on)\b"),
		format!(r"\b(?:after|within|in)\s+({COUNT_PATTERN})\s+(day|week|month)s?\b"),
	];

	for pattern in counted {
		if let Some(caps) = Regex::new(&pattern).ok().and_then(|re| re.captures(&lower)) {
			let count = count_value(caps.get(1)?.as_str())?;

			return unit_offset(caps.get(2)?.as_str(), count);
		}
	}

	if let Some(caps) = Regex::new(r"\b(?:next|following)\s+(day|week|month)\b")
		.ok()
		.and_then(|re| re.captures(&lower))
	{
		return unit_offset(caps.get(1)?.as_str(), 1);
	}
	if Regex::new(r"\b(?:the\s+day\s+after|tomorrow|next\s+morning)\b")
		.map(|re| re.is_match(&lower))
		.unwrap_or(false)
	{
		return Some(Offset::Days(1));
	}

	None
}

/// Explicit close-date header near the top of the document, if any.
pub fn header_close_date(text: &str) -> Option<Date> {
	let fallback_year = full_dates(text).into_iter().max().map(|date| date.year());

	text.lines().take(HEADER_LINES).find_map(|line| {
		let (key, value) = line.trim().split_once(':')?;
		let key = key.trim().to_lowercase();

		if !CLOSE_DATE_KEYS.contains(&key.as_str()) {
			return None;
		}

		parse_absolute(value, fallback_year).map(|found| found.date)
	})
}

/// The close-date header when present, else the latest fully specified date in the text.
pub fn reference_date(text: &str) -> Option<Date> {
	header_close_date(text).or_else(|| full_dates(text).into_iter().max())
}

pub fn clamp_floor(date: Date) -> Date {
	date.max(MIN_DATE)
}

pub fn add_days(date: Date, days: i64) -> Date {
	date.saturating_add(Duration::days(days))
}

pub fn days_between(start: Date, end: Date) -> i64 {
	(end - start).whole_days()
}

fn scan(text: &str, fallback_year: Option<i32>) -> Vec<AbsoluteDate> {
	let mut found = Vec::new();

	for layout in [Layout::Iso, Layout::Numeric, Layout::MonthFirst, Layout::DayFirst] {
		let Ok(re) = Regex::new(&layout.pattern()) else {
			continue;
		};

		for caps in re.captures_iter(text) {
			let start = caps.get(0).map(|m| m.start()).unwrap_or(0);

			if let Some(date) = layout.resolve(&caps, fallback_year) {
				found.push((start, date));
			}
		}
	}

	found.sort_by_key(|(start, _)| *start);

	found.into_iter().map(|(_, date)| date).collect()
}

fn capture_number(caps: &Captures<'_>, group: usize) -> Option<i32> {
	caps.get(group)?.as_str().parse().ok()
}

fn count_value(raw: &str) -> Option<u32> {
	let value = match raw {
		"a" | "an" | "one" => 1,
		"two" => 2,
		"three" => 3,
		"four" => 4,
		"five" => 5,
		"six" => 6,
		"seven" => 7,
		"eight" => 8,
		"nine" => 9,
		"ten" => 10,
		"eleven" => 11,
		"twelve" => 12,
		digits => digits.parse().ok()?,
	};

	Some(value)
}

fn unit_offset(unit: &str, count: u32) -> Option<Offset> {
	match unit {
		"day" => Some(Offset::Days(count)),
		"week" => Some(Offset::Weeks(count)),
		"month" => Some(Offset::Months(count)),
		_ => None,
	}
}

fn month_from_number(value: i32) -> Option<Month> {
	Month::try_from(u8::try_from(value).ok()?).ok()
}

fn month_from_name(raw: &str) -> Option<Month> {
	let prefix: String = raw.chars().take(3).collect::<String>().to_lowercase();
	let month = match prefix.as_str() {
		"jan" => Month::January,
		"feb" => Month::February,
		"mar" => Month::March,
		"apr" => Month::April,
		"may" => Month::May,
		"jun" => Month::June,
		"jul" => Month::July,
		"aug" => Month::August,
		"sep" => Month::September,
		"oct" => Month::October,
		"nov" => Month::November,
		"dec" => Month::December,
		_ => return None,
	};

	Some(month)
}

/// Builds a date, pulling an overflowing day back to the last day of the month.
fn calendar_date(year: i32, month: Month, day: u8) -> Option<Date> {
	(1..=day).rev().find_map(|day| Date::from_calendar_date(year, month, day).ok())
}

fn add_months(date: Date, months: u32) -> Date {
	let total = date.year() * 12 + i32::from(u8::from(date.month())) - 1 + months as i32;
	let year = total.div_euclid(12);
	let Some(month) = month_from_number(total.rem_euclid(12) + 1) else {
		return date;
	};

	calendar_date(year, month, date.day()).unwrap_or(date)
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use crate::dates::{self, DateMention, Offset};

	#[test]
	fn absolute_forms_parse() {
		let cases = [
			("2024-03-01", date!(2024 - 03 - 01)),
			("3/1/2024", date!(2024 - 03 - 01)),
			("March 1st", date!(2024 - 03 - 01)),
			("on March 1, 2023", date!(2023 - 03 - 01)),
			("1 March 2022", date!(2022 - 03 - 01)),
			("Sept. 9", date!(2024 - 09 - 09)),
		];

		for (mention, expected) in cases {
			assert_eq!(
				dates::classify(mention, 2024),
				DateMention::Absolute(expected),
				"mention: {mention}"
			);
		}
	}

	#[test]
	fn overflowing_day_clamps_to_month_end() {
		assert_eq!(dates::classify("February 30", 2023), DateMention::Absolute(date!(2023 - 02 - 28)));
	}

	#[test]
	fn out_of_range_years_are_contextual() {
		assert_eq!(dates::classify("March 1, 1999", 2024), DateMention::Contextual);
		assert_eq!(dates::classify("2150-01-01", 2024), DateMention::Contextual);
	}

	#[test]
	fn relative_forms_parse() {
		let cases = [
			("two days later", Offset::Days(2)),
			("3 weeks after the demo", Offset::Weeks(3)),
			("next week", Offset::Weeks(1)),
			("the following day", Offset::Days(1)),
			("a month later", Offset::Months(1)),
			("after 10 days", Offset::Days(10)),
		];

		for (mention, expected) in cases {
			assert_eq!(
				dates::classify(mention, 2024),
				DateMention::Relative(expected),
				"mention: {mention}"
			);
		}
	}

	#[test]
	fn vague_mentions_are_contextual() {
		assert_eq!(dates::classify("during negotiation", 2024), DateMention::Contextual);
		assert_eq!(dates::classify("", 2024), DateMention::Contextual);
	}

	#[test]
	fn month_offsets_clamp_day() {
		assert_eq!(Offset::Months(1).apply(date!(2024 - 01 - 31)), date!(2024 - 02 - 29));
		assert_eq!(Offset::Months(2).apply(date!(2024 - 11 - 15)), date!(2025 - 01 - 15));
	}

	#[test]
	fn full_dates_require_explicit_year() {
		let text = "Kickoff on March 1. Pricing review 2024-03-05. Decision on April 2, 2024.";

		assert_eq!(dates::full_dates(text), vec![date!(2024 - 03 - 05), date!(2024 - 04 - 02)]);
	}

	#[test]
	fn reference_date_prefers_close_header() {
		let text = "Deal: Atlas\nClose Date: May 20\nFollow-up sent 2024-06-01.";

		assert_eq!(dates::reference_date(text), Some(date!(2024 - 05 - 20)));
		assert_eq!(
			dates::reference_date("Meeting 2023-01-04, then 2023-02-11."),
			Some(date!(2023 - 02 - 11))
		);
		assert_eq!(dates::reference_date("no dates here"), None);
	}
}
