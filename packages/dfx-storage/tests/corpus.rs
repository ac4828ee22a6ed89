use std::path::Path;

use dfx_storage::{Error, corpus};
use dfx_testkit::{SAMPLE_CORPUS_JSON, TempPath};

#[test]
fn missing_corpus_is_empty() {
	let records = corpus::load_corpus(Path::new("/nonexistent/dfx/historical_deals.json"))
		.expect("Missing corpus must load as empty.");

	assert!(records.is_empty());
}

#[test]
fn sample_corpus_loads_in_insertion_order() {
	let file = TempPath::new("dfx_corpus", "json");

	file.write(SAMPLE_CORPUS_JSON).expect("Failed to write corpus.");

	let records = corpus::load_corpus(file.path()).expect("Corpus must load.");

	assert_eq!(records.first().map(|record| record.deal_id.as_str()), Some("HD-1001"));
	assert!(records.iter().all(|record| record.embedding.is_none()));
	assert_eq!(records[5].metadata.value, None);
}

#[test]
fn duplicate_ids_are_rejected() {
	let file = TempPath::new("dfx_corpus", "json");
	let payload = r#"[
		{ "deal_id": "A", "metadata": { "industry": "Retail", "outcome": "Closed Lost" }, "risk_summary": "x" },
		{ "deal_id": "A", "metadata": { "industry": "Retail", "outcome": "Closed Lost" }, "risk_summary": "y" }
	]"#;

	file.write(payload).expect("Failed to write corpus.");

	let err = corpus::load_corpus(file.path()).expect_err("Expected duplicate id error.");

	assert!(matches!(err, Error::InvalidArgument(_)), "Unexpected error: {err:?}");
}

#[test]
fn malformed_corpus_reports_decode_error() {
	let file = TempPath::new("dfx_corpus", "json");

	file.write("{\"deal_id\": 1}").expect("Failed to write corpus.");

	let err = corpus::load_corpus(file.path()).expect_err("Expected decode error.");

	assert!(matches!(err, Error::Decode { .. }), "Unexpected error: {err:?}");
}
