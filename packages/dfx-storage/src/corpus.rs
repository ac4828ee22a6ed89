use std::{collections::HashSet, fs, io::ErrorKind, path::Path};

use dfx_domain::HistoricalDealRecord;

use crate::{Error, Result};

/// Loads the historical corpus: a JSON array of records. A missing file is an empty corpus.
pub fn load_corpus(path: &Path) -> Result<Vec<HistoricalDealRecord>> {
	let raw = match fs::read_to_string(path) {
		Ok(raw) => raw,
		Err(err) if err.kind() == ErrorKind::NotFound => {
			tracing::warn!(path = %path.display(), "Historical corpus not found. Using an empty corpus.");

			return Ok(Vec::new());
		},
		Err(err) => return Err(Error::Read { path: path.to_path_buf(), source: err }),
	};

	if raw.trim().is_empty() {
		return Ok(Vec::new());
	}

	let records: Vec<HistoricalDealRecord> = serde_json::from_str(&raw)
		.map_err(|err| Error::Decode { path: path.to_path_buf(), source: err })?;

	validate_corpus(&records)?;

	tracing::info!(path = %path.display(), records = records.len(), "Loaded historical corpus.");

	Ok(records)
}

pub fn validate_corpus(records: &[HistoricalDealRecord]) -> Result<()> {
	let mut seen = HashSet::new();

	for record in records {
		if record.deal_id.trim().is_empty() {
			return Err(Error::InvalidArgument("Corpus record deal_id must be non-empty.".to_string()));
		}
		if !seen.insert(record.deal_id.as_str()) {
			return Err(Error::InvalidArgument(format!(
				"Corpus record deal_id {} is duplicated.",
				record.deal_id
			)));
		}
		if record
			.embedding
			.as_ref()
			.is_some_and(|vec| vec.iter().any(|value| !value.is_finite()))
		{
			return Err(Error::InvalidArgument(format!(
				"Corpus record {} embedding must contain finite numbers.",
				record.deal_id
			)));
		}
	}

	Ok(())
}
