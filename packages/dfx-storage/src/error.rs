use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read {path:?}.")]
	Read { path: PathBuf, source: std::io::Error },
	#[error("Failed to write {path:?}.")]
	Write { path: PathBuf, source: std::io::Error },
	#[error("Failed to decode {path:?}: {source}")]
	Decode { path: PathBuf, source: serde_json::Error },
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
