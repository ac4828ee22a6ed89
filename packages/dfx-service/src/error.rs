pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Retrieval returned no chunks: {message}")]
	RetrievalEmpty { message: String },
	#[error("Generation failed: {message}")]
	Generation { message: String },
	#[error("Embedding failed: {message}")]
	Embedding { message: String },
	#[error("Contract violation: {message}")]
	ContractViolation { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Fatal errors abort a run. The rest are absorbed by the stage that raised them.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Self::RetrievalEmpty { .. } | Self::Generation { .. })
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::RetrievalEmpty { .. } => "retrieval_empty",
			Self::Generation { .. } => "generation",
			Self::Embedding { .. } => "embedding",
			Self::ContractViolation { .. } => "contract_violation",
			Self::Storage { .. } => "storage",
		}
	}
}

impl From<dfx_storage::Error> for Error {
	fn from(err: dfx_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
