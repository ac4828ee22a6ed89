pub mod corpus;
pub mod embedding_cache;

mod error;

pub use embedding_cache::EmbeddingCache;
pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
