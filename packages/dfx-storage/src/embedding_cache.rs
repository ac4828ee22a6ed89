//! Content-addressed embedding cache shared across analysis runs.
//!
//! Keys are blake3 digests of the provider namespace plus the normalized text, so vectors from
//! different models never collide. Entries never expire. When backed by a file, every write
//! merges the entries already on disk, writes the union to a uniquely named temporary file and
//! renames it into place. Several runs may share one file; a failed write only costs a later
//! recompute and is logged, never surfaced.

use std::{
	collections::HashMap,
	fs,
	future::Future,
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{Error, Result};

const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
	version: u32,
	entries: HashMap<String, Vec<f32>>,
}

pub struct EmbeddingCache {
	namespace: String,
	path: Option<PathBuf>,
	entries: RwLock<HashMap<String, Vec<f32>>>,
	in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
	write_lock: Mutex<()>,
}
impl EmbeddingCache {
	/// Namespace for one embedding model configuration.
	pub fn namespace(provider_id: &str, model: &str, dimensions: u32) -> String {
		format!("{provider_id}:{model}:{dimensions}")
	}

	/// A cache that lives for the process lifetime only.
	pub fn in_memory(namespace: impl Into<String>) -> Self {
		Self::with_entries(namespace.into(), None, HashMap::new())
	}

	/// Opens a file-backed cache, loading existing entries when the file exists.
	pub fn open(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Result<Self> {
		let path = path.into();
		let entries = match fs::read(&path) {
			Ok(raw) => decode_file(&path, &raw)?,
			Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
			Err(err) => return Err(Error::Read { path, source: err }),
		};

		tracing::debug!(path = %path.display(), entries = entries.len(), "Opened embedding cache.");

		Ok(Self::with_entries(namespace.into(), Some(path), entries))
	}

	fn with_entries(
		namespace: String,
		path: Option<PathBuf>,
		entries: HashMap<String, Vec<f32>>,
	) -> Self {
		Self {
			namespace,
			path,
			entries: RwLock::new(entries),
			in_flight: Mutex::new(HashMap::new()),
			write_lock: Mutex::new(()),
		}
	}

	pub fn key(&self, text: &str) -> String {
		let mut hasher = blake3::Hasher::new();

		hasher.update(self.namespace.as_bytes());
		hasher.update(b"\n");
		hasher.update(dfx_domain::text::normalize(text).as_bytes());

		hasher.finalize().to_hex().to_string()
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}

	pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
		self.entries.read().await.get(&self.key(text)).cloned()
	}

	/// Looks up every text, preserving input order.
	pub async fn get_many(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
		let entries = self.entries.read().await;

		texts.iter().map(|text| entries.get(&self.key(text)).cloned()).collect()
	}

	/// Stores computed vectors. Existing entries for the same key are overwritten.
	pub async fn insert_many(&self, items: Vec<(String, Vec<f32>)>) {
		if items.is_empty() {
			return;
		}

		{
			let mut entries = self.entries.write().await;

			for (text, vector) in items {
				entries.insert(self.key(&text), vector);
			}
		}

		self.persist().await;
	}

	/// Returns the cached vector for `text`, running `compute` on a miss. Concurrent misses on
	/// one key wait for the first caller instead of computing again.
	pub async fn get_or_compute<F, Fut, E>(&self, text: &str, compute: F) -> Result<Vec<f32>, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Vec<f32>, E>>,
	{
		let key = self.key(text);

		if let Some(hit) = self.entries.read().await.get(&key).cloned() {
			tracing::debug!(key = %&key[..12], "Embedding cache hit.");

			return Ok(hit);
		}

		let gate = self.in_flight.lock().await.entry(key.clone()).or_default().clone();
		let guard = gate.lock().await;

		if let Some(hit) = self.entries.read().await.get(&key).cloned() {
			drop(guard);
			self.release(&key).await;

			return Ok(hit);
		}

		tracing::debug!(key = %&key[..12], "Embedding cache miss.");

		let result = match compute().await {
			Ok(vector) => {
				self.entries.write().await.insert(key.clone(), vector.clone());
				self.persist().await;

				Ok(vector)
			},
			Err(err) => Err(err),
		};

		drop(guard);
		self.release(&key).await;

		result
	}

	async fn release(&self, key: &str) {
		self.in_flight.lock().await.remove(key);
	}

	async fn persist(&self) {
		let Some(path) = &self.path else {
			return;
		};
		let _guard = self.write_lock.lock().await;

		if let Err(err) = self.merge_and_write(path).await {
			tracing::warn!(
				path = %path.display(),
				error = %err,
				"Failed to persist embedding cache. Entries stay in memory."
			);
		}
	}

	async fn merge_and_write(&self, path: &Path) -> Result<()> {
		let on_disk = match fs::read(path) {
			Ok(raw) => decode_file(path, &raw).unwrap_or_else(|err| {
				tracing::warn!(
					path = %path.display(),
					error = %err,
					"Embedding cache file is unreadable. Overwriting."
				);

				HashMap::new()
			}),
			Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
			Err(err) => return Err(Error::Read { path: path.to_path_buf(), source: err }),
		};
		let merged = {
			let mut entries = self.entries.write().await;

			for (key, vector) in on_disk {
				entries.entry(key).or_insert(vector);
			}

			entries.clone()
		};
		let payload =
			serde_json::to_vec(&CacheFile { version: CACHE_SCHEMA_VERSION, entries: merged })?;
		let tmp = tmp_path(path, &Uuid::new_v4().simple().to_string());

		if let Some(parent) = path.parent()
			&& !parent.as_os_str().is_empty()
		{
			fs::create_dir_all(parent)
				.map_err(|err| Error::Write { path: parent.to_path_buf(), source: err })?;
		}

		fs::write(&tmp, payload).map_err(|err| Error::Write { path: tmp.clone(), source: err })?;

		if let Err(err) = fs::rename(&tmp, path) {
			let _ = fs::remove_file(&tmp);

			return Err(Error::Write { path: path.to_path_buf(), source: err });
		}

		Ok(())
	}
}

fn decode_file(path: &Path, raw: &[u8]) -> Result<HashMap<String, Vec<f32>>> {
	let file: CacheFile = serde_json::from_slice(raw)
		.map_err(|err| Error::Decode { path: path.to_path_buf(), source: err })?;

	if file.version != CACHE_SCHEMA_VERSION {
		tracing::warn!(
			path = %path.display(),
			version = file.version,
			"Embedding cache schema version mismatch. Starting empty."
		);

		return Ok(HashMap::new());
	}

	Ok(file.entries)
}

fn tmp_path(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();

	name.push(format!(".{suffix}.tmp"));

	path.with_file_name(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keys_ignore_whitespace_and_respect_namespace() {
		let small = EmbeddingCache::in_memory(EmbeddingCache::namespace("p", "small", 64));
		let large = EmbeddingCache::in_memory(EmbeddingCache::namespace("p", "large", 64));

		assert_eq!(small.key("pricing  gap\n"), small.key("pricing gap"));
		assert_ne!(small.key("pricing gap"), large.key("pricing gap"));
	}

	#[test]
	fn tmp_path_is_a_unique_sibling() {
		let path = Path::new("/var/cache/embeddings.json");

		assert_eq!(tmp_path(path, "a1"), Path::new("/var/cache/embeddings.json.a1.tmp"));
		assert_ne!(tmp_path(path, "a1"), tmp_path(path, "b2"));
	}
}
