pub mod embedding;
pub mod error;
pub mod generator;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, Value};

	use crate::{Error, auth_headers};

	#[test]
	fn auth_headers_include_bearer_and_defaults() {
		let mut defaults = Map::new();

		defaults.insert("x-tenant".to_string(), Value::String("acme".to_string()));

		let headers = auth_headers("secret", &defaults).expect("Headers must build.");

		assert_eq!(headers["authorization"], "Bearer secret");
		assert_eq!(headers["x-tenant"], "acme");
	}

	#[test]
	fn non_string_default_headers_are_rejected() {
		let mut defaults = Map::new();

		defaults.insert("x-retries".to_string(), Value::from(3));

		let err = auth_headers("secret", &defaults).expect_err("Expected invalid config.");

		assert!(matches!(err, Error::InvalidConfig { .. }), "Unexpected error: {err:?}");
	}
}
