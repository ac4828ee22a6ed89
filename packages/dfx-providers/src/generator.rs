use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const SYSTEM_PROMPT: &str = "You analyze lost sales deals. Respond with a single JSON object \
	that follows the requested shape exactly. Do not add commentary.";

/// Calls an OpenAI-compatible chat completions endpoint and parses the reply as a JSON object.
/// There is no retry; a non-JSON reply is an error for this call.
pub async fn generate(
	cfg: &dfx_config::GeneratorProviderConfig,
	prompt: &str,
	context: &[String],
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"response_format": { "type": "json_object" },
		"messages": [
			{ "role": "system", "content": SYSTEM_PROMPT },
			{ "role": "user", "content": render_user_message(prompt, context) },
		],
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_generator_json(json)
}

fn render_user_message(prompt: &str, context: &[String]) -> String {
	if context.is_empty() {
		return prompt.to_string();
	}

	let excerpts: Vec<String> = context
		.iter()
		.enumerate()
		.map(|(idx, excerpt)| format!("[{}] {}", idx + 1, excerpt.trim()))
		.collect();

	format!("{prompt}\n\nDocument excerpts:\n{}", excerpts.join("\n\n"))
}

fn parse_generator_json(json: Value) -> Result<Value> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Generator response is missing message content.".to_string(),
		})?;
	let parsed: Value = serde_json::from_str(strip_code_fence(content)).map_err(|_| {
		Error::InvalidResponse { message: "Generator content is not valid JSON.".to_string() }
	})?;

	if !parsed.is_object() {
		return Err(Error::InvalidResponse {
			message: "Generator content must be a JSON object.".to_string(),
		});
	}

	Ok(parsed)
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(inner) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn completion(content: &str) -> Value {
		serde_json::json!({ "choices": [{ "message": { "content": content } }] })
	}

	#[test]
	fn parses_choice_content_json() {
		let parsed =
			parse_generator_json(completion("{\"events\": []}")).expect("parse failed");

		assert!(parsed.get("events").is_some());
	}

	#[test]
	fn strips_markdown_fences() {
		let parsed = parse_generator_json(completion("```json\n{\"red_flags\": [\"x\"]}\n```"))
			.expect("parse failed");

		assert_eq!(parsed["red_flags"][0], "x");
	}

	#[test]
	fn rejects_prose_and_non_objects() {
		for content in ["Sure! Here is the timeline.", "[1, 2]"] {
			let err = parse_generator_json(completion(content)).expect_err("Expected error.");

			assert!(matches!(err, Error::InvalidResponse { .. }), "Unexpected error: {err:?}");
		}
	}

	#[test]
	fn rejects_missing_content() {
		let err = parse_generator_json(serde_json::json!({ "choices": [] }))
			.expect_err("Expected error.");

		assert!(err.to_string().contains("missing message content"));
	}

	#[test]
	fn numbers_context_excerpts() {
		let rendered =
			render_user_message("Extract events.", &["first".to_string(), " second ".to_string()]);

		assert!(rendered.ends_with("[1] first\n\n[2] second"));
	}
}
