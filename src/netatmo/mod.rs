pub mod auth;
pub mod stations;

pub use auth::{RefreshOutcome, TokenRefresher};
pub use stations::{StationApi, StationClient};

/// Build the shared HTTP client used for both Netatmo endpoints
///
/// The client-wide timeout keeps a hung upstream from stalling a poll cycle.
pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Pull the provider's error message out of an error body
///
/// The token endpoint answers `{"error": "invalid_grant"}` while the data
/// endpoints answer `{"error": {"code": 2, "message": "Invalid access_token"}}`.
pub(crate) fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Object(error) => error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| error.get("code").map(|c| format!("error code {c}"))),
        _ => None,
    }
}

/// Diagnostic text for a failed response: provider message, else a body excerpt
pub(crate) fn describe_failure(body: &str) -> String {
    const MAX_EXCERPT: usize = 200;

    if let Some(message) = provider_error_message(body) {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_EXCERPT).collect()
}
