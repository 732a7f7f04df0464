//! Gemini Live API configuration types.

use std::time::Duration;

use url::Url;

use super::messages::FunctionDeclaration;
use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// Default Gemini Live API host.
pub const GEMINI_LIVE_BASE_URL: &str = "wss://generativelanguage.googleapis.com";

/// Default API version segment.
pub const GEMINI_LIVE_API_VERSION: &str = "v1alpha";

/// Default live model.
pub const GEMINI_LIVE_MODEL: &str = "gemini-2.0-flash-live-001";

/// Name of the time tool declared to the model.
pub const CURRENT_TIME_TOOL: &str = "current_time";

/// Connection settings for the Gemini Live client.
#[derive(Debug, Clone)]
pub struct GeminiLiveConfig {
    pub api_key: String,
    pub base_url: String,
    pub api_version: String,
    /// Upper bound for the WebSocket handshake plus `setupComplete`
    pub connect_timeout: Duration,
}

impl Default for GeminiLiveConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: GEMINI_LIVE_BASE_URL.to_string(),
            api_version: GEMINI_LIVE_API_VERSION.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl GeminiLiveConfig {
    /// Build the `BidiGenerateContent` endpoint URL.
    pub fn ws_url(&self) -> RealtimeResult<Url> {
        let raw = format!(
            "{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent",
            self.base_url.trim_end_matches('/'),
            self.api_version
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("{raw}: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RealtimeError::InvalidConfiguration(format!(
                    "unsupported URL scheme: {other}"
                )));
            }
        }
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

/// Qualify a bare model name with the `models/` prefix.
pub fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// The tool set declared to the model.
pub fn default_tools() -> Vec<FunctionDeclaration> {
    vec![FunctionDeclaration {
        name: CURRENT_TIME_TOOL.to_string(),
        description: "Returns the current date and time.".to_string(),
        parameters: None,
    }]
}
