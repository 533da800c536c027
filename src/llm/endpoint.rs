//! Connection parameters for one completion provider

use std::collections::BTreeMap;
use std::fmt;

/// Default chat-completions base address
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Immutable connection parameters (credential, base address, model, headers).
///
/// Passive data: the orchestrator selects an endpoint, it never mutates one.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub headers: BTreeMap<String, String>,
}

impl ProviderEndpoint {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// Keeps credentials out of logs
impl fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
