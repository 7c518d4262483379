use crate::config::Settings;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod anthropic;
pub mod error;
pub mod gemini;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => anyhow::bail!("unknown LLM_PROVIDER: {other}"),
        }
    }
}

/// Free-text generation used for recommendation explanations.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_text(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Builds the configured text generator. `LLM_PROVIDER` defaults to Gemini.
pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let provider = match settings.llm_provider.as_deref() {
        Some(s) => s.parse::<Provider>()?,
        None => Provider::Gemini,
    };

    Ok(match provider {
        Provider::Gemini => Arc::new(gemini::GeminiClient::from_settings(settings)?),
        Provider::Anthropic => Arc::new(anthropic::AnthropicClient::from_settings(settings)?),
    })
}
