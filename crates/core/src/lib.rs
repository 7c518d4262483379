pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod recommend;
pub mod refresh;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub llm_provider: Option<String>,
        pub google_api_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub market_data_base_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                llm_provider: non_empty_var("LLM_PROVIDER"),
                google_api_key: non_empty_var("GOOGLE_API_KEY"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_google_api_key(&self) -> anyhow::Result<&str> {
            self.google_api_key
                .as_deref()
                .context("GOOGLE_API_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

}
