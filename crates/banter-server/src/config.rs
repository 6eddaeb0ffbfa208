/// Server configuration, collected from the environment once at startup and
/// threaded through explicitly — no process-wide singletons.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,

    /// Upstream completion provider
    pub ai_api_key: String,
    pub ai_model: String,
    /// Override for a local sidecar or test server
    pub ai_base_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: std::env::var("BANTER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("BANTER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            db_path: std::env::var("BANTER_DB_PATH").unwrap_or_else(|_| "banter.db".to_string()),
            ai_api_key: std::env::var("GEMINI_API_KEY")?,
            ai_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            ai_base_url: std::env::var("GEMINI_BASE_URL").ok(),
        })
    }
}
