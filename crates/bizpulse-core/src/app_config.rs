#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL of an Ollama-compatible service. `None` runs rule-based only.
    pub model_url: Option<String>,
    pub model_name: String,
    pub model_timeout_secs: u64,
    pub active_client_hours: i64,
    pub kpi_period_days: i64,
    pub trend_window_short_days: i64,
    pub trend_window_long_days: i64,
    pub trend_keep_stable: bool,
    pub insight_days_back: i64,
    pub text_batch_limit: i64,
    pub max_concurrent_clients: usize,
    pub pipeline_cron: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("model_url", &self.model_url)
            .field("model_name", &self.model_name)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("active_client_hours", &self.active_client_hours)
            .field("kpi_period_days", &self.kpi_period_days)
            .field("trend_window_short_days", &self.trend_window_short_days)
            .field("trend_window_long_days", &self.trend_window_long_days)
            .field("trend_keep_stable", &self.trend_keep_stable)
            .field("insight_days_back", &self.insight_days_back)
            .field("text_batch_limit", &self.text_batch_limit)
            .field("max_concurrent_clients", &self.max_concurrent_clients)
            .field("pipeline_cron", &self.pipeline_cron)
            .finish()
    }
}
