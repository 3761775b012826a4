use std::env;
use std::time::Duration;

/// Process-wide configuration, loaded once at startup. Every field has a
/// documented default; malformed environment values fall back to the
/// default and log a warning rather than panicking.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub query_cache_hours: i64,
    pub query_cache_cleanup_enabled: bool,
    pub login_timeout: Duration,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub llm_timeout: Duration,
    pub embedding_dimensions: usize,
    pub hybrid_candidate_multiplier: usize,
    pub max_pages: usize,
    pub search_batch_size: usize,
    pub embedding_batch_size: usize,
    pub embedding_save_batch_size: usize,
    pub chat_history_window: usize,
    pub chat_max_context_issues: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./ims_crawler.db".to_string(),
            query_cache_hours: 24,
            query_cache_cleanup_enabled: true,
            login_timeout: Duration::from_millis(10_000),
            navigation_timeout: Duration::from_millis(60_000),
            selector_timeout: Duration::from_millis(30_000),
            llm_timeout: Duration::from_millis(120_000),
            embedding_dimensions: 4096,
            hybrid_candidate_multiplier: 5,
            max_pages: 100,
            search_batch_size: 10,
            embedding_batch_size: 32,
            embedding_save_batch_size: 20,
            chat_history_window: 10,
            chat_max_context_issues: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "invalid config value, using default");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            query_cache_hours: env_or("IMS_QUERY_CACHE_HOURS", defaults.query_cache_hours),
            query_cache_cleanup_enabled: env_or(
                "IMS_QUERY_CACHE_CLEANUP_ENABLED",
                defaults.query_cache_cleanup_enabled,
            ),
            login_timeout: Duration::from_millis(env_or(
                "IMS_CRAWLER_LOGIN_TIMEOUT_MS",
                defaults.login_timeout.as_millis() as u64,
            )),
            navigation_timeout: Duration::from_millis(env_or(
                "IMS_CRAWLER_NAVIGATION_TIMEOUT_MS",
                defaults.navigation_timeout.as_millis() as u64,
            )),
            selector_timeout: Duration::from_millis(env_or(
                "IMS_CRAWLER_SELECTOR_TIMEOUT_MS",
                defaults.selector_timeout.as_millis() as u64,
            )),
            llm_timeout: Duration::from_millis(env_or(
                "IMS_LLM_TIMEOUT_MS",
                defaults.llm_timeout.as_millis() as u64,
            )),
            embedding_dimensions: env_or("EMBEDDING_DIMENSIONS", defaults.embedding_dimensions),
            hybrid_candidate_multiplier: env_or(
                "IMS_HYBRID_CANDIDATE_MULTIPLIER",
                defaults.hybrid_candidate_multiplier,
            ),
            max_pages: env_or("IMS_MAX_PAGES", defaults.max_pages),
            search_batch_size: env_or("IMS_SEARCH_BATCH_SIZE", defaults.search_batch_size),
            embedding_batch_size: env_or(
                "IMS_EMBEDDING_BATCH_SIZE",
                defaults.embedding_batch_size,
            ),
            embedding_save_batch_size: env_or(
                "IMS_EMBEDDING_SAVE_BATCH_SIZE",
                defaults.embedding_save_batch_size,
            ),
            chat_history_window: env_or("IMS_CHAT_HISTORY_WINDOW", defaults.chat_history_window),
            chat_max_context_issues: env_or(
                "IMS_CHAT_MAX_CONTEXT_ISSUES",
                defaults.chat_max_context_issues,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_never_panic() {
        let cfg = Config::default();
        assert_eq!(cfg.query_cache_hours, 24);
    }

    #[test]
    fn from_env_falls_back_on_garbage() {
        std::env::set_var("IMS_QUERY_CACHE_HOURS", "not-a-number");
        let cfg = Config::from_env();
        assert_eq!(cfg.query_cache_hours, 24);
        std::env::remove_var("IMS_QUERY_CACHE_HOURS");
    }
}
