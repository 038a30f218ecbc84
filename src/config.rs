//! Environment configuration

use crate::error::OrchestrationError;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub docs_dir: PathBuf,
    pub db_path: PathBuf,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub llm_timeout: Duration,
    pub sql_timeout: Duration,
    pub retrieval_top_k: usize,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            db_path: PathBuf::from("data/northwind.sqlite"),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            llm_timeout: Duration::from_secs(60),
            sql_timeout: Duration::from_secs(30),
            retrieval_top_k: 3,
            port: 8080,
        }
    }
}

impl AgentConfig {
    /// Load from the process environment. Call `dotenv::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup; unset or blank keys take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let retrieval_top_k = match get("RETRIEVAL_TOP_K") {
            Some(raw) => parse_value("RETRIEVAL_TOP_K", &raw)?,
            None => defaults.retrieval_top_k,
        };

        Ok(Self {
            docs_dir: get("DOCS_DIR").map(PathBuf::from).unwrap_or(defaults.docs_dir),
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            llm_timeout: seconds(&get, "LLM_TIMEOUT_SECS", defaults.llm_timeout)?,
            sql_timeout: seconds(&get, "SQL_TIMEOUT_SECS", defaults.sql_timeout)?,
            retrieval_top_k,
            port,
        })
    }
}

fn seconds(get: &dyn Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match get(key) {
        Some(raw) => Ok(Duration::from_secs(parse_value(key, &raw)?)),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| OrchestrationError::ConfigError(format!("{} = {:?}: {}", key, raw, e)))
}
