use crate::error::{Error, Result};
use crate::services::coordinator_service::GenerationSettings;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub catalogue_path: Option<String>,
    pub openai_api_key: String,
    pub embedding_api_key: Option<String>,
    pub generator_model: String,
    pub embedding_model: String,
    pub api_rps: u32,
    pub max_batch_size: usize,
    pub generation_pause_ms: u64,
    pub external_timeout_secs: u64,
    pub max_attempts: u32,
    pub duplicate_threshold: f32,
    pub ann_corpus_threshold: usize,
    pub fallback_templates: bool,
    pub session_capacity: usize,
    pub progress_capacity: usize,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            catalogue_path: env::var("CATALOGUE_PATH").ok().filter(|v| !v.is_empty()),
            openai_api_key: get_env("OPENAI_API_KEY")?,
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok().filter(|v| !v.is_empty()),
            generator_model: env::var("GENERATOR_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            api_rps: get_env_parse_or("API_RPS", 20)?,
            max_batch_size: get_env_parse_or("MAX_BATCH_SIZE", 50)?,
            generation_pause_ms: get_env_parse_or("GENERATION_PAUSE_MS", 1200)?,
            external_timeout_secs: get_env_parse_or("EXTERNAL_TIMEOUT_SECS", 30)?,
            max_attempts: get_env_parse_or("MAX_ATTEMPTS", 3)?,
            duplicate_threshold: get_env_parse_or("DUPLICATE_THRESHOLD", 0.9)?,
            ann_corpus_threshold: get_env_parse_or("ANN_CORPUS_THRESHOLD", 2000)?,
            fallback_templates: get_env_parse_or("FALLBACK_TEMPLATES", true)?,
            session_capacity: get_env_parse_or("SESSION_CAPACITY", 10_000)?,
            progress_capacity: get_env_parse_or("PROGRESS_CAPACITY", 1_000)?,
        };

        if config.max_attempts == 0 {
            return Err(Error::Configuration("MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&config.duplicate_threshold) {
            return Err(Error::Configuration(
                "DUPLICATE_THRESHOLD must be within [0, 1]".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            max_attempts: self.max_attempts,
            duplicate_threshold: self.duplicate_threshold,
            pause_between_calls: Duration::from_millis(self.generation_pause_ms),
            external_timeout: Duration::from_secs(self.external_timeout_secs),
            ann_corpus_threshold: self.ann_corpus_threshold,
            fallback_templates: self.fallback_templates,
        }
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Configuration(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Configuration("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
