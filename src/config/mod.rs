use std::env;

/// Run-level settings for the scoring engine.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Language code for localized descriptions and methods text;
    /// unsupported codes fall back to the default language downstream.
    pub language: String,
    /// Worker threads for the row loop; 0 lets the pool size itself to
    /// available compute.
    pub workers: usize,
    /// Emit raw item columns alongside computed scores.
    pub include_items: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            workers: 0,
            include_items: false,
        }
    }
}

/// Tracing controls for the CLI.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SCOREMILL_WORKERS must be a non-negative integer")]
    InvalidWorkers,
    #[error("SCOREMILL_INCLUDE_ITEMS must be 'true' or 'false'")]
    InvalidIncludeItems,
}

impl RunConfig {
    /// Loads settings from the environment, with `.env` support.
    pub fn load() -> Result<(Self, TelemetryConfig), ConfigError> {
        dotenvy::dotenv().ok();

        let language = env::var("SCOREMILL_LANG").unwrap_or_else(|_| "en".to_string());
        let workers = match env::var("SCOREMILL_WORKERS") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidWorkers)?,
            Err(_) => 0,
        };
        let include_items = match env::var("SCOREMILL_INCLUDE_ITEMS") {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(ConfigError::InvalidIncludeItems),
            },
            Err(_) => false,
        };
        let log_level = env::var("SCOREMILL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok((
            Self {
                language,
                workers,
                include_items,
            },
            TelemetryConfig { log_level },
        ))
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }
}
