use crate::config::types::{
    AssetConfig, Config, CrawlerConfig, FetcherConfig, LinkConfig, OutputConfig, RenderingConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound on concurrent page workers
pub const MAX_WORKERS: u32 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_link_config(&config.links)?;
    validate_rendering_config(&config.rendering)?;
    validate_asset_config(&config.assets)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_seed(&config.seed)?;

    if config.max_depth < 1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be >= 1, got {}",
            config.max_depth
        )));
    }

    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "deadline_secs must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the seed URL: absolute, http or https, with a host
pub fn validate_seed(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the exclusion keyword policy
fn validate_link_config(config: &LinkConfig) -> Result<(), ConfigError> {
    for (category, keywords) in &config.exclusions {
        if category.is_empty() {
            return Err(ConfigError::Validation(
                "exclusion category name cannot be empty".to_string(),
            ));
        }

        if keywords.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "exclusion category '{}' contains an empty keyword",
                category
            )));
        }
    }

    Ok(())
}

fn validate_rendering_config(config: &RenderingConfig) -> Result<(), ConfigError> {
    if config.dynamic && config.chrome_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chrome_path is required when dynamic rendering is enabled".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "rendering timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates asset configuration
fn validate_asset_config(config: &AssetConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "asset directory cannot be empty".to_string(),
        ));
    }

    if config.extensions.is_empty() {
        return Err(ConfigError::Validation(
            "at least one image extension must be recognized".to_string(),
        ));
    }

    for ext in &config.extensions {
        if ext.is_empty() || ext.starts_with('.') || ext.contains('/') {
            return Err(ConfigError::Validation(format!(
                "invalid image extension '{}' (expected e.g. \"png\")",
                ext
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.document_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "document_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
