use crate::config::types::{CatalogConfig, Config, CrawlerConfig, ExtractorConfig, OutputConfig};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_catalog_config(&config.catalog)?;
    validate_output_config(&config.output)?;
    validate_extractor_config(&config.extractor)?;

    if config.http.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.http.timeout == 0 {
        return Err(ConfigError::Validation(
            "http timeout must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.retry_budget < 1 || config.retry_budget > 20 {
        return Err(ConfigError::Validation(format!(
            "retry-budget must be between 1 and 20, got {}",
            config.retry_budget
        )));
    }

    if config.session_pool_size < 1 || config.session_pool_size > 16 {
        return Err(ConfigError::Validation(format!(
            "session-pool-size must be between 1 and 16, got {}",
            config.session_pool_size
        )));
    }

    if config.persist_every < 1 {
        return Err(ConfigError::Validation(format!(
            "persist-every must be >= 1, got {}",
            config.persist_every
        )));
    }

    if config.max_pages_per_tile == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages-per-tile must be >= 1 when set".to_string(),
        ));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "progress-interval must be >= 1, got {}",
            config.progress_interval
        )));
    }

    Ok(())
}

fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    if config.sources.is_empty() {
        return Err(ConfigError::Validation(
            "catalog must list at least one source".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if !seen.insert(source) {
            return Err(ConfigError::Validation(format!(
                "catalog source listed twice: {}",
                source.display()
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let paths = [
        ("master-path", &config.master_path),
        ("checkpoint-path", &config.checkpoint_path),
        ("error-log-path", &config.error_log_path),
    ];

    for (key, path) in paths {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", key)));
        }
    }

    if config.master_path == config.checkpoint_path
        || config.master_path == config.error_log_path
        || config.checkpoint_path == config.error_log_path
    {
        return Err(ConfigError::Validation(
            "master-path, checkpoint-path and error-log-path must be distinct".to_string(),
        ));
    }

    Ok(())
}

fn validate_extractor_config(config: &ExtractorConfig) -> Result<(), ConfigError> {
    validate_selector(&config.record_selector)?;
    validate_selector(&config.id_selector)?;

    if config.id_attribute.trim().is_empty() {
        return Err(ConfigError::Validation(
            "id-attribute cannot be empty".to_string(),
        ));
    }

    if let Some(next) = &config.next_link_selector {
        validate_selector(next)?;
    }

    let mut names = HashSet::new();
    for rule in &config.fields {
        if rule.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "extractor field name cannot be empty".to_string(),
            ));
        }
        if !names.insert(rule.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "extractor field '{}' is defined twice",
                rule.name
            )));
        }
        validate_selector(&rule.selector)?;
    }

    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}
