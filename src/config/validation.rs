use crate::config::types::{Config, NavigationConfig, OrchestratorConfig, ScraperConfig};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_orchestrator_config(&config.orchestrator)?;
    validate_navigation_config(&config.navigation)?;

    if config.messaging.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "messaging max-attempts must be >= 1".to_string(),
        ));
    }

    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    validate_scrapers(&config.scrapers)?;
    Ok(())
}

fn validate_orchestrator_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    if config.max_extract_attempts < 1 || config.max_extract_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-extract-attempts must be between 1 and 10, got {}",
            config.max_extract_attempts
        )));
    }

    if config.extract_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "extract-timeout-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_navigation_config(config: &NavigationConfig) -> Result<(), ConfigError> {
    if config.page_load_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "page-load-timeout-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates scraper definitions
fn validate_scrapers(scrapers: &[ScraperConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for scraper in scrapers {
        if scraper.id.is_empty() {
            return Err(ConfigError::Validation(
                "scraper id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(scraper.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate scraper id '{}'",
                scraper.id
            )));
        }

        if scraper.domain.is_empty() {
            return Err(ConfigError::Validation(format!(
                "scraper '{}' must declare a domain",
                scraper.id
            )));
        }

        if scraper.page_param.is_empty() {
            return Err(ConfigError::Validation(format!(
                "scraper '{}' has an empty page-param",
                scraper.id
            )));
        }

        if !scraper.fields.iter().any(|f| f.name == scraper.id_field) {
            return Err(ConfigError::Validation(format!(
                "scraper '{}' id-field '{}' is not a declared field",
                scraper.id, scraper.id_field
            )));
        }

        validate_selector(scraper, &scraper.item_selector)?;
        for field in &scraper.fields {
            validate_selector(scraper, &field.selector)?;
        }
        if let Some(selector) = &scraper.next_page_selector {
            validate_selector(scraper, selector)?;
        }
        if let Some(selector) = &scraper.total_pages_selector {
            validate_selector(scraper, selector)?;
        }
    }

    Ok(())
}

fn validate_selector(scraper: &ScraperConfig, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
        scraper: scraper.id.clone(),
        selector: selector.to_string(),
    })?;
    Ok(())
}
