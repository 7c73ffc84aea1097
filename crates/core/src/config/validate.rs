use super::{types::Config, ConfigError};

/// Validate a loaded configuration before the service starts.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.catalog.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "catalog.base_url must not be empty".to_string(),
        ));
    }

    if config.download.max_concurrent == 0 {
        return Err(ConfigError::Invalid(
            "download.max_concurrent must be at least 1".to_string(),
        ));
    }

    if config.download.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "download.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.download.attempt_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "download.attempt_timeout_secs must be at least 1".to_string(),
        ));
    }

    if config.download.staging_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(
            "download.staging_dir must not be empty".to_string(),
        ));
    }

    if let Some(url) = &config.store.durable_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store.durable_url must not be empty when set".to_string(),
            ));
        }
    }

    if config.reaper.ttl_secs == 0 {
        return Err(ConfigError::Invalid(
            "reaper.ttl_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::load_config_from_str;
    use super::*;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[catalog]
base_url = "http://localhost:9200"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = valid_config();
        config.download.max_concurrent = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_empty_durable_url_rejected() {
        let mut config = valid_config();
        config.store.durable_url = Some("  ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = valid_config();
        config.reaper.ttl_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
