use thiserror::Error;
use url::Url;

use crate::config::settings::Settings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid URL: {field} - {value}")]
    InvalidUrl { field: String, value: String },
    #[error("Invalid range: {field} must be between {min} and {max}, got {value}")]
    InvalidRange { field: String, min: f64, max: f64, value: f64 },
    #[error("Invalid format: {field} - {message}")]
    InvalidFormat { field: String, message: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Allowed ranges for tunable settings
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub port_range: (u16, u16),
    pub unit_timeout_range: (u64, u64),
    pub retry_range: (u32, u32),
    pub concurrency_range: (usize, usize),
    pub cache_ttl_range: (u64, u64),
    pub session_age_range: (u64, u64),
    pub sweep_interval_range: (u64, u64),
    pub fetch_timeout_range: (u64, u64),
    pub weight_tolerance: f64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            port_range: (1, 65535),
            unit_timeout_range: (1, 3600),
            retry_range: (1, 10),
            concurrency_range: (1, 64),
            cache_ttl_range: (1, 86_400),
            session_age_range: (1, 24 * 30),
            sweep_interval_range: (1, 86_400),
            fetch_timeout_range: (1, 300),
            weight_tolerance: 1e-6,
        }
    }
}

pub struct ConfigValidator {
    rules: ValidationRules,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::default(),
        }
    }

    pub fn with_rules(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn validate(&self, settings: &Settings) -> ValidationResult<()> {
        let rules = &self.rules;

        self.validate_range(
            settings.server.port as f64,
            rules.port_range.0 as f64,
            rules.port_range.1 as f64,
            "server.port",
        )?;

        let orchestrator = &settings.orchestrator;
        self.validate_range(
            orchestrator.unit_timeout_seconds as f64,
            rules.unit_timeout_range.0 as f64,
            rules.unit_timeout_range.1 as f64,
            "orchestrator.unit_timeout_seconds",
        )?;
        self.validate_range(
            orchestrator.retry_attempts as f64,
            rules.retry_range.0 as f64,
            rules.retry_range.1 as f64,
            "orchestrator.retry_attempts",
        )?;
        if let Some(limit) = orchestrator.max_concurrent_units {
            self.validate_range(
                limit as f64,
                rules.concurrency_range.0 as f64,
                rules.concurrency_range.1 as f64,
                "orchestrator.max_concurrent_units",
            )?;
        }
        if orchestrator.retry_max_delay_ms < orchestrator.retry_base_delay_ms {
            return Err(ValidationError::InvalidFormat {
                field: "orchestrator.retry_max_delay_ms".to_string(),
                message: "retry_max_delay_ms must be >= retry_base_delay_ms".to_string(),
            });
        }

        self.validate_range(
            settings.cache.ttl_seconds as f64,
            rules.cache_ttl_range.0 as f64,
            rules.cache_ttl_range.1 as f64,
            "cache.ttl_seconds",
        )?;
        if settings.cache.redis_enabled {
            self.validate_url(&settings.cache.redis_url, "cache.redis_url", &["redis", "rediss"])?;
        }

        self.validate_range(
            settings.session.max_age_hours as f64,
            rules.session_age_range.0 as f64,
            rules.session_age_range.1 as f64,
            "session.max_age_hours",
        )?;
        self.validate_range(
            settings.session.sweep_interval_seconds as f64,
            rules.sweep_interval_range.0 as f64,
            rules.sweep_interval_range.1 as f64,
            "session.sweep_interval_seconds",
        )?;

        self.validate_range(
            settings.sources.fetch_timeout_seconds as f64,
            rules.fetch_timeout_range.0 as f64,
            rules.fetch_timeout_range.1 as f64,
            "sources.fetch_timeout_seconds",
        )?;
        for (url, field) in [
            (&settings.sources.github_url, "sources.github_url"),
            (&settings.sources.defi_data_url, "sources.defi_data_url"),
            (&settings.sources.blockchain_url, "sources.blockchain_url"),
        ] {
            self.validate_url(url, field, &["http", "https"])?;
        }
        if settings.narrative.enabled {
            self.validate_url(&settings.narrative.url, "narrative.url", &["http", "https"])?;
        }

        self.validate_weights(settings)
    }

    fn validate_weights(&self, settings: &Settings) -> ValidationResult<()> {
        let entries = settings.weights.entries();
        for (category, weight) in &entries {
            self.validate_range(*weight, 0.0, 1.0, &format!("weights.{}", category))?;
        }
        if entries.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "weights".to_string(),
                message: "at least one category must carry weight".to_string(),
            });
        }
        let sum: f64 = entries.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > self.rules.weight_tolerance {
            return Err(ValidationError::InvalidRange {
                field: "weights (sum)".to_string(),
                min: 1.0,
                max: 1.0,
                value: sum,
            });
        }
        Ok(())
    }

    fn validate_range(&self, value: f64, min: f64, max: f64, field: &str) -> ValidationResult<()> {
        if value < min || value > max || value.is_nan() {
            return Err(ValidationError::InvalidRange {
                field: field.to_string(),
                min,
                max,
                value,
            });
        }
        Ok(())
    }

    fn validate_url(&self, value: &str, field: &str, schemes: &[&str]) -> ValidationResult<()> {
        let url = Url::parse(value).map_err(|_| ValidationError::InvalidUrl {
            field: field.to_string(),
            value: value.to_string(),
        })?;
        if !schemes.contains(&url.scheme()) {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: format!("Unsupported scheme: {}", url.scheme()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sum_is_enforced() {
        let mut settings = Settings::default();
        settings.weights.security = 0.5;
        match ConfigValidator::new().validate(&settings) {
            Err(ValidationError::InvalidRange { field, value, .. }) => {
                assert_eq!(field, "weights (sum)");
                assert!((value - 1.15).abs() < 1e-9);
            }
            other => panic!("expected weight sum error, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_range() {
        let mut settings = Settings::default();
        settings.orchestrator.unit_timeout_seconds = 0;
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_concurrency_cap_is_optional() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        settings.orchestrator.max_concurrent_units = Some(0);
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::InvalidRange { .. })
        ));
        settings.orchestrator.max_concurrent_units = Some(2);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_source_urls_must_parse() {
        let mut settings = Settings::default();
        settings.sources.github_url = "not a url".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));

        settings.sources.github_url = "ftp://example.com".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_redis_url_only_checked_when_enabled() {
        let mut settings = Settings::default();
        settings.cache.redis_url = "bogus".to_string();
        assert!(settings.validate().is_ok());
        settings.cache.redis_enabled = true;
        assert!(settings.validate().is_err());
    }
}
