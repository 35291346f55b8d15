use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::validator::{ConfigValidator, ValidationError};
use crate::error::RetryPolicy;
use crate::models::RiskCategory;
use crate::risk::weights::WeightSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: String,
    pub server: ServerSettings,
    pub orchestrator: OrchestratorSettings,
    pub cache: CacheSettings,
    pub session: SessionSettings,
    pub sources: SourceSettings,
    pub narrative: NarrativeSettings,
    pub weights: WeightSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub unit_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub max_concurrent_units: Option<usize>,
    pub validate_subjects: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_capacity: u64,
    pub redis_enabled: bool,
    pub redis_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_age_hours: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub github_url: String,
    pub defi_data_url: String,
    pub blockchain_url: String,
    pub fetch_timeout_seconds: u64,
    pub retry_attempts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeSettings {
    pub enabled: bool,
    pub url: String,
    pub timeout_seconds: u64,
}

/// Category weights. A zero weight removes the category from scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightSettings {
    pub security: f64,
    pub financial: f64,
    pub technical: f64,
    pub governance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        OrchestratorSettings {
            unit_timeout_seconds: 120,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            max_concurrent_units: None,
            validate_subjects: true,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_seconds: 600,
            max_capacity: 1_000,
            redis_enabled: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            max_age_hours: 24,
            sweep_interval_seconds: 3_600,
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            github_url: "http://localhost:8101".to_string(),
            defi_data_url: "http://localhost:8102".to_string(),
            blockchain_url: "http://localhost:8103".to_string(),
            fetch_timeout_seconds: 30,
            retry_attempts: 2,
        }
    }
}

impl Default for NarrativeSettings {
    fn default() -> Self {
        NarrativeSettings {
            enabled: false,
            url: "http://localhost:8001".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for WeightSettings {
    fn default() -> Self {
        WeightSettings {
            security: 0.35,
            financial: 0.30,
            technical: 0.20,
            governance: 0.15,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then optional files, then `RISK_ORCH__*` variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("RISK_ORCH_ENV")
            .or_else(|_| env::var("ENVIRONMENT"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();
        info!("Loading configuration for environment: {}", environment);

        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(Environment::with_prefix("RISK_ORCH").separator("__"))
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.environment = environment;
        settings
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        info!("Configuration loaded and validated successfully");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ConfigValidator::new().validate(self)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl OrchestratorSettings {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
            ..RetryPolicy::default()
        }
    }
}

impl SessionSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3_600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl WeightSettings {
    pub fn entries(&self) -> Vec<(RiskCategory, f64)> {
        vec![
            (RiskCategory::Security, self.security),
            (RiskCategory::Financial, self.financial),
            (RiskCategory::Technical, self.technical),
            (RiskCategory::Governance, self.governance),
        ]
        .into_iter()
        .filter(|(_, weight)| *weight > 0.0)
        .collect()
    }

    pub fn to_weight_set(&self) -> Result<WeightSet, crate::risk::RiskError> {
        WeightSet::new(self.entries())
    }
}
