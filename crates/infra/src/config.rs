//! Runtime configuration.
//!
//! Loaded in layers, later sources overriding earlier ones:
//! 1. Defaults in code
//! 2. Optional `config/stockflow.{toml,yaml,json}` file
//! 3. `STOCKFLOW__*` environment variables (`.env` is read first when present),
//!    e.g. `STOCKFLOW__DATABASE__URL`, `STOCKFLOW__PROCUREMENT__TAX_RATE`

use std::time::Duration;

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use stockflow_observability::LogFormat;
use stockflow_purchasing::ApprovalMatrix;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,

    /// Redis URL for the shared cache and pub/sub bus; in-process fallbacks when unset.
    #[serde(default)]
    pub redis_url: Option<String>,

    pub cache: CacheConfig,

    pub procurement: ProcurementConfig,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Lifetime of cached item snapshots.
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProcurementConfig {
    /// Fraction applied to the PO subtotal, e.g. `0.16`.
    pub tax_rate: Decimal,

    #[serde(default)]
    pub approval: ApprovalMatrix,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::ZERO,
            approval: ApprovalMatrix::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("database.url", "postgres://localhost/stockflow")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("cache.ttl_secs", 30)?
            .set_default("procurement.tax_rate", "0")?
            .add_source(File::with_name("config/stockflow").required(false))
            .add_source(
                Environment::with_prefix("STOCKFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: AppConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message(
                "database.min_connections exceeds database.max_connections".into(),
            ));
        }
        if self.procurement.tax_rate.is_sign_negative() {
            return Err(ConfigError::Message("procurement.tax_rate cannot be negative".into()));
        }
        self.procurement
            .approval
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/test".into(),
                max_connections: 5,
                min_connections: 1,
            },
            redis_url: None,
            cache: CacheConfig { ttl_secs: 10 },
            procurement: ProcurementConfig {
                tax_rate: dec!(0.16),
                approval: ApprovalMatrix::default(),
            },
            log_format: LogFormat::Json,
        }
    }

    #[test]
    fn sample_config_is_valid() {
        assert!(sample().validate().is_ok());
        assert_eq!(sample().cache.ttl(), Duration::from_secs(10));
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = sample();
        cfg.database.min_connections = 9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_tax_rate_is_rejected() {
        let mut cfg = sample();
        cfg.procurement.tax_rate = dec!(-0.01);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn approval_matrix_deserializes_from_toml() {
        let raw = r#"
            tax_rate = "0.10"

            [approval]
            default_role = "store_manager"

            [[approval.tiers]]
            level = 2
            role = "regional_director"
            urgencies = ["urgent"]
        "#;
        let cfg: ProcurementConfig = config::Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.tax_rate, dec!(0.10));
        assert_eq!(cfg.approval.default_role, "store_manager");
        assert_eq!(cfg.approval.tiers[0].level, 2);
        assert!(cfg.approval.tiers[0].min_total.is_none());
    }
}
