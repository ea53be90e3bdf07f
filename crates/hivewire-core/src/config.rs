//! Runtime configuration.
//!
//! A single immutable snapshot built once at startup (environment-derived,
//! optionally seeded from a TOML file by the CLI) and threaded through every
//! component at construction. Nothing reads the environment after startup.

use crate::{HivewireError, HivewireResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which backing the secret provider uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum SecretsProviderKind {
    Env {
        #[serde(default)]
        prefix: String,
    },
    ExternalKv {
        prefix: String,
    },
}

impl Default for SecretsProviderKind {
    fn default() -> Self {
        SecretsProviderKind::Env {
            prefix: String::new(),
        }
    }
}

/// Immutable runtime configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub max_daily_spend_usdc: f64,
    pub max_per_tx_usdc: f64,
    pub high_confidence: f64,
    pub medium_confidence: f64,
    pub max_attempts: u32,
    pub worker_lease_sec: u64,
    pub judge_lease_sec: u64,
    pub perception_poll_sec: u64,
    pub perception_threshold: f64,
    pub perception_dedup_ttl_hours: u64,
    /// Review-queue depth past which workers back off.
    pub review_high_water_mark: usize,
    /// Grace period for in-flight work on shutdown.
    pub shutdown_grace_sec: u64,
    pub sensitive_topics: Vec<String>,
    pub trend_words: Vec<String>,
    pub commerce_words: Vec<String>,
    pub secrets_provider: SecretsProviderKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_daily_spend_usdc: 50.0,
            max_per_tx_usdc: 10.0,
            high_confidence: 0.90,
            medium_confidence: 0.70,
            max_attempts: 3,
            worker_lease_sec: 30,
            judge_lease_sec: 60,
            perception_poll_sec: 10,
            perception_threshold: 0.75,
            perception_dedup_ttl_hours: 24,
            review_high_water_mark: 1000,
            shutdown_grace_sec: 10,
            sensitive_topics: ["politics", "health", "financial", "legal", "religion"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trend_words: ["trend", "trends", "trending", "viral", "buzz"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            commerce_words: ["buy", "purchase", "transfer", "payment", "pay", "usdc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            secrets_provider: SecretsProviderKind::default(),
        }
    }
}

impl Config {
    /// Build a snapshot from the process environment, falling back to the
    /// documented defaults. Malformed values are fatal configuration errors.
    pub fn from_env() -> HivewireResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Testable core of [`Config::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> HivewireResult<Self> {
        let mut config = Config::default();

        parse_into(vars, "MAX_DAILY_SPEND_USDC", &mut config.max_daily_spend_usdc)?;
        parse_into(vars, "MAX_PER_TX_USDC", &mut config.max_per_tx_usdc)?;
        parse_into(vars, "HIGH_CONFIDENCE", &mut config.high_confidence)?;
        parse_into(vars, "MEDIUM_CONFIDENCE", &mut config.medium_confidence)?;
        parse_into(vars, "MAX_ATTEMPTS", &mut config.max_attempts)?;
        parse_into(vars, "WORKER_LEASE_SEC", &mut config.worker_lease_sec)?;
        parse_into(vars, "JUDGE_LEASE_SEC", &mut config.judge_lease_sec)?;
        parse_into(vars, "PERCEPTION_POLL_SEC", &mut config.perception_poll_sec)?;
        parse_into(vars, "PERCEPTION_THRESHOLD", &mut config.perception_threshold)?;
        parse_into(
            vars,
            "PERCEPTION_DEDUP_TTL_HOURS",
            &mut config.perception_dedup_ttl_hours,
        )?;
        parse_into(vars, "REVIEW_HIGH_WATER_MARK", &mut config.review_high_water_mark)?;
        parse_into(vars, "SHUTDOWN_GRACE_SEC", &mut config.shutdown_grace_sec)?;

        if let Some(list) = vars.get("SENSITIVE_TOPICS") {
            config.sensitive_topics = split_csv(list);
        }
        if let Some(list) = vars.get("TREND_WORDS") {
            config.trend_words = split_csv(list);
        }
        if let Some(list) = vars.get("COMMERCE_WORDS") {
            config.commerce_words = split_csv(list);
        }

        config.secrets_provider = match vars.get("SECRETS_PROVIDER").map(|s| s.trim()) {
            None | Some("") | Some("env") => SecretsProviderKind::Env {
                prefix: vars
                    .get("SECRETS_ENV_PREFIX")
                    .cloned()
                    .unwrap_or_default(),
            },
            Some("external-kv") => {
                let prefix = vars
                    .get("SECRETS_KV_PREFIX")
                    .cloned()
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| {
                        HivewireError::Config(
                            "SECRETS_PROVIDER=external-kv requires SECRETS_KV_PREFIX".to_string(),
                        )
                    })?;
                SecretsProviderKind::ExternalKv { prefix }
            }
            Some(other) => {
                return Err(HivewireError::Config(format!(
                    "unknown SECRETS_PROVIDER '{other}' (expected env or external-kv)"
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HivewireResult<()> {
        if !(0.0..=1.0).contains(&self.high_confidence)
            || !(0.0..=1.0).contains(&self.medium_confidence)
        {
            return Err(HivewireError::Config(
                "confidence thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if self.medium_confidence > self.high_confidence {
            return Err(HivewireError::Config(
                "MEDIUM_CONFIDENCE must not exceed HIGH_CONFIDENCE".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.perception_threshold) || self.perception_threshold == 0.0 {
            return Err(HivewireError::Config(
                "PERCEPTION_THRESHOLD must lie in (0, 1]".to_string(),
            ));
        }
        if self.max_per_tx_usdc <= 0.0 || self.max_daily_spend_usdc <= 0.0 {
            return Err(HivewireError::Config(
                "budget caps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_into<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    target: &mut T,
) -> HivewireResult<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = vars.get(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| HivewireError::Config(format!("invalid {name}='{raw}': {e}")))?;
    }
    Ok(())
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
