//! Secret retrieval.
//!
//! Keys are never hard-coded and never logged. Two providers exist: one
//! backed by the process environment (default, works everywhere) and one
//! backed by an external key/value store under a configured prefix. The
//! commerce adapter depends on the interface, not an implementation.

use async_trait::async_trait;
use hivewire_core::{HivewireError, HivewireResult, SecretsProviderKind};
use hivewire_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get(&self, name: &str) -> HivewireResult<Option<String>>;

    /// Like [`get`](Self::get), but missing or empty values are errors.
    async fn get_required(&self, name: &str) -> HivewireResult<String> {
        match self.get(name).await? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(HivewireError::SecretNotFound(name.to_string())),
        }
    }
}

/// Reads secrets from the process environment, optionally under a prefix.
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get(&self, name: &str) -> HivewireResult<Option<String>> {
        let key = format!("{}{}", self.prefix, name);
        Ok(std::env::var(&key).ok())
    }
}

/// Reads secrets from an external key/value store under a required prefix.
/// Values are stored as plain JSON strings.
pub struct StoreKvSecretProvider {
    store: Arc<dyn Store>,
    prefix: String,
}

impl StoreKvSecretProvider {
    pub fn new(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl SecretProvider for StoreKvSecretProvider {
    async fn get(&self, name: &str) -> HivewireResult<Option<String>> {
        let key = format!("{}{}", self.prefix, name);
        Ok(self
            .store
            .get(&key)
            .await?
            .and_then(|v| v.value.as_str().map(str::to_string)))
    }
}

/// Read-through cache in front of any provider. The provider surface is
/// read-only, so entries live for a fixed TTL (5 minutes in production).
pub struct CachedSecretProvider {
    inner: Arc<dyn SecretProvider>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Option<String>, Instant)>>,
}

impl CachedSecretProvider {
    pub fn new(inner: Arc<dyn SecretProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SecretProvider for CachedSecretProvider {
    async fn get(&self, name: &str) -> HivewireResult<Option<String>> {
        {
            let cache = self.cache.lock().await;
            if let Some((value, cached_at)) = cache.get(name) {
                if cached_at.elapsed() < self.ttl {
                    return Ok(value.clone());
                }
            }
        }
        let value = self.inner.get(name).await?;
        self.cache
            .lock()
            .await
            .insert(name.to_string(), (value.clone(), Instant::now()));
        Ok(value)
    }
}

/// Wire a provider from configuration, wrapped in the per-process cache.
pub fn provider_from_config(
    kind: &SecretsProviderKind,
    store: Arc<dyn Store>,
) -> Arc<dyn SecretProvider> {
    let inner: Arc<dyn SecretProvider> = match kind {
        SecretsProviderKind::Env { prefix } => Arc::new(EnvSecretProvider::new(prefix.clone())),
        SecretsProviderKind::ExternalKv { prefix } => {
            Arc::new(StoreKvSecretProvider::new(store, prefix.clone()))
        }
    };
    Arc::new(CachedSecretProvider::new(inner, Duration::from_secs(300)))
}
