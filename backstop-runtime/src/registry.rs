//! Limiters addressed by bucket name
//!
//! Callers usually know which API they are about to hit, not which handle to use. The
//! registry spawns one actor per configured bucket and routes by name.

use crate::actor::{LimiterHandle, RateLimiterActor};
use crate::config::{LimiterConfig, Settings};
use crate::error::{ConfigError, LimiterError};
use crate::types::StateSnapshot;
use backstop::ResponseEnvelope;
use http::HeaderMap;
use std::time::Duration;

#[cfg(feature = "ahash")]
type HandleMap = ahash::AHashMap<String, LimiterHandle>;
#[cfg(not(feature = "ahash"))]
type HandleMap = std::collections::HashMap<String, LimiterHandle>;

/// One limiter actor per bucket name
///
/// Cloning is cheap and every clone talks to the same actors.
///
/// # Example
///
/// ```
/// use backstop_runtime::{LimiterConfig, LimiterRegistry};
///
/// # tokio_test::block_on(async {
/// let registry = LimiterRegistry::start(vec![
///     LimiterConfig::new("github").bucket_size(5000),
///     LimiterConfig::new("slack"),
/// ])
/// .unwrap();
///
/// registry.acquire("github", None).await.unwrap();
/// let state = registry.get_state("github").await.unwrap();
/// assert_eq!(state.tokens, 4999);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct LimiterRegistry {
    limiters: HandleMap,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a limiter for every config
    ///
    /// # Errors
    ///
    /// Fails on the first invalid config or duplicate name; limiters spawned before the
    /// failure are shut down.
    pub fn start(configs: impl IntoIterator<Item = LimiterConfig>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for config in configs {
            if let Err(e) = registry.register(config) {
                registry.shutdown();
                return Err(e);
            }
        }
        Ok(registry)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::start(settings.limiters.iter().cloned())
    }

    /// Spawn and add one limiter
    pub fn register(&mut self, config: LimiterConfig) -> Result<LimiterHandle, ConfigError> {
        if self.limiters.contains_key(&config.name) {
            return Err(ConfigError::DuplicateName(config.name));
        }

        let handle = RateLimiterActor::spawn(config)?;
        self.limiters
            .insert(handle.name().to_string(), handle.clone());
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<&LimiterHandle> {
        self.limiters.get(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limiters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    pub async fn acquire(&self, name: &str, timeout: Option<Duration>) -> Result<(), LimiterError> {
        self.handle(name)?.acquire(timeout).await
    }

    pub fn update_from_response(
        &self,
        name: &str,
        envelope: &ResponseEnvelope,
    ) -> Result<(), LimiterError> {
        self.handle(name)?.update_from_response(envelope);
        Ok(())
    }

    pub fn update_from_headers(&self, name: &str, headers: &HeaderMap) -> Result<(), LimiterError> {
        self.handle(name)?.update_from_headers(headers);
        Ok(())
    }

    pub async fn get_state(&self, name: &str) -> Result<StateSnapshot, LimiterError> {
        self.handle(name)?.get_state().await
    }

    /// Stop every limiter
    pub fn shutdown(&self) {
        for handle in self.limiters.values() {
            handle.shutdown();
        }
    }

    fn handle(&self, name: &str) -> Result<&LimiterHandle, LimiterError> {
        self.limiters
            .get(name)
            .ok_or_else(|| LimiterError::UnknownLimiter {
                name: name.to_string(),
            })
    }
}
