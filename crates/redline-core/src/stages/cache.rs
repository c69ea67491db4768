//! Styled rationale cache keyed by rationale and style

use crate::config::RedlineConfig;
use crate::context::{StyleParams, StyledRationale};
use moka::future::Cache;
use std::time::Duration;

type Key = (String, StyleParams);

/// Bounded, expiring cache of style transformations
///
/// A hit for the same rationale under the same style skips the stylist.
#[derive(Debug, Clone)]
pub struct TransformationCache {
    inner: Cache<Key, StyledRationale>,
}

impl TransformationCache {
    /// Create with `capacity` entries, each living for `ttl`
    #[inline]
    #[must_use]
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Create with capacity and TTL from `config`
    #[must_use]
    pub fn from_config(config: &RedlineConfig) -> Self {
        Self::new(
            config.transformation_cache_capacity,
            config.transformation_cache_ttl(),
        )
    }

    /// Cached transformation of `rationale_id` under `style`
    pub async fn get(&self, rationale_id: &str, style: &StyleParams) -> Option<StyledRationale> {
        self.inner
            .get(&(rationale_id.to_string(), style.clone()))
            .await
    }

    /// Store a transformation under its rationale id and style
    pub async fn insert(&self, styled: StyledRationale) {
        let key = (styled.rationale_id.clone(), styled.style.clone());
        self.inner.insert(key, styled).await;
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for TransformationCache {
    fn default() -> Self {
        Self::from_config(&RedlineConfig::default())
    }
}
