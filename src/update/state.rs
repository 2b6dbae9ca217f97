use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VersionInfo;
use crate::storage::{load_json, store_json, KeyValueStore, StorageResult};

pub const DISMISSED_VERSIONS_KEY: &str = "update.dismissed_versions";
pub const CHECK_CACHE_KEY: &str = "update.cache";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCheck {
    pub last_check: DateTime<Utc>,
    pub info: VersionInfo,
}

/// Update state that outlives the process.
#[derive(Clone)]
pub struct UpdateStore {
    store: Arc<dyn KeyValueStore>,
}

impl UpdateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn dismissed(&self) -> StorageResult<BTreeSet<String>> {
        Ok(load_json(self.store.as_ref(), DISMISSED_VERSIONS_KEY)?.unwrap_or_default())
    }

    pub fn is_dismissed(&self, version: &str) -> StorageResult<bool> {
        Ok(self.dismissed()?.contains(version))
    }

    /// Read the whole set, add `version`, write the whole set back.
    pub fn dismiss(&self, version: &str) -> StorageResult<BTreeSet<String>> {
        let mut dismissed = self.dismissed()?;
        dismissed.insert(version.to_string());
        store_json(self.store.as_ref(), DISMISSED_VERSIONS_KEY, &dismissed)?;
        Ok(dismissed)
    }

    pub fn clear_dismissed(&self) -> StorageResult<()> {
        self.store.remove(DISMISSED_VERSIONS_KEY)
    }

    pub fn cached_check(&self) -> StorageResult<Option<CachedCheck>> {
        load_json(self.store.as_ref(), CHECK_CACHE_KEY)
    }

    pub fn store_check(&self, check: &CachedCheck) -> StorageResult<()> {
        store_json(self.store.as_ref(), CHECK_CACHE_KEY, check)
    }
}
