//! Entity registry
//!
//! Maps an integration's stable `(domain, platform, unique_id)` to the
//! entity id it was given, and records which device and config entry the
//! entity belongs to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::slugify;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityEntry {
    pub id: String,
    pub entity_id: String,
    pub unique_id: String,
    pub platform: String,
    pub device_id: Option<String>,
    pub config_entry_id: Option<String>,
    /// User override of the friendly name
    #[serde(default)]
    pub name: Option<String>,
    pub original_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip)]
    order: u64,
}

impl EntityEntry {
    pub fn domain(&self) -> &str {
        self.entity_id.split_once('.').map_or("", |(d, _)| d)
    }

    pub fn object_id(&self) -> &str {
        self.entity_id.split_once('.').map_or("", |(_, o)| o)
    }
}

/// Registration request for [`EntityRegistry::get_or_create`]
#[derive(Debug, Clone, Default)]
pub struct EntityRegistration<'a> {
    pub domain: &'a str,
    pub platform: &'a str,
    pub unique_id: &'a str,
    /// Object id to try first; slugified
    pub suggested_object_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub config_entry_id: Option<&'a str>,
    pub original_name: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = "core.entity_registry";
    const VERSION: u32 = 1;
}

pub struct EntityRegistry {
    storage: Arc<Storage>,
    entities: DashMap<String, Arc<EntityEntry>>,
    by_unique_id: DashMap<(String, String, String), String>,
    order: AtomicU64,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entities: DashMap::new(),
            by_unique_id: DashMap::new(),
            order: AtomicU64::new(0),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(data) = self.storage.load::<EntityRegistryData>().await? else {
            return Ok(());
        };
        info!(count = data.entities.len(), "loading entities");
        let mut entities = data.entities;
        entities.sort_by_key(|e| e.created_at);
        for entity in entities {
            self.insert(entity);
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let entities = self.entities().into_iter().map(|e| (*e).clone()).collect();
        self.storage.save(&EntityRegistryData { entities }).await
    }

    fn insert(&self, mut entity: EntityEntry) -> Arc<EntityEntry> {
        entity.order = self.order.fetch_add(1, Ordering::Relaxed);
        self.store(entity)
    }

    fn store(&self, entity: EntityEntry) -> Arc<EntityEntry> {
        let entity = Arc::new(entity);
        self.by_unique_id.insert(
            (
                entity.domain().to_string(),
                entity.platform.clone(),
                entity.unique_id.clone(),
            ),
            entity.entity_id.clone(),
        );
        self.entities.insert(entity.entity_id.clone(), entity.clone());
        entity
    }

    /// Existing entry for the unique id, or a new one with a free entity id
    /// derived from the suggested object id (`_2`, `_3`, ... on collision).
    #[instrument(skip(self, registration), fields(platform = registration.platform, unique_id = registration.unique_id))]
    pub fn get_or_create(&self, registration: EntityRegistration<'_>) -> Arc<EntityEntry> {
        let key = (
            registration.domain.to_string(),
            registration.platform.to_string(),
            registration.unique_id.to_string(),
        );
        if let Some(existing) = self
            .by_unique_id
            .get(&key)
            .and_then(|id| self.get(id.value()))
        {
            let mut updated = (*existing).clone();
            let mut changed = false;
            if let Some(device_id) = registration.device_id {
                changed |= updated.device_id.as_deref() != Some(device_id);
                updated.device_id = Some(device_id.to_string());
            }
            if let Some(entry_id) = registration.config_entry_id {
                changed |= updated.config_entry_id.as_deref() != Some(entry_id);
                updated.config_entry_id = Some(entry_id.to_string());
            }
            if !changed {
                return existing;
            }
            updated.modified_at = Utc::now();
            return self.store(updated);
        }

        let base = slugify(
            registration
                .suggested_object_id
                .unwrap_or(registration.unique_id),
        );
        let entity_id = self.free_entity_id(registration.domain, &base);
        debug!(%entity_id, "registering entity");

        let now = Utc::now();
        self.insert(EntityEntry {
            id: Uuid::new_v4().simple().to_string(),
            entity_id,
            unique_id: registration.unique_id.to_string(),
            platform: registration.platform.to_string(),
            device_id: registration.device_id.map(String::from),
            config_entry_id: registration.config_entry_id.map(String::from),
            name: None,
            original_name: registration.original_name.map(String::from),
            created_at: now,
            modified_at: now,
            order: 0,
        })
    }

    fn free_entity_id(&self, domain: &str, base: &str) -> String {
        let candidate = format!("{domain}.{base}");
        if !self.entities.contains_key(&candidate) {
            return candidate;
        }
        (2..)
            .map(|n| format!("{domain}.{base}_{n}"))
            .find(|id| !self.entities.contains_key(id))
            .unwrap_or(candidate)
    }

    /// Register an entity under a fixed entity id. Used for entities other
    /// integrations publish directly, such as those of a linked device.
    pub fn register_existing(
        &self,
        entity_id: &str,
        platform: &str,
        unique_id: &str,
        device_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        if let Some(existing) = self.get(entity_id) {
            return existing;
        }
        let now = Utc::now();
        self.insert(EntityEntry {
            id: Uuid::new_v4().simple().to_string(),
            entity_id: entity_id.to_string(),
            unique_id: unique_id.to_string(),
            platform: platform.to_string(),
            device_id: device_id.map(String::from),
            config_entry_id: None,
            name: None,
            original_name: None,
            created_at: now,
            modified_at: now,
            order: 0,
        })
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.entities.get(entity_id).map(|e| e.clone())
    }

    pub fn get_entity_id(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.by_unique_id
            .get(&(domain.to_string(), platform.to_string(), unique_id.to_string()))
            .map(|id| id.clone())
    }

    /// Entities in registration order
    pub fn entities(&self) -> Vec<Arc<EntityEntry>> {
        let mut entities: Vec<_> = self.entities.iter().map(|e| e.value().clone()).collect();
        entities.sort_by_key(|e| e.order);
        entities
    }

    /// Entities of one device, in registration order
    pub fn entities_for_device(&self, device_id: &str) -> Vec<Arc<EntityEntry>> {
        self.entities()
            .into_iter()
            .filter(|e| e.device_id.as_deref() == Some(device_id))
            .collect()
    }

    pub fn entities_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.entities()
            .into_iter()
            .filter(|e| e.config_entry_id.as_deref() == Some(config_entry_id))
            .collect()
    }

    pub fn update<F>(&self, entity_id: &str, f: F) -> Option<Arc<EntityEntry>>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let mut entity = (*self.get(entity_id)?).clone();
        f(&mut entity);
        entity.modified_at = Utc::now();
        Some(self.store(entity))
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let (_, entity) = self.entities.remove(entity_id)?;
        self.by_unique_id.remove(&(
            entity.domain().to_string(),
            entity.platform.clone(),
            entity.unique_id.clone(),
        ));
        Some(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
