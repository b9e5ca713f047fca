//! Config entry manager
//!
//! Owns every [`ConfigEntry`], persists them under `core.config_entries`
//! and drives their lifecycle through the [`IntegrationHandler`] registered
//! for each domain.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use ha_registries::{Registries, Storable, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};

pub const STORAGE_KEY: &str = "core.config_entries";

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("unload failed: {0}")]
    UnloadFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] ha_registries::StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = 1;
}

/// Per-domain setup and teardown of config entries
#[async_trait]
pub trait IntegrationHandler: Send + Sync {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), String>;

    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), String>;
}

pub type UpdateListener = Arc<dyn Fn(ConfigEntry) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateListenerId(u64);

pub struct ConfigEntries {
    storage: Arc<Storage>,
    /// Devices and entities detached when an entry is removed
    registries: Option<Arc<Registries>>,
    entries: DashMap<String, ConfigEntry>,
    by_unique_id: DashMap<(String, String), String>,
    handlers: DashMap<String, Arc<dyn IntegrationHandler>>,
    update_listeners: DashMap<String, Vec<(UpdateListenerId, UpdateListener)>>,
    next_listener: AtomicU64,
    setup_lock: Mutex<()>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            registries: None,
            entries: DashMap::new(),
            by_unique_id: DashMap::new(),
            handlers: DashMap::new(),
            update_listeners: DashMap::new(),
            next_listener: AtomicU64::new(1),
            setup_lock: Mutex::new(()),
        }
    }

    /// Persist alongside `registries` and clean them up on entry removal
    pub fn with_registries(registries: Arc<Registries>) -> Self {
        let mut entries = Self::new(registries.storage.clone());
        entries.registries = Some(registries);
        entries
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<ConfigEntriesData>().await? {
            info!(count = data.entries.len(), "loading config entries");
            for entry in data.entries {
                self.index(entry);
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let mut entries: Vec<ConfigEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.created_at);
        self.storage.save(&ConfigEntriesData { entries }).await?;
        debug!(count = self.entries.len(), "saved config entries");
        Ok(())
    }

    fn index(&self, entry: ConfigEntry) {
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry.entry_id.clone());
        }
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn unindex(&self, entry: &ConfigEntry) {
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|e| e.value().clone())
    }

    /// Entries of `domain`, oldest first
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.domain == domain)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        let entry_id = self
            .by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))?
            .clone();
        self.get(&entry_id)
    }

    /// Add and persist; a `(domain, unique_id)` pair may only exist once.
    #[instrument(skip(self, entry), fields(domain = %entry.domain, title = %entry.title))]
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(unique_id) = &entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }
        self.index(entry.clone());
        self.save().await?;
        info!(entry_id = %entry.entry_id, "added config entry");
        Ok(entry)
    }

    /// Apply `update`, persist, then run the entry's update listeners.
    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
            if let Some(title) = update.title {
                entry.title = title;
            }
            if let Some(data) = update.data {
                entry.data = data;
            }
            if let Some(options) = update.options {
                entry.options = options;
            }
            entry.modified_at = Utc::now();
            entry.clone()
        };
        self.save().await?;
        debug!("updated config entry");

        let listeners: Vec<UpdateListener> = self
            .update_listeners
            .get(entry_id)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(updated.clone()).await;
        }
        Ok(updated)
    }

    /// Unload if needed, then delete the entry.
    #[instrument(skip(self))]
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if entry.is_loaded() {
            self.unload(entry_id).await?;
        }
        self.unindex(&entry);
        self.update_listeners.remove(entry_id);
        self.save().await?;
        if let Some(registries) = &self.registries {
            registries.devices.clear_config_entry(entry_id);
            for entity in registries.entities.entities_for_config_entry(entry_id) {
                registries.entities.remove(&entity.entity_id);
            }
            if let Err(err) = registries.save_all().await {
                warn!(%err, "failed to persist registries");
            }
        }
        info!("removed config entry");
        Ok(entry)
    }

    fn set_state(&self, entry_id: &str, state: ConfigEntryState, reason: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            entry.state = state;
            entry.reason = reason;
        }
    }

    pub fn register_handler(&self, domain: impl Into<String>, handler: Arc<dyn IntegrationHandler>) {
        let domain = domain.into();
        debug!(%domain, "registered integration handler");
        self.handlers.insert(domain, handler);
    }

    pub fn has_handler(&self, domain: &str) -> bool {
        self.handlers.contains_key(domain)
    }

    /// Run `listener` after each [`update`](Self::update) of `entry_id`.
    /// Listeners are dropped when the entry is unloaded.
    pub fn add_update_listener<F, Fut>(&self, entry_id: &str, listener: F) -> UpdateListenerId
    where
        F: Fn(ConfigEntry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = UpdateListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let listener: UpdateListener = Arc::new(move |entry| Box::pin(listener(entry)));
        self.update_listeners
            .entry(entry_id.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove_update_listener(&self, entry_id: &str, id: UpdateListenerId) {
        if let Some(mut listeners) = self.update_listeners.get_mut(entry_id) {
            listeners.retain(|(lid, _)| *lid != id);
        }
    }

    /// `not_loaded → setup_in_progress → loaded | setup_error`
    #[instrument(skip(self))]
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if entry.is_loaded() {
            debug!("entry already loaded");
            return Ok(());
        }

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None);
        let handler = self.handlers.get(&entry.domain).map(|h| h.clone());
        let Some(handler) = handler else {
            warn!(domain = %entry.domain, "no integration handler registered");
            let reason = format!("integration {} not found", entry.domain);
            self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()));
            return Err(ConfigEntriesError::SetupFailed(reason));
        };

        match handler.setup_entry(&entry).await {
            Ok(()) => {
                self.set_state(entry_id, ConfigEntryState::Loaded, None);
                info!(title = %entry.title, "config entry loaded");
                Ok(())
            }
            Err(reason) => {
                warn!(%reason, "config entry setup failed");
                self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()));
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if !entry.is_loaded() {
            self.set_state(entry_id, ConfigEntryState::NotLoaded, None);
            return Ok(());
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None);
        let handler = self.handlers.get(&entry.domain).map(|h| h.clone());
        if let Some(handler) = handler {
            if let Err(reason) = handler.unload_entry(&entry).await {
                self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()));
                return Err(ConfigEntriesError::UnloadFailed(reason));
            }
        }
        self.update_listeners.remove(entry_id);
        self.set_state(entry_id, ConfigEntryState::NotLoaded, None);
        info!(title = %entry.title, "config entry unloaded");
        Ok(())
    }

    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    /// Set up every stored entry whose domain has a handler. Failures are
    /// logged and returned but do not stop the remaining entries.
    pub async fn setup_all(&self) -> Vec<(String, ConfigEntriesResult<()>)> {
        let domains: HashSet<String> = self.handlers.iter().map(|h| h.key().clone()).collect();
        let mut entries: Vec<ConfigEntry> = self
            .entries
            .iter()
            .filter(|e| domains.contains(&e.domain))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self.setup(&entry.entry_id).await;
            results.push((entry.entry_id, result));
        }
        results
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
