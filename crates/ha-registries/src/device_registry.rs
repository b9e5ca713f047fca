//! Device registry
//!
//! A device groups the entities of one physical (or virtual) appliance and
//! is addressed by one or more `(domain, id)` identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::storage::{Storable, Storage, StorageResult};

/// `(domain, id)`; serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    /// True if either half equals `value`
    pub fn contains(&self, value: &str) -> bool {
        self.0 == value || self.1 == value
    }

    fn key(&self) -> String {
        format!("{}\u{1f}{}", self.0, self.1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,
    #[serde(default)]
    pub config_entries: Vec<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub name_by_user: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip)]
    order: u64,
}

impl DeviceEntry {
    /// `name_by_user`, then `name`
    pub fn display_name(&self) -> Option<&str> {
        self.name_by_user.as_deref().or(self.name.as_deref())
    }

    pub fn has_identifiers(&self) -> bool {
        !self.identifiers.is_empty()
    }
}

/// What an integration knows about a device it wants registered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<DeviceIdentifier>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = "core.device_registry";
    const VERSION: u32 = 1;
}

pub struct DeviceRegistry {
    storage: Arc<Storage>,
    devices: DashMap<String, Arc<DeviceEntry>>,
    by_identifier: DashMap<String, String>,
    order: AtomicU64,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            devices: DashMap::new(),
            by_identifier: DashMap::new(),
            order: AtomicU64::new(0),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(data) = self.storage.load::<DeviceRegistryData>().await? else {
            return Ok(());
        };
        info!(count = data.devices.len(), "loading devices");
        let mut devices = data.devices;
        devices.sort_by_key(|d| d.created_at);
        for device in devices {
            self.insert(device);
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let devices = self.devices().into_iter().map(|d| (*d).clone()).collect();
        self.storage.save(&DeviceRegistryData { devices }).await
    }

    fn insert(&self, mut device: DeviceEntry) -> Arc<DeviceEntry> {
        device.order = self.order.fetch_add(1, Ordering::Relaxed);
        self.store(device)
    }

    fn store(&self, device: DeviceEntry) -> Arc<DeviceEntry> {
        let device = Arc::new(device);
        for identifier in &device.identifiers {
            self.by_identifier.insert(identifier.key(), device.id.clone());
        }
        self.devices.insert(device.id.clone(), device.clone());
        device
    }

    /// Find the device matching any of `info.identifiers` and refresh its
    /// metadata, or register a new one. `config_entry_id` is linked either way.
    #[instrument(skip(self, info), fields(name = ?info.name))]
    pub fn get_or_create(&self, info: DeviceInfo, config_entry_id: Option<&str>) -> Arc<DeviceEntry> {
        let existing = info
            .identifiers
            .iter()
            .find_map(|i| self.by_identifier.get(&i.key()).map(|id| id.clone()))
            .and_then(|id| self.get(&id));
        let now = Utc::now();
        let is_new = existing.is_none();

        let mut device = match existing {
            Some(current) => (*current).clone(),
            None => {
                debug!("registering new device");
                DeviceEntry {
                    id: Uuid::new_v4().simple().to_string(),
                    identifiers: Vec::new(),
                    config_entries: Vec::new(),
                    name: None,
                    name_by_user: None,
                    manufacturer: None,
                    model: None,
                    sw_version: None,
                    created_at: now,
                    modified_at: now,
                    order: 0,
                }
            }
        };

        for identifier in info.identifiers {
            if !device.identifiers.contains(&identifier) {
                device.identifiers.push(identifier);
            }
        }
        if let Some(entry_id) = config_entry_id {
            if !device.config_entries.iter().any(|e| e == entry_id) {
                device.config_entries.push(entry_id.to_string());
            }
        }
        device.name = info.name.or(device.name);
        device.manufacturer = info.manufacturer.or(device.manufacturer);
        device.model = info.model.or(device.model);
        device.sw_version = info.sw_version.or(device.sw_version);
        device.modified_at = now;

        if is_new {
            self.insert(device)
        } else {
            self.store(device)
        }
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices.get(device_id).map(|d| d.clone())
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let key = DeviceIdentifier::new(domain, id).key();
        let device_id = self.by_identifier.get(&key)?.clone();
        self.get(&device_id)
    }

    /// First device (in registration order) with an identifier half equal
    /// to `value`.
    pub fn find_by_identifier_value(&self, value: &str) -> Option<Arc<DeviceEntry>> {
        self.devices()
            .into_iter()
            .find(|d| d.identifiers.iter().any(|i| i.contains(value)))
    }

    /// All devices in registration order
    pub fn devices(&self) -> Vec<Arc<DeviceEntry>> {
        let mut devices: Vec<_> = self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by_key(|d| d.order);
        devices
    }

    /// Detach `config_entry_id`; devices left without entries are removed.
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        for device in self.devices() {
            if !device.config_entries.iter().any(|e| e == config_entry_id) {
                continue;
            }
            let mut updated = (*device).clone();
            updated.config_entries.retain(|e| e != config_entry_id);
            if updated.config_entries.is_empty() {
                self.remove(&device.id);
            } else {
                self.store(updated);
            }
        }
    }

    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let (_, device) = self.devices.remove(device_id)?;
        for identifier in &device.identifiers {
            self.by_identifier.remove(&identifier.key());
        }
        Some(device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(Storage::new(dir.path())))
    }

    fn cast_device() -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![DeviceIdentifier::new("mqtt", "ccast_player_ent_1")],
            name: Some("Living Room Cast".into()),
            manufacturer: Some("Yan".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_or_create_reuses_device() {
        let dir = TempDir::new().unwrap();
        let devices = registry(&dir);

        let first = devices.get_or_create(cast_device(), Some("entry1"));
        let mut update = cast_device();
        update.sw_version = Some("1.2".into());
        let second = devices.get_or_create(update, Some("entry2"));

        assert_eq!(first.id, second.id);
        assert_eq!(devices.len(), 1);
        assert_eq!(second.sw_version.as_deref(), Some("1.2"));
        assert_eq!(second.manufacturer.as_deref(), Some("Yan"));
        assert_eq!(second.config_entries, vec!["entry1", "entry2"]);
    }

    #[test]
    fn test_lookup_by_identifier() {
        let dir = TempDir::new().unwrap();
        let devices = registry(&dir);
        let created = devices.get_or_create(cast_device(), None);

        assert_eq!(
            devices.get_by_identifier("mqtt", "ccast_player_ent_1").unwrap().id,
            created.id
        );
        assert!(devices.get_by_identifier("mqtt", "other").is_none());
        assert_eq!(
            devices.find_by_identifier_value("ccast_player_ent_1").unwrap().id,
            created.id
        );
        assert_eq!(devices.find_by_identifier_value("mqtt").unwrap().id, created.id);
        assert!(devices.find_by_identifier_value("ccast").is_none());
    }

    #[test]
    fn test_devices_keep_registration_order() {
        let dir = TempDir::new().unwrap();
        let devices = registry(&dir);
        for n in 0..5 {
            devices.get_or_create(
                DeviceInfo {
                    identifiers: vec![DeviceIdentifier::new("mqtt", format!("dev{n}"))],
                    name: Some(format!("Device {n}")),
                    ..Default::default()
                },
                None,
            );
        }
        devices.get_or_create(
            DeviceInfo {
                identifiers: vec![DeviceIdentifier::new("mqtt", "dev0")],
                sw_version: Some("2".into()),
                ..Default::default()
            },
            None,
        );

        let names: Vec<_> = devices
            .devices()
            .iter()
            .map(|d| d.display_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Device 0", "Device 1", "Device 2", "Device 3", "Device 4"]);
    }

    #[test]
    fn test_clear_config_entry_removes_orphans() {
        let dir = TempDir::new().unwrap();
        let devices = registry(&dir);
        let device = devices.get_or_create(cast_device(), Some("entry1"));

        devices.clear_config_entry("entry1");
        assert!(devices.get(&device.id).is_none());
        assert!(devices.get_by_identifier("mqtt", "ccast_player_ent_1").is_none());
    }

    #[tokio::test]
    async fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let devices = registry(&dir);
        let created = devices.get_or_create(cast_device(), Some("entry1"));
        devices.save().await.unwrap();

        let reloaded = registry(&dir);
        reloaded.load().await.unwrap();
        let device = reloaded.get(&created.id).unwrap();
        assert_eq!(device.name.as_deref(), Some("Living Room Cast"));
        assert_eq!(device.identifiers, vec![DeviceIdentifier::new("mqtt", "ccast_player_ent_1")]);
    }
}
