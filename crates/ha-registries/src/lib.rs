//! Persistent registries
//!
//! - [`DeviceRegistry`]: devices and their `(domain, id)` identifiers
//! - [`EntityRegistry`]: entity ids keyed by integration unique id
//!
//! Both persist as versioned JSON under `<config>/.storage/`.

pub mod device_registry;
pub mod entity_registry;
pub mod storage;

pub use device_registry::{DeviceEntry, DeviceIdentifier, DeviceInfo, DeviceRegistry};
pub use entity_registry::{EntityEntry, EntityRegistration, EntityRegistry};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

use std::path::Path;
use std::sync::Arc;

pub struct Registries {
    pub storage: Arc<Storage>,
    pub devices: DeviceRegistry,
    pub entities: EntityRegistry,
}

impl Registries {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));
        Self {
            devices: DeviceRegistry::new(storage.clone()),
            entities: EntityRegistry::new(storage.clone()),
            storage,
        }
    }

    pub async fn load_all(&self) -> StorageResult<()> {
        self.devices.load().await?;
        self.entities.load().await
    }

    pub async fn save_all(&self) -> StorageResult<()> {
        self.devices.save().await?;
        self.entities.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_registries_roundtrip_through_storage() {
        let dir = TempDir::new().unwrap();
        let registries = Registries::new(dir.path());
        let device = registries.devices.get_or_create(
            DeviceInfo {
                identifiers: vec![DeviceIdentifier::new("ccplayer", "entry1")],
                name: Some("CC Player".into()),
                ..Default::default()
            },
            Some("entry1"),
        );
        registries.entities.get_or_create(EntityRegistration {
            domain: "media_player",
            platform: "ccplayer",
            unique_id: "entry1",
            suggested_object_id: Some("CC Player"),
            device_id: Some(&device.id),
            config_entry_id: Some("entry1"),
            original_name: Some("CC Player"),
        });
        registries.save_all().await.unwrap();

        let loaded = Registries::new(dir.path());
        loaded.load_all().await.unwrap();
        assert_eq!(loaded.devices.len(), 1);
        assert_eq!(
            loaded.entities.entities_for_device(&device.id)[0].entity_id,
            "media_player.cc_player"
        );
    }
}
