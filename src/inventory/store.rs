//! Inventory collaborator
//!
//! The inventory owns every herd, server and instance record. Callers load
//! a fresh copy per operation and persist each state-changing step with an
//! explicit `save_instance`; nothing is cached across operations.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{InventoryError, InventoryResult};
use super::model::{Herd, HerdId, Instance, InstanceId, Placement, Server, ServerId};

/// Inventory trait.
///
/// Implementations must be shareable across the threads of a batch.
pub trait Inventory: Send + Sync {
    /// Load one herd.
    fn herd(&self, id: HerdId) -> InventoryResult<Herd>;

    /// Load one server.
    fn server(&self, id: ServerId) -> InventoryResult<Server>;

    /// Load one instance.
    fn instance(&self, id: InstanceId) -> InventoryResult<Instance>;

    /// Load every member of a herd, ordered by instance id.
    fn members(&self, herd: HerdId) -> InventoryResult<Vec<Instance>>;

    /// Persist one instance. Stamps the modification time.
    fn save_instance(&self, instance: &Instance) -> InventoryResult<()>;

    /// Hostname of the server an instance lives on.
    fn host_of(&self, instance: &Instance) -> InventoryResult<String> {
        Ok(self.server(instance.server_id)?.hostname)
    }

    /// Herd and host of an instance.
    fn placement_of(&self, instance: &Instance) -> InventoryResult<Placement> {
        Ok(Placement {
            herd: self.herd(instance.herd_id)?,
            host: self.host_of(instance)?,
        })
    }
}

/// Serialized form of a whole inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub herds: Vec<Herd>,
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Default)]
struct Tables {
    herds: BTreeMap<HerdId, Herd>,
    servers: BTreeMap<ServerId, Server>,
    instances: BTreeMap<InstanceId, Instance>,
}

impl Tables {
    fn from_document(doc: InventoryDocument) -> Self {
        Self {
            herds: doc.herds.into_iter().map(|h| (h.id, h)).collect(),
            servers: doc.servers.into_iter().map(|s| (s.id, s)).collect(),
            instances: doc.instances.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    fn to_document(&self) -> InventoryDocument {
        InventoryDocument {
            herds: self.herds.values().cloned().collect(),
            servers: self.servers.values().cloned().collect(),
            instances: self.instances.values().cloned().collect(),
        }
    }

    fn herd(&self, id: HerdId) -> InventoryResult<Herd> {
        self.herds
            .get(&id)
            .cloned()
            .ok_or(InventoryError::HerdNotFound(id))
    }

    fn server(&self, id: ServerId) -> InventoryResult<Server> {
        self.servers
            .get(&id)
            .cloned()
            .ok_or(InventoryError::ServerNotFound(id))
    }

    fn instance(&self, id: InstanceId) -> InventoryResult<Instance> {
        self.instances
            .get(&id)
            .cloned()
            .ok_or(InventoryError::InstanceNotFound(id))
    }

    fn members(&self, herd: HerdId) -> InventoryResult<Vec<Instance>> {
        if !self.herds.contains_key(&herd) {
            return Err(InventoryError::HerdNotFound(herd));
        }
        Ok(self
            .instances
            .values()
            .filter(|i| i.herd_id == herd)
            .cloned()
            .collect())
    }

    fn save(&mut self, instance: &Instance) {
        let mut stored = instance.clone();
        stored.modified_at = Some(Utc::now());
        self.instances.insert(stored.id, stored);
    }
}

/// In-memory inventory.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    tables: Mutex<Tables>,
}

impl MemoryInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inventory from a document.
    pub fn from_document(doc: InventoryDocument) -> Self {
        Self {
            tables: Mutex::new(Tables::from_document(doc)),
        }
    }

    /// Add or replace a herd.
    pub fn put_herd(&self, herd: Herd) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.herds.insert(herd.id, herd);
        }
    }

    /// Add or replace a server.
    pub fn put_server(&self, server: Server) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.servers.insert(server.id, server);
        }
    }

    /// Add or replace an instance without stamping it.
    pub fn put_instance(&self, instance: Instance) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.instances.insert(instance.id, instance);
        }
    }

    /// Snapshot the whole inventory.
    pub fn document(&self) -> InventoryResult<InventoryDocument> {
        Ok(self.lock()?.to_document())
    }

    fn lock(&self) -> InventoryResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| InventoryError::Poisoned)
    }
}

impl Inventory for MemoryInventory {
    fn herd(&self, id: HerdId) -> InventoryResult<Herd> {
        self.lock()?.herd(id)
    }

    fn server(&self, id: ServerId) -> InventoryResult<Server> {
        self.lock()?.server(id)
    }

    fn instance(&self, id: InstanceId) -> InventoryResult<Instance> {
        self.lock()?.instance(id)
    }

    fn members(&self, herd: HerdId) -> InventoryResult<Vec<Instance>> {
        self.lock()?.members(herd)
    }

    fn save_instance(&self, instance: &Instance) -> InventoryResult<()> {
        self.lock()?.save(instance);
        Ok(())
    }
}

/// Inventory stored as one JSON document on disk.
///
/// Every save rewrites the document through a temporary file and a rename,
/// so a crash mid-write never leaves a truncated inventory behind.
///
/// Several processes may share one document. A save holds an exclusive
/// advisory lock on `<document>.lock`, re-reads the document and replaces
/// only the saved instance.
#[derive(Debug)]
pub struct JsonInventory {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl JsonInventory {
    /// Open an existing inventory document.
    pub fn open(path: impl AsRef<Path>) -> InventoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = read_document(&path)?;

        Ok(Self {
            path,
            tables: Mutex::new(Tables::from_document(doc)),
        })
    }

    /// Path of the advisory lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot the whole inventory.
    pub fn document(&self) -> InventoryResult<InventoryDocument> {
        Ok(self.lock()?.to_document())
    }

    fn lock(&self) -> InventoryResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| InventoryError::Poisoned)
    }

    /// Block until no other process is saving. Released when dropped.
    fn lock_document(&self) -> InventoryResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        file.lock()?;
        Ok(file)
    }

    fn write_document(&self, doc: &InventoryDocument) -> InventoryResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, doc)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Inventory for JsonInventory {
    fn herd(&self, id: HerdId) -> InventoryResult<Herd> {
        self.lock()?.herd(id)
    }

    fn server(&self, id: ServerId) -> InventoryResult<Server> {
        self.lock()?.server(id)
    }

    fn instance(&self, id: InstanceId) -> InventoryResult<Instance> {
        self.lock()?.instance(id)
    }

    fn members(&self, herd: HerdId) -> InventoryResult<Vec<Instance>> {
        self.lock()?.members(herd)
    }

    fn save_instance(&self, instance: &Instance) -> InventoryResult<()> {
        let mut tables = self.lock()?;
        let _document_lock = self.lock_document()?;

        let mut latest = Tables::from_document(read_document(&self.path)?);
        latest.save(instance);
        self.write_document(&latest.to_document())?;
        *tables = latest;
        Ok(())
    }
}

fn read_document(path: &Path) -> InventoryResult<InventoryDocument> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> InventoryDocument {
        InventoryDocument {
            herds: vec![Herd {
                id: HerdId(1),
                name: "orders".into(),
                instance_name: "main".into(),
                port: 5433,
                pgdata: "/db/orders".into(),
                vhost: "orders-db".into(),
                environment: Some("prod".into()),
            }],
            servers: vec![Server {
                id: ServerId(10),
                hostname: "db-a".into(),
                environment: None,
            }],
            instances: vec![
                Instance::new(InstanceId(2), HerdId(1), ServerId(10)),
                Instance::new(InstanceId(1), HerdId(1), ServerId(10)),
            ],
        }
    }

    #[test]
    fn test_memory_members_ordered_by_id() {
        let inv = MemoryInventory::from_document(document());
        let ids: Vec<_> = inv.members(HerdId(1)).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![InstanceId(1), InstanceId(2)]);
    }

    #[test]
    fn test_memory_missing_records() {
        let inv = MemoryInventory::from_document(document());
        assert!(matches!(
            inv.instance(InstanceId(99)),
            Err(InventoryError::InstanceNotFound(InstanceId(99)))
        ));
        assert!(matches!(
            inv.members(HerdId(5)),
            Err(InventoryError::HerdNotFound(HerdId(5)))
        ));
    }

    #[test]
    fn test_save_stamps_modified_time() {
        let inv = MemoryInventory::from_document(document());
        let mut inst = inv.instance(InstanceId(1)).unwrap();
        assert!(inst.modified_at.is_none());

        inst.is_online = true;
        inv.save_instance(&inst).unwrap();

        let stored = inv.instance(InstanceId(1)).unwrap();
        assert!(stored.is_online);
        assert!(stored.modified_at.is_some());
    }

    #[test]
    fn test_host_of() {
        let inv = MemoryInventory::from_document(document());
        let inst = inv.instance(InstanceId(1)).unwrap();
        assert_eq!(inv.host_of(&inst).unwrap(), "db-a");
    }

    #[test]
    fn test_json_inventory_persists_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, serde_json::to_string(&document()).unwrap()).unwrap();

        let inv = JsonInventory::open(&path).unwrap();
        let mut inst = inv.instance(InstanceId(2)).unwrap();
        inst.master = Some(InstanceId(1));
        inv.save_instance(&inst).unwrap();

        let reopened = JsonInventory::open(&path).unwrap();
        let stored = reopened.instance(InstanceId(2)).unwrap();
        assert_eq!(stored.master, Some(InstanceId(1)));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_inventory_keeps_other_writers_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, serde_json::to_string(&document()).unwrap()).unwrap();

        let first = JsonInventory::open(&path).unwrap();
        let second = JsonInventory::open(&path).unwrap();

        let mut one = first.instance(InstanceId(1)).unwrap();
        one.is_online = true;
        first.save_instance(&one).unwrap();

        let mut two = second.instance(InstanceId(2)).unwrap();
        two.master = Some(InstanceId(1));
        second.save_instance(&two).unwrap();

        let reopened = JsonInventory::open(&path).unwrap();
        assert!(reopened.instance(InstanceId(1)).unwrap().is_online);
        assert_eq!(
            reopened.instance(InstanceId(2)).unwrap().master,
            Some(InstanceId(1))
        );
        // the second handle picked up the first one's save
        assert!(second.instance(InstanceId(1)).unwrap().is_online);
        assert!(second.lock_path().exists());
    }

    #[test]
    fn test_json_inventory_failed_write_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, serde_json::to_string(&document()).unwrap()).unwrap();
        let inv = JsonInventory::open(&path).unwrap();

        // a directory where the temporary file should go makes the write fail
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let mut inst = inv.instance(InstanceId(1)).unwrap();
        inst.is_online = true;

        assert!(matches!(inv.save_instance(&inst), Err(InventoryError::Io(_))));
        assert!(!inv.instance(InstanceId(1)).unwrap().is_online);
        let reopened = JsonInventory::open(&path).unwrap();
        assert!(!reopened.instance(InstanceId(1)).unwrap().is_online);
    }

    #[test]
    fn test_json_inventory_rejects_invalid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonInventory::open(&path),
            Err(InventoryError::Format(_))
        ));
    }
}
