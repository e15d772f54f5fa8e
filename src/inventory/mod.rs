//! Inventory Subsystem
//!
//! Herds, servers and instances are owned by an external inventory. This
//! module defines the records, the `Inventory` collaborator trait and two
//! implementations: an in-memory store and a JSON document on disk.
//!
//! Invariant: among the members of a consistent herd exactly one has no
//! `master`. Zero or several is an inconsistency that callers can detect
//! through the topology resolver; it is never a crash condition.

mod errors;
mod lsn;
mod model;
mod store;

pub use errors::{InventoryError, InventoryResult};
pub use lsn::{Lsn, LsnParseError};
pub use model::{DrPair, Herd, HerdId, Instance, InstanceId, Placement, Server, ServerId};
pub use store::{Inventory, InventoryDocument, JsonInventory, MemoryInventory};
