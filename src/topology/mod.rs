//! Topology Resolver
//!
//! Answers "who is the primary of this herd" from inventory records alone.
//! The answer is advisory: it reflects what the inventory says, not what the
//! hosts are doing.

mod resolver;

pub use resolver::{designated_secondary, herd_health, replicas_of, resolve_primary, HerdHealth};
