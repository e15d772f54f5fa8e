//! herdsman - replication orchestrator for herds of PostgreSQL instances
//!
//! A herd is one logical database served by one primary and any number of
//! streaming replicas spread over several hosts. herdsman starts, stops,
//! rebuilds, promotes and fails over herd members by running configurable
//! shell commands on those hosts.

pub mod cli;
pub mod config;
pub mod errors;
pub mod failover;
pub mod inventory;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod promotion;
pub mod rebuild;
pub mod remote;
pub mod templates;
pub mod topology;
