//! sentinel-provisioner
//!
//! Idempotent DynamoDB table creation for the three Sentinel stores.
//! `provision_tables` can run on every deploy: an existing table is a
//! success, a fresh one is created with the shared schema (partition key
//! `id`, three ALL-projection GSIs range-keyed by `created_at`, on-demand
//! billing, TTL on `expires_at`) and waited into ACTIVE.

pub mod error;
pub mod tables;

pub use crate::error::ProvisionerError;
pub use crate::tables::{provision_tables, sentinel_tables, ProvisionOutcome, TableSpec};
