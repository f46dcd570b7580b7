//! Foundation types for idvault.
//!
//! This crate provides the addressing scheme and the entity records shared by
//! every other idvault crate.
//!
//! # Key Types
//!
//! - [`HashedKey`] / [`KeyHasher`]: case-insensitive SHA-1 storage address for a logical key
//! - [`Entity`]: implemented by every record persisted through a repository
//! - [`Client`], [`ApiResource`], [`ApiScope`], [`IdentityResource`]: configuration records
//! - [`PersistedGrant`], [`GrantFilter`]: grant records and their query predicate
//! - [`DeviceFlowCode`], [`SigningKeyRecord`]: device authorization and key material records

pub mod client;
pub mod device;
pub mod entity;
pub mod error;
pub mod grant;
pub mod hashed_key;
pub mod resource;
pub mod secret;
pub mod signing;
pub mod validation;

pub use client::Client;
pub use device::DeviceFlowCode;
pub use entity::{Entity, EntityKind};
pub use error::ValidationError;
pub use grant::{GrantFilter, PersistedGrant};
pub use hashed_key::{HashedKey, KeyHasher, HASHED_KEY_LEN};
pub use resource::{ApiResource, ApiScope, IdentityResource};
pub use secret::Secret;
pub use signing::SigningKeyRecord;
