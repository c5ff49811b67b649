//! Core boxfs types and traits.
//!
//! This crate defines what every other boxfs crate agrees on:
//!
//! - The remote object model (`node::RemoteNode`, `node::NodeKind`). Remote
//!   objects are addressed by opaque IDs, never by path.
//! - Path normalization and splitting (`path`), which fixes the spelling of
//!   every key the path cache stores.
//! - The collision policy enum (`collision::CollisionStrategy`).
//! - The error taxonomy (`store::StoreError`) and the `RemoteStore` trait that
//!   concrete backends implement (`boxfs_store_box`, `boxfs_store_memory`).
//!
//! Resolution, caching and the filesystem facade live in `boxfs_fs`;
//! credentials live in `boxfs_auth`.

pub mod collision;
pub mod node;
pub mod path;
pub mod store;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use collision::CollisionStrategy;
pub use node::{NodeKind, RemoteNode};
pub use path::ResolvedPath;
pub use store::{
    ByteStream, RemoteStore, SearchQuery, SharedLinkAccess, SharedLinkOptions, StoreError,
    StoreResult,
};
