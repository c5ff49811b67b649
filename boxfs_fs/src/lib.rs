//! # boxfs
//!
//! Path-addressed view over an ID-addressed [`RemoteStore`](boxfs_core::RemoteStore).
//!
//! ## Layers
//! 1. `cache`     – normalized path → `(kind, id)`, invalidated on mutation.
//! 2. `resolver`  – walks paths segment by segment through the cache and
//!    folder listings; creates missing folders on demand.
//! 3. `collision` – decides the effective name of a create or upload.
//! 4. `api`       – the `BoxFs` façade applications use.

mod api;
pub mod cache;
pub mod collision;
pub mod debug;
pub mod resolver;

pub use api::{BoxFs, Entry, FsConfig, FsError, FsResult, WriteOptions};
pub use cache::{CacheEntry, PathCache};
pub use collision::{CollisionResolver, Outcome, resolve_create_name};
pub use resolver::{PathResolver, Resolution};
