//! TagVault core: a SQLite-backed store for tagged images and videos.
//!
//! The store keeps media records, user tags, and tag types; computes
//! perceptual hashes for similarity search; and exposes the SQL surface
//! (scalar functions plus pseudo-tag expansions) an external query compiler
//! targets.

pub mod batch;
pub mod domain;
pub mod error;
pub mod hash;
pub mod pseudo;
pub mod query;
pub mod store;

pub use batch::{import_directory, rehash_all, BatchProgress};
pub use domain::{MediaChange, MediaRecord, NewTag, NewTagType, Tag, TagType};
pub use error::{Error, Result};
pub use hash::PerceptualHash;
pub use query::{ExpansionBudget, MediaPredicate};
pub use store::Store;
