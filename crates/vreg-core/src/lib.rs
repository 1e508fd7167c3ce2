//! # Vreg Core Library
//!
//! This crate provides the client-side search engine for vehicle
//! registration records: a locally mirrored copy of the remote record set,
//! a substring index over it, subsequence fallback matching, relevance
//! ranking, a result cache, and a debounced query controller.
//!
//! ## Architecture
//!
//! - **Source** (`source`): The `RecordSource` trait for the remote store
//! - **Sync** (`sync`): The authoritative mirror, refresh timer and writes
//! - **Fields** (`fields`): Searchable field table and normalization
//! - **Index** (`index`): Suffix trie built from one mirror snapshot
//! - **Fuzzy** (`fuzzy`): Subsequence matching when the index misses
//! - **Score** (`score`): Relevance scoring and stable ranking
//! - **Cache** (`cache`): Bounded, time-limited query result cache
//! - **Controller** (`controller`): Debounce, generation checks and view state
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vreg_core::{Config, JsonFileSource, SearchController, SyncManager};
//!
//! let config = Config::load()?;
//! let source = Arc::new(JsonFileSource::new(config.data_file()?));
//! let sync = Arc::new(SyncManager::new(source, config.sync.clone()));
//! let controller = SearchController::new(sync.clone(), config.search.clone(), &config.cache)?;
//!
//! controller.initialize()?;
//! sync.start()?;
//! for hit in controller.search_now("ABC-45")? {
//!     println!("{} {}", hit.record.plate, hit.score);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod fields;
pub mod fuzzy;
pub mod index;
pub mod score;
pub mod source;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, ResultCache};
pub use config::{CacheConfig, Config, GeneralConfig, SearchConfig, SyncConfig};
pub use controller::{SearchController, SearchEvent, SearchSnapshot};
pub use error::{Result, VregError};
pub use fields::{normalize, SearchField, SEARCHABLE_FIELDS};
pub use fuzzy::SubsequencePattern;
pub use index::{build_index, IndexStats, SearchIndex};
pub use score::{score, SearchHit};
pub use source::{JsonFileSource, MemorySource, RecordSource, TimeoutSource};
pub use sync::{RefreshOutcome, Subscription, SyncManager};
pub use types::{ApprovalStatus, Mirror, NewVehicleRecord, RecordId, RecordPatch, VehicleRecord};
