//! Cadence Storage
//!
//! Persistence backends for the playback session's key/value contract.
//!
//! - [`MemoryStore`]: process-local, for tests and ephemeral sessions
//! - [`SqliteStore`]: a single upserted `kv` table in SQLite
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_core::KeyValueStore;
//! use cadence_storage::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::connect("sqlite://cadence.db").await?;
//! store.write("playback.session", b"{}").await?;
//! assert!(store.read("playback.session").await?.is_some());
//! # Ok(())
//! # }
//! ```

mod error;
pub mod memory;
pub mod sqlite;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
