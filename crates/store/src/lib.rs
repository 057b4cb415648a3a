//! Authenticated, transactional, path-keyed state store.
//!
//! Values live under a hierarchical path plus a key. The `state` column is
//! committed to by a SHA-256 merkle root; the `aux` column holds node
//! bookkeeping that is persisted but never hashed. At most one transaction is
//! open at a time and it is the only way to write while it is open.

pub mod error;
pub mod memory;
pub mod merkle;
pub mod path;
pub mod query;
#[cfg(feature = "sled")]
pub mod sled_store;
pub mod store;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use merkle::{Hash, Proof, ProofStep, ProvedEntry, EMPTY_ROOT};
pub use path::{decode_key, encode_key, encode_path, Path};
pub use query::{PathQuery, Query, QueryItem};
#[cfg(feature = "sled")]
pub use sled_store::SledBackend;
#[cfg(feature = "sled")]
pub use store::SledStore;
pub use store::{AuthenticatedStore, MemoryStore, StateStore, Transaction, TransactionArg};
pub use traits::{Backend, BatchOp, ColumnId, WriteBatch};
