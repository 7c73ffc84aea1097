//! Tiered job persistence.
//!
//! One record per job, replicated across three tiers so the process can be
//! replaced at any point without losing progress:
//!
//! 1. **Fast**: in-process map, always consulted first.
//! 2. **Durable**: remote key-value service, write-through with read-back
//!    verification; optional.
//! 3. **Fallback**: local SQLite file, written only while the durable tier
//!    is unavailable (or absent).
//!
//! All mutation goes through [`TieredJobStore::update`], a serialized
//! read-modify-write, so concurrent completion callbacks can never lose a
//! counter increment.

mod memory;
mod remote;
mod sqlite;
mod tiered;
mod types;

pub use memory::MemoryTier;
pub use remote::RemoteKvTier;
pub use sqlite::SqliteTier;
pub use tiered::TieredJobStore;
pub use types::{JobTier, StoreError};
