//! Infrastructure layer module
//!
//! Table stores (Supabase / in-memory), the local key/value store, error
//! collection with metrics, and vault cryptography.

pub mod database;
pub mod monitoring;
pub mod security;
pub mod storage;

pub use database::{InMemoryStore, Query, SupabaseStore, Table, TableStore};
pub use monitoring::ErrorCollector;
pub use security::VaultCipher;
pub use storage::LocalStore;
