//! IP address management over a prefix trie.
//!
//! An [`Engine`] keeps one [`AddressTrie`](trie::AddressTrie) per index and
//! resolves claims (static or dynamic addresses, prefixes and ranges)
//! against it, persisting entries and claim records through a
//! [`Storage`](storage::Storage) implementation.

pub mod applicator;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod handle_registry;
pub mod helpers;
pub mod instance;
pub mod public_api;
pub mod range;
pub mod selector;
pub mod storage;
pub mod telemetry;
pub mod trie;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use errors::{Error, ErrorCode, Result, StorageError};
pub use selector::{Operator, Selector};
pub use storage::{Context, MemoryStorage, Storage};
pub use types::*;

use once_cell::sync::OnceCell;

// ---- logging bootstraper -------------------------------------------------
pub(crate) fn ensure_logging() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        // Fallback: simple env_logger with RFC‑3339 ts off.
        let _ = env_logger::builder()
            .format_timestamp(None)
            .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
            .try_init();
    });
}
