//! Store operations for cairn.
//!
//! The store is the content-addressed storage for all build outputs. An entry
//! at `obj/<address>` only counts as present once its completion marker has
//! been written; anything without a marker is a partial build and is cleared
//! before the address is built again.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── obj/                    # Build outputs (immutable once sealed)
//! │   └── <address>/
//! │       └── .cairn-complete
//! ├── src/                    # Imported local sources
//! │   └── <hash>-<name>
//! ├── log/                    # Builder stdout/stderr
//! │   └── <address>.log
//! ├── tmp/                    # Per-build scratch space
//! │   └── <address>/
//! └── locks/                  # One advisory lock per address
//!     └── <address>.lock
//! ```

mod content;
pub mod lock;
mod types;

pub use content::ContentStore;
pub use lock::{AddressLock, LockError};
pub use types::{EntryMarker, StoreEntry, StoreError};
