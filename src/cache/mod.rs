//! Install cache
//!
//! Content-addressed snapshots of what an install produced, keyed by the
//! package's pre-install state. Entries are immutable once published.
//!
//! # Entry kinds
//!
//! | Kind | Keyed by | Contents |
//! |------|----------|----------|
//! | dependencies | declared dependencies | the whole dependency tree |
//! | changes | package files (size only) | paths the install created or changed |

pub mod copy;
pub mod key;
pub mod store;

pub use copy::{create_copier, BulkCopy, CommandCopier, CopyBackend, NativeCopier};
pub use key::{EntryKind, InstallCacheKey};
pub use store::{CacheEntry, CacheStore, StoreOutcome};
