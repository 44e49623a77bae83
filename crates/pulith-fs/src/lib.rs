//! Atomic filesystem primitives.
//!
//! - [`atomic_write`] writes through a sibling temp file and renames it into
//!   place, so readers observe either the old or the new content.
//! - [`Workspace`] is a scratch directory that is always removed on drop;
//!   artifacts leave it only through [`Workspace::commit`].
//! - [`Transaction`] holds an exclusive advisory lock on a lock file.

mod error;
pub mod primitives;
pub mod workflow;

pub use error::{Error, Result};
pub use primitives::{AtomicWriteOptions, atomic_read, atomic_write};
pub use workflow::{Transaction, Workspace};
