//! Content-addressed object storage.
//!
//! Every object is addressed by the SHA-256 of its bytes ([`ContentHash`]).
//! [`LocalStore`] keeps objects on disk and commits them atomically,
//! [`MemoryStore`] keeps them in process. Directory trees built with
//! [`pulith_verify::Tree`] are persisted with [`persist_tree`] and read back
//! through a lazy [`TreeAccessor`].

mod error;
mod local;
mod memory;
mod store;
mod tree;

pub use error::{Error, Result};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use pulith_verify::ContentHash;
pub use store::{ObjectReader, ObjectWriter, Store};
pub use tree::{TreeAccessor, Walk, WalkEntry, persist_tree};
