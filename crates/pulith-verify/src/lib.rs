//! Content verification primitives.
//!
//! Provides incremental SHA-256 hashing, a streaming verifying reader, the
//! [`ContentHash`] identifier used as a store handle, and the canonical
//! [`Tree`] hash that summarizes a whole directory tree.
//!
//! # Example
//!
//! ```
//! use std::io::Read;
//! use pulith_verify::{ContentHash, Sha256Hasher, VerifiedReader};
//!
//! let data = b"hello world";
//! let expected = ContentHash::of(data);
//!
//! let mut reader = VerifiedReader::new(&data[..], Sha256Hasher::new());
//! let mut buffer = Vec::new();
//! reader.read_to_end(&mut buffer).unwrap();
//!
//! reader.finish(&expected).unwrap();
//! ```

pub use self::error::{Result, VerificationError};
pub use self::hash::ContentHash;
pub use self::hasher::{Hasher, Sha256Hasher};
pub use self::reader::VerifiedReader;
pub use self::tree::{Mode, Node, ObjectKind, Tree, TreeEntry, decode_directory, encode_directory};

mod error;
mod hash;
mod hasher;
mod reader;
pub mod tree;
