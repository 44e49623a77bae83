//! Archive import into canonical in-memory trees.
//!
//! Archives are never extracted to disk. Each entry is validated (no `..`,
//! no absolute or drive-prefixed paths) and placed into a
//! [`pulith_verify::Tree`], whose hash is independent of compression, entry
//! order and timestamps.
//!
//! # Architecture
//!
//! - `format.rs` - Format sniffing and tar decompression
//! - `sanitize.rs` - Entry path validation
//! - `extract/` - Per-format entry readers
//! - `import.rs` - Root stripping, link resolution and tree building

pub use error::{Error, Result};
pub use format::{ArchiveFormat, Decoder, TarCompress, detect_format, detect_from_reader};
pub use import::{ImportedTree, import, import_with_options};
pub use options::ImportOptions;
pub use sanitize::{MAX_PATH_DEPTH, split_entry_path};

mod error;
mod extract;
mod format;
mod import;
mod options;
mod sanitize;
