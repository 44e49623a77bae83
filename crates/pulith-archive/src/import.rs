use std::io::{Read, Seek};

use chrono::{DateTime, Utc};
use pulith_verify::{Node, Tree};
use tracing::debug;

use crate::extract::{RawEntry, RawKind};
use crate::format::{ArchiveFormat, detect_from_reader};
use crate::options::ImportOptions;
use crate::sanitize::{display_path, split_entry_path};
use crate::{Error, Result};

/// An archive read into memory as a canonical tree.
#[derive(Clone, Debug)]
pub struct ImportedTree {
    pub tree: Tree,
    /// Latest entry modification time, when the format records one.
    pub last_modified: Option<DateTime<Utc>>,
    pub format: ArchiveFormat,
    pub entry_count: usize,
}

/// Import an archive using default options. `hint` is a file name or URL
/// consulted only when the leading bytes do not identify the format.
pub fn import<R: Read + Seek>(reader: R, hint: Option<&str>) -> Result<ImportedTree> {
    let options = ImportOptions {
        hint: hint.map(str::to_owned),
        ..ImportOptions::default()
    };
    import_with_options(reader, &options)
}

pub fn import_with_options<R: Read + Seek>(
    mut reader: R,
    options: &ImportOptions,
) -> Result<ImportedTree> {
    let format = match options.format {
        Some(format) => format,
        None => detect_from_reader(&mut reader)?
            .or_else(|| options.hint.as_deref().and_then(ArchiveFormat::from_name))
            .ok_or_else(|| Error::UnsupportedFormat(options.hint.clone()))?,
    };

    let mut entries = Vec::new();
    let mut collect = |raw: RawEntry| -> Result<()> {
        if matches!(raw.kind, RawKind::Metadata) {
            return Ok(());
        }
        entries.push(Entry {
            components: split_entry_path(&raw.path)?,
            kind: raw.kind,
            mtime: raw.mtime,
        });
        Ok(())
    };

    match format {
        ArchiveFormat::Tar(compress) => {
            crate::extract::tar::read_entries(compress.decoder(reader)?, &mut collect)?
        }
        #[cfg(feature = "zip")]
        ArchiveFormat::Zip => crate::extract::zip::read_entries(reader, &mut collect)?,
        #[cfg(not(feature = "zip"))]
        ArchiveFormat::Zip => {
            return Err(Error::UnsupportedFormat(Some(
                "zip support not compiled in".into(),
            )));
        }
    }

    let root = if options.strip_common_root {
        common_root(&entries)
    } else {
        None
    };
    let entry_count = entries.len();
    let (tree, newest) = build_tree(entries, root.as_deref())?;

    let last_modified = newest
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    debug!(
        ?format,
        entry_count,
        stripped = root.is_some(),
        "imported archive"
    );
    Ok(ImportedTree {
        tree,
        last_modified,
        format,
        entry_count,
    })
}

struct Entry {
    components: Vec<Vec<u8>>,
    kind: RawKind,
    mtime: Option<u64>,
}

/// The top-level name shared by every entry, provided it is a directory.
fn common_root(entries: &[Entry]) -> Option<Vec<u8>> {
    let root = entries.iter().find_map(|e| e.components.first())?;
    let shared = entries.iter().all(|e| match e.components.as_slice() {
        [] => matches!(e.kind, RawKind::Directory),
        [only] => only == root && matches!(e.kind, RawKind::Directory),
        [head, ..] => head == root,
    });
    shared.then(|| root.clone())
}

fn strip_root(mut components: Vec<Vec<u8>>, root: Option<&[u8]>) -> Vec<Vec<u8>> {
    if let Some(root) = root {
        if components.first().map(Vec::as_slice) == Some(root) {
            components.remove(0);
        }
    }
    components
}

fn build_tree(entries: Vec<Entry>, root: Option<&[u8]>) -> Result<(Tree, Option<u64>)> {
    let mut tree = Tree::new();
    let mut newest: Option<u64> = None;

    for entry in entries {
        if let Some(mtime) = entry.mtime {
            newest = Some(newest.map_or(mtime, |n| n.max(mtime)));
        }

        let path = strip_root(entry.components, root);
        let node = match entry.kind {
            RawKind::File {
                contents,
                executable,
            } => Node::File {
                contents,
                executable,
            },
            RawKind::Directory => Node::directory(),
            RawKind::Symlink { target } => Node::Symlink { target },
            RawKind::HardLink { target } => {
                let target_path = strip_root(split_entry_path(&target)?, root);
                match tree.get(target_path.as_slice()) {
                    Some(node @ (Node::File { .. } | Node::Symlink { .. })) => node.clone(),
                    _ => {
                        return Err(Error::MissingLinkTarget {
                            path: display_path(&path),
                            target: String::from_utf8_lossy(&target).into_owned(),
                        });
                    }
                }
            }
            RawKind::Metadata => continue,
        };

        tree.insert(path.as_slice(), node)
            .map_err(|_| Error::InvalidPath(display_path(&path)))?;
    }

    Ok((tree, newest))
}
