use std::io::Read;

use tar::EntryType;

use super::{RawEntry, RawKind, entry_buffer, is_executable};
use crate::{Error, Result};

pub(crate) fn read_entries<R: Read>(
    reader: R,
    mut visit: impl FnMut(RawEntry) -> Result<()>,
) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(Error::corrupted)? {
        let mut entry = entry.map_err(Error::corrupted)?;
        let path = entry.path_bytes().into_owned();
        let header = entry.header();
        let entry_type = header.entry_type();
        let mtime = header.mtime().ok();
        let mode = header.mode().unwrap_or(0o644);
        let declared = entry.size();

        let kind = match entry_type {
            EntryType::Regular | EntryType::Continuous => {
                let mut contents = entry_buffer(declared);
                entry.read_to_end(&mut contents).map_err(Error::corrupted)?;
                if (contents.len() as u64) < declared {
                    return Err(Error::Corrupted(format!(
                        "entry '{}' is truncated",
                        String::from_utf8_lossy(&path)
                    )));
                }
                RawKind::File {
                    contents,
                    executable: is_executable(mode),
                }
            }
            EntryType::Directory => RawKind::Directory,
            EntryType::Symlink | EntryType::Link => {
                let target = entry
                    .link_name_bytes()
                    .map(|t| t.into_owned())
                    .ok_or_else(|| {
                        Error::Corrupted(format!(
                            "link '{}' has no target",
                            String::from_utf8_lossy(&path)
                        ))
                    })?;
                if entry_type == EntryType::Symlink {
                    RawKind::Symlink { target }
                } else {
                    RawKind::HardLink { target }
                }
            }
            EntryType::XGlobalHeader | EntryType::XHeader => RawKind::Metadata,
            other => {
                return Err(Error::UnsupportedEntry {
                    path: String::from_utf8_lossy(&path).into_owned(),
                    kind: format!("{other:?}"),
                });
            }
        };

        visit(RawEntry { path, kind, mtime })?;
    }
    Ok(())
}
