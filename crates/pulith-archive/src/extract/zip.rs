use std::io::{Read, Seek};

use super::{RawEntry, RawKind, entry_buffer, is_executable};
use crate::{Error, Result};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub(crate) fn read_entries<R: Read + Seek>(
    reader: R,
    mut visit: impl FnMut(RawEntry) -> Result<()>,
) -> Result<()> {
    let mut archive = zip::ZipArchive::new(reader).map_err(Error::corrupted)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(Error::corrupted)?;
        let path = file.name().as_bytes().to_vec();
        let mode = file.unix_mode();

        let kind = if file.is_dir() {
            RawKind::Directory
        } else {
            let mut contents = entry_buffer(file.size());
            file.read_to_end(&mut contents).map_err(Error::corrupted)?;
            match mode {
                Some(mode) if mode & S_IFMT == S_IFLNK => RawKind::Symlink { target: contents },
                Some(mode) => RawKind::File {
                    contents,
                    executable: is_executable(mode),
                },
                None => RawKind::File {
                    contents,
                    executable: false,
                },
            }
        };

        // DOS timestamps carry no zone, so they never feed last_modified.
        visit(RawEntry {
            path,
            kind,
            mtime: None,
        })?;
    }
    Ok(())
}
