//! Validation of archive entry paths.
//!
//! Entries never touch the filesystem; a path is accepted only when it is a
//! plain relative path, and is turned into its list of name components.

use crate::{Error, Result};

/// Deepest entry path accepted. Trees are hashed and dropped recursively, so
/// depth must stay well inside a blocking worker's stack.
pub const MAX_PATH_DEPTH: usize = 1024;

/// Split a raw entry path into validated components.
///
/// `.` and empty segments are dropped. A `..` segment, a leading root, or a
/// Windows drive prefix is rejected as [`Error::UnsafePath`]; NUL bytes as
/// [`Error::InvalidPath`]. Backslashes count as separators so paths written
/// on Windows cannot smuggle a `..` through. Paths with more than
/// [`MAX_PATH_DEPTH`] components are rejected as [`Error::InvalidPath`].
pub fn split_entry_path(raw: &[u8]) -> Result<Vec<Vec<u8>>> {
    let display = || String::from_utf8_lossy(raw).into_owned();

    if raw.contains(&0) {
        return Err(Error::InvalidPath(display()));
    }
    if matches!(raw.first(), Some(b'/' | b'\\')) || has_drive_prefix(raw) {
        return Err(Error::UnsafePath(display()));
    }

    let mut components = Vec::new();
    for segment in raw.split(|&b| b == b'/' || b == b'\\') {
        match segment {
            b"" | b"." => {}
            b".." => return Err(Error::UnsafePath(display())),
            name => {
                if components.len() == MAX_PATH_DEPTH {
                    return Err(Error::InvalidPath(format!(
                        "{} (more than {MAX_PATH_DEPTH} components)",
                        truncated(raw)
                    )));
                }
                components.push(name.to_vec());
            }
        }
    }
    Ok(components)
}

fn has_drive_prefix(raw: &[u8]) -> bool {
    matches!(raw, [letter, b':', ..] if letter.is_ascii_alphabetic())
}

fn truncated(raw: &[u8]) -> String {
    const SHOWN: usize = 64;
    let shown = String::from_utf8_lossy(&raw[..raw.len().min(SHOWN)]).into_owned();
    if raw.len() > SHOWN {
        format!("{shown}...")
    } else {
        shown
    }
}

pub(crate) fn display_path(components: &[Vec<u8>]) -> String {
    String::from_utf8_lossy(&components.join(&b'/')).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(raw: &str) -> Result<Vec<String>> {
        split_entry_path(raw.as_bytes()).map(|parts| {
            parts
                .into_iter()
                .map(|p| String::from_utf8(p).unwrap())
                .collect()
        })
    }

    #[test]
    fn plain_paths_are_split() {
        assert_eq!(split("pkg-1.0/src/main.c").unwrap(), ["pkg-1.0", "src", "main.c"]);
        assert_eq!(split("./a//b/./c/").unwrap(), ["a", "b", "c"]);
        assert!(split("./").unwrap().is_empty());
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(matches!(split("../../etc/passwd"), Err(Error::UnsafePath(_))));
        assert!(matches!(split("a/../../b"), Err(Error::UnsafePath(_))));
        assert!(matches!(split("a\\..\\b"), Err(Error::UnsafePath(_))));
    }

    #[test]
    fn roots_and_prefixes_are_rejected() {
        assert!(matches!(split("/etc/passwd"), Err(Error::UnsafePath(_))));
        assert!(matches!(split("C:/Windows"), Err(Error::UnsafePath(_))));
        assert!(matches!(split("\\\\server\\share"), Err(Error::UnsafePath(_))));
    }

    #[test]
    fn nul_is_rejected() {
        assert!(matches!(
            split_entry_path(b"a\0b"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn depth_is_bounded() {
        let deepest = "d/".repeat(MAX_PATH_DEPTH - 1) + "f";
        assert_eq!(split(&deepest).unwrap().len(), MAX_PATH_DEPTH);

        let too_deep = "d/".repeat(MAX_PATH_DEPTH) + "f";
        assert!(matches!(split(&too_deep), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn dotted_names_are_not_traversal() {
        assert_eq!(split("a/..b/c..").unwrap(), ["a", "..b", "c.."]);
    }
}
