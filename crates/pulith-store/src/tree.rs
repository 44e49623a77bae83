//! Persisting [`Tree`]s and reading them back lazily.

use std::fmt;
use std::sync::Arc;

use pulith_verify::{ContentHash, Mode, Tree, TreeEntry, decode_directory};

use crate::store::{ObjectReader, Store};
use crate::{Error, Result};

/// Write every blob and directory object of `tree` into `store` and return
/// the root hash. Objects already present are skipped.
pub fn persist_tree(store: &dyn Store, tree: &Tree) -> Result<ContentHash> {
    tree.objects(&mut |_, hash, bytes| {
        if !store.contains(&hash) {
            store.put(None, bytes)?;
        }
        Ok::<(), Error>(())
    })
}

/// Read-only, path-indexed view of a tree stored in a [`Store`].
///
/// Directory objects are loaded on demand; nothing is cached between calls.
#[derive(Clone)]
pub struct TreeAccessor {
    store: Arc<dyn Store>,
    root: ContentHash,
}

impl fmt::Debug for TreeAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeAccessor").field("root", &self.root).finish()
    }
}

impl PartialEq for TreeAccessor {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl TreeAccessor {
    pub fn new(store: Arc<dyn Store>, root: ContentHash) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> ContentHash {
        self.root
    }

    /// Resolve `path` (slash separated, relative to the root). The empty path
    /// resolves to the root directory. Symlinks are not followed.
    pub fn lookup(&self, path: impl AsRef<[u8]>) -> Result<Option<TreeEntry>> {
        let mut current = TreeEntry {
            mode: Mode::Directory,
            name: Vec::new(),
            hash: self.root,
        };
        for component in components(path.as_ref()) {
            if current.mode != Mode::Directory {
                return Ok(None);
            }
            let entries = self.load_dir(&current.hash)?;
            match entries.into_iter().find(|e| e.name == component) {
                Some(entry) => current = entry,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub fn read_dir(&self, path: impl AsRef<[u8]>) -> Result<Vec<TreeEntry>> {
        let entry = self.resolve_kind(path.as_ref(), "directory", |m| m == Mode::Directory)?;
        self.load_dir(&entry.hash)
    }

    pub fn read_file(&self, path: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let entry = self.resolve_kind(path.as_ref(), "file", is_file)?;
        self.store.get(&entry.hash)
    }

    pub fn open_file(&self, path: impl AsRef<[u8]>) -> Result<Box<dyn ObjectReader>> {
        let entry = self.resolve_kind(path.as_ref(), "file", is_file)?;
        self.store.open(&entry.hash)
    }

    /// Target of a symlink, verbatim.
    pub fn read_link(&self, path: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let entry = self.resolve_kind(path.as_ref(), "symlink", |m| m == Mode::Symlink)?;
        self.store.get(&entry.hash)
    }

    /// Depth-first walk over every entry below the root.
    pub fn walk(&self) -> Walk {
        Walk {
            accessor: self.clone(),
            stack: Vec::new(),
            started: false,
        }
    }

    fn resolve_kind(
        &self,
        path: &[u8],
        expected: &'static str,
        ok: fn(Mode) -> bool,
    ) -> Result<TreeEntry> {
        let display = || String::from_utf8_lossy(path).into_owned();
        match self.lookup(path)? {
            Some(entry) if ok(entry.mode) => Ok(entry),
            Some(_) => Err(Error::WrongKind {
                path: display(),
                expected,
            }),
            None => Err(Error::NotFound(display())),
        }
    }

    fn load_dir(&self, hash: &ContentHash) -> Result<Vec<TreeEntry>> {
        let bytes = self.store.get(hash)?;
        Ok(decode_directory(&bytes)?)
    }
}

fn is_file(mode: Mode) -> bool {
    matches!(mode, Mode::File | Mode::Executable)
}

fn components(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|&b| b == b'/')
        .filter(|c| !c.is_empty() && *c != b".")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkEntry {
    /// Slash separated path relative to the root.
    pub path: Vec<u8>,
    pub mode: Mode,
    pub hash: ContentHash,
}

/// Lazy pre-order traversal returned by [`TreeAccessor::walk`].
///
/// The walk is finite and may be rewound with [`Walk::restart`]; it only reads
/// from the store.
pub struct Walk {
    accessor: TreeAccessor,
    stack: Vec<(Vec<u8>, std::vec::IntoIter<TreeEntry>)>,
    started: bool,
}

impl Walk {
    pub fn restart(&mut self) {
        self.stack.clear();
        self.started = false;
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            match self.accessor.load_dir(&self.accessor.root) {
                Ok(entries) => self.stack.push((Vec::new(), entries.into_iter())),
                Err(e) => return Some(Err(e)),
            }
        }

        loop {
            let next = {
                let (prefix, entries) = self.stack.last_mut()?;
                entries.next().map(|entry| {
                    let mut path = prefix.clone();
                    if !path.is_empty() {
                        path.push(b'/');
                    }
                    path.extend_from_slice(&entry.name);
                    (path, entry)
                })
            };

            let Some((path, entry)) = next else {
                self.stack.pop();
                continue;
            };

            if entry.mode == Mode::Directory {
                match self.accessor.load_dir(&entry.hash) {
                    Ok(children) => self.stack.push((path.clone(), children.into_iter())),
                    Err(e) => return Some(Err(e)),
                }
            }
            return Some(Ok(WalkEntry {
                path,
                mode: entry.mode,
                hash: entry.hash,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use pulith_verify::Node;

    fn stored() -> (Arc<MemoryStore>, TreeAccessor, Tree) {
        let mut tree = Tree::new();
        tree.insert(&["README"], Node::file("read me", false)).unwrap();
        tree.insert(&["bin", "tool"], Node::file("#!/bin/sh", true)).unwrap();
        tree.insert(&["src", "lib", "a.rs"], Node::file("fn a() {}", false)).unwrap();
        tree.insert(&["latest"], Node::symlink("bin/tool")).unwrap();
        tree.insert(&["empty"], Node::directory()).unwrap();

        let store = Arc::new(MemoryStore::new());
        let root = persist_tree(store.as_ref(), &tree).unwrap();
        let accessor = TreeAccessor::new(store.clone(), root);
        (store, accessor, tree)
    }

    #[test]
    fn persisted_root_is_tree_hash() {
        let (_, accessor, tree) = stored();
        assert_eq!(accessor.root(), tree.hash());
    }

    #[test]
    fn reads_files_links_and_dirs() {
        let (_, accessor, _) = stored();
        assert_eq!(accessor.read_file("src/lib/a.rs").unwrap(), b"fn a() {}");
        assert_eq!(accessor.read_file("/README").unwrap(), b"read me");
        assert_eq!(accessor.read_link("latest").unwrap(), b"bin/tool");
        assert_eq!(accessor.lookup("bin/tool").unwrap().unwrap().mode, Mode::Executable);

        let names: Vec<_> = accessor
            .read_dir("")
            .unwrap()
            .into_iter()
            .map(|e| String::from_utf8(e.name).unwrap())
            .collect();
        assert_eq!(names, ["README", "bin", "empty", "latest", "src"]);
        assert!(accessor.read_dir("empty").unwrap().is_empty());
    }

    #[test]
    fn wrong_kind_and_missing_paths() {
        let (_, accessor, _) = stored();
        assert!(matches!(accessor.read_file("src"), Err(Error::WrongKind { .. })));
        assert!(matches!(accessor.read_link("README"), Err(Error::WrongKind { .. })));
        assert!(matches!(accessor.read_file("nope"), Err(Error::NotFound(_))));
        assert!(accessor.lookup("README/inner").unwrap().is_none());
        assert!(accessor.lookup("latest/tool").unwrap().is_none());
    }

    #[test]
    fn walk_visits_everything_and_restarts() {
        let (_, accessor, _) = stored();
        let mut walk = accessor.walk();
        let paths: Vec<_> = walk
            .by_ref()
            .map(|e| String::from_utf8(e.unwrap().path).unwrap())
            .collect();
        assert_eq!(
            paths,
            [
                "README",
                "bin",
                "bin/tool",
                "empty",
                "latest",
                "src",
                "src/lib",
                "src/lib/a.rs"
            ]
        );
        assert!(walk.next().is_none());

        walk.restart();
        assert_eq!(walk.count(), paths.len());
    }

    #[test]
    fn walk_reports_missing_objects() {
        let (store, accessor, _) = stored();
        let src = accessor.lookup("src").unwrap().unwrap();
        store.remove(&src.hash);
        assert!(accessor.walk().any(|e| e.is_err()));
    }
}
