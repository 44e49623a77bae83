//! Canonical, content-only hashing of directory trees.
//!
//! A directory is encoded as the concatenation of its entries, ordered by the
//! raw bytes of their names, each written as
//!
//! ```text
//! <mode in ASCII octal> SP <name> NUL <32-byte SHA-256 of the entry>
//! ```
//!
//! A file entry hashes its bytes, a symlink hashes its target, and a
//! subdirectory contributes its own tree hash. The SHA-256 of the encoding is
//! the directory's hash. Nothing else (timestamps, ownership, source order)
//! takes part.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::{ContentHash, Result, VerificationError};

/// Entry mode recorded in a directory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    File,
    Executable,
    Symlink,
    Directory,
}

impl Mode {
    pub const fn bits(self) -> u32 {
        match self {
            Mode::File => 0o100644,
            Mode::Executable => 0o100755,
            Mode::Symlink => 0o120000,
            Mode::Directory => 0o040000,
        }
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Mode::File),
            0o100755 => Some(Mode::Executable),
            0o120000 => Some(Mode::Symlink),
            0o040000 => Some(Mode::Directory),
            _ => None,
        }
    }
}

/// One decoded entry of a directory object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: Mode,
    pub name: Vec<u8>,
    pub hash: ContentHash,
}

/// Kind of object emitted by [`Tree::objects`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// File contents or a symlink target.
    Blob,
    /// An encoded directory.
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    File { contents: Vec<u8>, executable: bool },
    Symlink { target: Vec<u8> },
    Directory(Tree),
}

impl Node {
    pub fn file(contents: impl Into<Vec<u8>>, executable: bool) -> Self {
        Node::File {
            contents: contents.into(),
            executable,
        }
    }

    pub fn symlink(target: impl Into<Vec<u8>>) -> Self {
        Node::Symlink {
            target: target.into(),
        }
    }

    pub fn directory() -> Self {
        Node::Directory(Tree::new())
    }

    pub fn mode(&self) -> Mode {
        match self {
            Node::File { executable: true, .. } => Mode::Executable,
            Node::File { .. } => Mode::File,
            Node::Symlink { .. } => Mode::Symlink,
            Node::Directory(_) => Mode::Directory,
        }
    }
}

/// In-memory directory keyed by raw name bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<Vec<u8>, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct entries in canonical (byte-wise) name order.
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], &Node)> {
        self.entries.iter().map(|(name, node)| (name.as_slice(), node))
    }

    pub fn get<C: AsRef<[u8]>>(&self, path: &[C]) -> Option<&Node> {
        let (last, parents) = path.split_last()?;
        let mut dir = self;
        for component in parents {
            match dir.entries.get(component.as_ref())? {
                Node::Directory(child) => dir = child,
                _ => return None,
            }
        }
        dir.entries.get(last.as_ref())
    }

    /// Insert `node` at `path`, overwriting whatever is there.
    ///
    /// Non-directories found along the way are replaced by directories. A
    /// directory inserted over an existing directory keeps its children.
    /// Inserting a directory at the empty path is a no-op.
    pub fn insert<C: AsRef<[u8]>>(&mut self, path: &[C], node: Node) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return match node {
                Node::Directory(_) => Ok(()),
                _ => Err(VerificationError::InvalidTreePath(
                    "non-directory at tree root".into(),
                )),
            };
        };

        let mut dir = self;
        for component in parents {
            let name = checked_name(component.as_ref())?;
            let slot = dir.entries.entry(name.to_vec()).or_insert_with(Node::directory);
            if !matches!(slot, Node::Directory(_)) {
                *slot = Node::directory();
            }
            dir = match slot {
                Node::Directory(child) => child,
                _ => unreachable!("slot was just made a directory"),
            };
        }

        let name = checked_name(last.as_ref())?;
        match dir.entries.entry(name.to_vec()) {
            Entry::Occupied(mut existing) => {
                let keep = matches!(
                    (existing.get(), &node),
                    (Node::Directory(_), Node::Directory(_))
                );
                if !keep {
                    existing.insert(node);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(node);
            }
        }
        Ok(())
    }

    /// The canonical hash of this tree.
    pub fn hash(&self) -> ContentHash {
        match self.objects(&mut |_, _, _| Ok::<(), std::convert::Infallible>(())) {
            Ok(hash) => hash,
            Err(never) => match never {},
        }
    }

    /// Emit every object of the tree bottom-up (children before the directory
    /// that references them) and return the root hash.
    pub fn objects<E>(
        &self,
        sink: &mut impl FnMut(ObjectKind, ContentHash, &[u8]) -> std::result::Result<(), E>,
    ) -> std::result::Result<ContentHash, E> {
        let mut records = Vec::with_capacity(self.entries.len());
        for (name, node) in &self.entries {
            let hash = match node {
                Node::File { contents, .. } => {
                    let hash = ContentHash::of(contents);
                    sink(ObjectKind::Blob, hash, contents)?;
                    hash
                }
                Node::Symlink { target } => {
                    let hash = ContentHash::of(target);
                    sink(ObjectKind::Blob, hash, target)?;
                    hash
                }
                Node::Directory(child) => child.objects(sink)?,
            };
            records.push(TreeEntry {
                mode: node.mode(),
                name: name.clone(),
                hash,
            });
        }

        let encoded = encode_directory(&records);
        let hash = ContentHash::of(&encoded);
        sink(ObjectKind::Directory, hash, &encoded)?;
        Ok(hash)
    }
}

fn checked_name(name: &[u8]) -> Result<&[u8]> {
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') || name.contains(&0)
    {
        return Err(VerificationError::InvalidTreePath(
            String::from_utf8_lossy(name).into_owned(),
        ));
    }
    Ok(name)
}

/// Encode directory entries. `entries` must already be in name order.
pub fn encode_directory(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 48);
    for entry in entries {
        out.extend_from_slice(format!("{:o}", entry.mode.bits()).as_bytes());
        out.push(b' ');
        out.extend_from_slice(&entry.name);
        out.push(0);
        out.extend_from_slice(entry.hash.as_bytes());
    }
    out
}

pub fn decode_directory(mut bytes: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    while !bytes.is_empty() {
        let space = bytes
            .iter()
            .position(|&b| b == b' ')
            .ok_or(VerificationError::MalformedTree("missing mode separator"))?;
        let mode = std::str::from_utf8(&bytes[..space])
            .ok()
            .and_then(|s| u32::from_str_radix(s, 8).ok())
            .and_then(Mode::from_bits)
            .ok_or(VerificationError::MalformedTree("unknown mode"))?;
        bytes = &bytes[space + 1..];

        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or(VerificationError::MalformedTree("missing name terminator"))?;
        let name = bytes[..nul].to_vec();
        bytes = &bytes[nul + 1..];

        if bytes.len() < ContentHash::LEN {
            return Err(VerificationError::MalformedTree("truncated entry hash"));
        }
        let hash = ContentHash::from_slice(&bytes[..ContentHash::LEN])
            .ok_or(VerificationError::MalformedTree("truncated entry hash"))?;
        bytes = &bytes[ContentHash::LEN..];

        if let Some(previous) = entries.last().map(|e: &TreeEntry| &e.name) {
            if previous >= &name {
                return Err(VerificationError::MalformedTree("entries out of order"));
            }
        }
        entries.push(TreeEntry { mode, name, hash });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        let mut tree = Tree::new();
        tree.insert(&["src", "main.c"], Node::file("int main;", false)).unwrap();
        tree.insert(&["bin", "run"], Node::file("#!/bin/sh", true)).unwrap();
        tree.insert(&["link"], Node::symlink("src/main.c")).unwrap();
        tree
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut other = Tree::new();
        other.insert(&["link"], Node::symlink("src/main.c")).unwrap();
        other.insert(&["bin", "run"], Node::file("#!/bin/sh", true)).unwrap();
        other.insert(&["src"], Node::directory()).unwrap();
        other.insert(&["src", "main.c"], Node::file("int main;", false)).unwrap();

        assert_eq!(sample().hash(), other.hash());
    }

    #[test]
    fn any_change_changes_hash() {
        let base = sample().hash();

        let mut content = sample();
        content.insert(&["src", "main.c"], Node::file("int main!", false)).unwrap();
        assert_ne!(content.hash(), base);

        let mut exec = sample();
        exec.insert(&["src", "main.c"], Node::file("int main;", true)).unwrap();
        assert_ne!(exec.hash(), base);

        let mut renamed = Tree::new();
        renamed.insert(&["src", "main.h"], Node::file("int main;", false)).unwrap();
        renamed.insert(&["bin", "run"], Node::file("#!/bin/sh", true)).unwrap();
        renamed.insert(&["link"], Node::symlink("src/main.c")).unwrap();
        assert_ne!(renamed.hash(), base);

        let mut empty_dir = sample();
        empty_dir.insert(&["empty"], Node::directory()).unwrap();
        assert_ne!(empty_dir.hash(), base);
    }

    #[test]
    fn file_and_symlink_with_same_bytes_differ() {
        let mut a = Tree::new();
        a.insert(&["x"], Node::file("target", false)).unwrap();
        let mut b = Tree::new();
        b.insert(&["x"], Node::symlink("target")).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn empty_tree_hash_is_hash_of_nothing() {
        assert_eq!(Tree::new().hash(), ContentHash::of(b""));
    }

    #[test]
    fn last_insert_wins() {
        let mut tree = Tree::new();
        tree.insert(&["a"], Node::file("one", false)).unwrap();
        tree.insert(&["a"], Node::file("two", false)).unwrap();
        assert_eq!(tree.get(&["a"]), Some(&Node::file("two", false)));

        tree.insert(&["a", "b"], Node::file("nested", false)).unwrap();
        assert!(matches!(tree.get(&["a"]), Some(Node::Directory(_))));

        tree.insert(&["a"], Node::directory()).unwrap();
        assert_eq!(tree.get(&["a", "b"]), Some(&Node::file("nested", false)));
    }

    #[test]
    fn rejects_bad_components() {
        let mut tree = Tree::new();
        assert!(tree.insert(&[".."], Node::file("x", false)).is_err());
        assert!(tree.insert(&["a/b"], Node::file("x", false)).is_err());
        assert!(tree.insert(&[""], Node::file("x", false)).is_err());
        let root: [&str; 0] = [];
        assert!(tree.insert(&root, Node::file("x", false)).is_err());
        assert!(tree.insert(&root, Node::directory()).is_ok());
    }

    #[test]
    fn names_sort_by_raw_bytes() {
        let mut tree = Tree::new();
        tree.insert(&["b"], Node::file("", false)).unwrap();
        tree.insert(&["B"], Node::file("", false)).unwrap();
        tree.insert(&["a.txt"], Node::file("", false)).unwrap();
        tree.insert(&["a"], Node::directory()).unwrap();
        let names: Vec<_> = tree.entries().map(|(n, _)| n.to_vec()).collect();
        assert_eq!(names, vec![b"B".to_vec(), b"a".to_vec(), b"a.txt".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn objects_are_emitted_bottom_up_and_decode() {
        let tree = sample();
        let mut emitted = Vec::new();
        let root = tree
            .objects(&mut |kind, hash, bytes| {
                assert_eq!(ContentHash::of(bytes), hash);
                emitted.push((kind, hash, bytes.to_vec()));
                Ok::<_, ()>(())
            })
            .unwrap();

        let (kind, last_hash, encoded) = emitted.last().unwrap();
        assert_eq!(*kind, ObjectKind::Directory);
        assert_eq!(*last_hash, root);
        assert_eq!(root, tree.hash());

        let entries = decode_directory(encoded).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![b"bin".to_vec(), b"link".to_vec(), b"src".to_vec()]);
        assert_eq!(entries[0].mode, Mode::Directory);
        assert_eq!(entries[1].mode, Mode::Symlink);
        assert_eq!(entries[1].hash, ContentHash::of(b"src/main.c"));
    }

    #[test]
    fn encoding_layout() {
        let hash = ContentHash::of(b"x");
        let encoded = encode_directory(&[TreeEntry {
            mode: Mode::Directory,
            name: b"d".to_vec(),
            hash,
        }]);
        let mut expected = b"40000 d\0".to_vec();
        expected.extend_from_slice(hash.as_bytes());
        assert_eq!(encoded, expected);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_directory(b"100644 name").is_err());
        assert!(decode_directory(b"777 a\0").is_err());
        assert!(decode_directory(b"100644 a\0short").is_err());
    }
}
