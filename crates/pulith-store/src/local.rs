use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use pulith_fs::{AtomicWriteOptions, Workspace, atomic_write};
use pulith_verify::{ContentHash, Hasher, Sha256Hasher, VerifiedReader};
use tracing::{debug, warn};

use crate::store::{ObjectReader, ObjectWriter, Store};
use crate::{Error, Result};

const STAGED: &str = "object";

/// On-disk store.
///
/// ```text
/// <root>/
///   objects/ab/cdef…   object bytes, named by their SHA-256
///   labels/abcdef…     name hint of the first writer, if any
///   tmp/               per-writer staging workspaces
/// ```
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["objects", "labels", "tmp"] {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    /// Name recorded by the first writer of this object.
    pub fn label(&self, hash: &ContentHash) -> Option<String> {
        fs::read_to_string(self.label_path(hash)).ok()
    }

    /// Re-hash an object on disk and compare against its handle.
    pub fn verify(&self, hash: &ContentHash) -> Result<()> {
        let file = File::open(self.object_path(hash)).map_err(|e| not_found(e, hash))?;
        let mut reader = VerifiedReader::new(file, Sha256Hasher::new());
        io::copy(&mut reader, &mut io::sink())?;
        reader.finish(hash).map_err(|e| Error::Corrupted {
            hash: *hash,
            reason: e.to_string(),
        })
    }

    fn label_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join("labels").join(hash.to_hex())
    }
}

impl Store for LocalStore {
    fn writer(&self, name: Option<&str>) -> Result<Box<dyn ObjectWriter>> {
        let workspace = Workspace::new(self.root.join("tmp"))?;
        let file = File::create(workspace.file(STAGED))?;
        Ok(Box::new(LocalWriter {
            store: self.clone(),
            name: name.map(str::to_owned),
            file: BufWriter::new(file),
            hasher: Sha256Hasher::new(),
            workspace,
        }))
    }

    fn open(&self, hash: &ContentHash) -> Result<Box<dyn ObjectReader>> {
        let file = File::open(self.object_path(hash)).map_err(|e| not_found(e, hash))?;
        Ok(Box::new(file))
    }

    fn contains(&self, hash: &ContentHash) -> bool {
        self.object_path(hash).is_file()
    }

    fn get(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let bytes = fs::read(self.object_path(hash)).map_err(|e| not_found(e, hash))?;
        let actual = ContentHash::of(&bytes);
        if actual != *hash {
            warn!(%hash, %actual, "stored object does not match its handle");
            return Err(Error::Corrupted {
                hash: *hash,
                reason: format!("content hashes to {actual}"),
            });
        }
        Ok(bytes)
    }
}

fn not_found(e: io::Error, hash: &ContentHash) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::missing(hash)
    } else {
        Error::Io(e)
    }
}

struct LocalWriter {
    store: LocalStore,
    name: Option<String>,
    file: BufWriter<File>,
    hasher: Sha256Hasher,
    workspace: Workspace,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl ObjectWriter for LocalWriter {
    fn commit(self: Box<Self>) -> Result<ContentHash> {
        let LocalWriter {
            store,
            name,
            file,
            hasher,
            workspace,
        } = *self;

        let file = file.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let hash = hasher.finish();
        let destination = store.object_path(&hash);
        if workspace.commit(STAGED, &destination, false)? {
            debug!(%hash, name = name.as_deref().unwrap_or(""), "stored object");
        }

        if let Some(name) = name {
            let label = store.label_path(&hash);
            if !label.exists() {
                atomic_write(&label, name.as_bytes(), AtomicWriteOptions::new())?;
            }
        }
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_writes_fanned_out_object() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let hash = store.put(Some("hello.txt"), b"hello world").unwrap();
        let hex = hash.to_hex();
        let expected = dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);

        assert_eq!(store.object_path(&hash), expected);
        assert_eq!(fs::read(expected).unwrap(), b"hello world");
        assert_eq!(store.label(&hash).as_deref(), Some("hello.txt"));
        assert!(store.contains(&hash));
    }

    #[test]
    fn identical_content_is_stored_once() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let a = store.put(Some("first"), b"same").unwrap();
        let b = store.put(Some("second"), b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.label(&a).as_deref(), Some("first"));
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn streaming_writer_matches_put() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let mut writer = store.writer(None).unwrap();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        let hash = writer.commit().unwrap();

        assert_eq!(hash, ContentHash::of(b"hello world"));
        assert_eq!(store.get(&hash).unwrap(), b"hello world");
    }

    #[test]
    fn dropped_writer_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let mut writer = store.writer(None).unwrap();
        writer.write_all(b"partial").unwrap();
        drop(writer);

        assert!(!store.contains(&ContentHash::of(b"partial")));
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn tampered_object_is_reported() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let hash = store.put(None, b"original").unwrap();
        fs::write(store.object_path(&hash), b"tampered").unwrap();

        assert!(matches!(store.get(&hash), Err(Error::Corrupted { .. })));
        assert!(matches!(store.verify(&hash), Err(Error::Corrupted { .. })));
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let hash = ContentHash::of(b"absent");
        assert!(!store.contains(&hash));
        assert!(matches!(store.open(&hash), Err(Error::NotFound(_))));
    }
}
