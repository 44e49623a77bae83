use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::RwLock;
use pulith_verify::{ContentHash, Hasher, Sha256Hasher};

use crate::store::{ObjectReader, ObjectWriter, Store};
use crate::{Error, Result};

type Objects = Arc<RwLock<HashMap<ContentHash, Arc<[u8]>>>>;

/// Process-local store, mostly for tests and short-lived tools.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Objects,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn remove(&self, hash: &ContentHash) -> bool {
        self.objects.write().remove(hash).is_some()
    }
}

impl Store for MemoryStore {
    fn writer(&self, _name: Option<&str>) -> Result<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryWriter {
            objects: Arc::clone(&self.objects),
            buffer: Vec::new(),
            hasher: Sha256Hasher::new(),
        }))
    }

    fn open(&self, hash: &ContentHash) -> Result<Box<dyn ObjectReader>> {
        let bytes = self
            .objects
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::missing(hash))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn contains(&self, hash: &ContentHash) -> bool {
        self.objects.read().contains_key(hash)
    }
}

struct MemoryWriter {
    objects: Objects,
    buffer: Vec<u8>,
    hasher: Sha256Hasher,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryWriter {
    fn commit(self: Box<Self>) -> Result<ContentHash> {
        let MemoryWriter {
            objects,
            buffer,
            hasher,
        } = *self;
        let hash = hasher.finish();
        objects
            .write()
            .entry(hash)
            .or_insert_with(|| Arc::from(buffer));
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_deduplicated() {
        let store = MemoryStore::new();
        let a = store.put(Some("a"), b"same").unwrap();
        let b = store.put(Some("b"), b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ContentHash::of(b"same"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn uncommitted_writer_stores_nothing() {
        let store = MemoryStore::new();
        let mut writer = store.writer(None).unwrap();
        writer.write_all(b"pending").unwrap();
        drop(writer);
        assert!(store.is_empty());
    }

    #[test]
    fn missing_object_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(&ContentHash::of(b"nope")).err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
