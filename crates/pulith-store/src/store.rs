use std::io::{Read, Seek, Write};

use pulith_verify::ContentHash;

use crate::Result;

/// Readable handle to a stored object.
pub trait ObjectReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> ObjectReader for T {}

/// Streaming writer for a new object. Bytes are hashed as they are written;
/// nothing becomes visible in the store until [`commit`](Self::commit).
pub trait ObjectWriter: Write + Send {
    fn commit(self: Box<Self>) -> Result<ContentHash>;
}

/// Content-addressed object store.
///
/// Handles are the SHA-256 of the object bytes, so identical bytes always map
/// to the same handle and a stored object never changes. `name` is a hint used
/// only for labeling.
pub trait Store: Send + Sync {
    fn writer(&self, name: Option<&str>) -> Result<Box<dyn ObjectWriter>>;

    fn open(&self, hash: &ContentHash) -> Result<Box<dyn ObjectReader>>;

    fn contains(&self, hash: &ContentHash) -> bool;

    fn put(&self, name: Option<&str>, bytes: &[u8]) -> Result<ContentHash> {
        let mut writer = self.writer(name)?;
        writer.write_all(bytes)?;
        writer.commit()
    }

    fn get(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let mut reader = self.open(hash)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
