use std::io::{self, Read};

use crate::{ContentHash, Hasher, Result, VerificationError};

/// Streaming reader that hashes data as it passes through.
pub struct VerifiedReader<R, H> {
    reader: R,
    hasher: H,
}

impl<R, H> VerifiedReader<R, H> {
    pub fn new(reader: R, hasher: H) -> Self {
        Self { reader, hasher }
    }
}

impl<R: Read, H: Hasher> Read for VerifiedReader<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

impl<R: Read, H: Hasher> VerifiedReader<R, H> {
    /// Finalize verification against the expected hash.
    pub fn finish(self, expected: &ContentHash) -> Result<()> {
        let actual = self.hasher.finalize();
        if actual.as_slice() == expected.as_bytes() {
            Ok(())
        } else {
            Err(VerificationError::Mismatch {
                expected: expected.to_hex(),
                actual: hex::encode(actual),
            })
        }
    }
}
