//! Content digests for the checksum columns

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::column::Column;
use crate::error::{Result, SiftError};

/// Computes lowercase hex digests of file contents
pub struct Digester {
    /// Read buffer size
    buffer_size: usize,
}

impl Default for Digester {
    fn default() -> Self {
        Self::new()
    }
}

impl Digester {
    pub fn new() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64KB buffer
        }
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size: buffer_size.max(1) }
    }

    /// Digest the file at `path` with the algorithm of a checksum column
    pub fn digest_file(&self, path: &Path, column: Column) -> Result<String> {
        let file = File::open(path)
            .map_err(|e| SiftError::hash_error(path, format!("Failed to open file: {}", e)))?;
        self.digest_reader(file, column)
            .map_err(|e| SiftError::hash_error(path, format!("Failed to read file: {}", e)))
    }

    /// Digest everything readable from `reader`
    pub fn digest_reader<R: Read>(&self, reader: R, column: Column) -> std::io::Result<String> {
        match column {
            Column::Md5 => self.hash_with::<Md5, _>(reader),
            Column::Sha1 => self.hash_with::<Sha1, _>(reader),
            Column::Sha256 => self.hash_with::<Sha256, _>(reader),
            Column::Sha512 => self.hash_with::<Sha512, _>(reader),
            Column::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();
                self.feed(reader, |chunk| hasher.update(chunk))?;
                Ok(format!("{:08x}", hasher.finalize()))
            }
            Column::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                self.feed(reader, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(hasher.finalize().to_hex().to_string())
            }
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' is not a checksum column", other),
            )),
        }
    }

    fn hash_with<D: Digest, R: Read>(&self, reader: R) -> std::io::Result<String> {
        let mut hasher = D::new();
        self.feed(reader, |chunk| hasher.update(chunk))?;
        Ok(hex(&hasher.finalize()))
    }

    fn feed<R: Read>(&self, mut reader: R, mut update: impl FnMut(&[u8])) -> std::io::Result<()> {
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if bytes_read == 0 {
                return Ok(());
            }
            update(&buffer[..bytes_read]);
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
