//! Chunked persistence of collection payloads.
//!
//! A collection is one logical file. Under the binary encoding, arrays whose
//! encoded size exceeds the file ceiling are split greedily across chunk
//! files named `<name> <index>.<ext>` (chunk 0 keeps the base name), and the
//! chunks are reassembled transparently on read. Stale chunk files beyond
//! the current count are removed after every write so an earlier, larger
//! write can never leak documents into a later read.

use crate::codec;
use crate::config::{Config, Encoding};
use crate::crypto;
use crate::error::{Result, StoreError};
use crate::types::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Ceiling for a single chunk file, in encoded bytes.
pub const MAX_CHUNK_BYTES: u64 = 10_000_000;

/// Diagnostics about the physical layout of a collection.
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    pub chunked: bool,
    pub chunk_count: usize,
    pub total_bytes: u64,
    pub files: Vec<PathBuf>,
    pub has_oversized: bool,
}

/// Name of the chunk file at `index` for a base path. Chunk 0 is the base
/// file itself; later chunks insert ` <index>` before the extension.
pub fn chunk_file_name(base: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match name.rfind('.') {
        Some(dot) => format!("{} {}{}", &name[..dot], index, &name[dot..]),
        None => format!("{} {}", name, index),
    };
    base.with_file_name(renamed)
}

pub struct ChunkStore {
    config: Config,
}

impl ChunkStore {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Persist a payload at the logical path, chunking binary arrays that
    /// exceed the file ceiling.
    pub fn write(&self, path: &Path, payload: &Value) -> Result<()> {
        // Text mode and non-array payloads always land in a single file.
        if self.config.encoding != Encoding::Binary || !payload.is_array() {
            self.write_single(path, payload)?;
            self.cleanup_chunks(path, 1);
            return Ok(());
        }

        let items = payload.as_array().unwrap_or_default();
        let estimated = codec::binary_size(payload)?;

        if estimated <= MAX_CHUNK_BYTES {
            match self.write_single(path, payload) {
                Ok(()) => {
                    self.cleanup_chunks(path, 1);
                    return Ok(());
                }
                // The estimate was wrong; fall through to chunking.
                Err(StoreError::Oversized) => {
                    log::warn!(
                        "single-file write of {} exceeded the binary size limit, chunking",
                        path.display()
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let chunks = self.pack_chunks(items)?;
        log::debug!(
            "splitting {} documents across {} chunks for {}",
            items.len(),
            chunks.len(),
            path.display()
        );

        let chunk_count = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_path = chunk_file_name(path, index);
            self.write_single(&chunk_path, &Value::Array(chunk))?;
        }
        self.cleanup_chunks(path, chunk_count);
        Ok(())
    }

    /// Read a payload back, reassembling chunks in order.
    ///
    /// Returns `Ok(None)` when the base file does not exist so callers can
    /// treat a first write as collection creation. A corrupt or unreadable
    /// chunk past the base file stops reassembly at the last good chunk.
    pub fn read(&self, path: &Path) -> Result<Option<Value>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let mut documents = match self.decode_payload(&bytes)? {
            Value::Array(documents) => documents,
            other => return Ok(Some(other)),
        };

        let mut index = 1;
        loop {
            let chunk_path = chunk_file_name(path, index);
            if !chunk_path.exists() {
                break;
            }
            let chunk_bytes = match fs::read(&chunk_path) {
                Ok(b) => b,
                Err(e) => {
                    log::warn!(
                        "stopping chunk reassembly at {}: {}",
                        chunk_path.display(),
                        e
                    );
                    break;
                }
            };
            match self.decode_payload(&chunk_bytes) {
                Ok(Value::Array(more)) => documents.extend(more),
                Ok(_) => {
                    log::warn!(
                        "chunk {} does not hold a document array, skipping",
                        chunk_path.display()
                    );
                }
                Err(e) => {
                    log::warn!(
                        "stopping chunk reassembly at {}: {}",
                        chunk_path.display(),
                        e
                    );
                    break;
                }
            }
            index += 1;
        }

        Ok(Some(Value::Array(documents)))
    }

    /// Delete the base file and every discoverable chunk file.
    /// Returns how many files were removed.
    pub fn remove_all(&self, path: &Path) -> Result<usize> {
        let mut removed = 0;
        let mut index = 0;
        loop {
            let chunk_path = chunk_file_name(path, index);
            if !chunk_path.exists() {
                break;
            }
            fs::remove_file(&chunk_path)?;
            removed += 1;
            index += 1;
        }
        Ok(removed)
    }

    /// Physical layout diagnostics for a collection, or `None` if absent.
    pub fn chunk_info(&self, path: &Path) -> Result<Option<ChunkInfo>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut info = ChunkInfo {
            chunked: false,
            chunk_count: 1,
            total_bytes: fs::metadata(path)?.len(),
            files: vec![path.to_path_buf()],
            has_oversized: false,
        };
        let mut index = 1;
        loop {
            let chunk_path = chunk_file_name(path, index);
            if !chunk_path.exists() {
                break;
            }
            let size = fs::metadata(&chunk_path)?.len();
            info.chunked = true;
            info.chunk_count += 1;
            info.total_bytes += size;
            if size > MAX_CHUNK_BYTES {
                info.has_oversized = true;
            }
            info.files.push(chunk_path);
            index += 1;
        }
        Ok(Some(info))
    }

    /// Greedily pack items into chunks under the ceiling. A single item too
    /// large for any chunk is placed alone rather than failing the write.
    fn pack_chunks(&self, items: &[Value]) -> Result<Vec<Vec<Value>>> {
        let mut chunks: Vec<Vec<Value>> = Vec::new();
        let mut current: Vec<Value> = Vec::new();
        let mut current_size: u64 = 0;

        for item in items {
            let item_size = codec::binary_item_size(item)?;

            if item_size > MAX_CHUNK_BYTES {
                log::warn!(
                    "document of {} encoded bytes exceeds the chunk ceiling, storing alone",
                    item_size
                );
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                    current_size = 0;
                }
                chunks.push(vec![item.clone()]);
                continue;
            }

            if current_size + item_size > MAX_CHUNK_BYTES && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(item.clone());
            current_size += item_size;
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }

    /// Remove leftover chunk files at `from_index` and beyond.
    fn cleanup_chunks(&self, base: &Path, from_index: usize) {
        let mut index = from_index;
        loop {
            let chunk_path = chunk_file_name(base, index);
            if !chunk_path.exists() {
                break;
            }
            match fs::remove_file(&chunk_path) {
                Ok(()) => log::debug!("removed stale chunk {}", chunk_path.display()),
                Err(e) => log::warn!(
                    "failed to remove stale chunk {}: {}",
                    chunk_path.display(),
                    e
                ),
            }
            index += 1;
        }
    }

    fn write_single(&self, path: &Path, payload: &Value) -> Result<()> {
        let bytes = self.encode_payload(payload)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn encode_payload(&self, payload: &Value) -> Result<Vec<u8>> {
        match (self.config.encryption, self.config.encryption_key.as_deref()) {
            (Some(algorithm), Some(key)) => {
                Ok(crypto::encrypt(payload, algorithm, key)?.into_bytes())
            }
            _ => codec::encode(payload, &self.config),
        }
    }

    fn decode_payload(&self, bytes: &[u8]) -> Result<Value> {
        match (self.config.encryption, self.config.encryption_key.as_deref()) {
            (Some(algorithm), Some(key)) => {
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    StoreError::Decode("encrypted file is not valid utf-8".to_string())
                })?;
                crypto::decrypt(text, algorithm, key)
            }
            _ => codec::decode(bytes, &self.config),
        }
    }
}
