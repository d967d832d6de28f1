//! The store engine: the file controller, the block codec, the free-block
//! registry and the index composed behind a single write gate.
//!
//! Every operation that touches the backing file first claims the gate, a
//! mutex over the controller and the registry, so writes of whole blocks
//! never interleave and on-demand value reads are serialized with them.
//! The index sits outside the gate under a reader-writer lock: `has`,
//! `len`, `keys` and cached lookups answer from the index alone and see it
//! as of the last completed mutation.
//!
//! Lock order is gate first, then index, and no index guard is ever held
//! while claiming the gate; readers of on-disk values work from a cloned
//! snapshot of the coordinates instead. A fresh `set` only inserts its
//! index entry after the block write has completed, so no reader can
//! observe a key whose block is not on disk yet.
//!
//! An I/O failure in the middle of a mutation leaves the index out of step
//! with the file; there are no internal retries and the store should be
//! discarded when that happens. Corruption detected by the open-time scan
//! fails the open outright.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, error};

use packdb_api::controller::StoreFile;
use packdb_api::error::{Result, StoreError};
use packdb_api::kv::{KeyValueSupport, StoreOptions, StoreSysSupport};
use packdb_api::types::{self, BlockClass, RecordHeader, Value, KEY_MAX, PREFIX_LEN, VALUE_MAX};

use super::index::{Entry, Index, Payload};
use super::registry::FreeRegistry;

/// Everything the write gate protects: the backing file and the free-block
/// registry.
#[derive(Debug)]
struct Backend {
    file: StoreFile,
    registry: FreeRegistry,
}

/// An embedded key-value store over a single block-packed file.
///
/// All methods take `&self`; the store may be shared freely between
/// threads. It owns its file for its lifetime: mutating the file from
/// outside is undefined behavior.
#[derive(Debug)]
pub struct KvStore {
    opts: StoreOptions,
    path: PathBuf,
    gate: Mutex<Backend>,
    index: RwLock<Index>,
}

impl KvStore {
    /// Open the database at `path` with default options.
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<KvStore> {
        KvStore::open(path, StoreOptions::default())
    }

    // A poisoned lock only means another caller panicked mid-operation;
    // re-enter it rather than wedge every later caller.
    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_read(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_write(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone the live entries in insertion order, so value reads never hold
    /// the index lock across file I/O.
    fn snapshot(&self) -> Vec<(String, Entry)> {
        self.index_read()
            .iter()
            .map(|(k, e)| (k.to_string(), e.clone()))
            .collect()
    }

    /// Resolve an entry to its value: cached entries clone, on-disk entries
    /// claim the gate for one positioned read of exactly the value bytes.
    fn value_of(&self, entry: &Entry) -> Result<Value> {
        match &entry.payload {
            Payload::Cached(value) => Ok(value.clone()),
            Payload::OnDisk {
                value_off,
                value_len,
            } => {
                let backend = self.backend();
                let mut buf = vec![0u8; *value_len as usize];
                backend
                    .file
                    .read_at(entry.offset + *value_off as u64, &mut buf)?;
                Ok(Value::from_raw(buf, self.opts.buffer_values))
            }
        }
    }
}

impl StoreSysSupport for KvStore {
    type Error = StoreError;

    fn open<P: AsRef<Path>>(path: P, opts: StoreOptions) -> Result<KvStore> {
        let file = StoreFile::open(path)?;
        let mut index = Index::new();
        let mut registry = FreeRegistry::new();
        load(&file, opts, &mut index, &mut registry)?;
        debug!(
            "loaded {} live keys and {} free blocks from {}",
            index.len(),
            registry.len(),
            file.path().display()
        );
        Ok(KvStore {
            opts,
            path: file.path().to_path_buf(),
            gate: Mutex::new(Backend { file, registry }),
            index: RwLock::new(index),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> usize {
        self.index_read().len()
    }
}

impl KeyValueSupport for KvStore {
    fn has(&self, key: &str) -> bool {
        self.index_read().contains(key)
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entry = { self.index_read().get(key).cloned() };
        match entry {
            None => Ok(None),
            Some(entry) => self.value_of(&entry).map(Some),
        }
    }

    fn set<V: Into<Value>>(&self, key: &str, value: V) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("keys must be non-empty"));
        }
        if key.len() > KEY_MAX {
            return Err(StoreError::InvalidKey("key longer than 65535 bytes"));
        }
        let value = value.into().normalize(self.opts.buffer_values);
        let record = types::record_len(key.as_bytes(), value.as_bytes());
        if value.byte_len() as u64 > VALUE_MAX {
            return Err(StoreError::BlockTooLarge(record));
        }

        let mut backend = self.backend();
        let existing = { self.index_read().get(key).map(|e| (e.offset, e.size)) };
        let (offset, size) = match existing {
            Some((offset, size)) if record <= size => {
                // Still fits: rewrite in place, keeping block and size. A
                // shrink repads the tail with zeros rather than moving.
                let class = BlockClass::for_capacity(size)?;
                let block = types::encode_record(key.as_bytes(), value.as_bytes(), class);
                backend.file.write_at(offset, &block)?;
                (offset, size)
            }
            old => {
                // Fresh placement, sized with growth headroom. Fail on an
                // unrepresentable record before touching the file.
                let class = BlockClass::for_capacity(types::grown_capacity(record))?;
                if let Some((old_offset, old_size)) = old {
                    // Outgrown its block: free the old one first.
                    let old_class = BlockClass::for_capacity(old_size)?;
                    backend
                        .file
                        .write_at(old_offset, &types::encode_free(old_class))?;
                    backend.registry.release(old_size, old_offset);
                    debug!(
                        "relocating a {record} byte record out of its {old_size} byte block at offset {old_offset}"
                    );
                }
                let size = class.size();
                let offset = match backend.registry.take(size) {
                    Some(offset) => offset,
                    None => backend.file.allocate(size),
                };
                let block = types::encode_record(key.as_bytes(), value.as_bytes(), class);
                backend.file.write_at(offset, &block)?;
                (offset, size)
            }
        };

        let payload = if self.opts.in_memory_values {
            Payload::Cached(value)
        } else {
            Payload::OnDisk {
                value_off: types::value_offset(key.as_bytes(), value.as_bytes()) as u32,
                value_len: value.byte_len() as u32,
            }
        };
        self.index_write().insert(key, Entry { offset, size, payload });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut backend = self.backend();
        let coords = { self.index_read().get(key).map(|e| (e.offset, e.size)) };
        let Some((offset, size)) = coords else {
            return Ok(false);
        };
        let class = BlockClass::for_capacity(size)?;
        backend.file.write_at(offset, &types::encode_free(class))?;
        backend.registry.release(size, offset);
        self.index_write().remove(key);
        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        let mut backend = self.backend();
        backend.file.truncate()?;
        backend.registry.forget_all();
        self.index_write().clear();
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.index_read().keys().map(str::to_string).collect()
    }

    fn values(&self) -> Result<Vec<Value>> {
        self.snapshot()
            .iter()
            .map(|(_, entry)| self.value_of(entry))
            .collect()
    }

    fn entries(&self) -> Result<Vec<(String, Value)>> {
        self.snapshot()
            .into_iter()
            .map(|(key, entry)| Ok((key, self.value_of(&entry)?)))
            .collect()
    }

    fn for_each<F: FnMut(&str, &Value)>(&self, mut f: F) -> Result<()> {
        for (key, entry) in self.snapshot() {
            let value = self.value_of(&entry)?;
            f(&key, &value);
        }
        Ok(())
    }

    fn try_for_each<F: FnMut(&str, &Value) -> std::result::Result<(), StoreError>>(
        &self,
        mut f: F,
    ) -> Result<()> {
        for (key, entry) in self.snapshot() {
            let value = self.value_of(&entry)?;
            f(&key, &value)?;
        }
        Ok(())
    }
}

/// Rebuild the index and the registry by scanning every block from offset 0
/// to end-of-file.
///
/// Each step reads the worst-case 7-byte prefix, decodes the block size
/// from the flags byte, and either records a free block or decodes the
/// record far enough to index it: always the key, and the value too when
/// values are cached. The scratch buffer grows in ladder-size jumps rather
/// than byte by byte.
fn load(
    file: &StoreFile,
    opts: StoreOptions,
    index: &mut Index,
    registry: &mut FreeRegistry,
) -> Result<()> {
    let eof = file.eof();
    let mut scratch: Vec<u8> = Vec::new();
    let mut prefix = [0u8; PREFIX_LEN];
    let mut offset = 0;
    while offset < eof {
        if eof - offset < PREFIX_LEN as u64 {
            error!("found truncated block header at offset {offset}, refusing to load");
            return Err(StoreError::CorruptBlock {
                offset,
                reason: "truncated block header",
            });
        }
        file.read_at(offset, &mut prefix)?;
        let header = RecordHeader::parse(&prefix);
        let size = header.class.size();
        if offset + size > eof {
            error!(
                "block at offset {offset} claims {size} bytes but the file ends at {eof}, refusing to load"
            );
            return Err(StoreError::CorruptBlock {
                offset,
                reason: "block overruns end of file",
            });
        }
        if header.free {
            registry.release(size, offset);
            offset += size;
            continue;
        }
        if header.record_len() > size {
            error!(
                "record at offset {offset} overruns its {size} byte block, refusing to load"
            );
            return Err(StoreError::CorruptBlock {
                offset,
                reason: "record overruns its block",
            });
        }

        let need = if opts.in_memory_values {
            header.record_len()
        } else {
            header.value_offset()
        } as usize;
        if scratch.len() < need {
            scratch.resize(BlockClass::for_capacity(need as u64)?.size() as usize, 0);
        }
        file.read_at(offset, &mut scratch[..need])?;

        let header_len = header.header_len() as usize;
        let key_end = header_len + header.key_len as usize;
        let key = std::str::from_utf8(&scratch[header_len..key_end]).map_err(|_| {
            error!("key in block at offset {offset} is not valid UTF-8, refusing to load");
            StoreError::CorruptBlock {
                offset,
                reason: "key is not valid UTF-8",
            }
        })?;
        let payload = if opts.in_memory_values {
            Payload::Cached(Value::from_raw(
                scratch[key_end..need].to_vec(),
                opts.buffer_values,
            ))
        } else {
            Payload::OnDisk {
                value_off: header.value_offset() as u32,
                value_len: header.value_len,
            }
        };
        index.insert(
            key,
            Entry {
                offset,
                size,
                payload,
            },
        );
        offset += size;
    }
    Ok(())
}

// The engine scenario tests live in the api crate's test directory, and are
// compiled into this module here.
#[cfg(test)]
#[path = "../../api/kv-tests/store_test.rs"]
mod tests;
