//! File-backed data queue
//!
//! Each hit is stored as its own record file inside the queue directory, named by
//! a monotonically increasing index so directory order is queue order. A record
//! is `magic | crc32(payload) | bincode(payload)`. Records are written to a
//! temporary file, synced, then renamed into place, so a crash mid-write never
//! leaves a half-written record visible; leftover temporary files are discarded
//! when the queue is reopened. The directory itself is synced after every
//! rename and removal so a returned `add` or `remove` survives a crash.

use super::{DataEntity, DataQueue};
use crate::errors::StorageError;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_MAGIC: &[u8; 4] = b"HKQ1";
const HEADER_LEN: usize = 8;
const RECORD_EXTENSION: &str = "hit";
const TEMP_EXTENSION: &str = "tmp";

// ----------------------------------------------------------------------------
// File Data Queue
// ----------------------------------------------------------------------------

/// Durable queue persisting one checksummed record file per hit
#[derive(Debug)]
pub struct FileDataQueue {
    dir: PathBuf,
    /// Record indices in queue order
    index: VecDeque<u64>,
    next_index: u64,
}

impl FileDataQueue {
    /// Open (or create) the queue stored in `dir`, replaying any persisted hits
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut indices = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(RECORD_EXTENSION) => match parse_index(&path) {
                    Some(index) => indices.push(index),
                    None => warn!("Ignoring unrecognized record file {}", path.display()),
                },
                Some(TEMP_EXTENSION) => {
                    debug!("Discarding interrupted write {}", path.display());
                    let _ = fs::remove_file(&path);
                }
                _ => {}
            }
        }
        indices.sort_unstable();

        let next_index = indices.last().map(|index| index + 1).unwrap_or(0);
        debug!(
            "Opened hit queue at {} with {} persisted hit(s)",
            dir.display(),
            indices.len()
        );

        Ok(Self {
            dir,
            index: indices.into(),
            next_index,
        })
    }

    /// Directory holding the queue's records
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{:020}.{}", index, RECORD_EXTENSION))
    }

    fn temp_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{:020}.{}", index, TEMP_EXTENSION))
    }

    fn write_record(&self, index: u64, record: &[u8]) -> Result<(), StorageError> {
        let temp = self.temp_path(index);
        let written = File::create(&temp).and_then(|mut file| {
            file.write_all(record)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|_| fs::rename(&temp, self.record_path(index))) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        self.sync_directory()
    }

    /// Flush the directory's entries to disk
    fn sync_directory(&self) -> Result<(), StorageError> {
        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

impl DataQueue for FileDataQueue {
    fn add(&mut self, entity: DataEntity) -> Result<(), StorageError> {
        let index = self.next_index;
        let record = encode_record(&entity)?;
        self.write_record(index, &record)?;

        self.next_index += 1;
        self.index.push_back(index);
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<DataEntity>, StorageError> {
        while let Some(&index) = self.index.front() {
            let path = self.record_path(index);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!("Record {} vanished from hit queue", path.display());
                    self.index.pop_front();
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match decode_record(&path, &bytes) {
                Ok(entity) => return Ok(Some(entity)),
                Err(err) => {
                    // An unreadable head can never be processed; drop it
                    warn!("Dropping unreadable hit record: {}", err);
                    let _ = fs::remove_file(&path);
                    self.index.pop_front();
                }
            }
        }
        Ok(None)
    }

    fn remove(&mut self) -> Result<bool, StorageError> {
        let Some(index) = self.index.pop_front() else {
            return Ok(false);
        };

        match fs::remove_file(self.record_path(index)) {
            Ok(()) => {
                self.sync_directory()?;
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
            Err(err) => {
                self.index.push_front(index);
                Err(err.into())
            }
        }
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        while let Some(index) = self.index.pop_front() {
            match fs::remove_file(self.record_path(index)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    self.index.push_front(index);
                    return Err(err.into());
                }
            }
        }
        self.sync_directory()
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.index.len())
    }
}

// ----------------------------------------------------------------------------
// Record Encoding
// ----------------------------------------------------------------------------

fn parse_index(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn encode_record(entity: &DataEntity) -> Result<Vec<u8>, StorageError> {
    let payload = bincode::serialize(entity)?;
    let mut record = Vec::with_capacity(HEADER_LEN + payload.len());
    record.extend_from_slice(RECORD_MAGIC);
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

fn decode_record(path: &Path, bytes: &[u8]) -> Result<DataEntity, StorageError> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != RECORD_MAGIC {
        return Err(StorageError::corrupt(path, "missing record header"));
    }

    let expected = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let payload = &bytes[HEADER_LEN..];
    if crc32fast::hash(payload) != expected {
        return Err(StorageError::corrupt(path, "checksum mismatch"));
    }

    bincode::deserialize(payload).map_err(|err| StorageError::corrupt(path, err.to_string()))
}
