//! # File I/O Module
//!
//! Local room-record storage with safety features:
//! - **Atomic saves**: Write to .tmp, sync, rename to prevent corruption
//! - **File locking**: Exclusive OS lock held while a record is replaced
//! - **Version validation**: Records from a newer schema are refused
//!
//! ## Layout
//!
//! One JSON file per room, `<dir>/<encoded room id>.json`, next to a `<room>.json.lock`
//! file that only ever carries the OS lock.
//!
//! ## Example
//!
//! ```rust,no_run
//! use clima_core::file_io::FileRoomStore;
//! use clima_core::room::RoomId;
//!
//! let store = FileRoomStore::new("salas")?;
//! let record = store.load(&RoomId::from("sala-101"))?;
//! println!("computed at {}", record.computed_at);
//! # Ok::<(), clima_core::errors::CalcError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::debug;

use crate::errors::{CalcError, CalcResult};
use crate::record::{PersistenceSink, RoomRecord};
use crate::room::RoomId;

pub const RECORD_EXTENSION: &str = "json";

/// Directory of room records.
#[derive(Debug, Clone)]
pub struct FileRoomStore {
    dir: PathBuf,
}

impl FileRoomStore {
    /// Open (creating if needed) a record directory.
    pub fn new(dir: impl Into<PathBuf>) -> CalcResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| CalcError::file_error("create directory", dir.display().to_string(), e.to_string()))?;
        Ok(FileRoomStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path for `room`; see [`encode_file_stem`] for the name.
    pub fn path_for(&self, room: &RoomId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", encode_file_stem(room.as_str()), RECORD_EXTENSION))
    }

    /// Save a record with atomic write semantics.
    ///
    /// 1. Take the exclusive lock on `<room>.json.lock` (blocks other writers)
    /// 2. Write to `<room>.json.tmp` and fsync
    /// 3. Rename over `<room>.json`
    pub fn save_record(&self, record: &RoomRecord) -> CalcResult<()> {
        let path = self.path_for(&record.room_id);
        let json = record.to_json()?;

        let lock_path = path.with_extension("json.lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| CalcError::file_error("create lock", lock_path.display().to_string(), e.to_string()))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| CalcError::file_error("lock", lock_path.display().to_string(), e.to_string()))?;

        let written = write_atomic(&path, json.as_bytes());

        // Closing the handle releases the lock as well
        let _ = FileExt::unlock(&lock_file);
        written?;

        debug!(room = %record.room_id, path = %path.display(), "room record written");
        Ok(())
    }

    /// Load the record for `room`.
    ///
    /// # Returns
    ///
    /// * `Ok(RoomRecord)` - Successfully loaded record
    /// * `Err(CalcError::VersionMismatch)` - Record written by a newer schema
    /// * `Err(CalcError::SerializationError)` - Invalid JSON
    /// * `Err(CalcError::FileError)` - I/O error (including no record yet)
    pub fn load(&self, room: &RoomId) -> CalcResult<RoomRecord> {
        let path = self.path_for(room);

        let mut file = File::open(&path)
            .map_err(|e| CalcError::file_error("open", path.display().to_string(), e.to_string()))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| CalcError::file_error("read", path.display().to_string(), e.to_string()))?;

        RoomRecord::from_json(&contents).map_err(|e| match e {
            CalcError::SerializationError { reason } => CalcError::SerializationError {
                reason: format!("Invalid JSON in {}: {}", path.display(), reason),
            },
            other => other,
        })
    }

    /// Rooms that have a record file, sorted by id.
    ///
    /// Files whose names do not decode to a room id are ignored.
    pub fn rooms(&self) -> CalcResult<Vec<RoomId>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| CalcError::file_error("list", self.dir.display().to_string(), e.to_string()))?;

        let mut rooms: Vec<RoomId> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some(RECORD_EXTENSION))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).and_then(decode_file_stem))
            .map(RoomId::new)
            .collect();
        rooms.sort();
        Ok(rooms)
    }

    /// Delete the record (and lock file) for `room`. Returns `false` if
    /// there was nothing to delete.
    pub fn remove(&self, room: &RoomId) -> CalcResult<bool> {
        let path = self.path_for(room);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| CalcError::file_error("remove", path.display().to_string(), e.to_string()))?;
        let _ = fs::remove_file(path.with_extension("json.lock"));
        Ok(true)
    }
}

#[async_trait]
impl PersistenceSink for FileRoomStore {
    async fn save(&self, record: &RoomRecord) -> CalcResult<()> {
        let store = self.clone();
        let record = record.clone();
        let room_id = record.room_id.clone();

        tokio::task::spawn_blocking(move || store.save_record(&record))
            .await
            .map_err(|e| CalcError::persistence_failure(room_id.as_str(), e.to_string()))?
            .map_err(|e| CalcError::persistence_failure(room_id.as_str(), e.to_string()))
    }
}

/// File stem for a room id: `[A-Za-z0-9-]` kept as is, every other byte
/// (including `_`) written as `_XX` upper-case hex. Distinct ids never share
/// a stem.
pub fn encode_file_stem(room_id: &str) -> String {
    let mut stem = String::with_capacity(room_id.len());
    for byte in room_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

/// Inverse of [`encode_file_stem`]; `None` for names it could not produce.
pub fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                let hex = stem.get(i + 1..i + 3)?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'-' => {
                decoded.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(decoded).ok()
}

/// Write `bytes` to `path` through a synced temp file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> CalcResult<()> {
    let tmp_path = path.with_extension("json.tmp");

    let mut tmp_file = File::create(&tmp_path).map_err(|e| {
        CalcError::file_error("create temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    tmp_file.write_all(bytes).map_err(|e| {
        CalcError::file_error("write temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    tmp_file.sync_all().map_err(|e| {
        CalcError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CalcError::file_error("rename to final", path.display().to_string(), e.to_string())
    })
}
