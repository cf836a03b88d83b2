use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::limits::*;

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    /// Stored bytes failed the integrity check or could not be decoded.
    Corrupt(String),
    QuotaExceeded { needed: usize, quota: usize },
    /// Storage switched off (private browsing, disabled by policy).
    Unavailable,
    InvalidKey(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage I/O error: {e}"),
            StorageError::Corrupt(msg) => write!(f, "corrupt stored value: {msg}"),
            StorageError::QuotaExceeded { needed, quota } => {
                write!(f, "storage quota exceeded: {needed} bytes needed, quota {quota}")
            }
            StorageError::Unavailable => write!(f, "storage unavailable"),
            StorageError::InvalidKey(key) => write!(f, "invalid storage key: {key:?}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Synchronous string key-value storage scoped to one origin.
///
/// Several stores may share one instance; nothing here locks across them.
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ── In-memory ────────────────────────────────────────────────────

/// Quota-limited in-memory storage, the local-storage stand-in used by tests
/// and embedded shells.
pub struct MemoryStorage {
    entries: DashMap<String, String>,
    quota: usize,
    used: AtomicUsize,
    available: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_STORAGE_QUOTA_BYTES)
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: DashMap::new(),
            quota,
            used: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability; every call fails with `Unavailable` while off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Swap `release` bytes for `claim` bytes of the quota.
    fn reserve(&self, release: usize, claim: usize) -> Result<(), StorageError> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let needed = used - release + claim;
                (needed <= self.quota).then_some(needed)
            })
            .map(|_| ())
            .map_err(|used| StorageError::QuotaExceeded {
                needed: used - release + claim,
                quota: self.quota,
            })
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let new_size = key.len() + value.len();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                self.reserve(key.len() + entry.get().len(), new_size)?;
                entry.insert(value.to_string());
            }
            Entry::Vacant(entry) => {
                self.reserve(0, new_size)?;
                entry.insert(value.to_string());
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        if let Some((k, v)) = self.entries.remove(key) {
            self.used.fetch_sub(k.len() + v.len(), Ordering::SeqCst);
        }
        Ok(())
    }
}

// ── File-backed ──────────────────────────────────────────────────

/// One file per key under a data directory.
///
/// Format per file: `[u32: len][utf-8 value][u32: crc32]`. Writes go to a
/// temp file that is fsynced and renamed over the old one, so a reader sees
/// either the previous value or the new one.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty()
            || key.len() > MAX_STORAGE_KEY_LEN
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.kv")))
    }
}

fn encode_value(writer: &mut impl Write, value: &str) -> io::Result<()> {
    let payload = value.as_bytes();
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&crc32fast::hash(payload).to_le_bytes())?;
    Ok(())
}

fn decode_value(bytes: &[u8]) -> Result<String, StorageError> {
    if bytes.len() < 8 {
        return Err(StorageError::Corrupt("truncated header".into()));
    }
    let (len_buf, rest) = bytes.split_at(4);
    let len = u32::from_le_bytes(len_buf.try_into().map_err(|_| {
        StorageError::Corrupt("bad length prefix".into())
    })?) as usize;
    if rest.len() != len + 4 {
        return Err(StorageError::Corrupt(format!(
            "length mismatch: header says {len}, found {}",
            rest.len().saturating_sub(4)
        )));
    }
    let (payload, crc_buf) = rest.split_at(len);
    let stored_crc = u32::from_le_bytes(
        crc_buf
            .try_into()
            .map_err(|_| StorageError::Corrupt("bad checksum".into()))?,
    );
    if stored_crc != crc32fast::hash(payload) {
        return Err(StorageError::Corrupt("checksum mismatch".into()));
    }
    String::from_utf8(payload.to_vec()).map_err(|e| StorageError::Corrupt(e.to_string()))
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode_value(&bytes).map(Some)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("kv.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            encode_value(&mut writer, value)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
