use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

/// Per-device boolean markers such as "has seen the newsletter popup".
pub trait OneTimeFlagStore: Send + Sync {
    fn is_set(&self, device_id: &str, key: &str) -> Result<bool, FlagStoreError>;
    fn set(&self, device_id: &str, key: &str) -> Result<(), FlagStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FlagStoreError {
    #[error("flag store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("flag store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

type DeviceFlags = BTreeMap<String, BTreeSet<String>>;

/// Flags persisted as a JSON document so they survive restarts.
///
/// Every `set` merges with the document currently on disk and replaces it
/// through a rename, so processes sharing the file keep each other's flags
/// and a crash never leaves a half-written document behind.
#[derive(Debug)]
pub struct JsonFileFlagStore {
    path: PathBuf,
    flags: Mutex<DeviceFlags>,
}

impl JsonFileFlagStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlagStoreError> {
        let path = path.as_ref().to_path_buf();
        let flags = read_document(&path)?;

        Ok(Self {
            path,
            flags: Mutex::new(flags),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OneTimeFlagStore for JsonFileFlagStore {
    fn is_set(&self, device_id: &str, key: &str) -> Result<bool, FlagStoreError> {
        let mut guard = self.flags.lock().expect("flag mutex poisoned");
        if contains(&guard, device_id, key) {
            return Ok(true);
        }

        // another process may have set it since we last looked
        merge(&mut guard, read_document(&self.path)?);
        Ok(contains(&guard, device_id, key))
    }

    fn set(&self, device_id: &str, key: &str) -> Result<(), FlagStoreError> {
        let mut guard = self.flags.lock().expect("flag mutex poisoned");

        // memory only changes once the file write lands
        let mut next = read_document(&self.path)?;
        merge(&mut next, guard.clone());
        next.entry(device_id.to_string())
            .or_default()
            .insert(key.to_string());

        write_document(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

fn contains(flags: &DeviceFlags, device_id: &str, key: &str) -> bool {
    flags
        .get(device_id)
        .is_some_and(|device_flags| device_flags.contains(key))
}

fn merge(into: &mut DeviceFlags, from: DeviceFlags) {
    for (device_id, keys) in from {
        into.entry(device_id).or_default().extend(keys);
    }
}

fn read_document(path: &Path) -> Result<DeviceFlags, FlagStoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(DeviceFlags::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(DeviceFlags::new()),
        Err(err) => Err(err.into()),
    }
}

fn write_document(path: &Path, flags: &DeviceFlags) -> Result<(), FlagStoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let bytes = serde_json::to_vec_pretty(flags)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(&bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}
