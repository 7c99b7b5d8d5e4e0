//! Whole-file JSON reads and crash-safe JSON writes

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{BackupError, BackupResult};

/// Read a JSON document, or `T::default()` when there is no file yet
pub fn read_json<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match fs::read(path) {
        Ok(bytes) => parse(path, &bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(storage_error("read", path, e)),
    }
}

/// Read a JSON document that must exist
pub fn read_json_required<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| storage_error("read", path, e))?;
    parse(path, &bytes)
}

/// Replace `path` with `value` serialized as pretty JSON
///
/// The bytes go to `<name>.tmp` next to the target and are renamed over it
/// once synced, so readers see the old document or the new one.
pub fn write_json_atomic<T, P>(path: P, value: &T) -> BackupResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| BackupError::Storage(format!("Cannot encode {}: {}", path.display(), e)))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| storage_error("create directory for", path, e))?;
    }

    let staging = staging_path(path);
    let written = File::create(&staging)
        .and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&staging, path));

    written.map_err(|e| {
        let _ = fs::remove_file(&staging);
        storage_error("write", path, e)
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn parse<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> BackupResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| BackupError::Storage(format!("Cannot parse {}: {}", path.display(), e)))
}

fn storage_error(action: &str, path: &Path, e: io::Error) -> BackupError {
    BackupError::Storage(format!("Cannot {} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Marker {
        label: String,
        count: u64,
    }

    #[test]
    fn test_missing_file_reads_as_default() {
        let temp_dir = TempDir::new().unwrap();
        let map: BTreeMap<String, String> = read_json(temp_dir.path().join("absent.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_write_replaces_and_cleans_staging() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marker.json");

        write_json_atomic(&path, &Marker { label: "a".into(), count: 1 }).unwrap();
        let second = Marker { label: "b".into(), count: 2 };
        write_json_atomic(&path, &second).unwrap();

        assert_eq!(read_json_required::<Marker, _>(&path).unwrap(), second);
        assert!(!temp_dir.path().join("marker.json.tmp").exists());
    }

    #[test]
    fn test_write_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("marker.json");

        write_json_atomic(&path, &Marker::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_failed_rename_keeps_old_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marker.json");
        fs::create_dir(&path).unwrap();

        let err = write_json_atomic(&path, &Marker::default()).unwrap_err();
        assert!(matches!(err, BackupError::Storage(_)));
        assert!(path.is_dir());
        assert!(!temp_dir.path().join("marker.json.tmp").exists());
    }

    #[test]
    fn test_required_read_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marker.json");
        assert!(read_json_required::<Marker, _>(&path).is_err());

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            read_json_required::<Marker, _>(&path),
            Err(BackupError::Storage(_))
        ));
        // Present but unparsable is an error even with a default
        assert!(read_json::<Marker, _>(&path).is_err());
    }
}
