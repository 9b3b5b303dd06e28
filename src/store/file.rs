//! File-based key-value persistence with secure permissions.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::KeyValueStore;
use crate::error::Error;

/// Persistence in a single JSON object file, written with 0600 permissions.
///
/// The whole file is replaced on every change (temp file + rename in the
/// same directory); it only ever holds a couple of short strings. A file
/// that no longer parses is reported by `get` and overwritten by the next
/// `set` or `remove`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
}

impl FileKeyValueStore {
    /// Create storage at the specified path. Nothing is touched on disk
    /// until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, Error> {
        self.read_raw()?
            .map_or(Ok(BTreeMap::new()), |content| {
                serde_json::from_str(&content)
                    .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
            })
    }

    /// Current contents for a read-modify-write. An unparseable file is
    /// treated as empty (`true` in the second slot) so it gets replaced.
    /// I/O errors still fail the write.
    fn read_for_update(&self) -> Result<(BTreeMap<String, String>, bool), Error> {
        let Some(content) = self.read_raw()? else {
            return Ok((BTreeMap::new(), false));
        };
        match serde_json::from_str(&content) {
            Ok(data) => Ok((data, false)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discarding unreadable session file"
                );
                Ok((BTreeMap::new(), true))
            }
        }
    }

    /// File content, or `None` when the file is missing or blank.
    fn read_raw(&self) -> Result<Option<String>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| storage_io(&self.path, &e))?;
        Ok(Some(content).filter(|c| !c.trim().is_empty()))
    }

    fn write_all(&self, data: &BTreeMap<String, String>) -> Result<(), Error> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| storage_io(parent, &e))?;

        let content = serde_json::to_string_pretty(data)?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| storage_io(parent, &e))?;
        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| storage_io(tmp.path(), &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(tmp.path(), perms)
                .map_err(|e| storage_io(tmp.path(), &e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| storage_io(&self.path, &e.error))?;

        tracing::debug!(path = %self.path.display(), "Session file written");
        Ok(())
    }
}

fn storage_io(path: &Path, e: &std::io::Error) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let (mut data, _) = self.read_for_update()?;
        data.insert(key.to_owned(), value.to_owned());
        self.write_all(&data)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let (mut data, recovered) = self.read_for_update()?;
        if data.remove(key).is_none() && !recovered {
            return Ok(());
        }
        self.write_all(&data)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("session.json"));

        assert!(store.get("kc_token").unwrap().is_none());
        store.remove("kc_token").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        FileKeyValueStore::new(&path).set("kc_token", "abc").unwrap();
        FileKeyValueStore::new(&path)
            .set("kc_refresh_token", "def")
            .unwrap();

        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(reopened.get("kc_token").unwrap().as_deref(), Some("abc"));
        assert_eq!(
            reopened.get("kc_refresh_token").unwrap().as_deref(),
            Some("def")
        );

        reopened.remove("kc_token").unwrap();
        assert!(FileKeyValueStore::new(&path).get("kc_token").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileKeyValueStore::new(&path).get("kc_token").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn corrupt_file_is_overwritten_by_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"kc_tok"#).unwrap();
        let store = FileKeyValueStore::new(&path);

        store.set("kc_token", "fresh").unwrap();

        assert_eq!(store.get("kc_token").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn corrupt_file_is_reset_by_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileKeyValueStore::new(&path);

        store.remove("kc_refresh_token").unwrap();

        assert!(store.get("kc_token").unwrap().is_none());
        assert!(store.get("kc_refresh_token").unwrap().is_none());
    }

    #[test]
    fn writes_leave_no_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("session.json"));

        store.set("kc_token", "a").unwrap();
        store.set("kc_token", "b").unwrap();
        store.remove("kc_token").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("session.json"));
        store.set("kc_token", "abc").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
