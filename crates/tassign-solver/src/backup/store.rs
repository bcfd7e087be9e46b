use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

fn file_name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^([A-Za-z0-9.%-]+)_([A-Za-z0-9._%-]*)\.json(\.part)?$").unwrap())
}

/// Percent-encodes every byte outside `[A-Za-z0-9.-]`, plus `_` unless
/// `keep_underscore` is set.
fn encode_key(key: &str, keep_underscore: bool) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' => encoded.push(byte as char),
            b'_' if keep_underscore => encoded.push('_'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

/// Decoded id and partial flag of a backup file name with the given type
/// prefix.
fn parse_file_name(name: &str, prefix: &str) -> Option<(String, bool)> {
    let captures = file_name_regex().captures(name)?;
    if &captures[1] != prefix {
        return None;
    }
    Some((decode_key(&captures[2])?, captures.get(3).is_some()))
}

/// A backup file found in the store folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub id: String,
    pub path: PathBuf,
    /// Left over from an interrupted write.
    pub partial: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Folder of backup documents, one file per `(type, id)`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    /// Root directory of the store
    root: PathBuf,
}

impl BackupStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the document for `(kind, id)`. Distinct pairs always
    /// map to distinct file names.
    pub fn path(&self, kind: &str, id: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.json", encode_key(kind, false), encode_key(id, true)))
    }

    pub fn has(&self, kind: &str, id: &str) -> bool {
        self.path(kind, id).is_file()
    }

    /// Read a document
    ///
    /// # Returns
    /// * `Ok(Some(data))` - Document was found and read
    /// * `Ok(None)` - No document for the key
    /// * `Err(e)` - IO error occurred
    pub fn read(&self, kind: &str, id: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(kind, id)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a document, replacing any previous one. The data goes to a
    /// partial file first; on failure the partial file is removed.
    pub fn write(&self, kind: &str, id: &str, data: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.path(kind, id);
        let partial = path.with_extension("json.part");

        let result = fs::write(&partial, data).and_then(|_| fs::rename(&partial, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        Ok(path)
    }

    /// Delete a document; missing documents are not an error
    pub fn remove(&self, kind: &str, id: &str) -> io::Result<()> {
        match fs::remove_file(self.path(kind, id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Backup files of one type, partial files included. Other files in the
    /// folder are not listed.
    pub fn entries(&self, kind: &str) -> io::Result<Vec<BackupEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = encode_key(kind, false);
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some((id, partial)) = entry.file_name().to_str().and_then(|name| parse_file_name(name, &prefix))
            else {
                continue;
            };
            let metadata = entry.metadata().map_err(io::Error::from)?;
            entries.push(BackupEntry {
                id,
                path: entry.into_path(),
                partial,
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id).then(a.partial.cmp(&b.partial)));
        Ok(entries)
    }

    /// Removes backups of one type not modified within `ttl`, and their
    /// leftover partial files.
    ///
    /// # Returns
    /// Number of bytes freed
    pub fn gc(&self, kind: &str, ttl: Duration) -> io::Result<u64> {
        let now = SystemTime::now();
        let mut freed = 0u64;
        for entry in self.entries(kind)? {
            let expired = entry
                .modified
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > ttl);
            if !expired {
                continue;
            }
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    log::debug!("Removed expired backup {}", entry.path.display());
                    freed += entry.size;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(freed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_encoding() {
        let store = BackupStore::new("/tmp");
        assert_eq!(
            store.path("tassign", "User A"),
            PathBuf::from("/tmp/tassign_User%20A.json")
        );
        assert_eq!(
            store.path("tassign", "InstrSchd_12/34"),
            PathBuf::from("/tmp/tassign_InstrSchd_12%2F34.json")
        );
        assert_eq!(decode_key("InstrSchd_12%2F34").as_deref(), Some("InstrSchd_12/34"));
        assert_eq!(decode_key("bad%2"), None);
    }

    #[test]
    fn test_distinct_ids_get_distinct_paths() {
        let store = BackupStore::new("/tmp");
        let pairs = [
            (("tassign", "Alice"), ("tassign", "alice")),
            (("tassign", "a/b"), ("tassign", "a-b")),
            (("tassign", "a b"), ("tassign", "a%20b")),
            (("tassign_x", "y"), ("tassign", "x_y")),
        ];
        for ((k1, i1), (k2, i2)) in pairs {
            assert_ne!(store.path(k1, i1), store.path(k2, i2), "{}/{} vs {}/{}", k1, i1, k2, i2);
        }
    }

    #[test]
    fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path().join("backups"));

        assert!(!store.has("tassign", "1"));
        assert!(store.read("tassign", "1").unwrap().is_none());

        store.write("tassign", "1", b"first").unwrap();
        store.write("tassign", "1", b"second").unwrap();
        assert_eq!(store.read("tassign", "1").unwrap(), Some(b"second".to_vec()));
        assert!(!store.path("tassign", "1").with_extension("json.part").exists());

        store.write("tassign", "Alice", b"upper").unwrap();
        store.write("tassign", "alice", b"lower").unwrap();
        assert_eq!(store.read("tassign", "Alice").unwrap(), Some(b"upper".to_vec()));

        store.remove("tassign", "1").unwrap();
        assert!(!store.has("tassign", "1"));
        store.remove("tassign", "1").unwrap();
    }

    #[test]
    fn test_entries_decode_ids() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path());
        store.write("tassign", "a/b", b"1").unwrap();
        store.write("tassign", "User A", b"22").unwrap();
        store.write("other", "x", b"333").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let entries = store.entries("tassign").unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["User A", "a/b"]);
        assert!(entries.iter().all(|e| !e.partial));
        assert_eq!(entries[0].size, 2);
    }

    #[test]
    fn test_gc() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path());
        store.write("tassign", "old", b"12345").unwrap();
        fs::write(dir.path().join("tassign_stale.json.part"), b"12").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
        fs::write(dir.path().join("tassign.toml"), b"keep me").unwrap();
        store.write("other", "old", b"keep me").unwrap();

        assert_eq!(store.gc("tassign", Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.gc("tassign", Duration::from_millis(1)).unwrap(), 7);
        assert!(!store.has("tassign", "old"));
        assert!(!dir.path().join("tassign_stale.json.part").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("tassign.toml").exists());
        assert!(store.has("other", "old"));
    }

    #[test]
    fn test_gc_on_missing_folder() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path().join("none"));
        assert_eq!(store.gc("tassign", Duration::ZERO).unwrap(), 0);
    }
}
