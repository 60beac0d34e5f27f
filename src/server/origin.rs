use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::common::{CacheKey, Result};

/// Result of fetching a document from the origin
pub enum FetchOutcome {
    /// The file exists; its raw bytes
    File(Vec<u8>),
    /// No file at the resolved path
    NotFound,
}

/// Origin serves files from a document root on cache miss. It also owns
/// path normalisation, since the cache key depends on what is a directory
/// on disk.
pub struct Origin {
    doc_root: PathBuf,
}

impl Origin {
    pub fn new(doc_root: impl Into<PathBuf>) -> Self {
        Self {
            doc_root: doc_root.into(),
        }
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Normalises a request path into a cache key.
    ///
    /// `/` becomes `/index.html`; a path resolving to a directory gets
    /// `/index.html` appended; everything else is used verbatim. Paths with
    /// a `..` segment are refused.
    pub fn normalise(&self, raw_path: &str) -> Option<CacheKey> {
        if raw_path.split('/').any(|segment| segment == "..") {
            return None;
        }

        let mut path = raw_path.to_string();
        if path == "/" {
            path.push_str("index.html");
        } else if self.resolve(&path).is_dir() {
            if !path.ends_with('/') {
                path.push('/');
            }
            path.push_str("index.html");
        }

        Some(CacheKey::new(path))
    }

    /// Reads the document for a normalised key.
    pub fn fetch(&self, key: &CacheKey) -> Result<FetchOutcome> {
        let path = self.resolve(key.as_str());
        match fs::read(&path) {
            Ok(body) => Ok(FetchOutcome::File(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FetchOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, key_path: &str) -> PathBuf {
        self.doc_root.join(key_path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    fn doc_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("index.html")).unwrap();
        f.write_all(b"root index").unwrap();
        let mut f = File::create(dir.path().join("a.html")).unwrap();
        f.write_all(b"A").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut f = File::create(dir.path().join("sub/index.html")).unwrap();
        f.write_all(b"sub index").unwrap();
        dir
    }

    #[test]
    fn test_normalise_verbatim() {
        let dir = doc_root();
        let origin = Origin::new(dir.path());
        assert_eq!(
            origin.normalise("/a.html"),
            Some(CacheKey::new("/a.html"))
        );
    }

    #[test]
    fn test_normalise_root_becomes_index() {
        let dir = doc_root();
        let origin = Origin::new(dir.path());
        assert_eq!(origin.normalise("/"), Some(CacheKey::new("/index.html")));
    }

    #[test]
    fn test_normalise_directory_appends_index() {
        let dir = doc_root();
        let origin = Origin::new(dir.path());
        assert_eq!(
            origin.normalise("/sub"),
            Some(CacheKey::new("/sub/index.html"))
        );
        assert_eq!(
            origin.normalise("/sub/"),
            Some(CacheKey::new("/sub/index.html"))
        );
    }

    #[test]
    fn test_normalise_rejects_traversal() {
        let dir = doc_root();
        let origin = Origin::new(dir.path());
        assert_eq!(origin.normalise("/../etc/passwd"), None);
        assert_eq!(origin.normalise("/a/../../b.html"), None);
    }

    #[test]
    fn test_fetch_existing_file() {
        let dir = doc_root();
        let origin = Origin::new(dir.path());
        let key = origin.normalise("/a.html").unwrap();

        match origin.fetch(&key).unwrap() {
            FetchOutcome::File(body) => assert_eq!(body, b"A"),
            FetchOutcome::NotFound => panic!("expected file"),
        }
    }

    #[test]
    fn test_fetch_missing_file() {
        let dir = doc_root();
        let origin = Origin::new(dir.path());
        let key = origin.normalise("/missing.html").unwrap();

        assert!(matches!(
            origin.fetch(&key).unwrap(),
            FetchOutcome::NotFound
        ));
    }
}
