//! Package mirror access.
//!
//! The repository serving component tarballs is an external
//! collaborator; tasks reach it through this trait so tests can serve
//! packages from a directory.

use std::path::Path;

use crate::error::{Result, TaskError};

/// A source of component packages.
pub trait Mirror: Send + Sync {
    /// Prepares the mirror for downloads.
    fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Fetches `file_name` into `dst_dir`.
    fn download(&self, file_name: &str, dst_dir: &Path) -> Result<()>;

    /// Releases any resources held open.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Mirror backed by an HTTP file server.
pub struct HttpMirror {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpMirror {
    /// Creates a mirror rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Mirror for HttpMirror {
    fn download(&self, file_name: &str, dst_dir: &Path) -> Result<()> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), file_name);
        let resp = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| TaskError::Download {
                file: file_name.to_string(),
                reason: e.to_string(),
            })?;
        let body = resp.bytes().map_err(|e| TaskError::Download {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;

        std::fs::create_dir_all(dst_dir)?;
        std::fs::write(dst_dir.join(file_name), &body)?;
        Ok(())
    }
}

/// Mirror backed by a local directory, used by tests and air-gapped
/// installs.
pub struct DirMirror {
    root: std::path::PathBuf,
}

impl DirMirror {
    /// Creates a mirror over `root`.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Mirror for DirMirror {
    fn download(&self, file_name: &str, dst_dir: &Path) -> Result<()> {
        let src = self.root.join(file_name);
        if !src.exists() {
            return Err(TaskError::Download {
                file: file_name.to_string(),
                reason: format!("{} not present in mirror", src.display()),
            });
        }
        std::fs::create_dir_all(dst_dir)?;
        std::fs::copy(&src, dst_dir.join(file_name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_mirror_copies_file() {
        let root = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("pkg.tar.gz"), b"bytes").unwrap();

        let mirror = DirMirror::new(root.path());
        mirror.download("pkg.tar.gz", dst.path()).unwrap();
        assert_eq!(std::fs::read(dst.path().join("pkg.tar.gz")).unwrap(), b"bytes");
    }

    #[test]
    fn test_dir_mirror_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let err = DirMirror::new(root.path())
            .download("nope.tar.gz", dst.path())
            .unwrap_err();
        assert!(matches!(err, TaskError::Download { .. }));
    }
}
