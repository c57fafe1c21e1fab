//! Package movement: mirror downloads, uploads, backups and installs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use sha1::{Digest, Sha1};
use tiops_profile::Profile;
use tracing::{debug, info};

use crate::context::Context;
use crate::error::{Result, TaskError};
use crate::mirror::Mirror;
use crate::task::Task;

/// Hex SHA1 of a file's content.
fn sha1_of(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha1::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Verifies `file` against the first token of its `.sha1` sidecar.
fn verify_sha1(file: &Path, sha_file: &Path) -> Result<()> {
    let expected = std::fs::read_to_string(sha_file)?;
    let expected = expected.split_whitespace().next().unwrap_or("").to_string();
    let actual = sha1_of(file)?;
    if expected != actual {
        return Err(TaskError::ChecksumMismatch {
            file: file.to_string_lossy().into_owned(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Concurrent downloads of the same package serialize on a per-key
/// mutex and re-verify after any write.
fn download_lock(key: &str) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = locks.lock().unwrap_or_else(|e| e.into_inner());
    map.entry(key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Ensures a component tarball and its checksum are present and valid
/// in the local package cache.
pub struct Download {
    component: String,
    version: String,
    os: String,
    arch: String,
    profile: Profile,
    mirror: Arc<dyn Mirror>,
}

impl Download {
    /// Creates the task.
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
        profile: Profile,
        mirror: Arc<dyn Mirror>,
    ) -> Self {
        Self {
            component: component.into(),
            version: version.into(),
            os: os.into(),
            arch: arch.into(),
            profile,
            mirror,
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}.tar.gz",
            self.component, self.version, self.os, self.arch
        )
    }
}

impl Task for Download {
    fn execute(&self, _ctx: &Context) -> Result<()> {
        let file_name = self.file_name();
        let sha_name = format!(
            "{}-{}-{}-{}.sha1",
            self.component, self.version, self.os, self.arch
        );
        let packages = self.profile.packages_dir();
        let tarball = packages.join(&file_name);
        let sha_file = packages.join(&sha_name);

        let lock = download_lock(&file_name);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if tarball.exists() && sha_file.exists() && verify_sha1(&tarball, &sha_file).is_ok() {
            debug!(package = %file_name, "Package already cached");
            return Ok(());
        }

        info!(package = %file_name, "Downloading package");
        self.mirror.download(&file_name, &packages)?;
        self.mirror.download(&sha_name, &packages)?;

        if let Err(e) = verify_sha1(&tarball, &sha_file) {
            let _ = std::fs::remove_file(&tarball);
            let _ = std::fs::remove_file(&sha_file);
            return Err(e);
        }
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "Download: component={}, version={}",
            self.component, self.version
        )
    }
}

/// Uploads one local file to a host.
pub struct CopyFile {
    src: PathBuf,
    host: String,
    dst: String,
}

impl CopyFile {
    /// Creates the task.
    pub fn new(src: impl Into<PathBuf>, host: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            host: host.into(),
            dst: dst.into(),
        }
    }
}

impl Task for CopyFile {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        exec.transfer(&self.src.to_string_lossy(), &self.dst, false)?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "CopyFile: src={}, host={}, dst={}",
            self.src.display(),
            self.host,
            self.dst
        )
    }
}

/// Ships a cached component package to a host and unpacks it under
/// `<deploy_dir>/bin`.
///
/// A patched package under the cluster's `patch/` directory takes
/// precedence over the cache, so patched clusters scale out with the
/// patched binary.
pub struct CopyComponent {
    component: String,
    version: String,
    os: String,
    arch: String,
    host: String,
    deploy_dir: String,
    cluster: String,
    profile: Profile,
}

impl CopyComponent {
    /// Creates the task.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
        host: impl Into<String>,
        deploy_dir: impl Into<String>,
        cluster: impl Into<String>,
        profile: Profile,
    ) -> Self {
        Self {
            component: component.into(),
            version: version.into(),
            os: os.into(),
            arch: arch.into(),
            host: host.into(),
            deploy_dir: deploy_dir.into(),
            cluster: cluster.into(),
            profile,
        }
    }
}

impl Task for CopyComponent {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let patched = self
            .profile
            .cluster_path(&self.cluster, format!("patch/{}.tar.gz", self.component));
        let src = if patched.exists() {
            info!(component = %self.component, "Using patched package");
            patched
        } else {
            let cached =
                self.profile
                    .package_path(&self.component, &self.version, &self.os, &self.arch);
            if !cached.exists() {
                return Err(TaskError::PackageNotFound(
                    cached.to_string_lossy().into_owned(),
                ));
            }
            cached
        };

        install_package(ctx, &src, &self.host, &self.deploy_dir)
    }

    fn stringify(&self) -> String {
        format!(
            "CopyComponent: component={}, version={}, remote={}:{}",
            self.component, self.version, self.host, self.deploy_dir
        )
    }
}

/// Uploads `package` to the host and extracts it into
/// `<deploy_dir>/bin`.
fn install_package(ctx: &Context, package: &Path, host: &str, deploy_dir: &str) -> Result<()> {
    let exec = ctx
        .get_executor(host)
        .ok_or_else(|| TaskError::NoExecutor(host.to_string()))?;

    let file = package
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package.tar.gz".to_string());
    let bin_dir = format!("{}/bin", deploy_dir);
    let staged = format!("{}/{}", bin_dir, file);

    exec.transfer(&package.to_string_lossy(), &staged, false)?;
    exec.exec(
        &format!("tar -xzf {} -C {} && rm {}", staged, bin_dir, staged),
        None,
        false,
    )?;
    Ok(())
}

/// Snapshots a host's current binaries before they are replaced.
pub struct BackupComponent {
    component: String,
    version: String,
    host: String,
    deploy_dir: String,
}

impl BackupComponent {
    /// Creates the task.
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        host: impl Into<String>,
        deploy_dir: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            version: version.into(),
            host: host.into(),
            deploy_dir: deploy_dir.into(),
        }
    }

    fn backup_path(&self) -> String {
        format!(
            "{}/bin-backup-{}-{}.tar.gz",
            self.deploy_dir, self.component, self.version
        )
    }
}

impl Task for BackupComponent {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        exec.exec(
            &format!(
                "tar -czf {} -C {} bin",
                self.backup_path(),
                self.deploy_dir
            ),
            None,
            false,
        )?;
        Ok(())
    }

    /// Restores the snapshot taken by `execute`.
    fn rollback(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        exec.exec(
            &format!("tar -xzf {} -C {}", self.backup_path(), self.deploy_dir),
            None,
            false,
        )?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "BackupComponent: component={}, remote={}:{}",
            self.component, self.host, self.deploy_dir
        )
    }
}

/// Uploads a local package and extracts it in place.
pub struct InstallPackage {
    package: PathBuf,
    host: String,
    deploy_dir: String,
}

impl InstallPackage {
    /// Creates the task.
    pub fn new(
        package: impl Into<PathBuf>,
        host: impl Into<String>,
        deploy_dir: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            host: host.into(),
            deploy_dir: deploy_dir.into(),
        }
    }
}

impl Task for InstallPackage {
    fn execute(&self, ctx: &Context) -> Result<()> {
        install_package(ctx, &self.package, &self.host, &self.deploy_dir)
    }

    fn stringify(&self) -> String {
        format!(
            "InstallPackage: package={}, remote={}:{}",
            self.package.display(),
            self.host,
            self.deploy_dir
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::DirMirror;

    fn sha1_hex(data: &[u8]) -> String {
        Sha1::digest(data)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn mirror_with_package(
        dir: &Path,
        name: &str,
        content: &[u8],
        sha: Option<&str>,
    ) -> DirMirror {
        std::fs::write(dir.join(format!("{name}.tar.gz")), content).unwrap();
        let sha = sha.map(str::to_string).unwrap_or_else(|| sha1_hex(content));
        std::fs::write(dir.join(format!("{name}.sha1")), format!("{sha}\n")).unwrap();
        DirMirror::new(dir)
    }

    #[test]
    fn test_download_fetches_and_verifies() {
        let mirror_dir = tempfile::tempdir().unwrap();
        let profile_dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(profile_dir.path()).unwrap();
        let mirror = mirror_with_package(
            mirror_dir.path(),
            "tikv-v4.0.0-linux-amd64",
            b"tarball-bytes",
            None,
        );

        let task = Download::new(
            "tikv",
            "v4.0.0",
            "linux",
            "amd64",
            profile.clone(),
            Arc::new(mirror),
        );
        task.execute(&Context::new()).unwrap();

        assert!(profile
            .package_path("tikv", "v4.0.0", "linux", "amd64")
            .exists());

        // A second run is a cache hit and must also succeed.
        task.execute(&Context::new()).unwrap();
    }

    #[test]
    fn test_download_rejects_checksum_mismatch() {
        let mirror_dir = tempfile::tempdir().unwrap();
        let profile_dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(profile_dir.path()).unwrap();
        let mirror = mirror_with_package(
            mirror_dir.path(),
            "pd-v4.0.0-linux-amd64",
            b"tarball-bytes",
            Some("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"),
        );

        let task = Download::new(
            "pd",
            "v4.0.0",
            "linux",
            "amd64",
            profile.clone(),
            Arc::new(mirror),
        );
        let err = task.execute(&Context::new()).unwrap_err();
        assert!(matches!(err, TaskError::ChecksumMismatch { .. }), "{err}");
        // The corrupt download must not stay in the cache.
        assert!(!profile
            .package_path("pd", "v4.0.0", "linux", "amd64")
            .exists());
    }

    #[test]
    fn test_copy_component_requires_cached_package() {
        let profile_dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(profile_dir.path()).unwrap();
        let task = CopyComponent::new(
            "tikv",
            "v4.0.0",
            "linux",
            "amd64",
            "10.0.0.1",
            "/deploy",
            "foo",
            profile,
        );
        let err = task.execute(&Context::new()).unwrap_err();
        assert!(matches!(err, TaskError::PackageNotFound(_)));
    }
}
