//! The concrete task library.

pub mod check;
pub mod config;
pub mod meta;
pub mod operate;
pub mod package;
pub mod shell;
pub mod ssh;
pub mod wait;

pub use check::{CheckKind, CheckSys};
pub use config::{InitConfig, MonitoredConfig};
pub use meta::UpdateMeta;
pub use operate::ClusterOperate;
pub use package::{BackupComponent, CopyComponent, CopyFile, Download, InstallPackage};
pub use shell::{Chown, Mkdir, Rmdir, Shell};
pub use ssh::{ClusterSsh, EnvInit, RootSsh, SshKeyGen, SshKeySet, UserSsh};
pub use wait::WaitForPort;
