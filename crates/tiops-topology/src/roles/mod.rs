//! One module per component role.
//!
//! Each module materializes the role's instances from the topology and
//! implements the [`crate::Instance`] capabilities: identity, claimed
//! ports and directories, status probing, and rendering of the
//! on-host artifacts.

pub mod alertmanager;
pub(crate) mod common;
pub mod drainer;
pub mod grafana;
pub mod monitored;
pub mod pd;
pub mod prometheus;
pub mod pump;
pub mod tidb;
pub mod tiflash;
pub mod tikv;
