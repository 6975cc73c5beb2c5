use std::fmt;

use crate::error::Result;
use crate::registry_auth::RegistryAuth;
use crate::spec::{WorkloadHandle, WorkloadSpec};

pub mod daemon;

pub use daemon::DaemonCli;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    RemoteApi,
    LocalDaemon,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::RemoteApi => f.write_str("remote-api"),
            BackendKind::LocalDaemon => f.write_str("local-daemon"),
        }
    }
}

/// What a create call reported. `id` is empty when the platform refused it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOutcome {
    pub id: String,
    pub message: String,
    pub warnings: Vec<String>,
}

impl CreateOutcome {
    pub fn succeeded(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// Something that can apply a final spec to the platform.
///
/// `update` returns `Ok(false)` for a plain refusal and reserves `Err` for
/// failures the caller has to tell apart (conflict, timeout, transport).
pub trait ExecutionBackend {
    fn kind(&self) -> BackendKind;

    fn create(&self, spec: &WorkloadSpec, auth: Option<&RegistryAuth>) -> Result<CreateOutcome>;

    /// `handle` carries the desired spec and the version index observed by
    /// the resolve that produced it.
    fn update(&self, handle: &WorkloadHandle, auth: Option<&RegistryAuth>) -> Result<bool>;
}
