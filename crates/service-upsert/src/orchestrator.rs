//! Resolve, decide, build the final spec, execute, report.
//!
//! One upsert runs front to back on the calling thread. Nothing is retried
//! and nothing is rolled back: whatever the platform reports is what the
//! caller gets.

use std::fmt;

use crate::backend::{BackendKind, ExecutionBackend};
use crate::cloner::{self, Overrides, RoutingConfig};
use crate::error::Error;
use crate::request::UpsertRequest;
use crate::resolver::{Lookup, WorkloadResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Creating,
    Updating,
    Executing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Resolving => "resolving",
            Phase::Creating => "creating",
            Phase::Updating => "updating",
            Phase::Executing => "executing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub target: String,
    pub action: Action,
    pub backend: BackendKind,
    pub success: bool,
    /// Assigned id; only set by a successful create.
    pub id: Option<String>,
    pub message: Option<String>,
}

/// A failed upsert, with the phase it failed in.
#[derive(Debug)]
pub struct UpsertFailure {
    pub target: String,
    pub phase: Phase,
    pub source: Error,
}

impl fmt::Display for UpsertFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upsert of '{}' failed while {}: {}",
            self.target, self.phase, self.source
        )
    }
}

impl std::error::Error for UpsertFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub struct Upsert<'a> {
    resolver: &'a dyn WorkloadResolver,
    remote: &'a dyn ExecutionBackend,
    daemon: &'a dyn ExecutionBackend,
    routing: RoutingConfig,
}

impl<'a> Upsert<'a> {
    pub fn new(
        resolver: &'a dyn WorkloadResolver,
        remote: &'a dyn ExecutionBackend,
        daemon: &'a dyn ExecutionBackend,
        routing: RoutingConfig,
    ) -> Self {
        Self {
            resolver,
            remote,
            daemon,
            routing,
        }
    }

    fn update_backend(&self, req: &UpsertRequest) -> &'a dyn ExecutionBackend {
        match req.update_backend() {
            BackendKind::RemoteApi => self.remote,
            BackendKind::LocalDaemon => self.daemon,
        }
    }

    pub fn run(&self, req: &UpsertRequest) -> std::result::Result<UpsertOutcome, UpsertFailure> {
        let target = req.target_name.as_str();
        let span = tracing::info_span!("upsert", service = %target);
        let _guard = span.enter();

        let fail = |phase: Phase| {
            move |source: Error| UpsertFailure {
                target: target.to_string(),
                phase,
                source,
            }
        };

        req.validate().map_err(fail(Phase::Resolving))?;

        tracing::debug!(phase = %Phase::Resolving, "looking up target");
        let lookup = self
            .resolver
            .resolve(target)
            .map_err(fail(Phase::Resolving))?;

        match lookup {
            Lookup::NotFound => {
                tracing::warn!(
                    phase = %Phase::Creating,
                    template = %req.template_name,
                    "target does not exist yet, creating it from template"
                );
                self.create(req).map_err(|(phase, e)| fail(phase)(e))
            }
            Lookup::Found(handle) => {
                tracing::info!(
                    phase = %Phase::Updating,
                    version = handle.version_index(),
                    image = handle.spec.image(),
                    "target exists, updating in place"
                );
                let spec = cloner::update_spec(
                    &handle.spec,
                    &req.image,
                    req.routing_domain(),
                    &self.routing,
                );
                let next = handle.with_spec(spec);
                let backend = self.update_backend(req);
                tracing::debug!(
                    phase = %Phase::Executing,
                    backend = %backend.kind(),
                    "submitting update"
                );
                let ok = backend
                    .update(&next, req.registry_auth.as_ref())
                    .map_err(fail(Phase::Executing))?;
                if ok {
                    tracing::info!(backend = %backend.kind(), "service updated");
                } else {
                    tracing::error!(backend = %backend.kind(), "update was not accepted");
                }
                Ok(UpsertOutcome {
                    target: target.to_string(),
                    action: Action::Updated,
                    backend: backend.kind(),
                    success: ok,
                    id: None,
                    message: (!ok).then(|| "update was not accepted".to_string()),
                })
            }
        }
    }

    fn create(&self, req: &UpsertRequest) -> std::result::Result<UpsertOutcome, (Phase, Error)> {
        let template_name = req.template_name.trim();
        if template_name.is_empty() {
            return Err((
                Phase::Creating,
                Error::validation(format!(
                    "'{}' does not exist and no template was given",
                    req.target_name
                )),
            ));
        }
        let template = match self
            .resolver
            .resolve(template_name)
            .map_err(|e| (Phase::Creating, e))?
        {
            Lookup::Found(h) => h,
            Lookup::NotFound => {
                return Err((
                    Phase::Creating,
                    Error::validation(format!(
                        "neither '{}' nor template '{template_name}' exist",
                        req.target_name
                    )),
                ));
            }
        };

        let spec = cloner::clone_spec(
            &template.spec,
            &Overrides {
                name: &req.target_name,
                image: &req.image,
                routing_domain: req.routing_domain(),
            },
            &self.routing,
        );

        tracing::debug!(
            phase = %Phase::Executing,
            backend = %self.remote.kind(),
            "submitting create"
        );
        let created = self
            .remote
            .create(&spec, req.registry_auth.as_ref())
            .map_err(|e| (Phase::Executing, e))?;
        for w in &created.warnings {
            tracing::warn!(warning = %w, "create warning");
        }

        let success = created.succeeded();
        if success {
            tracing::info!(id = %created.id, "service created");
        } else {
            tracing::error!(message = %created.message, "create was not accepted");
        }
        Ok(UpsertOutcome {
            target: req.target_name.clone(),
            action: Action::Created,
            backend: self.remote.kind(),
            success,
            id: success.then(|| created.id.clone()),
            message: Some(created.message).filter(|m| !m.trim().is_empty()),
        })
    }
}

/// Convenience for callers that only care about pass/fail.
pub fn exit_code(result: &std::result::Result<UpsertOutcome, UpsertFailure>) -> i32 {
    match result {
        Ok(o) if o.success => 0,
        _ => 1,
    }
}
