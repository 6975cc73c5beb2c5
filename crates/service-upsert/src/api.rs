//! Blocking client for the engine's service endpoints.
//!
//! One client serves both as the resolver and as the remote-API backend.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::backend::{BackendKind, CreateOutcome, ExecutionBackend};
use crate::error::{Error, Result};
use crate::registry_auth::{self, RegistryAuth};
use crate::resolver::{Lookup, WorkloadResolver};
use crate::spec::{WorkloadHandle, WorkloadSpec};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2375";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CreateResponse {
    #[serde(rename = "ID")]
    id: String,
    message: String,
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
}

/// Pulls `message` out of an engine error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) if !b.message.trim().is_empty() => b.message.trim().to_string(),
        _ => body.trim().to_string(),
    }
}

fn is_version_conflict(status: StatusCode, message: &str) -> bool {
    status == StatusCode::CONFLICT
        || message.to_ascii_lowercase().contains("update out of sequence")
}

#[derive(Debug, Clone)]
pub struct ManagementApi {
    base: String,
    base_url: Url,
    timeout: Duration,
    client: Client,
}

impl ManagementApi {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base = endpoint.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(Error::config("management endpoint is empty"));
        }
        let base_url = Url::parse(&base)
            .map_err(|e| Error::config(format!("invalid management endpoint '{base}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "management endpoint '{base}' cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport {
                endpoint: base.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base,
            base_url,
            timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base
    }

    /// Appends `segments` to the endpoint path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::config(format!(
                    "management endpoint '{}' cannot carry a path",
                    self.base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, req: RequestBuilder, what: &str) -> Result<(StatusCode, String)> {
        let res = req.send().map_err(|e| self.transport_error(what, e))?;
        let status = res.status();
        let body = res.text().map_err(|e| self.transport_error(what, e))?;
        tracing::debug!(%status, bytes = body.len(), "{what}");
        Ok((status, body))
    }

    fn transport_error(&self, what: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            return Error::Timeout {
                what: what.to_string(),
                after: self.timeout,
            };
        }
        Error::Transport {
            endpoint: self.base.clone(),
            reason: format!("{what}: {err}"),
        }
    }

    fn with_json(
        &self,
        req: RequestBuilder,
        spec: &WorkloadSpec,
        auth: Option<&RegistryAuth>,
    ) -> Result<RequestBuilder> {
        let body = serde_json::to_vec(spec).map_err(|e| Error::Serialization {
            what: format!("spec for '{}'", spec.name),
            reason: e.to_string(),
        })?;
        let mut req = req.header(CONTENT_TYPE, "application/json").body(body);
        if let Some(auth) = auth {
            req = req.header(registry_auth::HEADER, auth.header_value()?);
        }
        Ok(req)
    }

    pub fn inspect_service(&self, name_or_id: &str) -> Result<Lookup> {
        let url = self.url(&["services", name_or_id])?;
        let what = format!("GET {url}");
        tracing::debug!("{what}");
        let (status, body) = self.send(self.client.get(url), &what)?;

        if status == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if !status.is_success() {
            return Err(Error::Remote {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Lookup::NotFound);
        }
        let handle: WorkloadHandle =
            serde_json::from_str(&body).map_err(|e| Error::Serialization {
                what: format!("service '{name_or_id}'"),
                reason: e.to_string(),
            })?;
        if handle.spec.name.trim().is_empty() {
            return Ok(Lookup::NotFound);
        }
        Ok(Lookup::Found(handle))
    }

    pub fn create_service(
        &self,
        spec: &WorkloadSpec,
        auth: Option<&RegistryAuth>,
    ) -> Result<CreateOutcome> {
        let url = self.url(&["services", "create"])?;
        let what = format!("POST {url}");
        tracing::debug!(name = %spec.name, image = spec.image(), "{what}");
        let req = self.with_json(self.client.post(url), spec, auth)?;
        let (status, body) = self.send(req, &what)?;

        if !status.is_success() {
            return Ok(CreateOutcome {
                message: format!("{status}: {}", error_message(&body)),
                ..Default::default()
            });
        }
        let parsed: CreateResponse =
            serde_json::from_str(&body).map_err(|e| Error::Serialization {
                what: "create response".into(),
                reason: e.to_string(),
            })?;
        Ok(CreateOutcome {
            id: parsed.id,
            message: parsed.message,
            warnings: parsed.warnings.unwrap_or_default(),
        })
    }

    pub fn update_service(
        &self,
        handle: &WorkloadHandle,
        auth: Option<&RegistryAuth>,
    ) -> Result<bool> {
        let version = handle.version_index();
        let mut url = self.url(&["services", handle.name(), "update"])?;
        url.query_pairs_mut()
            .append_pair("version", &version.to_string());
        let what = format!("POST {url}");
        tracing::debug!(image = handle.spec.image(), "{what}");
        let req = self.with_json(self.client.post(url), &handle.spec, auth)?;
        let (status, body) = self.send(req, &what)?;

        if status.is_success() {
            return Ok(true);
        }
        let message = error_message(&body);
        if is_version_conflict(status, &message) {
            return Err(Error::VersionConflict {
                name: handle.name().to_string(),
                version,
            });
        }
        tracing::warn!(%status, %message, "update rejected");
        Ok(false)
    }
}

impl WorkloadResolver for ManagementApi {
    fn resolve(&self, name_or_id: &str) -> Result<Lookup> {
        self.inspect_service(name_or_id)
    }
}

impl ExecutionBackend for ManagementApi {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteApi
    }

    fn create(&self, spec: &WorkloadSpec, auth: Option<&RegistryAuth>) -> Result<CreateOutcome> {
        self.create_service(spec, auth)
    }

    fn update(&self, handle: &WorkloadHandle, auth: Option<&RegistryAuth>) -> Result<bool> {
        self.update_service(handle, auth)
    }
}
