use regex::Regex;

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::registry_auth::RegistryAuth;

/// Names the platform accepts for services.
const SERVICE_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]*$";

fn check_service_name(role: &str, name: &str) -> Result<()> {
    let re = Regex::new(SERVICE_NAME_PATTERN)
        .map_err(|e| Error::validation(format!("invalid service name pattern: {e}")))?;
    if !re.is_match(name) {
        return Err(Error::validation(format!(
            "{role} name '{name}' must match {SERVICE_NAME_PATTERN}"
        )));
    }
    Ok(())
}

/// Everything one upsert needs, fixed before the run starts.
#[derive(Debug, Clone)]
pub struct UpsertRequest {
    pub target_name: String,
    pub template_name: String,
    pub image: String,
    pub routing_domain: Option<String>,
    pub registry_auth: Option<RegistryAuth>,
    pub use_daemon_fallback: bool,
}

impl UpsertRequest {
    pub fn new(
        target_name: impl Into<String>,
        template_name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            template_name: template_name.into(),
            image: image.into(),
            routing_domain: None,
            registry_auth: None,
            use_daemon_fallback: false,
        }
    }

    pub fn with_routing_domain(mut self, domain: impl Into<String>) -> Self {
        self.routing_domain = Some(domain.into());
        self
    }

    pub fn with_registry_auth(mut self, auth: RegistryAuth) -> Self {
        self.registry_auth = Some(auth);
        self
    }

    pub fn with_daemon_fallback(mut self, enabled: bool) -> Self {
        self.use_daemon_fallback = enabled;
        self
    }

    /// Routing domain, with blank values treated as absent.
    pub fn routing_domain(&self) -> Option<&str> {
        self.routing_domain
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn update_backend(&self) -> BackendKind {
        if self.use_daemon_fallback {
            BackendKind::LocalDaemon
        } else {
            BackendKind::RemoteApi
        }
    }

    /// Checks the fields every path needs. The template is only required once
    /// the target turns out to be missing, so its presence is checked by the
    /// orchestrator; a non-blank template must still be a valid name.
    pub fn validate(&self) -> Result<()> {
        if self.target_name.trim().is_empty() {
            return Err(Error::validation("target name is empty"));
        }
        if self.image.trim().is_empty() {
            return Err(Error::validation(format!(
                "image is empty for '{}'",
                self.target_name
            )));
        }
        check_service_name("target", &self.target_name)?;
        let template = self.template_name.trim();
        if !template.is_empty() {
            check_service_name("template", template)?;
        }
        Ok(())
    }
}
