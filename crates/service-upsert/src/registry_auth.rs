use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::Serialize;

use crate::error::{Error, Result};

pub const HEADER: &str = "X-Registry-Auth";

/// Value for the `X-Registry-Auth` header.
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// Already encoded; sent verbatim.
    Token(String),
    Credentials {
        username: String,
        password: String,
        server_address: String,
    },
}

#[derive(Serialize)]
struct AuthConfig<'a> {
    username: &'a str,
    password: &'a str,
    serveraddress: &'a str,
}

impl RegistryAuth {
    pub fn token(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else {
            Some(Self::Token(raw.to_string()))
        }
    }

    pub fn header_value(&self) -> Result<String> {
        match self {
            Self::Token(t) => Ok(t.clone()),
            Self::Credentials {
                username,
                password,
                server_address,
            } => {
                let json = serde_json::to_vec(&AuthConfig {
                    username,
                    password,
                    serveraddress: server_address,
                })
                .map_err(|e| Error::Serialization {
                    what: "registry auth".into(),
                    reason: e.to_string(),
                })?;
                Ok(URL_SAFE.encode(json))
            }
        }
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("RegistryAuth::Token(<redacted>)"),
            Self::Credentials {
                username,
                server_address,
                ..
            } => f
                .debug_struct("RegistryAuth::Credentials")
                .field("username", username)
                .field("server_address", server_address)
                .finish_non_exhaustive(),
        }
    }
}
