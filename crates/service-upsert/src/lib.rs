pub mod api;
pub mod backend;
pub mod cloner;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod registry_auth;
pub mod request;
pub mod resolver;
pub mod spec;

pub use error::{Error, Result};
