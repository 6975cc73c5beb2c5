use crate::error::Result;
use crate::spec::WorkloadHandle;

/// Outcome of a lookup. A missing service is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(WorkloadHandle),
    NotFound,
}

pub trait WorkloadResolver {
    /// Looks up a service by name or id. Transport and decode failures are
    /// errors; an unknown name is `Lookup::NotFound`.
    fn resolve(&self, name_or_id: &str) -> Result<Lookup>;
}
