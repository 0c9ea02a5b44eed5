//! The boundary to the surrounding analytics platform.
//!
//! Everything the sandbox is NOT responsible for — data-source lookup,
//! stored-query storage, prior results — lives behind [`HostServices`].
//! The sandbox only ever sees opaque handles and frames.

pub mod static_host;
pub mod template;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SandboxError;
use crate::result::frame::Frame;

/// A downstream failure from the platform (missing query, data-source
/// error, …). The underlying message text is carried verbatim.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<HostError> for SandboxError {
    fn from(err: HostError) -> Self {
        SandboxError::host(err.0)
    }
}

/// A data source, by stable id or by display name — scripts may use either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Id(i64),
    Name(String),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Id(id) => write!(f, "{id}"),
            SourceRef::Name(name) => f.write_str(name),
        }
    }
}

/// A stored query as the platform knows it: its text plus the source it
/// runs against. Template parameters in the text are unresolved.
#[derive(Debug, Clone)]
pub struct StoredQuery {
    pub id: i64,
    pub data_source: SourceRef,
    pub query_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaTable {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Platform services injected into the sandbox namespace. Implementations
/// must be shareable across concurrently running executions.
pub trait HostServices: Send + Sync {
    /// Look up a stored query by id.
    fn get_query(&self, query_id: i64) -> Result<StoredQuery, HostError>;

    /// The latest computed result of a stored query. Having no computed
    /// result yet is an error.
    fn get_query_result(&self, query_id: i64) -> Result<Frame, HostError>;

    /// Run raw query text against a data source.
    fn run_query(&self, source: &SourceRef, query: &str) -> Result<Frame, HostError>;

    fn get_schema(&self, source: &SourceRef) -> Result<Vec<SchemaTable>, HostError>;

    fn current_user(&self) -> UserInfo;
}
