use std::{fmt, time::Duration};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used to decide how a failure is handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The target object does not exist
    NotFound,
    /// A create raced with an earlier or concurrent create
    AlreadyExists,
    /// Optimistic concurrency precondition failed
    Conflict,
    /// Network or availability failure
    Transient,
    /// Rejected by the API server or admission as malformed
    Invalid,
    /// Contract violation, needs a human
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Transient => "Transient",
            ErrorKind::Invalid => "Invalid",
            ErrorKind::Fatal => "Fatal",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("ClusterScan {namespace}/{name} changed since it was fetched")]
    StatusConflict { namespace: String, name: String },

    #[error("Reconcile of {key} exceeded its deadline of {timeout:?}")]
    DeadlineExceeded { key: String, timeout: Duration },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cannot build owner reference for ClusterScan {0}")]
    OwnerReference(String),

    #[error("ClusterScan {0} has no namespace")]
    MissingNamespace(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::KubeError(e) => classify_kube_error(e),
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::StatusConflict { .. } => ErrorKind::Conflict,
            Error::DeadlineExceeded { .. } | Error::StoreUnavailable(_) => ErrorKind::Transient,
            Error::ConfigError(_) => ErrorKind::Invalid,
            Error::OwnerReference(_) | Error::MissingNamespace(_) => ErrorKind::Fatal,
        }
    }

    /// Determine if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Transient)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::ConfigError(e.to_string())
    }
}

fn classify_kube_error(e: &kube::Error) -> ErrorKind {
    match e {
        kube::Error::Api(ae) => classify_status(ae.code, &ae.reason),
        // transport, TLS and service errors are all worth another attempt
        _ => ErrorKind::Transient,
    }
}

/// Map an API server status code and reason onto an [`ErrorKind`]
pub fn classify_status(code: u16, reason: &str) -> ErrorKind {
    match code {
        404 => ErrorKind::NotFound,
        409 if reason == "AlreadyExists" => ErrorKind::AlreadyExists,
        409 => ErrorKind::Conflict,
        400 | 422 => ErrorKind::Invalid,
        401 | 403 => ErrorKind::Fatal,
        _ => ErrorKind::Transient,
    }
}
