//! Error types shared by the range enumerator, the scanner and interface selection.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Malformed mask, prefix or CIDR, or a subnet without usable hosts.
    /// Raised before any lookup is started.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A single reverse lookup attempt failed. Retried by the scanner and
    /// never surfaced past a resolution task.
    #[error("Lookup failure: {0}")]
    LookupFailure(String),

    /// `--resolver` named no IP that a resolver could be built on.
    #[error("{0}")]
    NoResolver(String),

    #[error("{0}")]
    NoInterface(String),

    #[error("{0}")]
    Selection(String),
}
