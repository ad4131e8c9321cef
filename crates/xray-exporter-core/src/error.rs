//! Shared error type across xray-exporter crates.

use thiserror::Error;

/// Why fetching one instance failed (stable label values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Connection refused, DNS failure, reset mid-body.
    Transport,
    /// The per-instance deadline elapsed.
    Timeout,
    /// Upstream answered with a non-2xx status.
    Status,
    /// Body was not a valid `/debug/vars` document.
    Decode,
}

impl FetchErrorKind {
    /// String representation used as the `kind` metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::Transport => "transport",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Status => "status",
            FetchErrorKind::Decode => "decode",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type used by core and bridge.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Unreadable or malformed configuration. Fatal at startup.
    #[error("config: {0}")]
    Config(String),
    /// One instance could not be polled. Recovered inside the scrape.
    #[error("fetch failed (server={server}, kind={kind}): {detail}")]
    Fetch {
        server: String,
        kind: FetchErrorKind,
        detail: String,
    },
    #[error("internal: {0}")]
    Internal(String),
}

impl ExporterError {
    pub fn fetch(server: impl Into<String>, kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        ExporterError::Fetch {
            server: server.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Fetch failure kind, if this is an instance fetch error.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            ExporterError::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExporterError::Fetch { .. })
    }
}
