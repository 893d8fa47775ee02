use {
    super::error::SyncError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Where a document write came from. Outbound hooks only run for `Local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOrigin {
    /// Authored in the CMS (admin UI, API, signup).
    Local,
    /// Applied from a verified platform event or a platform response.
    Remote,
}

/// Per-write context handed to every hook in the chain.
///
/// The origin travels with the single write it describes, so concurrent
/// writes to other documents never observe it.
#[derive(Debug, Clone)]
pub struct WriteContext {
    origin: SyncOrigin,
    actor: String,
}

impl WriteContext {
    pub fn local(actor: impl Into<String>) -> Self {
        Self {
            origin: SyncOrigin::Local,
            actor: actor.into(),
        }
    }

    pub fn remote(actor: impl Into<String>) -> Self {
        Self {
            origin: SyncOrigin::Remote,
            actor: actor.into(),
        }
    }

    pub fn origin(&self) -> SyncOrigin {
        self.origin
    }

    pub fn is_remote(&self) -> bool {
        self.origin == SyncOrigin::Remote
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}

/// Outbound mirror state of a local document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Synced,
    /// Local write committed, outbound call not finished yet.
    Syncing,
    /// Outbound call failed after retries; see the failure ledger.
    PendingRemoteSync,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Syncing => "syncing",
            Self::PendingRemoteSync => "pending_remote_sync",
        }
    }

    /// State a freshly written document starts in.
    pub fn for_origin(origin: SyncOrigin) -> Self {
        match origin {
            SyncOrigin::Local => Self::Syncing,
            SyncOrigin::Remote => Self::Synced,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SyncState {
    type Error = SyncError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "synced" => Ok(Self::Synced),
            "syncing" => Ok(Self::Syncing),
            "pending_remote_sync" => Ok(Self::PendingRemoteSync),
            other => Err(SyncError::Validation(format!("unknown sync state: {other}"))),
        }
    }
}
