use uuid::Uuid;

/// Result of applying one verified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// New local document created.
    Created(Uuid),
    /// Existing document changed.
    Updated(Uuid),
    /// Event applied but nothing differed from what we hold.
    Unchanged(Uuid),
    /// Event is older than what we've already applied; no state change.
    Stale(Uuid),
    /// Transition is not valid for the order state machine; logged as anomaly.
    Anomaly(Uuid),
    /// Event id was already applied (redelivery).
    Duplicate,
    /// Acknowledged without any local effect.
    Ignored(String),
}

impl ProcessResult {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Unchanged(_) => "unchanged",
            Self::Stale(_) => "stale",
            Self::Anomaly(_) => "anomaly",
            Self::Duplicate => "duplicate",
            Self::Ignored(_) => "ignored",
        }
    }
}
