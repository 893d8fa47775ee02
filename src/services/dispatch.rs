use {
    crate::{
        domain::{
            audit::ProcessedEvent,
            error::SyncError,
            event::{EventKind, VerifiedEvent},
            outcome::ProcessResult,
            platform::BoxFuture,
        },
        infra::store::DocumentStore,
    },
    std::{collections::HashMap, sync::Arc},
};

/// Applies one family of verified events to local documents.
///
/// Handlers must be idempotent: a failed event is redelivered by the
/// platform and may have been partly applied.
pub trait EventHandler: Send + Sync {
    fn handle<'a>(&'a self, event: &'a VerifiedEvent)
    -> BoxFuture<'a, Result<ProcessResult, SyncError>>;
}

/// Subscribed event types and the handler each one goes to.
#[derive(Default, Clone)]
pub struct WebhookRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown event types are a configuration error, caught at startup.
    pub fn register(
        &mut self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), SyncError> {
        let kind: EventKind = event_type.trim().parse()?;
        if self.handlers.insert(kind, handler).is_some() {
            return Err(SyncError::Config(format!(
                "webhook event type registered twice: {kind}"
            )));
        }
        Ok(())
    }

    pub fn handler(&self, kind: EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&kind)
    }

    pub fn subscribed(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

/// Dedup by event id, route to the registered handler, record the outcome.
pub struct EventProcessor {
    store: Arc<dyn DocumentStore>,
    registry: WebhookRegistry,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn DocumentStore>, registry: WebhookRegistry) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &WebhookRegistry {
        &self.registry
    }

    /// Errors other than validation are returned unrecorded so the platform
    /// redelivers the event.
    pub async fn process(&self, event: &VerifiedEvent) -> Result<ProcessResult, SyncError> {
        let Some(handler) = event.kind().and_then(|kind| self.registry.handler(kind)) else {
            tracing::info!(event_type = event.event_type(), "event type not subscribed, ignored");
            return Ok(ProcessResult::Ignored(format!(
                "{} is not subscribed",
                event.event_type()
            )));
        };

        if self.store.is_event_processed(event.id()).await? {
            return Ok(ProcessResult::Duplicate);
        }

        let result = match handler.handle(event).await {
            Ok(result) => result,
            Err(SyncError::Validation(msg)) => {
                tracing::warn!(event_type = event.event_type(), "skipping invalid event data: {msg}");
                ProcessResult::Ignored(msg)
            }
            Err(e) => return Err(e),
        };

        let recorded = self
            .store
            .mark_event_processed(&ProcessedEvent {
                event_id: event.id().clone(),
                event_type: event.event_type().to_string(),
                provider_ts: event.created(),
                outcome: result.status().to_string(),
            })
            .await?;
        if !recorded {
            // A concurrent delivery of the same event finished first.
            return Ok(ProcessResult::Duplicate);
        }
        Ok(result)
    }
}
