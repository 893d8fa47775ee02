use {
    crate::{
        domain::{error::SyncError, platform::BoxFuture, user::User},
        infra::store::DocumentStore,
    },
    axum::http::HeaderMap,
    std::sync::Arc,
    uuid::Uuid,
};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolves the signed-in CMS user for a request.
pub trait SessionResolver: Send + Sync {
    fn resolve<'a>(&'a self, headers: &'a HeaderMap) -> BoxFuture<'a, Result<User, SyncError>>;
}

/// Trusts the user id header set by the CMS gateway in front of this service.
pub struct HeaderSessionResolver {
    store: Arc<dyn DocumentStore>,
}

impl HeaderSessionResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn resolve_inner(&self, headers: &HeaderMap) -> Result<User, SyncError> {
        let raw = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SyncError::Unauthorized("no authenticated user".into()))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| SyncError::Unauthorized(format!("malformed user id: {raw}")))?;
        self.store
            .user(id)
            .await?
            .ok_or_else(|| SyncError::Unauthorized(format!("unknown user: {id}")))
    }
}

impl SessionResolver for HeaderSessionResolver {
    fn resolve<'a>(&'a self, headers: &'a HeaderMap) -> BoxFuture<'a, Result<User, SyncError>> {
        Box::pin(self.resolve_inner(headers))
    }
}
