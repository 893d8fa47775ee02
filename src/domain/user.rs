use {
    super::{id::CustomerExtId, sync::SyncState},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// CMS user. Owns at most one platform customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub customer_id: Option<CustomerExtId>,
    pub sync_state: SyncState,
    pub sync_error: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
}

impl NewUser {
    pub fn into_user(self, sync_state: SyncState) -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            email: self.email,
            name: self.name,
            customer_id: None,
            sync_state,
            sync_error: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<Option<String>>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
    }
}
