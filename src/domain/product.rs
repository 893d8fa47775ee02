use {
    super::{id::ProductExtId, sync::SyncState},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Catalog product. `external_id` is set once and never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub active: bool,
    pub external_id: Option<ProductExtId>,
    pub sync_state: SyncState,
    pub sync_error: Option<String>,
    /// `created` of the last platform event applied to this document.
    pub remote_synced_at: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub title: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub external_id: Option<ProductExtId>,
    pub remote_synced_at: Option<i64>,
}

impl NewProduct {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            active: true,
            ..Self::default()
        }
    }

    pub fn into_product(self, sync_state: SyncState) -> Product {
        let now = Utc::now();
        let slug = self.slug.unwrap_or_else(|| slugify(&self.title));
        Product {
            id: Uuid::now_v7(),
            slug,
            title: self.title,
            description: self.description,
            active: self.active,
            external_id: self.external_id,
            sync_state,
            sync_error: None,
            remote_synced_at: self.remote_synced_at,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field-level edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
    pub active: Option<bool>,
    pub remote_synced_at: Option<i64>,
}

impl ProductPatch {
    pub fn changes(&self, product: &Product) -> bool {
        self.title.as_ref().is_some_and(|t| *t != product.title)
            || self.slug.as_ref().is_some_and(|s| *s != product.slug)
            || self
                .description
                .as_ref()
                .is_some_and(|d| *d != product.description)
            || self.active.is_some_and(|a| a != product.active)
            || self
                .remote_synced_at
                .is_some_and(|ts| Some(ts) != product.remote_synced_at)
    }

    pub fn apply(&self, product: &mut Product) {
        if let Some(title) = &self.title {
            product.title = title.clone();
        }
        if let Some(slug) = &self.slug {
            product.slug = slug.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(active) = self.active {
            product.active = active;
        }
        if let Some(ts) = self.remote_synced_at {
            product.remote_synced_at = Some(ts);
        }
    }
}

/// Lowercase ASCII slug: alphanumerics kept, every other run becomes one `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
