use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::SyncError;

fn check_prefix(kind: &str, prefix: &str, id: &str) -> Result<(), SyncError> {
    if !id.starts_with(prefix) || id.len() == prefix.len() {
        return Err(SyncError::Validation(format!(
            "{kind} must start with {prefix}, got: {id}"
        )));
    }
    Ok(())
}

/// Platform product identifier (`prod_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductExtId(String);

impl ProductExtId {
    pub const PREFIX: &'static str = "prod_";

    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        check_prefix("ProductExtId", Self::PREFIX, &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Platform price identifier (`price_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceExtId(String);

impl PriceExtId {
    pub const PREFIX: &'static str = "price_";

    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        check_prefix("PriceExtId", Self::PREFIX, &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Platform customer identifier (`cus_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerExtId(String);

impl CustomerExtId {
    pub const PREFIX: &'static str = "cus_";

    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        check_prefix("CustomerExtId", Self::PREFIX, &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Platform invoice identifier (`in_xxx`). Orders are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    pub const PREFIX: &'static str = "in_";

    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        check_prefix("InvoiceId", Self::PREFIX, &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Webhook event identifier (`evt_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub const PREFIX: &'static str = "evt_";

    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        check_prefix("EventId", Self::PREFIX, &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
