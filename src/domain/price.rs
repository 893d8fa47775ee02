use {
    super::{error::SyncError, id::PriceExtId, money::Money, sync::SyncState},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    Week,
    Month,
    Year,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Interval {
    type Error = SyncError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(SyncError::Validation(format!(
                "unknown billing interval: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurring {
    pub interval: Interval,
    pub interval_count: u32,
}

/// A price belongs to exactly one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: Uuid,
    pub product_id: Uuid,
    pub external_id: Option<PriceExtId>,
    pub money: Money,
    pub recurring: Option<Recurring>,
    pub nickname: Option<String>,
    pub active: bool,
    pub sync_state: SyncState,
    pub sync_error: Option<String>,
    pub remote_synced_at: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Price {
    pub fn is_recurring(&self) -> bool {
        self.recurring.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewPrice {
    pub product_id: Uuid,
    pub money: Money,
    pub recurring: Option<Recurring>,
    pub nickname: Option<String>,
    pub active: bool,
    pub external_id: Option<PriceExtId>,
    pub remote_synced_at: Option<i64>,
}

impl NewPrice {
    pub fn one_off(product_id: Uuid, money: Money) -> Self {
        Self {
            product_id,
            money,
            recurring: None,
            nickname: None,
            active: true,
            external_id: None,
            remote_synced_at: None,
        }
    }

    pub fn into_price(self, sync_state: SyncState) -> Price {
        let now = Utc::now();
        Price {
            id: Uuid::now_v7(),
            product_id: self.product_id,
            external_id: self.external_id,
            money: self.money,
            recurring: self.recurring,
            nickname: self.nickname,
            active: self.active,
            sync_state,
            sync_error: None,
            remote_synced_at: self.remote_synced_at,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricePatch {
    pub money: Option<Money>,
    pub recurring: Option<Option<Recurring>>,
    pub nickname: Option<Option<String>>,
    pub active: Option<bool>,
    pub remote_synced_at: Option<i64>,
}

impl PricePatch {
    pub fn changes(&self, price: &Price) -> bool {
        self.money.is_some_and(|m| m != price.money)
            || self.recurring.is_some_and(|r| r != price.recurring)
            || self
                .nickname
                .as_ref()
                .is_some_and(|n| *n != price.nickname)
            || self.active.is_some_and(|a| a != price.active)
            || self
                .remote_synced_at
                .is_some_and(|ts| Some(ts) != price.remote_synced_at)
    }

    pub fn apply(&self, price: &mut Price) {
        if let Some(money) = self.money {
            price.money = money;
        }
        if let Some(recurring) = self.recurring {
            price.recurring = recurring;
        }
        if let Some(nickname) = &self.nickname {
            price.nickname = nickname.clone();
        }
        if let Some(active) = self.active {
            price.active = active;
        }
        if let Some(ts) = self.remote_synced_at {
            price.remote_synced_at = Some(ts);
        }
    }
}

/// True when billing terms differ. Platform prices cannot change terms once created.
pub fn terms_changed(previous: &Price, incoming: &Price) -> bool {
    previous.money != incoming.money || previous.recurring != incoming.recurring
}
