use std::num::NonZeroU32;

use crate::short_code::PasteId;
use crate::store::{Fields, StoreError};

mod field {
    pub const CONTENT: &str = "content";
    pub const CREATED_AT: &str = "created_at";
    pub const TTL_SECONDS: &str = "ttl_seconds";
    pub const MAX_VIEWS: &str = "max_views";
    pub const VIEWS: &str = "views";
}

pub use field::VIEWS as VIEWS_FIELD;

/// The store key a paste lives under.
pub fn key(id: &PasteId) -> String {
    format!("paste:{}", id)
}

/// The two independent ways a paste runs out. Either may be absent, which
/// means "no limit" and never "a limit of zero".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    pub ttl_seconds: Option<NonZeroU32>,
    pub max_views: Option<NonZeroU32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasteRecord {
    pub content: String,
    /// Milliseconds since the unix epoch.
    pub created_at: i64,
    pub policy: Policy,
    /// Successful reads so far, as observed when the record was fetched.
    pub views: i64,
}

impl PasteRecord {
    pub const fn new(content: String, created_at: i64, policy: Policy) -> Self {
        Self {
            content,
            created_at,
            policy,
            views: 0,
        }
    }

    /// Encodes the record as store fields. Unset limits become empty strings.
    pub fn into_fields(self) -> Fields {
        let limit = |value: Option<NonZeroU32>| value.map(|v| v.to_string()).unwrap_or_default();

        Fields::from([
            (field::CONTENT.to_owned(), self.content),
            (field::CREATED_AT.to_owned(), self.created_at.to_string()),
            (field::TTL_SECONDS.to_owned(), limit(self.policy.ttl_seconds)),
            (field::MAX_VIEWS.to_owned(), limit(self.policy.max_views)),
            (field::VIEWS.to_owned(), self.views.to_string()),
        ])
    }

    /// Decodes store fields. A hash without content (or with empty content)
    /// isn't a paste and yields `None`; a paste with unreadable fields is an
    /// error.
    pub fn from_fields(mut fields: Fields) -> Result<Option<Self>, StoreError> {
        let content = match fields.remove(field::CONTENT) {
            Some(content) if !content.is_empty() => content,
            _ => return Ok(None),
        };

        let created_at = match fields.get(field::CREATED_AT) {
            Some(value) => value.parse().map_err(|_| corrupt(field::CREATED_AT, value))?,
            None => return Err(corrupt(field::CREATED_AT, "")),
        };

        let views = match fields.get(field::VIEWS).map(String::as_str) {
            None | Some("") => 0,
            Some(value) => value
                .parse::<i64>()
                .ok()
                .filter(|views| *views >= 0)
                .ok_or_else(|| corrupt(field::VIEWS, value))?,
        };

        Ok(Some(Self {
            content,
            created_at,
            policy: Policy {
                ttl_seconds: decode_limit(&fields, field::TTL_SECONDS)?,
                max_views: decode_limit(&fields, field::MAX_VIEWS)?,
            },
            views,
        }))
    }

    /// When the paste stops being readable, in milliseconds since the epoch.
    pub fn expires_at(&self) -> Option<i64> {
        self.policy
            .ttl_seconds
            .map(|ttl| self.created_at.saturating_add(i64::from(ttl.get()) * 1000))
    }

    pub fn expired(&self, now: i64) -> bool {
        self.expires_at().map_or(false, |expires_at| now >= expires_at)
    }

    /// Whether the view count this record was fetched with already reached
    /// the limit.
    pub fn exhausted(&self) -> bool {
        self.policy
            .max_views
            .map_or(false, |max| self.views >= i64::from(max.get()))
    }

    /// Views left once the counter reads `views`, floored at zero.
    pub fn remaining_views(&self, views: i64) -> Option<u32> {
        self.policy.max_views.map(|max| {
            let remaining = (i64::from(max.get()) - views).max(0);
            u32::try_from(remaining).unwrap_or(0)
        })
    }
}

fn decode_limit(fields: &Fields, name: &'static str) -> Result<Option<NonZeroU32>, StoreError> {
    match fields.get(name).map(String::as_str) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<NonZeroU32>()
            .map(Some)
            .map_err(|_| corrupt(name, value)),
    }
}

fn corrupt(field: &'static str, value: &str) -> StoreError {
    StoreError::Corrupt {
        field,
        value: value.to_owned(),
    }
}
