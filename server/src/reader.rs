// Vanish Ephemeral Paste Hosting
// Copyright (C) 2021  Edward Shen
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The consume-and-check read.
//!
//! A read is a short sequence of store calls: fetch, decide, then either
//! delete or bump the counter. The only atomicity it needs is the store's
//! per-key increment.
//!
//! The exhaustion check looks at the view count fetched *before* this read's
//! increment. With [`ViewLimit::Loose`], `K` readers racing on the last view
//! can all pass the check and all succeed, delivering up to `K - 1` views
//! past the limit. [`ViewLimit::Strict`] replaces the plain increment with a
//! bounded one so only readers that actually claim a view succeed.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, instrument};
use vanish_common::{Gone, Limits, PasteView};

use crate::paste::{self, PasteRecord, VIEWS_FIELD};
use crate::short_code::PasteId;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("Paste not found")]
    NotFound,
    #[error("Paste expired")]
    Expired,
    #[error("Paste reached its view limit")]
    ViewLimitReached,
    #[error("Failed to read paste: {0}")]
    Storage(#[from] StoreError),
}

impl ConsumeError {
    /// The client facing reason, for the variants that mean the paste is gone.
    pub const fn gone(&self) -> Option<Gone> {
        match self {
            Self::NotFound => Some(Gone::NotFound),
            Self::Expired => Some(Gone::Expired),
            Self::ViewLimitReached => Some(Gone::ViewLimitReached),
            Self::Storage(_) => None,
        }
    }
}

/// How strictly concurrent reads honor a view limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewLimit {
    /// Check, then increment unconditionally. Racing readers may overshoot
    /// the limit by the number of racers.
    Loose,
    /// Increment only while the result stays within the limit.
    Strict,
}

/// A successful read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumed {
    pub content: String,
    pub remaining_views: Option<u32>,
    /// Milliseconds since the epoch.
    pub expires_at: Option<i64>,
}

impl From<Consumed> for PasteView {
    fn from(consumed: Consumed) -> Self {
        Self {
            content: consumed.content,
            limits: Limits {
                remaining_views: consumed.remaining_views,
                expires_at: consumed
                    .expires_at
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            },
        }
    }
}

pub struct PasteReader {
    store: Arc<dyn Store>,
    view_limit: ViewLimit,
}

impl PasteReader {
    pub fn new(store: Arc<dyn Store>, view_limit: ViewLimit) -> Self {
        Self { store, view_limit }
    }

    /// Reads a paste at time `now` (milliseconds since the epoch), counting
    /// the view. A paste found past either limit is deleted before the
    /// failure is returned, so no later read sees it alive.
    #[instrument(skip(self))]
    pub fn consume(&self, id: &PasteId, now: i64) -> Result<Consumed, ConsumeError> {
        let key = paste::key(id);

        let fields = self
            .store
            .get_all_fields(&key)?
            .ok_or(ConsumeError::NotFound)?;

        let record = match PasteRecord::from_fields(fields)? {
            Some(record) => record,
            // A counter bumped after a racing reader deleted the paste
            // recreates the key with nothing but `views`.
            None => {
                self.store.delete_key(&key)?;
                debug!(%id, "Deleted leftover counter");
                return Err(ConsumeError::NotFound);
            }
        };

        // Time is checked first; a paste past both limits reads as expired.
        if record.expired(now) {
            self.store.delete_key(&key)?;
            debug!(%id, "Deleted expired paste");
            return Err(ConsumeError::Expired);
        }

        if record.exhausted() {
            self.store.delete_key(&key)?;
            debug!(%id, views = record.views, "Deleted exhausted paste");
            return Err(ConsumeError::ViewLimitReached);
        }

        let views = match (self.view_limit, record.policy.max_views) {
            (ViewLimit::Strict, Some(max)) => {
                let limit = i64::from(max.get());
                match self
                    .store
                    .increment_field_bounded(&key, VIEWS_FIELD, 1, limit)?
                {
                    Some(views) => views,
                    // Another reader claimed the last view, or already
                    // deleted the paste.
                    None => {
                        self.store.delete_key(&key)?;
                        debug!(%id, "Lost the race for the last view");
                        return Err(ConsumeError::ViewLimitReached);
                    }
                }
            }
            _ => self.store.increment_field(&key, VIEWS_FIELD, 1)?,
        };

        Ok(Consumed {
            remaining_views: record.remaining_views(views),
            expires_at: record.expires_at(),
            content: record.content,
        })
    }
}
