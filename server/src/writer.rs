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

use std::num::NonZeroU32;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, instrument};
use vanish_common::{view_url, CreatePaste, CreatedPaste, Url, MAX_TTL_SECONDS, MAX_VIEWS};

use crate::paste::{self, PasteRecord, Policy};
use crate::short_code::{Generator, PasteId};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum CreateError {
    /// The request is malformed; the message names the violated constraint.
    #[error("{0}")]
    Validation(String),
    #[error("Failed to store paste: {0}")]
    Storage(#[from] StoreError),
}

/// Validates new pastes and persists them.
pub struct PasteWriter {
    store: Arc<dyn Store>,
    base_url: Url,
}

impl PasteWriter {
    pub fn new(store: Arc<dyn Store>, base_url: Url) -> Self {
        Self { store, base_url }
    }

    /// Stores `request` as a new paste created at `now` (milliseconds since
    /// the epoch) and returns its id and link. Invalid requests never reach
    /// the store.
    #[instrument(skip(self, request), fields(len = request.content.len()))]
    pub fn create(&self, request: CreatePaste, now: i64) -> Result<CreatedPaste, CreateError> {
        let policy = validate(&request)?;

        // Ids carry enough entropy that we don't look for collisions.
        let id: PasteId = rand::thread_rng().sample(Generator);
        let record = PasteRecord::new(request.content, now, policy);

        self.store
            .set_fields(&paste::key(&id), record.into_fields())
            .map_err(|e| {
                error!("Failed to insert paste into store: {}", e);
                e
            })?;

        debug!(%id, ?policy, "Created paste");

        let id = id.to_string();
        let url = view_url(&self.base_url, &id);
        Ok(CreatedPaste { id, url })
    }
}

/// Checks a request against the content and limit rules, producing the
/// policy to store.
pub fn validate(request: &CreatePaste) -> Result<Policy, CreateError> {
    if request.content.trim().is_empty() {
        return Err(CreateError::Validation("content required".to_owned()));
    }

    Ok(Policy {
        ttl_seconds: bounded(request.ttl_seconds, MAX_TTL_SECONDS, "ttl_seconds")?,
        max_views: bounded(request.max_views, MAX_VIEWS, "max_views")?,
    })
}

fn bounded(value: Option<i64>, max: u32, name: &str) -> Result<Option<NonZeroU32>, CreateError> {
    let value = match value {
        Some(value) => value,
        None => return Ok(None),
    };

    u32::try_from(value)
        .ok()
        .filter(|value| *value <= max)
        .and_then(NonZeroU32::new)
        .map(Some)
        .ok_or_else(|| CreateError::Validation(bound_message(name, max)))
}

/// The complaint for a limit that is missing its bounds or isn't a number.
pub fn bound_message(name: &str, max: u32) -> String {
    format!("{} must be between 1 and {}", name, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::FailingStore;
    use crate::store::MemoryStore;

    fn request(content: &str, ttl_seconds: Option<i64>, max_views: Option<i64>) -> CreatePaste {
        CreatePaste {
            content: content.to_owned(),
            ttl_seconds,
            max_views,
        }
    }

    fn writer() -> (PasteWriter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let base = Url::parse("http://localhost:8080").unwrap();
        (PasteWriter::new(store.clone(), base), store)
    }

    fn validation_message(request: &CreatePaste) -> String {
        match validate(request) {
            Err(CreateError::Validation(message)) => message,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn blank_content_is_rejected() {
        for content in ["", "   ", "\n\t "] {
            assert_eq!(
                validation_message(&request(content, None, None)),
                "content required"
            );
        }
    }

    #[test]
    fn ttl_must_be_within_bounds() {
        for ttl in [0, -1, 604_801, i64::MAX] {
            assert_eq!(
                validation_message(&request("x", Some(ttl), None)),
                "ttl_seconds must be between 1 and 604800"
            );
        }

        let policy = validate(&request("x", Some(604_800), None)).unwrap();
        assert_eq!(policy.ttl_seconds, NonZeroU32::new(604_800));
        assert!(validate(&request("x", Some(1), None)).is_ok());
    }

    #[test]
    fn max_views_must_be_within_bounds() {
        for views in [0, -5, 101] {
            assert_eq!(
                validation_message(&request("x", None, Some(views))),
                "max_views must be between 1 and 100"
            );
        }

        let policy = validate(&request("x", None, Some(100))).unwrap();
        assert_eq!(policy.max_views, NonZeroU32::new(100));
    }

    #[test]
    fn invalid_requests_never_reach_the_store() {
        let store = Arc::new(FailingStore::default());
        let writer = PasteWriter::new(store.clone(), Url::parse("http://localhost").unwrap());

        for bad in [
            request(" ", None, None),
            request("x", Some(0), None),
            request("x", None, Some(101)),
        ] {
            assert!(matches!(
                writer.create(bad, 0),
                Err(CreateError::Validation(_))
            ));
        }
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn failed_write_is_a_storage_error() {
        let store = Arc::new(FailingStore::default());
        let writer = PasteWriter::new(store.clone(), Url::parse("http://localhost").unwrap());

        assert!(matches!(
            writer.create(request("hello", Some(60), None), 0),
            Err(CreateError::Storage(StoreError::Poisoned))
        ));
        assert_eq!(store.calls(), 1);
    }

    #[test]
    fn create_stores_a_fresh_record() {
        let (writer, store) = writer();
        let created = writer
            .create(request("hello", Some(60), Some(2)), 1000)
            .unwrap();

        assert_eq!(
            created.url.as_str(),
            format!("http://localhost:8080/p/{}", created.id)
        );

        let fields = store
            .get_all_fields(&format!("paste:{}", created.id))
            .unwrap()
            .unwrap();
        assert_eq!(fields["content"], "hello");
        assert_eq!(fields["created_at"], "1000");
        assert_eq!(fields["ttl_seconds"], "60");
        assert_eq!(fields["max_views"], "2");
        assert_eq!(fields["views"], "0");
    }

    #[test]
    fn content_is_stored_untrimmed() {
        let (writer, store) = writer();
        let created = writer.create(request("  padded\n", None, None), 0).unwrap();
        let fields = store
            .get_all_fields(&format!("paste:{}", created.id))
            .unwrap()
            .unwrap();
        assert_eq!(fields["content"], "  padded\n");
        assert_eq!(fields["ttl_seconds"], "");
    }

    #[test]
    fn each_paste_gets_its_own_id() {
        let (writer, _store) = writer();
        let a = writer.create(request("a", None, None), 0).unwrap();
        let b = writer.create(request("a", None, None), 0).unwrap();
        assert_ne!(a.id, b.id);
    }
}
