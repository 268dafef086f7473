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

//! Key/field storage the paste lifecycle runs against.
//!
//! A [`Store`] holds hashes: every key maps to a set of string fields. All
//! atomicity the core relies on comes from here; each operation is atomic
//! with respect to every other operation on the same key.

use std::collections::HashMap;

use thiserror::Error;

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

pub type Fields = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),
    #[error("Failed to (de)serialize hash: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("Field `{field}` of `{key}` is not an integer")]
    NotAnInteger { key: String, field: String },
    #[error("Field `{field}` holds a malformed value: {value:?}")]
    Corrupt { field: &'static str, value: String },
    #[error("Store lock was poisoned")]
    Poisoned,
}

pub trait Store: Send + Sync {
    /// Every field of `key`, or `None` if the key does not exist.
    fn get_all_fields(&self, key: &str) -> Result<Option<Fields>, StoreError>;

    /// Creates `key` if needed and overwrites the given fields, leaving any
    /// other existing fields alone.
    fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError>;

    /// Adds `delta` to an integer field and returns the new value. A missing
    /// key or field counts as 0.
    fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    /// Like [`Store::increment_field`], but only if `key` already exists and
    /// the result would not exceed `limit`. Returns `None` when nothing was
    /// changed.
    fn increment_field_bounded(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        limit: i64,
    ) -> Result<Option<i64>, StoreError>;

    /// Removes `key` and all of its fields. Deleting a missing key is not an
    /// error.
    fn delete_key(&self, key: &str) -> Result<(), StoreError>;
}

/// Computes the value `field` would hold after adding `delta`. Both backends
/// call this while holding whatever guards `fields`.
fn incremented(fields: &Fields, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
    let not_an_integer = || StoreError::NotAnInteger {
        key: key.to_owned(),
        field: field.to_owned(),
    };

    let current = match fields.get(field) {
        Some(value) => value.parse::<i64>().map_err(|_| not_an_integer())?,
        None => 0,
    };

    current.checked_add(delta).ok_or_else(not_an_integer)
}
