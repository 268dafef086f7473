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

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{incremented, Fields, Store, StoreError};

/// Process-local store. A single lock covers every hash, so each operation is
/// trivially atomic. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    hashes: Mutex<HashMap<String, Fields>>,
}

impl MemoryStore {
    fn hashes(&self) -> Result<MutexGuard<'_, HashMap<String, Fields>>, StoreError> {
        self.hashes.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn get_all_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        Ok(self.hashes()?.get(key).cloned())
    }

    fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        self.hashes()?
            .entry(key.to_owned())
            .or_default()
            .extend(fields);
        Ok(())
    }

    fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut hashes = self.hashes()?;
        let fields = hashes.entry(key.to_owned()).or_default();
        let value = incremented(fields, key, field, delta)?;
        fields.insert(field.to_owned(), value.to_string());
        Ok(value)
    }

    fn increment_field_bounded(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        limit: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut hashes = self.hashes()?;
        let fields = match hashes.get_mut(key) {
            Some(fields) => fields,
            None => return Ok(None),
        };

        let value = incremented(fields, key, field, delta)?;
        if value > limit {
            return Ok(None);
        }

        fields.insert(field.to_owned(), value.to_string());
        Ok(Some(value))
    }

    fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.hashes()?.remove(key);
        Ok(())
    }
}
