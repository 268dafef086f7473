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

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rocksdb::DB;

use super::{incremented, Fields, Store, StoreError};

const LOCK_STRIPES: usize = 64;

/// Persistent store on RocksDB. Each key holds its bincode-encoded field map.
///
/// RocksDB only offers atomic puts of whole values, so every read-modify-write
/// (and every delete, so it can't interleave with one) first takes one of a
/// fixed set of locks picked by hashing the key. Plain reads take no lock.
pub struct RocksStore {
    db: DB,
    stripes: Vec<Mutex<()>>,
}

impl RocksStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            db: DB::open_default(path)?,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    fn lock(&self, key: &str) -> Result<MutexGuard<'_, ()>, StoreError> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let stripe = (hasher.finish() % LOCK_STRIPES as u64) as usize;
        self.stripes[stripe].lock().map_err(|_| StoreError::Poisoned)
    }

    fn read(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        match self.db.get_pinned(key)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, fields: &Fields) -> Result<(), StoreError> {
        self.db.put(key, bincode::serialize(fields)?)?;
        Ok(())
    }
}

impl Store for RocksStore {
    fn get_all_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        self.read(key)
    }

    fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        let _guard = self.lock(key)?;
        let mut existing = self.read(key)?.unwrap_or_default();
        existing.extend(fields);
        self.write(key, &existing)
    }

    fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let _guard = self.lock(key)?;
        let mut fields = self.read(key)?.unwrap_or_default();
        let value = incremented(&fields, key, field, delta)?;
        fields.insert(field.to_owned(), value.to_string());
        self.write(key, &fields)?;
        Ok(value)
    }

    fn increment_field_bounded(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        limit: i64,
    ) -> Result<Option<i64>, StoreError> {
        let _guard = self.lock(key)?;
        let mut fields = match self.read(key)? {
            Some(fields) => fields,
            None => return Ok(None),
        };

        let value = incremented(&fields, key, field, delta)?;
        if value > limit {
            return Ok(None);
        }

        fields.insert(field.to_owned(), value.to_string());
        self.write(key, &fields)?;
        Ok(Some(value))
    }

    fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock(key)?;
        self.db.delete(key)?;
        Ok(())
    }
}
