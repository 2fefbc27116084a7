// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::cache_io::{Cache, CacheMode, CacheWrite};
use crate::errors::*;
use std::time::Duration;

/// An interface to cache storage.
///
/// Implementations are shared by many concurrent wrapper processes, so a
/// `put` must become visible atomically: a `get` racing with it sees either
/// `Cache::Miss` or the complete entry.
pub trait Storage: Send + Sync {
    /// Get a cache entry by `key`.
    ///
    /// If nothing fails but the entry is not found in the cache,
    /// it should return a `Cache::Miss`.
    /// If the entry is successfully found in the cache, it should
    /// return a `Cache::Hit`.
    fn get(&self, key: &str) -> Result<Cache>;

    /// Put `entry` in the cache under `key`, returning how long it took.
    fn put(&self, key: &str, entry: CacheWrite) -> Result<Duration>;

    /// Check the cache capability.
    ///
    /// - `Ok(CacheMode::ReadOnly)` means cache can only be used to `get`
    ///   cache.
    /// - `Ok(CacheMode::ReadWrite)` means cache can do both `get` and `put`.
    fn check(&self) -> Result<CacheMode> {
        Ok(CacheMode::ReadWrite)
    }

    /// Get the storage location.
    fn location(&self) -> String;

    /// Get the current storage usage, if applicable.
    fn current_size(&self) -> Result<Option<u64>>;

    /// Get the maximum storage size, if applicable.
    fn max_size(&self) -> Result<Option<u64>>;
}
